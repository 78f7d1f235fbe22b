use crate::{validate_string, Error, MessageId, Time, UserId};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub read: bool,
    pub created_at: Time,
}

impl Message {
    pub fn between(&self, a: UserId, b: UserId) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }

    pub fn peer_of(&self, me: UserId) -> UserId {
        if self.sender == me {
            self.receiver
        } else {
            self.sender
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub content: String,
}

impl NewMessage {
    pub fn validate(&self) -> Result<UserId, Error> {
        let receiver = self.receiver_id.ok_or(Error::MissingFields)?;
        validate_string(&self.content)?;
        if self.content.is_empty() {
            return Err(Error::MissingFields);
        }
        Ok(receiver)
    }

    pub fn into_message(self, sender: UserId, receiver: UserId, now: Time) -> Message {
        Message {
            id: MessageId::new(),
            sender,
            receiver,
            content: self.content,
            read: false,
            created_at: now,
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversation {
    pub user_id: UserId,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadTotal {
    pub total: u64,
    pub last_message: Option<Message>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UnreadCount {
    pub count: u64,
}
