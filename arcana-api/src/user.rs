use std::collections::HashMap;

use crate::{normalize_login, required, validate_string, Error, Time, UserId};

pub const DEFAULT_AVATAR: &str = "/assets/default-avatar.png";

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub avatar: String,

    /// Last token handed out at signin, cleared on logout
    pub token: Option<String>,

    /// Peer id to the date the relationship started
    pub followers: HashMap<UserId, Time>,
    pub following: HashMap<UserId, Time>,

    pub created_at: Time,
    pub updated_at: Time,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            bio: self.bio.clone(),
            avatar: self.avatar.clone(),
            followers: connections(&self.followers),
            following: connections(&self.following),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn is_following(&self, peer: UserId) -> bool {
        self.following.contains_key(&peer)
    }
}

/// Relationship entries in the order they were created
pub fn connections(peers: &HashMap<UserId, Time>) -> Vec<Connection> {
    let mut res = peers
        .iter()
        .map(|(user_id, date)| Connection {
            user_id: *user_id,
            date: *date,
        })
        .collect::<Vec<_>>();
    res.sort_by(|a, b| a.date.cmp(&b.date).then(a.user_id.cmp(&b.user_id)));
    res
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub user_id: UserId,
    pub date: Time,
}

/// Display fields attached to records that reference a user
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub avatar: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub avatar: String,
    pub followers: Vec<Connection>,
    pub following: Vec<Connection>,
    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), Error> {
        required(&self.username)?;
        required(&self.password)?;
        required(&self.email)?;
        required(&self.first_name)?;
        required(&self.last_name)?;
        Ok(())
    }

    /// Builds the record to store, `password_hash` being the already-hashed password
    pub fn into_user(self, password_hash: String, now: Time) -> User {
        User {
            id: UserId::new(),
            username: normalize_login(&self.username),
            email: normalize_login(&self.email),
            password_hash,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            bio: None,
            avatar: String::from(DEFAULT_AVATAR),
            token: None,
            followers: HashMap::new(),
            following: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUp {
    pub user_id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

impl UserUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        for field in [
            &self.username,
            &self.email,
            &self.first_name,
            &self.last_name,
            &self.avatar,
        ]
        .into_iter()
        .flatten()
        {
            required(field)?;
        }
        if let Some(bio) = &self.bio {
            validate_string(bio)?;
        }
        Ok(())
    }

    pub fn apply(self, u: &mut User, now: Time) {
        if let Some(username) = self.username {
            u.username = normalize_login(&username);
        }
        if let Some(email) = self.email {
            u.email = normalize_login(&email);
        }
        if let Some(first_name) = self.first_name {
            u.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = self.last_name {
            u.last_name = last_name.trim().to_string();
        }
        if let Some(bio) = self.bio {
            u.bio = Some(bio);
        }
        if let Some(avatar) = self.avatar {
            u.avatar = avatar.trim().to_string();
        }
        u.updated_at = now;
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub target_user_id: UserId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowAction {
    Followed,
    Unfollowed,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FollowOutcome {
    pub action: FollowAction,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Connections {
    pub following: Vec<UserId>,
    pub followers: Vec<UserId>,
}

/// A relationship entry with the peer's display fields, absent when the peer is gone
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub user_id: UserId,
    pub date: Time,
    pub user: Option<UserSummary>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn signup_requires_every_field() {
        let mut u = NewUser {
            username: String::from("Alice"),
            password: String::from("hunter22"),
            email: String::from(" Alice@Example.com "),
            first_name: String::from("Alice"),
            last_name: String::from("Liddell"),
        };
        assert_eq!(u.validate(), Ok(()));
        let rec = u.clone().into_user(String::from("hash"), Utc::now());
        assert_eq!(rec.username, "alice");
        assert_eq!(rec.email, "alice@example.com");
        assert_eq!(rec.avatar, DEFAULT_AVATAR);

        u.last_name = String::from("  ");
        assert_eq!(u.validate(), Err(Error::MissingFields));
    }

    #[test]
    fn connections_are_chronological() {
        let (a, b) = (UserId::new(), UserId::new());
        let mut peers = HashMap::new();
        peers.insert(a, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        peers.insert(b, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let res = connections(&peers);
        assert_eq!(
            res.iter().map(|c| c.user_id).collect::<Vec<_>>(),
            vec![b, a]
        );
    }
}
