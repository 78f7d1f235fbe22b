use uuid::Uuid;

use crate::{required, Error, User, UserId, STUB_UUID};

pub const BCRYPT_COST: u32 = 10;

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    /// Username or email
    #[serde(default)]
    pub identification: String,
    #[serde(default)]
    pub password: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        required(&self.identification)?;
        required(&self.password)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub avatar: String,
    pub followers_count: usize,
    pub following_count: usize,
}

impl Session {
    pub fn new(token: String, u: &User) -> Session {
        Session {
            token,
            user_id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            bio: u.bio.clone().unwrap_or_default(),
            avatar: u.avatar.clone(),
            followers_count: u.followers.len(),
            following_count: u.following.len(),
        }
    }
}

/// Token granting access to the admin routes
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}
