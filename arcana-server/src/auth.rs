use anyhow::Context;
use arcana_api::{Time, User, UserId, Uuid};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

#[cfg(not(test))]
const BCRYPT_COST: u32 = arcana_api::BCRYPT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

#[derive(Debug, serde::Deserialize, serde::Serialize)]
struct Claims {
    sub: Uuid,
    username: String,
    iat: i64,
    exp: i64,
}

/// HS256 signing material for session tokens
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl: chrono::Duration) -> JwtKeys {
        JwtKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, u: &User, now: Time) -> anyhow::Result<String> {
        let claims = Claims {
            sub: u.id.0,
            username: u.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .with_context(|| format!("signing session token for user {}", u.id))
    }

    /// Returns the user the token was issued to, if it is well-signed and not expired
    pub fn verify(&self, token: &str) -> Option<UserId> {
        let validation = Validation::new(Algorithm::HS256);
        match jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Some(UserId(data.claims.sub)),
            Err(err) => {
                tracing::debug!(?err, "rejecting session token");
                None
            }
        }
    }
}

pub async fn hash_password(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .context("joining password hashing task")?
        .context("hashing password")
}

pub async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("joining password verification task")?
        .context("verifying password")
}

#[cfg(test)]
mod tests {
    use arcana_api::NewUser;
    use chrono::{Duration, Utc};

    use super::*;

    fn user() -> User {
        NewUser {
            username: String::from("alice"),
            password: String::from("pass"),
            email: String::from("alice@example.com"),
            first_name: String::from("Alice"),
            last_name: String::from("Liddell"),
        }
        .into_user(String::new(), Utc::now())
    }

    #[test]
    fn tokens_verify_with_the_same_secret_only() {
        let u = user();
        let keys = JwtKeys::new(b"secret", Duration::hours(24));
        let token = keys.issue(&u, Utc::now()).unwrap();
        assert_eq!(keys.verify(&token), Some(u.id));

        let other = JwtKeys::new(b"other secret", Duration::hours(24));
        assert_eq!(other.verify(&token), None);
        assert_eq!(keys.verify("not.a.token"), None);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let u = user();
        let keys = JwtKeys::new(b"secret", Duration::hours(1));
        let token = keys
            .issue(&u, Utc::now() - Duration::hours(3))
            .unwrap();
        assert_eq!(keys.verify(&token), None);
    }

    #[tokio::test]
    async fn passwords_round_trip_through_bcrypt() {
        let hash = hash_password(String::from("hunter22")).await.unwrap();
        assert!(verify_password(String::from("hunter22"), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password(String::from("hunter23"), hash).await.unwrap());
    }
}
