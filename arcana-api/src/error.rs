use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing or empty fields")]
    MissingFields,

    #[error("Invalid ID format {0:?}")]
    InvalidId(String),

    #[error("Content exceeds maximum length of {0} characters")]
    ContentTooLong(usize),

    #[error("Replies cannot nest deeper than {0} levels")]
    ReplyTooDeep(usize),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Already liked")]
    AlreadyLiked,

    #[error("Not liked")]
    NotLiked,

    #[error("Users cannot target themselves")]
    SelfTarget,

    #[error("No metadata result")]
    NoMetadata,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MissingFields => StatusCode::BAD_REQUEST,
            Error::InvalidId(_) => StatusCode::BAD_REQUEST,
            Error::ContentTooLong(_) => StatusCode::BAD_REQUEST,
            Error::ReplyTooDeep(_) => StatusCode::BAD_REQUEST,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::AlreadyLiked => StatusCode::CONFLICT,
            Error::NotLiked => StatusCode::NOT_FOUND,
            Error::SelfTarget => StatusCode::BAD_REQUEST,
            Error::NoMetadata => StatusCode::NOT_FOUND,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::Unauthenticated => json!({
                "message": "authentication required",
                "type": "unauthenticated",
            }),
            Error::NotFound(what) => json!({
                "message": format!("{what} not found"),
                "type": "not-found",
                "what": what,
            }),
            Error::MissingFields => json!({
                "message": "missing or empty fields",
                "type": "missing-fields",
            }),
            Error::InvalidId(id) => json!({
                "message": "invalid id format",
                "type": "invalid-id",
                "id": id,
            }),
            Error::ContentTooLong(max) => json!({
                "message": format!("content exceeds maximum length of {max} characters"),
                "type": "content-too-long",
                "max": max,
            }),
            Error::ReplyTooDeep(max) => json!({
                "message": format!("replies cannot nest deeper than {max} levels"),
                "type": "reply-too-deep",
                "max": max,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::AlreadyLiked => json!({
                "message": "already liked",
                "type": "already-liked",
            }),
            Error::NotLiked => json!({
                "message": "is not liked",
                "type": "not-liked",
            }),
            Error::SelfTarget => json!({
                "message": "users cannot target themselves",
                "type": "self-target",
            }),
            Error::NoMetadata => json!({
                "message": "no result",
                "type": "no-metadata",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error contents has no string field {name:?}"))
        };
        let max = || {
            data.get("max")
                .and_then(|m| m.as_u64())
                .and_then(|m| usize::try_from(m).ok())
                .ok_or_else(|| anyhow!("error contents has no max"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(field("message").unwrap_or_default()),
                "permission-denied" => Error::PermissionDenied,
                "unauthenticated" => Error::Unauthenticated,
                "not-found" => Error::NotFound(field("what")?),
                "missing-fields" => Error::MissingFields,
                "invalid-id" => Error::InvalidId(field("id")?),
                "content-too-long" => Error::ContentTooLong(max()?),
                "reply-too-deep" => Error::ReplyTooDeep(max()?),
                "conflict-name" => Error::NameAlreadyUsed(field("name")?),
                "already-liked" => Error::AlreadyLiked,
                "not-liked" => Error::NotLiked,
                "self-target" => Error::SelfTarget,
                "no-metadata" => Error::NoMetadata,
                "null-byte" => Error::NullByteInString(field("string")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_parse_back_from_their_contents() {
        for err in [
            Error::Unknown(String::from("boom")),
            Error::PermissionDenied,
            Error::Unauthenticated,
            Error::NotFound(String::from("comment")),
            Error::MissingFields,
            Error::InvalidId(String::from("zzz")),
            Error::ContentTooLong(500),
            Error::ReplyTooDeep(50),
            Error::NameAlreadyUsed(String::from("alice")),
            Error::AlreadyLiked,
            Error::NotLiked,
            Error::SelfTarget,
            Error::NoMetadata,
            Error::NullByteInString(String::from("a\0b")),
        ] {
            assert_eq!(Error::parse(&err.contents()).unwrap(), err);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Error::parse(br#"{"type": "teapot"}"#).is_err());
        assert!(Error::parse(b"not json").is_err());
    }
}
