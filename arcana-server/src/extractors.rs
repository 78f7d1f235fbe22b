use std::sync::Arc;

use anyhow::Context;
use arcana_api::{AuthToken, Db, Error as ApiError, User, Uuid};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{self, request},
};

use crate::{auth::JwtKeys, covers::CoverHandle, metadata::MetadataClient, Error};

pub type DbHandle = Arc<dyn Db>;

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: DbHandle,
    pub keys: JwtKeys,
    pub metadata: MetadataClient,
    pub covers: CoverHandle,
    pub admin_token: Option<AuthToken>,
}

/// Raw bearer token, not checked against anything yet
pub struct PreAuth(pub String);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::unauthenticated()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::unauthenticated())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::unauthenticated())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::unauthenticated());
                }
                let token = auth.next().ok_or(Error::unauthenticated())?;
                if auth.next().is_some() || token.is_empty() {
                    return Err(Error::unauthenticated());
                }
                Ok(PreAuth(String::from(token)))
            }
        }
    }
}

/// The signed-in user: the token must verify and still be the one stored on the user
pub struct Auth(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let user_id = state.keys.verify(&token).ok_or(Error::unauthenticated())?;
        let user = state
            .db
            .find_user(user_id)
            .await
            .with_context(|| format!("recovering session of user {user_id}"))?
            .ok_or(Error::unauthenticated())?;
        if user.token.as_deref() != Some(token.as_str()) {
            return Err(Error::unauthenticated());
        }
        Ok(Auth(user))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let token = Uuid::try_parse(&token).map_err(|_| Error::permission_denied())?;
        if Some(AuthToken(token)) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}

/// Single path parameter parsed as an id, rejected with a 400 when malformed
pub struct Id<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Id<T>
where
    T: From<Uuid> + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<Id<T>, Error> {
        let Path(raw) = Path::<String>::from_request_parts(req, state)
            .await
            .map_err(|_| Error::Api(ApiError::InvalidId(String::new())))?;
        match Uuid::try_parse(&raw) {
            Ok(id) => Ok(Id(T::from(id))),
            Err(_) => Err(Error::Api(ApiError::InvalidId(raw))),
        }
    }
}
