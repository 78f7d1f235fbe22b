use anyhow::Context;
use arcana_api::{
    connections, normalize_login, Connections, Error as ApiError, FollowAction, FollowOutcome,
    FollowRequest, NewSession, NewUser, PeerEntry, Profile, Session, SignedUp, User, UserId,
    UserUpdate,
};
use axum::{extract::State, Json};

use super::{now, summaries};
use crate::{auth, auth::JwtKeys, extractors::*, Error};

pub async fn signup(
    State(db): State<DbHandle>,
    Json(data): Json<NewUser>,
) -> Result<Json<SignedUp>, Error> {
    data.validate()?;
    let username = normalize_login(&data.username);
    let email = normalize_login(&data.email);
    if db
        .find_conflicting_user(&username, &email, None)
        .await
        .context("checking for existing users")?
        .is_some()
    {
        return Err(Error::name_already_used(username));
    }
    let hash = auth::hash_password(data.password.clone()).await?;
    let user = data.into_user(hash, now());
    db.create_user(&user).await?;
    tracing::info!(user = %user.id, "signed up");
    Ok(Json(SignedUp {
        user_id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
    }))
}

pub async fn signin(
    State(db): State<DbHandle>,
    State(keys): State<JwtKeys>,
    Json(data): Json<NewSession>,
) -> Result<Json<Session>, Error> {
    data.validate()?;
    let login = normalize_login(&data.identification);
    let mut user = db
        .find_user_by_login(&login)
        .await
        .context("looking up user for signin")?
        .ok_or(Error::permission_denied())?;
    if !auth::verify_password(data.password, user.password_hash.clone()).await? {
        return Err(Error::permission_denied());
    }
    let token = keys.issue(&user, now())?;
    db.set_user_token(user.id, Some(&token)).await?;
    user.token = Some(token.clone());
    Ok(Json(Session::new(token, &user)))
}

pub async fn logout(Auth(user): Auth, State(db): State<DbHandle>) -> Result<(), Error> {
    db.set_user_token(user.id, None)
        .await
        .with_context(|| format!("logging out user {}", user.id))?;
    Ok(())
}

pub async fn me(Auth(user): Auth) -> Json<Profile> {
    Json(user.profile())
}

pub async fn follow(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<FollowRequest>,
) -> Result<Json<FollowOutcome>, Error> {
    let target = data.target_user_id;
    if target == me.id {
        return Err(Error::Api(ApiError::SelfTarget));
    }
    db.find_user(target)
        .await?
        .ok_or_else(|| Error::not_found("user"))?;
    let action = if me.is_following(target) {
        db.remove_following(me.id, target).await?;
        db.remove_follower(target, me.id).await?;
        FollowAction::Unfollowed
    } else {
        let at = now();
        db.add_following(me.id, target, at).await?;
        db.add_follower(target, me.id, at).await?;
        FollowAction::Followed
    };
    Ok(Json(FollowOutcome { action }))
}

async fn find_user(db: &DbHandle, id: UserId) -> Result<User, Error> {
    db.find_user(id)
        .await
        .with_context(|| format!("fetching user {id}"))?
        .ok_or_else(|| Error::not_found("user"))
}

pub async fn connections_of(
    State(db): State<DbHandle>,
    Id(id): Id<UserId>,
) -> Result<Json<Connections>, Error> {
    let user = find_user(&db, id).await?;
    Ok(Json(Connections {
        following: connections(&user.following)
            .into_iter()
            .map(|c| c.user_id)
            .collect(),
        followers: connections(&user.followers)
            .into_iter()
            .map(|c| c.user_id)
            .collect(),
    }))
}

async fn peer_entries(db: &DbHandle, peers: Vec<arcana_api::Connection>) -> Result<Vec<PeerEntry>, Error> {
    let users = summaries(&**db, peers.iter().map(|p| p.user_id).collect()).await?;
    Ok(peers
        .into_iter()
        .map(|p| PeerEntry {
            user: users.get(&p.user_id).cloned(),
            user_id: p.user_id,
            date: p.date,
        })
        .collect())
}

pub async fn followers(
    State(db): State<DbHandle>,
    Id(id): Id<UserId>,
) -> Result<Json<Vec<PeerEntry>>, Error> {
    let user = find_user(&db, id).await?;
    Ok(Json(peer_entries(&db, connections(&user.followers)).await?))
}

pub async fn following(
    State(db): State<DbHandle>,
    Id(id): Id<UserId>,
) -> Result<Json<Vec<PeerEntry>>, Error> {
    let user = find_user(&db, id).await?;
    Ok(Json(peer_entries(&db, connections(&user.following)).await?))
}

pub async fn update(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<UserId>,
    Json(data): Json<UserUpdate>,
) -> Result<Json<Profile>, Error> {
    if id != me.id {
        return Err(Error::permission_denied());
    }
    data.validate()?;
    let mut user = me.clone();
    data.apply(&mut user, now());
    if user.username != me.username || user.email != me.email {
        if let Some(other) = db
            .find_conflicting_user(&user.username, &user.email, Some(me.id))
            .await?
        {
            let taken = if other.username == user.username {
                user.username
            } else {
                user.email
            };
            return Err(Error::name_already_used(taken));
        }
    }
    db.update_user(&user)
        .await
        .with_context(|| format!("updating user {id}"))?;
    Ok(Json(user.profile()))
}

pub async fn get(State(db): State<DbHandle>, Id(id): Id<UserId>) -> Result<Json<Profile>, Error> {
    Ok(Json(find_user(&db, id).await?.profile()))
}
