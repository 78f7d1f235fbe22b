use std::collections::HashSet;

use anyhow::Context;
use arcana_api::{
    Error as ApiError, Message, MessageId, NewMessage, StartConversation, UnreadCount, UnreadTotal,
    UserId, UserSummary,
};
use axum::{extract::State, http::StatusCode, Json};

use super::{now, summaries};
use crate::{extractors::*, Error};

/// Everyone `me` exchanged messages with, most recent conversation first
pub async fn conversations(
    Auth(me): Auth,
    State(db): State<DbHandle>,
) -> Result<Json<Vec<UserSummary>>, Error> {
    let mut seen = HashSet::new();
    let peers = db
        .messages_of(me.id)
        .await
        .with_context(|| format!("fetching messages of {}", me.id))?
        .iter()
        .map(|m| m.peer_of(me.id))
        .filter(|p| seen.insert(*p))
        .collect::<Vec<_>>();
    let users = summaries(&*db, peers.clone()).await?;
    Ok(Json(
        peers
            .into_iter()
            .filter_map(|p| users.get(&p).cloned())
            .collect(),
    ))
}

pub async fn with(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(peer): Id<UserId>,
) -> Result<Json<Vec<Message>>, Error> {
    Ok(Json(db.conversation(me.id, peer).await?))
}

pub async fn send(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), Error> {
    let receiver = data.validate()?;
    if receiver == me.id {
        return Err(Error::Api(ApiError::SelfTarget));
    }
    db.find_user(receiver)
        .await?
        .ok_or_else(|| Error::not_found("user"))?;
    let message = data.into_message(me.id, receiver, now());
    db.create_message(&message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn unread_total(
    Auth(me): Auth,
    State(db): State<DbHandle>,
) -> Result<Json<UnreadTotal>, Error> {
    Ok(Json(UnreadTotal {
        total: db.count_unread(me.id, None).await?,
        last_message: db.last_unread(me.id).await?,
    }))
}

/// Answers 200 when the two users already talked, 201 when the conversation is new
pub async fn start(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<StartConversation>,
) -> Result<(StatusCode, Json<UserSummary>), Error> {
    if data.user_id == me.id {
        return Err(Error::Api(ApiError::SelfTarget));
    }
    let peer = db
        .find_user(data.user_id)
        .await?
        .ok_or_else(|| Error::not_found("user"))?;
    let status = match db.last_message(me.id, peer.id).await? {
        Some(_) => StatusCode::OK,
        None => StatusCode::CREATED,
    };
    Ok((status, Json(peer.summary())))
}

pub async fn last(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(peer): Id<UserId>,
) -> Result<Json<Option<Message>>, Error> {
    Ok(Json(db.last_message(me.id, peer).await?))
}

pub async fn unread_count(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(peer): Id<UserId>,
) -> Result<Json<UnreadCount>, Error> {
    Ok(Json(UnreadCount {
        count: db.count_unread(me.id, Some(peer)).await?,
    }))
}

pub async fn mark_read(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(peer): Id<UserId>,
) -> Result<(), Error> {
    let marked = db.mark_read(me.id, peer).await?;
    tracing::debug!(user = %me.id, %peer, marked, "marked messages read");
    Ok(())
}

pub async fn delete(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<MessageId>,
) -> Result<(), Error> {
    let message = db
        .find_message(id)
        .await?
        .ok_or_else(|| Error::not_found("message"))?;
    if message.sender != me.id {
        return Err(Error::permission_denied());
    }
    db.delete_message(id).await?;
    Ok(())
}

pub async fn delete_conversation(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(peer): Id<UserId>,
) -> Result<(), Error> {
    let deleted = db.delete_conversation(me.id, peer).await?;
    tracing::info!(user = %me.id, %peer, deleted, "deleted conversation");
    Ok(())
}
