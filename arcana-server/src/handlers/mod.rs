use std::collections::HashMap;

use anyhow::Context;
use arcana_api::{
    Collection, CollectionCard, CollectionId, CollectionRef, Db, Time, UserId, UserSummary,
};
use axum::Json;
use chrono::Utc;

pub mod activity;
pub mod admin;
pub mod autocomplete;
pub mod collections;
pub mod comments;
pub mod elements;
pub mod likes;
pub mod messages;
pub mod search;
pub mod users;

pub fn now() -> Time {
    Utc::now()
}

pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "index" }))
}

/// Display fields of the listed users that still exist
pub async fn summaries(
    db: &dyn Db,
    mut ids: Vec<UserId>,
) -> anyhow::Result<HashMap<UserId, UserSummary>> {
    ids.sort_unstable();
    ids.dedup();
    Ok(db
        .find_users(&ids)
        .await
        .context("fetching user display fields")?
        .into_iter()
        .map(|u| (u.id, u.summary()))
        .collect())
}

pub async fn collection_refs(
    db: &dyn Db,
    mut ids: Vec<CollectionId>,
) -> anyhow::Result<HashMap<CollectionId, CollectionRef>> {
    ids.sort_unstable();
    ids.dedup();
    Ok(db
        .find_collections(&ids)
        .await
        .context("fetching referenced collections")?
        .iter()
        .map(|c| (c.id, CollectionRef::from(c)))
        .collect())
}

/// Decorates collections with their owner, element covers and like count, keeping their order
pub async fn cards(db: &dyn Db, collections: Vec<Collection>) -> anyhow::Result<Vec<CollectionCard>> {
    let ids = collections.iter().map(|c| c.id).collect::<Vec<_>>();
    let owners = summaries(db, collections.iter().map(|c| c.owner).collect()).await?;
    let likes = db.like_counts(&ids).await.context("counting likes")?;
    let mut covers = HashMap::<CollectionId, Vec<String>>::new();
    for e in db
        .elements_in(&ids)
        .await
        .context("fetching collection elements")?
    {
        if !e.cover.is_empty() {
            covers.entry(e.collection_id).or_default().push(e.cover);
        }
    }
    Ok(collections
        .into_iter()
        .map(|c| CollectionCard {
            owner: owners.get(&c.owner).cloned(),
            covers: covers.remove(&c.id).unwrap_or_default(),
            like_count: likes.get(&c.id).copied().unwrap_or(0),
            collection: c,
        })
        .collect())
}
