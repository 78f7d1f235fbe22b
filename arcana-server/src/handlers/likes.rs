use std::collections::HashMap;

use arcana_api::{
    Activity, ActivityFilter, ActivityKind, CollectionId, Error as ApiError, Like, LikeRequest,
    LikedCollection, Liker, UserId,
};
use axum::{extract::State, Json};

use super::{cards, collections, now, summaries};
use crate::{extractors::*, Error};

pub async fn like(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<LikeRequest>,
) -> Result<Json<Like>, Error> {
    let id = data.collection_id.ok_or(ApiError::MissingFields)?;
    let c = collections::find(&db, id).await?;
    if db.find_like(me.id, id).await?.is_some() {
        return Err(Error::Api(ApiError::AlreadyLiked));
    }
    let at = now();
    let like = Like::new(me.id, id, at);
    db.create_like(&like).await?;
    db.create_activity(
        &Activity::new(ActivityKind::Like, me.id, at)
            .on_collection(id)
            .private(!c.is_public()),
    )
    .await?;
    Ok(Json(like))
}

pub async fn unlike(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<CollectionId>,
) -> Result<(), Error> {
    if !db.delete_like(me.id, id).await? {
        return Err(Error::Api(ApiError::NotLiked));
    }
    db.delete_one_activity(&ActivityFilter {
        kinds: Some(vec![ActivityKind::Like]),
        actors: Some(vec![me.id]),
        collection: Some(id),
        comment: None,
    })
    .await?;
    Ok(())
}

/// Likes of a user whose collection and collection owner both still exist
async fn liked_by(db: &DbHandle, user: UserId) -> Result<Vec<LikedCollection>, Error> {
    let likes = db.likes_by(user).await?;
    let collections = db
        .find_collections(&likes.iter().map(|l| l.collection_id).collect::<Vec<_>>())
        .await?;
    let collections = cards(&**db, collections)
        .await?
        .into_iter()
        .filter(|c| c.owner.is_some())
        .map(|c| (c.collection.id, c))
        .collect::<HashMap<_, _>>();
    Ok(likes
        .into_iter()
        .filter_map(|like| {
            let collection = collections.get(&like.collection_id)?.clone();
            Some(LikedCollection { like, collection })
        })
        .collect())
}

pub async fn of_user(
    State(db): State<DbHandle>,
    Id(user): Id<UserId>,
) -> Result<Json<Vec<LikedCollection>>, Error> {
    Ok(Json(liked_by(&db, user).await?))
}

pub async fn mine(
    Auth(me): Auth,
    State(db): State<DbHandle>,
) -> Result<Json<Vec<LikedCollection>>, Error> {
    Ok(Json(liked_by(&db, me.id).await?))
}

pub async fn on_collection(
    State(db): State<DbHandle>,
    Id(id): Id<CollectionId>,
) -> Result<Json<Vec<Liker>>, Error> {
    let likes = db.likes_on(id).await?;
    let users = summaries(&*db, likes.iter().map(|l| l.user_id).collect()).await?;
    Ok(Json(
        likes
            .into_iter()
            .map(|like| Liker {
                user: users.get(&like.user_id).cloned(),
                like,
            })
            .collect(),
    ))
}
