use anyhow::Context;
use arcana_api::{
    Activity, ActivityFilter, ActivityKind, Collection, CollectionCard, CollectionDetail,
    CollectionFilter, CollectionId, CollectionUpdate, NewCollection, UserId,
};
use axum::{extract::State, Json};
use rand::seq::SliceRandom;

use super::{cards, now, summaries};
use crate::{
    covers::{self, CollectionForm, CoverHandle},
    extractors::*,
    Error,
};

const SHOWCASE_SIZE: usize = 10;

pub async fn create(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    State(covers): State<CoverHandle>,
    CollectionForm { mut data, cover }: CollectionForm<NewCollection>,
) -> Result<Json<Collection>, Error> {
    data.validate()?;
    if let Some(cover) = cover {
        data.cover = Some(covers::store(&covers, cover).await?);
    }
    let at = now();
    let c = data.into_collection(me.id, at);
    db.create_collection(&c).await?;
    db.create_activity(
        &Activity::new(ActivityKind::CreateCollection, me.id, at)
            .on_collection(c.id)
            .private(!c.is_public()),
    )
    .await
    .with_context(|| format!("recording creation of collection {}", c.id))?;
    Ok(Json(c))
}

pub async fn list(State(db): State<DbHandle>) -> Result<Json<Vec<CollectionCard>>, Error> {
    let all = db.list_collections(&CollectionFilter::default()).await?;
    Ok(Json(cards(&*db, all).await?))
}

/// Public collections whose owner still exists, most liked first
pub async fn top(State(db): State<DbHandle>) -> Result<Json<Vec<CollectionCard>>, Error> {
    let public = db.list_collections(&CollectionFilter::public()).await?;
    let owners = summaries(&*db, public.iter().map(|c| c.owner).collect()).await?;
    let mut public = public
        .into_iter()
        .filter(|c| owners.contains_key(&c.owner))
        .collect::<Vec<_>>();
    let ids = public.iter().map(|c| c.id).collect::<Vec<_>>();
    let likes = db.like_counts(&ids).await?;
    // Stable, so ties stay newest first
    public.sort_by_key(|c| std::cmp::Reverse(likes.get(&c.id).copied().unwrap_or(0)));
    public.truncate(SHOWCASE_SIZE);
    Ok(Json(cards(&*db, public).await?))
}

pub async fn recent(State(db): State<DbHandle>) -> Result<Json<Vec<CollectionCard>>, Error> {
    let mut public = db.list_collections(&CollectionFilter::public()).await?;
    public.truncate(SHOWCASE_SIZE);
    Ok(Json(cards(&*db, public).await?))
}

pub async fn random(State(db): State<DbHandle>) -> Result<Json<Vec<CollectionCard>>, Error> {
    let mut public = db.list_collections(&CollectionFilter::public()).await?;
    public.shuffle(&mut rand::thread_rng());
    public.truncate(SHOWCASE_SIZE);
    Ok(Json(cards(&*db, public).await?))
}

/// The most liked public collection of a user
pub async fn top_of_user(
    State(db): State<DbHandle>,
    Id(user): Id<UserId>,
) -> Result<Json<CollectionCard>, Error> {
    let public = db
        .list_collections(&CollectionFilter {
            owner: Some(user),
            ..CollectionFilter::public()
        })
        .await?;
    let ids = public.iter().map(|c| c.id).collect::<Vec<_>>();
    let likes = db.like_counts(&ids).await?;
    // max_by_key keeps the last maximum, so iterate oldest first to prefer the newest on ties
    let best = public
        .into_iter()
        .rev()
        .max_by_key(|c| likes.get(&c.id).copied().unwrap_or(0))
        .ok_or_else(|| Error::not_found("collection"))?;
    cards(&*db, vec![best])
        .await?
        .pop()
        .map(Json)
        .ok_or_else(|| Error::not_found("collection"))
}

pub async fn of_user(
    State(db): State<DbHandle>,
    Id(user): Id<UserId>,
) -> Result<Json<Vec<CollectionCard>>, Error> {
    let owned = db
        .list_collections(&CollectionFilter {
            owner: Some(user),
            visibility: None,
        })
        .await?;
    Ok(Json(cards(&*db, owned).await?))
}

pub async fn mine(
    Auth(me): Auth,
    State(db): State<DbHandle>,
) -> Result<Json<Vec<CollectionCard>>, Error> {
    let owned = db
        .list_collections(&CollectionFilter {
            owner: Some(me.id),
            visibility: None,
        })
        .await?;
    Ok(Json(cards(&*db, owned).await?))
}

pub async fn find(db: &DbHandle, id: CollectionId) -> Result<Collection, Error> {
    db.find_collection(id)
        .await
        .with_context(|| format!("fetching collection {id}"))?
        .ok_or_else(|| Error::not_found("collection"))
}

pub async fn get(
    State(db): State<DbHandle>,
    Id(id): Id<CollectionId>,
) -> Result<Json<CollectionDetail>, Error> {
    let collection = find(&db, id).await?;
    let owner = db.find_user(collection.owner).await?.map(|u| u.summary());
    let elements = db.elements_in(&[id]).await?;
    Ok(Json(CollectionDetail {
        collection,
        owner,
        elements,
    }))
}

pub async fn update(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    State(covers): State<CoverHandle>,
    Id(id): Id<CollectionId>,
    CollectionForm { mut data, cover }: CollectionForm<CollectionUpdate>,
) -> Result<Json<Collection>, Error> {
    let mut c = find(&db, id).await?;
    if !c.can_edit(me.id) {
        return Err(Error::permission_denied());
    }
    data.validate()?;
    if let Some(cover) = cover {
        data.cover = Some(covers::store(&covers, cover).await?);
    }
    data.apply(&mut c, now());
    db.update_collection(&c).await?;
    Ok(Json(c))
}

pub async fn delete(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<CollectionId>,
) -> Result<(), Error> {
    let c = find(&db, id).await?;
    if c.owner != me.id {
        return Err(Error::permission_denied());
    }
    db.delete_collection(id).await?;
    let activities = db
        .delete_activities(&ActivityFilter {
            kinds: Some(vec![ActivityKind::CreateCollection]),
            collection: Some(id),
            ..Default::default()
        })
        .await?;
    let likes = db.delete_likes_on(id).await?;
    tracing::info!(collection = %id, activities, likes, "deleted collection");
    Ok(())
}
