use anyhow::Context;
use arcana_api::{
    Collection, CollectionFilter, CollectionId, Element, ElementId, ElementUpdate, NewElement,
    User, UserElements, UserId,
};
use axum::{extract::State, http::StatusCode, Json};

use super::{collections, now};
use crate::{extractors::*, Error};

/// The collection must exist and be editable by `user`
async fn editable(db: &DbHandle, user: &User, id: CollectionId) -> Result<Collection, Error> {
    let c = collections::find(db, id).await?;
    if !c.can_edit(user.id) {
        return Err(Error::permission_denied());
    }
    Ok(c)
}

async fn find(db: &DbHandle, id: ElementId) -> Result<Element, Error> {
    db.find_element(id)
        .await
        .with_context(|| format!("fetching element {id}"))?
        .ok_or_else(|| Error::not_found("element"))
}

pub async fn create(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<NewElement>,
) -> Result<(StatusCode, Json<Element>), Error> {
    let collection_id = data.validate()?;
    editable(&db, &me, collection_id).await?;
    let e = data.into_element(collection_id, now());
    db.create_element(&e).await?;
    db.push_element(collection_id, e.id).await?;
    Ok((StatusCode::CREATED, Json(e)))
}

pub async fn get(State(db): State<DbHandle>, Id(id): Id<ElementId>) -> Result<Json<Element>, Error> {
    Ok(Json(find(&db, id).await?))
}

pub async fn of_collection(
    State(db): State<DbHandle>,
    Id(id): Id<CollectionId>,
) -> Result<Json<Vec<Element>>, Error> {
    collections::find(&db, id).await?;
    Ok(Json(db.elements_in(&[id]).await?))
}

pub async fn update(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<ElementId>,
    Json(data): Json<ElementUpdate>,
) -> Result<Json<Element>, Error> {
    let mut e = find(&db, id).await?;
    editable(&db, &me, e.collection_id).await?;
    data.validate()?;
    data.apply(&mut e, now());
    db.update_element(&e).await?;
    Ok(Json(e))
}

pub async fn delete(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<ElementId>,
) -> Result<(), Error> {
    let e = find(&db, id).await?;
    editable(&db, &me, e.collection_id).await?;
    db.delete_element(id).await?;
    db.pull_element(e.collection_id, id).await?;
    Ok(())
}

/// Every element across a user's collections, with per-kind and per-status statistics
pub async fn of_user(
    State(db): State<DbHandle>,
    Id(user): Id<UserId>,
) -> Result<Json<UserElements>, Error> {
    let owned = db
        .list_collections(&CollectionFilter {
            owner: Some(user),
            visibility: None,
        })
        .await?;
    if owned.is_empty() {
        return Err(Error::not_found("collection"));
    }
    let ids = owned.iter().map(|c| c.id).collect::<Vec<_>>();
    let elements = db.elements_in(&ids).await?;
    if elements.is_empty() {
        return Err(Error::not_found("element"));
    }
    Ok(Json(UserElements::new(elements)))
}
