use arcana_api::{CommentActivityReport, SweepReport};
use axum::{extract::State, Json};

use crate::{extractors::*, sweeps, Error};

pub async fn cleanup_followers(
    AdminAuth: AdminAuth,
    State(db): State<DbHandle>,
) -> Result<Json<SweepReport>, Error> {
    Ok(Json(sweeps::cleanup_followers(&*db).await?))
}

pub async fn cleanup_collection_activity(
    AdminAuth: AdminAuth,
    State(db): State<DbHandle>,
) -> Result<Json<SweepReport>, Error> {
    Ok(Json(sweeps::cleanup_collection_activity(&*db).await?))
}

pub async fn cleanup_comment_activity(
    AdminAuth: AdminAuth,
    State(db): State<DbHandle>,
) -> Result<Json<CommentActivityReport>, Error> {
    Ok(Json(sweeps::cleanup_comment_activity(&*db).await?))
}

pub async fn cleanup_orphan_collections(
    AdminAuth: AdminAuth,
    State(db): State<DbHandle>,
) -> Result<Json<SweepReport>, Error> {
    Ok(Json(sweeps::cleanup_orphan_collections(&*db).await?))
}
