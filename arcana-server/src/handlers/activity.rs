use arcana_api::{Activity, ActivityFilter, Feed, FeedItem, FeedQuery, UserId};
use axum::{
    extract::{Query, State},
    Json,
};

use super::{collection_refs, summaries};
use crate::{extractors::*, Error};

/// Attaches actor and collection display fields, dropping activities about private collections
async fn feed_of(db: &DbHandle, activities: Vec<Activity>) -> Result<Feed, Error> {
    let users = summaries(&**db, activities.iter().map(|a| a.actor).collect()).await?;
    let collections = collection_refs(
        &**db,
        activities.iter().filter_map(|a| a.collection_id).collect(),
    )
    .await?;
    let activities = activities
        .into_iter()
        .map(|activity| FeedItem {
            user: users.get(&activity.actor).cloned(),
            collection: activity
                .collection_id
                .and_then(|c| collections.get(&c).cloned()),
            activity,
        })
        .filter(FeedItem::is_visible)
        .collect();
    Ok(Feed { activities })
}

pub async fn feed(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Query(q): Query<FeedQuery>,
) -> Result<Json<Feed>, Error> {
    let mut actors = me.following.keys().copied().collect::<Vec<_>>();
    if !q.only_following() {
        actors.push(me.id);
    }
    let activities = db
        .list_activities(&ActivityFilter {
            kinds: q.kinds(),
            actors: Some(actors),
            ..Default::default()
        })
        .await?;
    Ok(Json(feed_of(&db, activities).await?))
}

pub async fn of_user(
    State(db): State<DbHandle>,
    Id(user): Id<UserId>,
    Query(q): Query<FeedQuery>,
) -> Result<Json<Feed>, Error> {
    let activities = db
        .list_activities(&ActivityFilter {
            kinds: q.kinds(),
            actors: Some(vec![user]),
            ..Default::default()
        })
        .await?;
    Ok(Json(feed_of(&db, activities).await?))
}
