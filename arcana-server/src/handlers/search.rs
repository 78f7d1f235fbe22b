use std::collections::HashMap;

use arcana_api::{
    CollectionFilter, CollectionHit, Error as ApiError, PopularTag, SearchQuery, SearchResults,
};
use axum::{
    extract::{Query, State},
    Json,
};

use super::summaries;
use crate::{extractors::*, Error};

const SEARCH_LIMIT: usize = 10;
const POPULAR_TAGS: usize = 20;

pub async fn search(
    State(db): State<DbHandle>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<SearchResults>, Error> {
    let term = q
        .q
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingFields)?;
    let found = db.search_collections(term, SEARCH_LIMIT).await?;
    let owners = summaries(&*db, found.iter().map(|c| c.owner).collect()).await?;
    let likes = db
        .like_counts(&found.iter().map(|c| c.id).collect::<Vec<_>>())
        .await?;
    let collections = found
        .into_iter()
        .map(|c| CollectionHit {
            owner_username: owners.get(&c.owner).map(|o| o.username.clone()),
            likes_count: likes.get(&c.id).copied().unwrap_or(0),
            collection: c,
        })
        .collect();
    let users = db
        .search_users(term, SEARCH_LIMIT)
        .await?
        .iter()
        .map(|u| u.summary())
        .collect();
    Ok(Json(SearchResults { collections, users }))
}

pub async fn popular_tags(State(db): State<DbHandle>) -> Result<Json<Vec<PopularTag>>, Error> {
    let mut counts = HashMap::<String, u64>::new();
    for c in db.list_collections(&CollectionFilter::public()).await? {
        for tag in c.tags {
            *counts.entry(tag).or_default() += 1;
        }
    }
    let mut tags = counts
        .into_iter()
        .map(|(tag, count)| PopularTag { tag, count })
        .collect::<Vec<_>>();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags.truncate(POPULAR_TAGS);
    Ok(Json(tags))
}
