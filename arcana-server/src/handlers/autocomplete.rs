use arcana_api::{AutocompleteQuery, Error as ApiError, MediaKind, MediaMetadata, AUTOCOMPLETE_KINDS};
use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{metadata::MetadataClient, Error};

pub async fn lookup(
    State(client): State<MetadataClient>,
    Path(kind): Path<String>,
    Query(q): Query<AutocompleteQuery>,
) -> Result<Json<Vec<MediaMetadata>>, Error> {
    let kind = kind
        .parse::<MediaKind>()
        .ok()
        .filter(|k| AUTOCOMPLETE_KINDS.contains(k))
        .ok_or_else(|| Error::not_found("media kind"))?;
    let term = q.term().ok_or(ApiError::MissingFields)?;
    match client.lookup(kind, term).await {
        Ok(res) if !res.is_empty() => Ok(Json(res)),
        Ok(_) => Err(Error::Api(ApiError::NoMetadata)),
        Err(err) => {
            tracing::warn!(?err, kind = kind.as_str(), "metadata lookup failed");
            Err(Error::Api(ApiError::NoMetadata))
        }
    }
}
