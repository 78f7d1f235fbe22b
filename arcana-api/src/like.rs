use crate::{CollectionCard, CollectionId, LikeId, Time, UserId, UserSummary};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    #[serde(rename = "_id")]
    pub id: LikeId,
    pub user_id: UserId,
    pub collection_id: CollectionId,
    pub created_at: Time,
}

impl Like {
    pub fn new(user_id: UserId, collection_id: CollectionId, now: Time) -> Like {
        Like {
            id: LikeId::new(),
            user_id,
            collection_id,
            created_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub collection_id: Option<CollectionId>,
}

/// A like along with the collection it targets
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikedCollection {
    #[serde(flatten)]
    pub like: Like,
    pub collection: CollectionCard,
}

/// A like along with the display fields of who placed it
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Liker {
    #[serde(flatten)]
    pub like: Like,
    pub user: Option<UserSummary>,
}
