use crate::MediaKind;

/// Candidate element fields returned by the autocomplete lookups
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub title: String,
    pub description: String,
    pub cover: String,
    pub release_date: String,
    pub author: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct AutocompleteQuery {
    pub query: Option<String>,
}

impl AutocompleteQuery {
    pub fn term(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// The autocomplete routes, one per media kind
pub const AUTOCOMPLETE_KINDS: [MediaKind; 5] = [
    MediaKind::Movie,
    MediaKind::Serie,
    MediaKind::Book,
    MediaKind::Music,
    MediaKind::Game,
];
