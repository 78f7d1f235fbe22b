use std::str::FromStr;

use anyhow::anyhow;

use crate::{
    required, validate_string, CollectionId, Element, ElementId, Error, Time, UserId, UserSummary,
};

pub const DEFAULT_COVER: &str = "/assets/default-cover.png";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Visibility> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(anyhow!("unknown visibility {s:?}")),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(rename = "_id")]
    pub id: CollectionId,
    #[serde(rename = "userId")]
    pub owner: UserId,
    pub title: String,
    pub description: String,
    pub cover: String,
    pub visibility: Visibility,
    pub collaborators: Vec<UserId>,
    pub elements: Vec<ElementId>,
    pub tags: Vec<String>,
    pub created_at: Time,
    pub updated_at: Time,
}

impl Collection {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn can_edit(&self, user: UserId) -> bool {
        self.owner == user || self.collaborators.contains(&user)
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollectionFilter {
    pub owner: Option<UserId>,
    pub visibility: Option<Visibility>,
}

impl CollectionFilter {
    pub fn public() -> CollectionFilter {
        CollectionFilter {
            owner: None,
            visibility: Some(Visibility::Public),
        }
    }

    pub fn matches(&self, c: &Collection) -> bool {
        self.owner.map_or(true, |o| c.owner == o)
            && self.visibility.map_or(true, |v| c.visibility == v)
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollection {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub cover: Option<String>,
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub collaborators: Vec<UserId>,
    #[serde(default)]
    pub elements: Vec<ElementId>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewCollection {
    pub fn validate(&self) -> Result<(), Error> {
        required(&self.title)?;
        if self.visibility.is_none() {
            return Err(Error::MissingFields);
        }
        validate_string(&self.description)?;
        if let Some(cover) = &self.cover {
            validate_string(cover)?;
        }
        for t in &self.tags {
            validate_string(t)?;
        }
        Ok(())
    }

    pub fn into_collection(self, owner: UserId, now: Time) -> Collection {
        Collection {
            id: CollectionId::new(),
            owner,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            cover: self
                .cover
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| String::from(DEFAULT_COVER)),
            visibility: self.visibility.unwrap_or(Visibility::Public),
            collaborators: self.collaborators,
            elements: self.elements,
            tags: clean_tags(self.tags),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover: Option<String>,
    pub visibility: Option<Visibility>,
    pub collaborators: Option<Vec<UserId>>,
    pub elements: Option<Vec<ElementId>>,
    pub tags: Option<Vec<String>>,
}

impl CollectionUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(title) = &self.title {
            required(title)?;
        }
        for s in [&self.description, &self.cover].into_iter().flatten() {
            validate_string(s)?;
        }
        for t in self.tags.iter().flatten() {
            validate_string(t)?;
        }
        Ok(())
    }

    pub fn apply(self, c: &mut Collection, now: Time) {
        if let Some(title) = self.title {
            c.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            c.description = description.trim().to_string();
        }
        if let Some(cover) = self.cover {
            c.cover = cover.trim().to_string();
        }
        if let Some(visibility) = self.visibility {
            c.visibility = visibility;
        }
        if let Some(collaborators) = self.collaborators {
            c.collaborators = collaborators;
        }
        if let Some(elements) = self.elements {
            c.elements = elements;
        }
        if let Some(tags) = self.tags {
            c.tags = clean_tags(tags);
        }
        c.updated_at = now;
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Collection as shown in lists: owner display fields and element covers
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCard {
    #[serde(flatten)]
    pub collection: Collection,
    pub owner: Option<UserSummary>,
    pub covers: Vec<String>,
    pub like_count: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CollectionDetail {
    pub collection: Collection,
    pub owner: Option<UserSummary>,
    pub elements: Vec<Element>,
}

/// Short reference used when a record points at a collection
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CollectionRef {
    #[serde(rename = "_id")]
    pub id: CollectionId,
    pub title: String,
    pub visibility: Visibility,
}

impl From<&Collection> for CollectionRef {
    fn from(c: &Collection) -> CollectionRef {
        CollectionRef {
            id: c.id,
            title: c.title.clone(),
            visibility: c.visibility,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionHit {
    #[serde(flatten)]
    pub collection: Collection,
    pub owner_username: Option<String>,
    pub likes_count: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SearchResults {
    pub collections: Vec<CollectionHit>,
    pub users: Vec<UserSummary>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PopularTag {
    pub tag: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn new_collection_needs_title_and_visibility() {
        let mut c = NewCollection {
            title: String::from("Sci-fi"),
            visibility: Some(Visibility::Private),
            tags: vec![String::from(" space "), String::from("  ")],
            ..Default::default()
        };
        assert_eq!(c.validate(), Ok(()));
        let owner = UserId::new();
        let rec = c.clone().into_collection(owner, Utc::now());
        assert_eq!(rec.cover, DEFAULT_COVER);
        assert_eq!(rec.tags, vec![String::from("space")]);
        assert!(rec.can_edit(owner));
        assert!(!rec.is_public());

        c.visibility = None;
        assert_eq!(c.validate(), Err(Error::MissingFields));
    }

    #[test]
    fn collaborators_can_edit() {
        let (owner, helper) = (UserId::new(), UserId::new());
        let mut c = NewCollection {
            title: String::from("Games"),
            visibility: Some(Visibility::Public),
            ..Default::default()
        }
        .into_collection(owner, Utc::now());
        assert!(!c.can_edit(helper));
        CollectionUpdate {
            collaborators: Some(vec![helper]),
            ..Default::default()
        }
        .apply(&mut c, Utc::now());
        assert!(c.can_edit(helper));
    }
}
