use std::{collections::BTreeMap, str::FromStr};

use anyhow::anyhow;
use chrono::NaiveDate;

use crate::{required, validate_string, CollectionId, ElementId, Error, Time};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Book,
    Movie,
    Serie,
    Music,
    Game,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Book => "book",
            MediaKind::Movie => "movie",
            MediaKind::Serie => "serie",
            MediaKind::Music => "music",
            MediaKind::Game => "game",
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<MediaKind> {
        match s {
            "book" => Ok(MediaKind::Book),
            "movie" => Ok(MediaKind::Movie),
            "serie" => Ok(MediaKind::Serie),
            "music" => Ok(MediaKind::Music),
            "game" => Ok(MediaKind::Game),
            _ => Err(anyhow!("unknown media kind {s:?}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    #[serde(rename = "_id")]
    pub id: ElementId,
    pub collection_id: CollectionId,
    #[serde(rename = "type")]
    pub kind: Option<MediaKind>,
    pub title: String,
    pub description: String,
    pub cover: String,
    pub release_date: Option<NaiveDate>,
    pub author: Vec<String>,
    pub rating: Option<f64>,
    pub review: String,
    pub status: String,
    pub favorite: bool,
    pub tags: Vec<String>,
    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewElement {
    pub collection_id: Option<CollectionId>,
    #[serde(rename = "type")]
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover: String,
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub author: Vec<String>,
    pub rating: Option<f64>,
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewElement {
    pub fn validate(&self) -> Result<CollectionId, Error> {
        let collection_id = self.collection_id.ok_or(Error::MissingFields)?;
        required(&self.title)?;
        for s in [&self.description, &self.cover, &self.review, &self.status] {
            validate_string(s)?;
        }
        for s in self.author.iter().chain(self.tags.iter()) {
            validate_string(s)?;
        }
        Ok(collection_id)
    }

    pub fn into_element(self, collection_id: CollectionId, now: Time) -> Element {
        Element {
            id: ElementId::new(),
            collection_id,
            kind: self.kind,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            cover: self.cover.trim().to_string(),
            release_date: self.release_date,
            author: self.author.into_iter().map(|a| a.trim().to_string()).collect(),
            rating: self.rating,
            review: self.review.trim().to_string(),
            status: self.status.trim().to_string(),
            favorite: self.favorite,
            tags: self.tags.into_iter().map(|t| t.trim().to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdate {
    #[serde(rename = "type")]
    pub kind: Option<MediaKind>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub author: Option<Vec<String>>,
    pub rating: Option<f64>,
    pub review: Option<String>,
    pub status: Option<String>,
    pub favorite: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl ElementUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(title) = &self.title {
            required(title)?;
        }
        for s in [&self.description, &self.cover, &self.review, &self.status]
            .into_iter()
            .flatten()
        {
            validate_string(s)?;
        }
        for s in self.author.iter().chain(self.tags.iter()).flatten() {
            validate_string(s)?;
        }
        Ok(())
    }

    pub fn apply(self, e: &mut Element, now: Time) {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    e.$field = v;
                }
            };
            ($field:ident, optional) => {
                if let Some(v) = self.$field {
                    e.$field = Some(v);
                }
            };
        }
        set!(kind, optional);
        set!(title);
        set!(description);
        set!(cover);
        set!(release_date, optional);
        set!(author);
        set!(rating, optional);
        set!(review);
        set!(status);
        set!(favorite);
        set!(tags);
        e.updated_at = now;
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct KindStat {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u64,
    pub percentage: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StatusStat {
    pub status: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserElements {
    pub elements: Vec<Element>,
    pub stats: Vec<KindStat>,
    pub status_stats: Vec<StatusStat>,
}

impl UserElements {
    pub fn new(elements: Vec<Element>) -> UserElements {
        let total = elements.len() as u64;
        let mut kinds = BTreeMap::<&str, u64>::new();
        let mut statuses = BTreeMap::<&str, u64>::new();
        for e in &elements {
            *kinds
                .entry(e.kind.as_ref().map_or("unknown", |k| k.as_str()))
                .or_default() += 1;
            *statuses.entry(&e.status).or_default() += 1;
        }
        let stats = kinds
            .into_iter()
            .map(|(kind, count)| KindStat {
                kind: String::from(kind),
                count,
                percentage: format!("{}", (count as f64 * 100.0 / total as f64).round()),
            })
            .collect();
        let status_stats = statuses
            .into_iter()
            .map(|(status, count)| StatusStat {
                status: String::from(status),
                count,
            })
            .collect();
        UserElements {
            elements,
            stats,
            status_stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn element(kind: Option<MediaKind>, status: &str) -> Element {
        NewElement {
            collection_id: Some(CollectionId::new()),
            kind,
            title: String::from("Dune"),
            status: String::from(status),
            ..Default::default()
        }
        .into_element(CollectionId::new(), Utc::now())
    }

    #[test]
    fn stats_count_kinds_and_statuses() {
        let res = UserElements::new(vec![
            element(Some(MediaKind::Book), "read"),
            element(Some(MediaKind::Book), "to-read"),
            element(Some(MediaKind::Movie), "read"),
        ]);
        assert_eq!(
            res.stats,
            vec![
                KindStat {
                    kind: String::from("book"),
                    count: 2,
                    percentage: String::from("67"),
                },
                KindStat {
                    kind: String::from("movie"),
                    count: 1,
                    percentage: String::from("33"),
                },
            ]
        );
        assert_eq!(
            res.status_stats,
            vec![
                StatusStat {
                    status: String::from("read"),
                    count: 2,
                },
                StatusStat {
                    status: String::from("to-read"),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn new_element_requires_collection_and_title() {
        let e = NewElement {
            title: String::from("Halo"),
            ..Default::default()
        };
        assert_eq!(e.validate(), Err(Error::MissingFields));
        let id = CollectionId::new();
        let e = NewElement {
            collection_id: Some(id),
            title: String::from(" "),
            ..Default::default()
        };
        assert_eq!(e.validate(), Err(Error::MissingFields));
    }

    #[test]
    fn update_only_touches_given_fields() {
        let mut e = element(Some(MediaKind::Game), "playing");
        ElementUpdate {
            favorite: Some(true),
            rating: Some(4.5),
            ..Default::default()
        }
        .apply(&mut e, Utc::now());
        assert!(e.favorite);
        assert_eq!(e.rating, Some(4.5));
        assert_eq!(e.status, "playing");
        assert_eq!(e.kind, Some(MediaKind::Game));
    }
}
