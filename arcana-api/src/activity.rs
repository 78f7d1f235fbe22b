use std::str::FromStr;

use anyhow::anyhow;

use crate::{ActivityId, CollectionId, CollectionRef, CommentId, Time, UserId, UserSummary};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    CreateCollection,
    Like,
    Comment,
    Reply,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CreateCollection => "create-collection",
            ActivityKind::Like => "like",
            ActivityKind::Comment => "comment",
            ActivityKind::Reply => "reply",
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, ActivityKind::Comment | ActivityKind::Reply)
    }
}

impl FromStr for ActivityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ActivityKind> {
        match s {
            "create-collection" => Ok(ActivityKind::CreateCollection),
            "like" => Ok(ActivityKind::Like),
            "comment" => Ok(ActivityKind::Comment),
            "reply" => Ok(ActivityKind::Reply),
            _ => Err(anyhow!("unknown activity kind {s:?}")),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "_id")]
    pub id: ActivityId,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(rename = "userId")]
    pub actor: UserId,
    pub collection_id: Option<CollectionId>,
    pub comment_id: Option<CommentId>,
    /// Content of the comment or reply that triggered the activity
    pub content: Option<String>,
    pub is_private: bool,
    pub created_at: Time,
}

impl Activity {
    pub fn new(kind: ActivityKind, actor: UserId, now: Time) -> Activity {
        Activity {
            id: ActivityId::new(),
            kind,
            actor,
            collection_id: None,
            comment_id: None,
            content: None,
            is_private: false,
            created_at: now,
        }
    }

    pub fn on_collection(mut self, collection: CollectionId) -> Activity {
        self.collection_id = Some(collection);
        self
    }

    pub fn on_comment(mut self, comment: CommentId, content: String) -> Activity {
        self.comment_id = Some(comment);
        self.content = Some(content);
        self
    }

    pub fn private(mut self, is_private: bool) -> Activity {
        self.is_private = is_private;
        self
    }
}

/// Conjunction of the set conditions. `kinds: Some(vec![])` matches nothing.
#[derive(Clone, Debug, Default)]
pub struct ActivityFilter {
    pub kinds: Option<Vec<ActivityKind>>,
    pub actors: Option<Vec<UserId>>,
    pub collection: Option<CollectionId>,
    pub comment: Option<CommentId>,
}

impl ActivityFilter {
    pub fn matches(&self, a: &Activity) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&a.kind))
            && self.actors.as_ref().map_or(true, |u| u.contains(&a.actor))
            && self.collection.map_or(true, |c| a.collection_id == Some(c))
            && self.comment.map_or(true, |c| a.comment_id == Some(c))
    }

    /// Comment and reply activities pointing at `comment`
    pub fn about_comment(comment: CommentId) -> ActivityFilter {
        ActivityFilter {
            kinds: Some(vec![ActivityKind::Comment, ActivityKind::Reply]),
            comment: Some(comment),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub only_following: Option<String>,
}

impl FeedQuery {
    /// `None` for no kind restriction; an unknown kind restricts to nothing
    pub fn kinds(&self) -> Option<Vec<ActivityKind>> {
        match self.kind.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(k) => Some(k.parse().into_iter().collect()),
        }
    }

    pub fn only_following(&self) -> bool {
        self.only_following.as_deref() == Some("true")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub activity: Activity,
    pub user: Option<UserSummary>,
    pub collection: Option<CollectionRef>,
}

impl FeedItem {
    /// Activities on a collection that still exists and is private stay out of feeds
    pub fn is_visible(&self) -> bool {
        self.collection.as_ref().map_or(true, |c| {
            c.visibility == crate::Visibility::Public
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Feed {
    pub activities: Vec<FeedItem>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn feed_kind_parsing() {
        let q = |k: Option<&str>| FeedQuery {
            kind: k.map(String::from),
            only_following: None,
        };
        assert_eq!(q(None).kinds(), None);
        assert_eq!(q(Some("all")).kinds(), None);
        assert_eq!(q(Some("like")).kinds(), Some(vec![ActivityKind::Like]));
        assert_eq!(q(Some("nonsense")).kinds(), Some(vec![]));
    }

    #[test]
    fn comment_filter_ignores_likes() {
        let c = CommentId::new();
        let f = ActivityFilter::about_comment(c);
        let now = Utc::now();
        let reply = Activity::new(ActivityKind::Reply, UserId::new(), now)
            .on_comment(c, String::from("hi"));
        let mut like = reply.clone();
        like.kind = ActivityKind::Like;
        let other = Activity::new(ActivityKind::Comment, UserId::new(), now)
            .on_comment(CommentId::new(), String::from("hi"));
        assert!(f.matches(&reply));
        assert!(!f.matches(&like));
        assert!(!f.matches(&other));
        assert!(!ActivityFilter {
            kinds: Some(vec![]),
            ..Default::default()
        }
        .matches(&reply));
    }

    #[test]
    fn kinds_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ActivityKind::CreateCollection).unwrap(),
            "\"create-collection\""
        );
        for k in [
            ActivityKind::CreateCollection,
            ActivityKind::Like,
            ActivityKind::Comment,
            ActivityKind::Reply,
        ] {
            assert_eq!(k.as_str().parse::<ActivityKind>().unwrap(), k);
        }
    }
}
