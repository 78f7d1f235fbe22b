use std::collections::{HashMap, HashSet};

use crate::{required, CollectionId, CommentId, Error, Page, Pagination, Time, UserId, UserSummary};

pub const MAX_COMMENT_LENGTH: usize = 500;
pub const DEFAULT_THREAD_LIMIT: u64 = 50;
/// Replies to a root sit at depth 1
pub const MAX_REPLY_DEPTH: usize = 50;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: CommentId,
    pub collection_id: CollectionId,
    #[serde(rename = "userId")]
    pub author: UserId,
    pub content: String,
    pub reply_to: Option<CommentId>,
    pub created_at: Time,
    pub updated_at: Time,
}

impl Comment {
    pub fn new(
        collection_id: CollectionId,
        author: UserId,
        content: String,
        reply_to: Option<CommentId>,
        now: Time,
    ) -> Comment {
        Comment {
            id: CommentId::new(),
            collection_id,
            author,
            content,
            reply_to,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trims comment content, rejecting it when empty or too long
pub fn validate_content(content: &str) -> Result<String, Error> {
    let content = required(content)?;
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(Error::ContentTooLong(MAX_COMMENT_LENGTH));
    }
    Ok(String::from(content))
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub collection_id: Option<CollectionId>,
    #[serde(default)]
    pub content: String,
    pub reply_to: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(CollectionId, String), Error> {
        let collection_id = self.collection_id.ok_or(Error::MissingFields)?;
        Ok((collection_id, validate_content(&self.content)?))
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct NewReply {
    #[serde(default)]
    pub content: String,
}

/// A comment whose `userId` carries the author's display fields, or only the id once the
/// author is gone
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(from = "CommentViewJson", into = "CommentViewJson")]
pub struct CommentView {
    pub comment: Comment,
    pub author: Option<UserSummary>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
enum AuthorField {
    Shown(UserSummary),
    Gone(UserId),
}

#[derive(serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentViewJson {
    #[serde(rename = "_id")]
    id: CommentId,
    collection_id: CollectionId,
    #[serde(rename = "userId")]
    author: AuthorField,
    content: String,
    reply_to: Option<CommentId>,
    created_at: Time,
    updated_at: Time,
}

impl From<CommentView> for CommentViewJson {
    fn from(v: CommentView) -> CommentViewJson {
        let c = v.comment;
        CommentViewJson {
            id: c.id,
            collection_id: c.collection_id,
            author: match v.author {
                Some(u) => AuthorField::Shown(u),
                None => AuthorField::Gone(c.author),
            },
            content: c.content,
            reply_to: c.reply_to,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

impl From<CommentViewJson> for CommentView {
    fn from(j: CommentViewJson) -> CommentView {
        let (author_id, author) = match j.author {
            AuthorField::Shown(u) => (u.id, Some(u)),
            AuthorField::Gone(id) => (id, None),
        };
        CommentView {
            comment: Comment {
                id: j.id,
                collection_id: j.collection_id,
                author: author_id,
                content: j.content,
                reply_to: j.reply_to,
                created_at: j.created_at,
                updated_at: j.updated_at,
            },
            author,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub view: CommentView,
    pub replies: Vec<CommentNode>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentThread {
    pub comments: Vec<CommentNode>,
    pub pagination: Pagination,
}

/// Comment listed on its own, with the title of the collection it was posted on
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    #[serde(flatten)]
    pub view: CommentView,
    pub collection_title: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentEntry>,
    pub pagination: Pagination,
}

/// Rebuilds the reply forest of one collection's comments.
///
/// Roots come newest first and are the only thing paginated, replies are
/// attached in chronological order at every depth. A reply whose parent is
/// not part of `comments` is dropped along with everything below it, and so
/// is anything nested deeper than `MAX_REPLY_DEPTH`.
pub fn build_thread(mut comments: Vec<CommentView>, page: Page) -> CommentThread {
    comments.sort_by_key(|c| c.comment.created_at);
    let known = comments
        .iter()
        .map(|c| c.comment.id)
        .collect::<HashSet<_>>();

    let mut roots = Vec::new();
    let mut children = HashMap::<CommentId, Vec<CommentView>>::new();
    for c in comments {
        match c.comment.reply_to {
            None => roots.push(c),
            Some(parent) if known.contains(&parent) => {
                children.entry(parent).or_default().push(c)
            }
            Some(_) => (),
        }
    }
    roots.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));

    let pagination = page.describe(roots.len() as u64);
    let comments = roots
        .into_iter()
        .skip(page.skip())
        .take(page.take())
        .map(|root| attach_replies(root, &mut children))
        .collect();
    CommentThread {
        comments,
        pagination,
    }
}

fn attach_replies(root: CommentView, children: &mut HashMap<CommentId, Vec<CommentView>>) -> CommentNode {
    // Breadth-first: slot 0 is the root, slot k + 1 holds found[k] as (view, parent slot, depth),
    // so every reply lands after its parent
    let mut found = Vec::<(CommentView, usize, usize)>::new();
    let mut slot = 0;
    loop {
        let (id, depth) = match slot {
            0 => (root.comment.id, 0),
            s => match found.get(s - 1) {
                Some((v, _, depth)) => (v.comment.id, *depth),
                None => break,
            },
        };
        if depth < MAX_REPLY_DEPTH {
            // Removing the entry means each reply list is consumed once, even with duplicate ids
            for r in children.remove(&id).unwrap_or_default() {
                found.push((r, slot, depth + 1));
            }
        }
        slot += 1;
    }

    let mut replies = (0..=found.len())
        .map(|_| Vec::new())
        .collect::<Vec<Vec<CommentNode>>>();
    while let Some((view, parent, _)) = found.pop() {
        let mut below = std::mem::take(&mut replies[found.len() + 1]);
        below.reverse();
        replies[parent].push(CommentNode {
            view,
            replies: below,
        });
    }
    let mut below = std::mem::take(&mut replies[0]);
    below.reverse();
    CommentNode {
        view: root,
        replies: below,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::Uuid;

    fn id(n: u8) -> CommentId {
        CommentId(Uuid::from_u128(u128::from(n) + 1))
    }

    fn view(n: u8, reply_to: Option<u8>, t: u16) -> CommentView {
        let at = Utc.timestamp_opt(1_700_000_000 + i64::from(t), 0).unwrap();
        CommentView {
            comment: Comment {
                id: id(n),
                collection_id: CollectionId::stub(),
                author: UserId::stub(),
                content: format!("comment {n}"),
                reply_to: reply_to.map(id),
                created_at: at,
                updated_at: at,
            },
            author: None,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<CommentId> {
        nodes.iter().map(|n| n.view.comment.id).collect()
    }

    #[test]
    fn content_length_is_bounded() {
        assert_eq!(validate_content("  hi "), Ok(String::from("hi")));
        assert_eq!(validate_content(" "), Err(Error::MissingFields));
        assert_eq!(validate_content(&"é".repeat(500)), Ok("é".repeat(500)));
        assert_eq!(
            validate_content(&"a".repeat(501)),
            Err(Error::ContentTooLong(MAX_COMMENT_LENGTH))
        );
    }

    #[test]
    fn orphan_replies_are_dropped() {
        let t = build_thread(
            vec![view(3, Some(99), 3), view(2, Some(1), 2), view(1, None, 1)],
            Page::new(1, 10),
        );
        assert_eq!(ids(&t.comments), vec![id(1)]);
        assert_eq!(ids(&t.comments[0].replies), vec![id(2)]);
        assert!(t.comments[0].replies[0].replies.is_empty());
        assert_eq!(
            t.pagination,
            Pagination {
                total: 1,
                page: 1,
                limit: 10,
                pages: 1,
            }
        );
    }

    #[test]
    fn roots_newest_first_replies_oldest_first() {
        let t = build_thread(
            vec![
                view(1, None, 10),
                view(2, None, 20),
                view(3, Some(1), 40),
                view(4, Some(1), 30),
                view(5, Some(4), 50),
            ],
            Page::new(1, 50),
        );
        assert_eq!(ids(&t.comments), vec![id(2), id(1)]);
        assert_eq!(ids(&t.comments[1].replies), vec![id(4), id(3)]);
        assert_eq!(ids(&t.comments[1].replies[0].replies), vec![id(5)]);
    }

    #[test]
    fn pages_split_roots_only() {
        let comments = (0..5)
            .map(|i| view(i, None, u16::from(i)))
            .chain([view(10, Some(4), 100)])
            .collect::<Vec<_>>();
        let p1 = build_thread(comments.clone(), Page::new(1, 2));
        let p2 = build_thread(comments.clone(), Page::new(2, 2));
        let p3 = build_thread(comments, Page::new(3, 2));
        assert_eq!(ids(&p1.comments), vec![id(4), id(3)]);
        assert_eq!(ids(&p1.comments[0].replies), vec![id(10)]);
        assert_eq!(ids(&p2.comments), vec![id(2), id(1)]);
        assert_eq!(ids(&p3.comments), vec![id(0)]);
        assert_eq!(p1.pagination.total, 5);
        assert_eq!(p1.pagination.pages, 3);
    }

    #[test]
    fn reply_cycles_are_dropped() {
        let t = build_thread(
            vec![view(1, Some(2), 1), view(2, Some(1), 2), view(3, Some(3), 3)],
            Page::new(1, 10),
        );
        assert!(t.comments.is_empty());
        assert_eq!(t.pagination.total, 0);
        assert_eq!(t.pagination.pages, 0);
    }

    fn chain(len: u32) -> Vec<CommentView> {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut parent = None;
        (0..len)
            .map(|i| {
                let id = CommentId(Uuid::from_u128(u128::from(i) + 1_000));
                let v = CommentView {
                    comment: Comment {
                        id,
                        collection_id: CollectionId::stub(),
                        author: UserId::stub(),
                        content: format!("reply {i}"),
                        reply_to: parent,
                        created_at: at + chrono::Duration::seconds(i64::from(i)),
                        updated_at: at,
                    },
                    author: None,
                };
                parent = Some(id);
                v
            })
            .collect()
    }

    fn depth(node: &CommentNode) -> usize {
        let mut depth = 0;
        let mut node = node;
        while let Some(next) = node.replies.first() {
            assert_eq!(node.replies.len(), 1);
            node = next;
            depth += 1;
        }
        depth
    }

    #[test]
    fn deep_reply_chains_are_cut_at_the_nesting_limit() {
        let t = build_thread(chain(20_000), Page::new(1, 10));
        assert_eq!(t.pagination.total, 1);
        assert_eq!(t.comments.len(), 1);
        assert_eq!(depth(&t.comments[0]), MAX_REPLY_DEPTH);
        let json = serde_json::to_string(&t).unwrap();
        let back: CommentThread = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let t = build_thread(chain(10), Page::new(1, 10));
        assert_eq!(depth(&t.comments[0]), 9);
    }

    #[test]
    fn author_display_fields_replace_the_user_id() {
        let mut v = view(1, None, 1);
        let author = UserSummary {
            id: UserId(Uuid::from_u128(7)),
            username: String::from("alice"),
            avatar: String::from("/a.png"),
        };
        v.comment.author = author.id;
        let gone = v.clone();
        v.author = Some(author.clone());

        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["userId"]["username"], "alice");
        assert_eq!(json["userId"]["_id"], author.id.0.to_string());
        assert!(json.get("author").is_none());
        assert_eq!(serde_json::from_value::<CommentView>(json).unwrap(), v);

        let json = serde_json::to_value(&gone).unwrap();
        assert_eq!(json["userId"], author.id.0.to_string());
        assert_eq!(serde_json::from_value::<CommentView>(json).unwrap(), gone);
    }

    fn collect(nodes: &[CommentNode], parent: Option<CommentId>, out: &mut Vec<CommentId>) {
        for n in nodes {
            assert_eq!(n.view.comment.reply_to, parent);
            out.push(n.view.comment.id);
            collect(&n.replies, Some(n.view.comment.id), out);
        }
    }

    #[test]
    fn thread_shape_holds_for_arbitrary_comments() {
        bolero::check!()
            .with_type::<Vec<(u8, Option<u8>, u16)>>()
            .cloned()
            .for_each(|raw| {
                let mut seen = HashSet::new();
                let comments = raw
                    .into_iter()
                    .filter(|(n, _, _)| seen.insert(*n))
                    .map(|(n, r, t)| view(n, r, t))
                    .collect::<Vec<_>>();
                let parents = comments
                    .iter()
                    .map(|c| (c.comment.id, c.comment.reply_to))
                    .collect::<HashMap<_, _>>();

                // A comment is shown iff following its parents leads to a root close enough
                let shown = |mut c: CommentId| {
                    for depth in 0..=parents.len() {
                        match parents.get(&c) {
                            None => return false,
                            Some(None) => return depth <= MAX_REPLY_DEPTH,
                            Some(Some(p)) => c = *p,
                        }
                    }
                    false
                };
                let mut expected = parents
                    .keys()
                    .copied()
                    .filter(|c| shown(*c))
                    .collect::<Vec<_>>();
                let roots = parents.values().filter(|p| p.is_none()).count();

                let t = build_thread(comments.clone(), Page::new(1, u64::MAX));
                assert_eq!(t.pagination.total, roots as u64);
                assert!(t
                    .comments
                    .windows(2)
                    .all(|w| w[0].view.comment.created_at >= w[1].view.comment.created_at));
                let mut got = Vec::new();
                collect(&t.comments, None, &mut got);
                got.sort();
                expected.sort();
                assert_eq!(got, expected);

                let (a, b) = (
                    build_thread(comments.clone(), Page::new(1, 2)),
                    build_thread(comments, Page::new(2, 2)),
                );
                let joined = ids(&a.comments)
                    .into_iter()
                    .chain(ids(&b.comments))
                    .collect::<Vec<_>>();
                assert_eq!(joined, ids(&t.comments).into_iter().take(4).collect::<Vec<_>>());
            });
    }
}
