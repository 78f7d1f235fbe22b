use std::collections::HashSet;

use arcana_api::{ActivityFilter, CommentId, Db};

/// Deletes a comment, every reply below it and their comment activities,
/// deepest replies first. Returns how many comments were deleted.
///
/// Stops at the first failure, so the comments above a reply that could not
/// be deleted are left in place.
pub async fn delete_comment(db: &dyn Db, id: CommentId) -> anyhow::Result<u64> {
    // Depth-first discovery order, walked backwards, puts every reply before its parent
    let mut visited = HashSet::new();
    let mut found = Vec::new();
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
        // reply cycles
        if !visited.insert(id) {
            continue;
        }
        if db.find_comment(id).await?.is_none() {
            tracing::debug!(comment = %id, "comment already gone, skipping");
            continue;
        }
        found.push(id);
        stack.extend(db.replies_to(id).await?.into_iter().rev().map(|r| r.id));
    }
    let mut deleted = 0;
    for id in found.into_iter().rev() {
        let activities = db
            .delete_activities(&ActivityFilter::about_comment(id))
            .await?;
        if db.delete_comment(id).await? {
            tracing::info!(comment = %id, activities, "deleted comment");
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use arcana_api::{Activity, ActivityKind, CollectionId, Comment, UserId};
    use arcana_mock_db::MockDb;
    use chrono::{Duration, Utc};

    use super::*;

    struct Thread {
        db: MockDb,
        c1: Comment,
        c2: Comment,
        c3: Comment,
        other: Comment,
    }

    async fn thread() -> Thread {
        let db = MockDb::new();
        let (coll, author) = (CollectionId::new(), UserId::new());
        let t = Utc::now();
        let c1 = Comment::new(coll, author, String::from("one"), None, t);
        let c2 = Comment::new(coll, author, String::from("two"), Some(c1.id), t + Duration::seconds(1));
        let c3 = Comment::new(coll, author, String::from("three"), Some(c2.id), t + Duration::seconds(2));
        let other = Comment::new(coll, author, String::from("other"), None, t + Duration::seconds(3));
        for (c, kind) in [
            (&c1, ActivityKind::Comment),
            (&c2, ActivityKind::Reply),
            (&c3, ActivityKind::Reply),
            (&other, ActivityKind::Comment),
        ] {
            db.create_comment(c).await.unwrap();
            db.create_activity(
                &Activity::new(kind, author, c.created_at)
                    .on_collection(coll)
                    .on_comment(c.id, c.content.clone()),
            )
            .await
            .unwrap();
        }
        db.create_activity(&Activity::new(ActivityKind::Like, author, t).on_collection(coll))
            .await
            .unwrap();
        Thread { db, c1, c2, c3, other }
    }

    #[tokio::test]
    async fn deleting_a_root_removes_its_whole_subtree() {
        let Thread { db, c1, other, .. } = thread().await;
        assert_eq!(delete_comment(&db, c1.id).await.unwrap(), 3);
        let left = db.test_comments();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, other.id);
        let activities = db.test_activities();
        assert_eq!(activities.len(), 2);
        assert!(activities
            .iter()
            .all(|a| a.comment_id.is_none() || a.comment_id == Some(other.id)));
    }

    #[tokio::test]
    async fn failing_descendant_keeps_ancestors() {
        let Thread { db, c1, c2, c3, .. } = thread().await;
        db.test_fail_comment_delete(c2.id);
        assert!(delete_comment(&db, c1.id).await.is_err());
        let left = db.test_comments().into_iter().map(|c| c.id).collect::<Vec<_>>();
        assert!(left.contains(&c1.id));
        assert!(left.contains(&c2.id));
        assert!(!left.contains(&c3.id));
    }

    #[tokio::test]
    async fn missing_comments_are_skipped() {
        let Thread { db, c3, .. } = thread().await;
        db.test_remove_comment(c3.id);
        assert_eq!(delete_comment(&db, c3.id).await.unwrap(), 0);
        assert_eq!(db.test_activities().len(), 5);
    }

    #[tokio::test]
    async fn reply_cycles_terminate() {
        let db = MockDb::new();
        let (coll, author, t) = (CollectionId::new(), UserId::new(), Utc::now());
        let mut a = Comment::new(coll, author, String::from("a"), None, t);
        let b = Comment::new(coll, author, String::from("b"), Some(a.id), t);
        a.reply_to = Some(b.id);
        db.create_comment(&a).await.unwrap();
        db.create_comment(&b).await.unwrap();
        assert_eq!(delete_comment(&db, a.id).await.unwrap(), 2);
        assert!(db.test_comments().is_empty());
    }

    #[tokio::test]
    async fn very_long_reply_chains_are_deleted() {
        let db = MockDb::new();
        let (coll, author, t) = (CollectionId::new(), UserId::new(), Utc::now());
        let root = Comment::new(coll, author, String::from("0"), None, t);
        db.create_comment(&root).await.unwrap();
        let mut parent = root.id;
        for i in 1..=10_000 {
            let c = Comment::new(
                coll,
                author,
                i.to_string(),
                Some(parent),
                t + Duration::seconds(i),
            );
            db.create_comment(&c).await.unwrap();
            parent = c.id;
        }
        assert_eq!(delete_comment(&db, root.id).await.unwrap(), 10_001);
        assert!(db.test_comments().is_empty());
    }
}
