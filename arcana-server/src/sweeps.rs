//! Reconciliation jobs for the references the store does not enforce.
//!
//! Each sweep collects the ids that currently exist, walks the candidate
//! records as a stream and deletes the ones pointing outside of that set, one
//! store call per orphan. A store error stops the sweep; what was already
//! deleted stays deleted.

use std::collections::HashSet;

use arcana_api::{CommentActivityReport, Db, SweepReport};
use futures::TryStreamExt;

pub async fn cleanup_followers(db: &dyn Db) -> anyhow::Result<SweepReport> {
    let valid = db.user_ids().await?.into_iter().collect::<HashSet<_>>();
    let mut removed = 0;
    let mut users = db.users();
    while let Some(u) = users.try_next().await? {
        for peer in u.followers.keys().filter(|p| !valid.contains(*p)) {
            if db.remove_follower(u.id, *peer).await? {
                tracing::info!(user = %u.id, %peer, "removed follower entry of deleted user");
                removed += 1;
            }
        }
        for peer in u.following.keys().filter(|p| !valid.contains(*p)) {
            if db.remove_following(u.id, *peer).await? {
                tracing::info!(user = %u.id, %peer, "removed following entry of deleted user");
                removed += 1;
            }
        }
    }
    tracing::info!(removed, "follow graph cleanup done");
    Ok(SweepReport { removed })
}

pub async fn cleanup_collection_activity(db: &dyn Db) -> anyhow::Result<SweepReport> {
    let valid = db
        .collection_ids()
        .await?
        .into_iter()
        .collect::<HashSet<_>>();
    let mut removed = 0;
    let mut activities = db.activities_with_collection();
    while let Some(a) = activities.try_next().await? {
        let dangling = a.collection_id.map_or(false, |c| !valid.contains(&c));
        if dangling && db.delete_activity(a.id).await? {
            tracing::info!(activity = %a.id, "removed activity of deleted collection");
            removed += 1;
        }
    }
    tracing::info!(removed, "collection activity cleanup done");
    Ok(SweepReport { removed })
}

/// Runs two passes: comment activities that never had a comment reference,
/// then those whose comment is gone
pub async fn cleanup_comment_activity(db: &dyn Db) -> anyhow::Result<CommentActivityReport> {
    let mut missing_reference = 0;
    let mut activities = db.comment_activities(false);
    while let Some(a) = activities.try_next().await? {
        if db.delete_activity(a.id).await? {
            tracing::info!(activity = %a.id, "removed comment activity without comment");
            missing_reference += 1;
        }
    }
    drop(activities);

    let valid = db.comment_ids().await?.into_iter().collect::<HashSet<_>>();
    let mut dangling_reference = 0;
    let mut activities = db.comment_activities(true);
    while let Some(a) = activities.try_next().await? {
        let dangling = a.comment_id.map_or(false, |c| !valid.contains(&c));
        if dangling && db.delete_activity(a.id).await? {
            tracing::info!(activity = %a.id, "removed activity of deleted comment");
            dangling_reference += 1;
        }
    }

    let removed = missing_reference + dangling_reference;
    tracing::info!(
        missing_reference,
        dangling_reference,
        removed,
        "comment activity cleanup done"
    );
    Ok(CommentActivityReport {
        missing_reference,
        dangling_reference,
        removed,
    })
}

pub async fn cleanup_orphan_collections(db: &dyn Db) -> anyhow::Result<SweepReport> {
    let valid = db.user_ids().await?.into_iter().collect::<HashSet<_>>();
    let mut removed = 0;
    let mut collections = db.collections();
    while let Some(c) = collections.try_next().await? {
        if !valid.contains(&c.owner) && db.delete_collection(c.id).await? {
            tracing::info!(collection = %c.id, owner = %c.owner, "removed collection of deleted user");
            removed += 1;
        }
    }
    tracing::info!(removed, "orphan collection cleanup done");
    Ok(SweepReport { removed })
}

#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;

    use arcana_api::{
        Activity, ActivityKind, Collection, CollectionId, Comment, CommentId, NewCollection, User,
        UserId, Visibility,
    };
    use arcana_mock_db::MockDb;
    use chrono::{Duration, Utc};

    use super::*;

    fn user(name: &str) -> User {
        arcana_api::NewUser {
            username: String::from(name),
            password: String::from("pass"),
            email: format!("{name}@example.com"),
            first_name: String::from(name),
            last_name: String::from(name),
        }
        .into_user(String::new(), Utc::now())
    }

    fn collection(owner: UserId) -> Collection {
        NewCollection {
            title: String::from("shelf"),
            visibility: Some(Visibility::Public),
            ..Default::default()
        }
        .into_collection(owner, Utc::now())
    }

    #[tokio::test]
    async fn followers_of_deleted_users_are_dropped() {
        let db = MockDb::new();
        let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));
        for u in [&alice, &bob, &carol] {
            db.create_user(u).await.unwrap();
        }
        let now = Utc::now();
        db.add_following(alice.id, bob.id, now).await.unwrap();
        db.add_follower(bob.id, alice.id, now).await.unwrap();
        db.add_following(alice.id, carol.id, now).await.unwrap();
        db.add_follower(carol.id, alice.id, now).await.unwrap();
        db.add_follower(alice.id, carol.id, now).await.unwrap();
        db.test_remove_user(carol.id);

        assert_eq!(cleanup_followers(&db).await.unwrap().removed, 2);
        let alice = db.find_user(alice.id).await.unwrap().unwrap();
        assert!(alice.following.contains_key(&bob.id));
        assert_eq!(alice.following.len(), 1);
        assert!(alice.followers.is_empty());
        assert_eq!(cleanup_followers(&db).await.unwrap().removed, 0);
    }

    #[tokio::test]
    async fn collections_of_missing_owners_are_removed() {
        let db = MockDb::new();
        let u1 = user("u1");
        db.create_user(&u1).await.unwrap();
        let a = collection(u1.id);
        let b = collection(UserId::new());
        db.create_collection(&a).await.unwrap();
        db.create_collection(&b).await.unwrap();

        assert_eq!(cleanup_orphan_collections(&db).await.unwrap().removed, 1);
        assert!(db.find_collection(a.id).await.unwrap().is_some());
        assert!(db.find_collection(b.id).await.unwrap().is_none());
        assert_eq!(cleanup_orphan_collections(&db).await.unwrap().removed, 0);
    }

    #[tokio::test]
    async fn collection_activity_follows_collections() {
        let db = MockDb::new();
        let actor = UserId::new();
        let kept = collection(actor);
        db.create_collection(&kept).await.unwrap();
        let now = Utc::now();
        let live = Activity::new(ActivityKind::Like, actor, now).on_collection(kept.id);
        let dead = Activity::new(ActivityKind::Like, actor, now).on_collection(CollectionId::new());
        let unrelated = Activity::new(ActivityKind::Comment, actor, now);
        for a in [&live, &dead, &unrelated] {
            db.create_activity(a).await.unwrap();
        }

        assert_eq!(cleanup_collection_activity(&db).await.unwrap().removed, 1);
        let left = db.test_activities();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|a| a.id != dead.id));
    }

    #[tokio::test]
    async fn comment_activity_runs_both_passes() {
        let db = MockDb::new();
        let actor = UserId::new();
        let now = Utc::now();
        let c = Comment::new(CollectionId::new(), actor, String::from("hi"), None, now);
        db.create_comment(&c).await.unwrap();
        let live = Activity::new(ActivityKind::Comment, actor, now)
            .on_comment(c.id, String::from("hi"));
        let dangling = Activity::new(ActivityKind::Reply, actor, now + Duration::seconds(1))
            .on_comment(CommentId::new(), String::from("yo"));
        let unreferenced = Activity::new(ActivityKind::Comment, actor, now);
        let like = Activity::new(ActivityKind::Like, actor, now);
        for a in [&live, &dangling, &unreferenced, &like] {
            db.create_activity(a).await.unwrap();
        }

        let report = cleanup_comment_activity(&db).await.unwrap();
        assert_eq!(
            report,
            CommentActivityReport {
                missing_reference: 1,
                dangling_reference: 1,
                removed: 2,
            }
        );
        let mut left = db.test_activities().into_iter().map(|a| a.id).collect::<Vec<_>>();
        left.sort();
        let mut expected = vec![live.id, like.id];
        expected.sort();
        assert_eq!(left, expected);
    }

    #[tokio::test]
    async fn store_errors_abort_the_sweep() {
        let db = MockDb::new();
        let actor = UserId::new();
        let now = Utc::now();
        let first = Activity::new(ActivityKind::Like, actor, now).on_collection(CollectionId::new());
        let second = Activity::new(ActivityKind::Like, actor, now).on_collection(CollectionId::new());
        db.create_activity(&first).await.unwrap();
        db.create_activity(&second).await.unwrap();
        db.test_fail_activity_delete(first.id);

        assert!(cleanup_collection_activity(&db).await.is_err());
        assert_eq!(db.test_activities().len(), 2);
    }

    #[derive(Clone, Debug)]
    struct World {
        users: u8,
        follows: Vec<(u8, u8)>,
        collections: Vec<u8>,
        comments: Vec<(u8, bool)>,
        activities: Vec<(u8, Option<u8>, Option<u8>)>,
    }

    async fn populate(db: &MockDb, w: World) {
        let now = Utc::now();
        // Ids are drawn from twice as many slots as there are live records, so about half dangle
        let users = (0..=u16::from(w.users) * 2)
            .map(|_| user(&UserId::new().to_string()))
            .collect::<Vec<_>>();
        for u in users.iter().take(usize::from(w.users)) {
            db.create_user(u).await.unwrap();
        }
        let pick_user = |i: u8| users[usize::from(i) % users.len()].id;
        for (a, b) in w.follows {
            db.add_following(pick_user(a), pick_user(b), now).await.unwrap();
            db.add_follower(pick_user(b), pick_user(a), now).await.unwrap();
        }
        let collections = w
            .collections
            .iter()
            .map(|o| collection(pick_user(*o)))
            .collect::<Vec<_>>();
        for c in collections.iter().step_by(2) {
            db.create_collection(c).await.unwrap();
        }
        let comments = w
            .comments
            .iter()
            .map(|(a, _)| Comment::new(CollectionId::new(), pick_user(*a), String::from("c"), None, now))
            .collect::<Vec<_>>();
        for (c, (_, live)) in comments.iter().zip(w.comments.iter()) {
            if *live {
                db.create_comment(c).await.unwrap();
            }
        }
        for (i, (actor, coll, comm)) in w.activities.into_iter().enumerate() {
            let kind = match i % 4 {
                0 => ActivityKind::CreateCollection,
                1 => ActivityKind::Like,
                2 => ActivityKind::Comment,
                _ => ActivityKind::Reply,
            };
            let mut a = Activity::new(kind, pick_user(actor), now);
            if let (Some(c), false) = (coll, collections.is_empty()) {
                a = a.on_collection(collections[usize::from(c) % collections.len()].id);
            }
            if let (Some(c), false) = (comm, comments.is_empty()) {
                a = a.on_comment(comments[usize::from(c) % comments.len()].id, String::from("c"));
            }
            db.create_activity(&a).await.unwrap();
        }
    }

    #[test]
    fn sweeps_are_idempotent() {
        let runtime = AssertUnwindSafe(
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed initializing tokio runtime"),
        );
        bolero::check!()
            .with_type::<(
                u8,
                Vec<(u8, u8)>,
                Vec<u8>,
                Vec<(u8, bool)>,
                Vec<(u8, Option<u8>, Option<u8>)>,
            )>()
            .cloned()
            .for_each(move |(users, follows, collections, comments, activities)| {
                let w = World {
                    users,
                    follows,
                    collections,
                    comments,
                    activities,
                };
                runtime.block_on(async move {
                    let db = MockDb::new();
                    populate(&db, w).await;
                    cleanup_followers(&db).await.unwrap();
                    assert_eq!(cleanup_followers(&db).await.unwrap().removed, 0);
                    cleanup_collection_activity(&db).await.unwrap();
                    assert_eq!(cleanup_collection_activity(&db).await.unwrap().removed, 0);
                    cleanup_comment_activity(&db).await.unwrap();
                    assert_eq!(cleanup_comment_activity(&db).await.unwrap().removed, 0);
                    cleanup_orphan_collections(&db).await.unwrap();
                    assert_eq!(cleanup_orphan_collections(&db).await.unwrap().removed, 0);
                })
            })
    }
}
