use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::anyhow;
use arcana_api::{
    Activity, ActivityFilter, ActivityId, Collection, CollectionFilter, CollectionId, Comment,
    CommentId, Db, DbStream, Element, ElementId, Like, Message, MessageId, Time, User, UserId,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;

/// In-memory store, keeping records in insertion order
pub struct MockDb(Mutex<Store>);

#[derive(Default)]
struct Store {
    users: BTreeMap<UserId, User>,
    collections: Vec<Collection>,
    elements: Vec<Element>,
    comments: Vec<Comment>,
    activities: Vec<Activity>,
    likes: Vec<Like>,
    messages: Vec<Message>,

    failing_comment_deletes: HashSet<CommentId>,
    failing_activity_deletes: HashSet<ActivityId>,
}

fn newest_first<T>(mut v: Vec<T>, at: impl Fn(&T) -> Time) -> Vec<T> {
    v.sort_by(|a, b| at(b).cmp(&at(a)));
    v
}

fn oldest_first<T>(mut v: Vec<T>, at: impl Fn(&T) -> Time) -> Vec<T> {
    v.sort_by_key(|x| at(x));
    v
}

fn snapshot<'a, T: Send + 'a>(v: Vec<T>) -> DbStream<'a, T> {
    futures::stream::iter(v.into_iter().map(Ok)).boxed()
}

fn remove_where<T>(v: &mut Vec<T>, mut pred: impl FnMut(&T) -> bool) -> u64 {
    let before = v.len();
    v.retain(|x| !pred(x));
    (before - v.len()) as u64
}

impl MockDb {
    pub fn new() -> MockDb {
        MockDb(Mutex::new(Store::default()))
    }

    /// Deletes a user without touching anything that references it
    pub fn test_remove_user(&self, id: UserId) {
        self.0.lock().users.remove(&id);
    }

    pub fn test_remove_collection(&self, id: CollectionId) {
        self.0.lock().collections.retain(|c| c.id != id);
    }

    pub fn test_remove_comment(&self, id: CommentId) {
        self.0.lock().comments.retain(|c| c.id != id);
    }

    /// Makes every later deletion of this comment fail
    pub fn test_fail_comment_delete(&self, id: CommentId) {
        self.0.lock().failing_comment_deletes.insert(id);
    }

    pub fn test_fail_activity_delete(&self, id: ActivityId) {
        self.0.lock().failing_activity_deletes.insert(id);
    }

    pub fn test_users(&self) -> Vec<User> {
        self.0.lock().users.values().cloned().collect()
    }

    pub fn test_collections(&self) -> Vec<Collection> {
        self.0.lock().collections.clone()
    }

    pub fn test_comments(&self) -> Vec<Comment> {
        self.0.lock().comments.clone()
    }

    pub fn test_activities(&self) -> Vec<Activity> {
        self.0.lock().activities.clone()
    }

    pub fn test_likes(&self) -> Vec<Like> {
        self.0.lock().likes.clone()
    }

    pub fn test_messages(&self) -> Vec<Message> {
        self.0.lock().messages.clone()
    }
}

impl Default for MockDb {
    fn default() -> MockDb {
        MockDb::new()
    }
}

#[async_trait]
impl Db for MockDb {
    async fn create_user(&self, u: &User) -> anyhow::Result<()> {
        let mut s = self.0.lock();
        if s.users.contains_key(&u.id) {
            return Err(anyhow!("user {} already exists", u.id));
        }
        s.users.insert(u.id, u.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.0.lock().users.get(&id).cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> anyhow::Result<Vec<User>> {
        let s = self.0.lock();
        Ok(ids.iter().filter_map(|id| s.users.get(id).cloned()).collect())
    }

    async fn find_user_by_login(&self, login: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .0
            .lock()
            .users
            .values()
            .find(|u| u.username == login || u.email == login)
            .cloned())
    }

    async fn find_conflicting_user(
        &self,
        username: &str,
        email: &str,
        except: Option<UserId>,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .0
            .lock()
            .users
            .values()
            .find(|u| Some(u.id) != except && (u.username == username || u.email == email))
            .cloned())
    }

    async fn set_user_token(&self, id: UserId, token: Option<&str>) -> anyhow::Result<()> {
        if let Some(u) = self.0.lock().users.get_mut(&id) {
            u.token = token.map(String::from);
        }
        Ok(())
    }

    async fn update_user(&self, u: &User) -> anyhow::Result<()> {
        if let Some(stored) = self.0.lock().users.get_mut(&u.id) {
            *stored = User {
                token: stored.token.clone(),
                followers: stored.followers.clone(),
                following: stored.following.clone(),
                ..u.clone()
            };
        }
        Ok(())
    }

    async fn search_users(&self, term: &str, limit: usize) -> anyhow::Result<Vec<User>> {
        let term = term.to_lowercase();
        Ok(self
            .0
            .lock()
            .users
            .values()
            .filter(|u| u.username.to_lowercase().contains(&term))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn user_ids(&self) -> anyhow::Result<Vec<UserId>> {
        Ok(self.0.lock().users.keys().copied().collect())
    }

    fn users(&self) -> DbStream<'_, User> {
        snapshot(self.test_users())
    }

    async fn add_following(&self, user: UserId, peer: UserId, at: Time) -> anyhow::Result<()> {
        if let Some(u) = self.0.lock().users.get_mut(&user) {
            u.following.entry(peer).or_insert(at);
        }
        Ok(())
    }

    async fn add_follower(&self, user: UserId, peer: UserId, at: Time) -> anyhow::Result<()> {
        if let Some(u) = self.0.lock().users.get_mut(&user) {
            u.followers.entry(peer).or_insert(at);
        }
        Ok(())
    }

    async fn remove_following(&self, user: UserId, peer: UserId) -> anyhow::Result<bool> {
        Ok(self
            .0
            .lock()
            .users
            .get_mut(&user)
            .map_or(false, |u| u.following.remove(&peer).is_some()))
    }

    async fn remove_follower(&self, user: UserId, peer: UserId) -> anyhow::Result<bool> {
        Ok(self
            .0
            .lock()
            .users
            .get_mut(&user)
            .map_or(false, |u| u.followers.remove(&peer).is_some()))
    }

    async fn create_collection(&self, c: &Collection) -> anyhow::Result<()> {
        self.0.lock().collections.push(c.clone());
        Ok(())
    }

    async fn find_collection(&self, id: CollectionId) -> anyhow::Result<Option<Collection>> {
        Ok(self
            .0
            .lock()
            .collections
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_collections(&self, ids: &[CollectionId]) -> anyhow::Result<Vec<Collection>> {
        Ok(self
            .0
            .lock()
            .collections
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn list_collections(&self, filter: &CollectionFilter) -> anyhow::Result<Vec<Collection>> {
        let res = self
            .0
            .lock()
            .collections
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        Ok(newest_first(res, |c| c.created_at))
    }

    async fn search_collections(&self, term: &str, limit: usize) -> anyhow::Result<Vec<Collection>> {
        let term = term.to_lowercase();
        Ok(self
            .0
            .lock()
            .collections
            .iter()
            .filter(|c| {
                c.title.to_lowercase().contains(&term)
                    || c.tags.iter().any(|t| t.to_lowercase().contains(&term))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_collection(&self, c: &Collection) -> anyhow::Result<()> {
        if let Some(stored) = self.0.lock().collections.iter_mut().find(|s| s.id == c.id) {
            *stored = c.clone();
        }
        Ok(())
    }

    async fn delete_collection(&self, id: CollectionId) -> anyhow::Result<bool> {
        Ok(remove_where(&mut self.0.lock().collections, |c| c.id == id) > 0)
    }

    async fn push_element(&self, c: CollectionId, e: ElementId) -> anyhow::Result<()> {
        if let Some(coll) = self.0.lock().collections.iter_mut().find(|s| s.id == c) {
            coll.elements.push(e);
        }
        Ok(())
    }

    async fn pull_element(&self, c: CollectionId, e: ElementId) -> anyhow::Result<()> {
        if let Some(coll) = self.0.lock().collections.iter_mut().find(|s| s.id == c) {
            coll.elements.retain(|x| *x != e);
        }
        Ok(())
    }

    async fn collection_ids(&self) -> anyhow::Result<Vec<CollectionId>> {
        Ok(self.0.lock().collections.iter().map(|c| c.id).collect())
    }

    fn collections(&self) -> DbStream<'_, Collection> {
        snapshot(self.test_collections())
    }

    async fn create_element(&self, e: &Element) -> anyhow::Result<()> {
        self.0.lock().elements.push(e.clone());
        Ok(())
    }

    async fn find_element(&self, id: ElementId) -> anyhow::Result<Option<Element>> {
        Ok(self.0.lock().elements.iter().find(|e| e.id == id).cloned())
    }

    async fn elements_in(&self, collections: &[CollectionId]) -> anyhow::Result<Vec<Element>> {
        let res = self
            .0
            .lock()
            .elements
            .iter()
            .filter(|e| collections.contains(&e.collection_id))
            .cloned()
            .collect();
        Ok(oldest_first(res, |e| e.created_at))
    }

    async fn update_element(&self, e: &Element) -> anyhow::Result<()> {
        if let Some(stored) = self.0.lock().elements.iter_mut().find(|s| s.id == e.id) {
            *stored = e.clone();
        }
        Ok(())
    }

    async fn delete_element(&self, id: ElementId) -> anyhow::Result<bool> {
        Ok(remove_where(&mut self.0.lock().elements, |e| e.id == id) > 0)
    }

    async fn create_comment(&self, c: &Comment) -> anyhow::Result<()> {
        self.0.lock().comments.push(c.clone());
        Ok(())
    }

    async fn find_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.0.lock().comments.iter().find(|c| c.id == id).cloned())
    }

    async fn comments_in(&self, collection: CollectionId) -> anyhow::Result<Vec<Comment>> {
        let res = self
            .0
            .lock()
            .comments
            .iter()
            .filter(|c| c.collection_id == collection)
            .cloned()
            .collect();
        Ok(oldest_first(res, |c| c.created_at))
    }

    async fn replies_to(&self, id: CommentId) -> anyhow::Result<Vec<Comment>> {
        let res = self
            .0
            .lock()
            .comments
            .iter()
            .filter(|c| c.reply_to == Some(id))
            .cloned()
            .collect();
        Ok(oldest_first(res, |c| c.created_at))
    }

    async fn comments_by(
        &self,
        author: UserId,
        skip: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<Comment>> {
        let res = self
            .0
            .lock()
            .comments
            .iter()
            .filter(|c| c.author == author)
            .cloned()
            .collect();
        Ok(newest_first(res, |c| c.created_at)
            .into_iter()
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn count_comments_by(&self, author: UserId) -> anyhow::Result<u64> {
        Ok(self
            .0
            .lock()
            .comments
            .iter()
            .filter(|c| c.author == author)
            .count() as u64)
    }

    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<bool> {
        let mut s = self.0.lock();
        if s.failing_comment_deletes.contains(&id) {
            return Err(anyhow!("deleting comment {id}: injected failure"));
        }
        Ok(remove_where(&mut s.comments, |c| c.id == id) > 0)
    }

    async fn comment_ids(&self) -> anyhow::Result<Vec<CommentId>> {
        Ok(self.0.lock().comments.iter().map(|c| c.id).collect())
    }

    async fn create_activity(&self, a: &Activity) -> anyhow::Result<()> {
        self.0.lock().activities.push(a.clone());
        Ok(())
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> anyhow::Result<Vec<Activity>> {
        let res = self
            .0
            .lock()
            .activities
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        Ok(newest_first(res, |a| a.created_at))
    }

    async fn delete_activity(&self, id: ActivityId) -> anyhow::Result<bool> {
        let mut s = self.0.lock();
        if s.failing_activity_deletes.contains(&id) {
            return Err(anyhow!("deleting activity {id}: injected failure"));
        }
        Ok(remove_where(&mut s.activities, |a| a.id == id) > 0)
    }

    async fn delete_activities(&self, filter: &ActivityFilter) -> anyhow::Result<u64> {
        Ok(remove_where(&mut self.0.lock().activities, |a| {
            filter.matches(a)
        }))
    }

    async fn delete_one_activity(&self, filter: &ActivityFilter) -> anyhow::Result<bool> {
        let mut s = self.0.lock();
        let oldest = s
            .activities
            .iter()
            .enumerate()
            .filter(|(_, a)| filter.matches(a))
            .min_by_key(|(_, a)| a.created_at)
            .map(|(i, _)| i);
        Ok(match oldest {
            Some(i) => {
                s.activities.remove(i);
                true
            }
            None => false,
        })
    }

    fn activities_with_collection(&self) -> DbStream<'_, Activity> {
        snapshot(
            self.test_activities()
                .into_iter()
                .filter(|a| a.collection_id.is_some())
                .collect(),
        )
    }

    fn comment_activities(&self, with_reference: bool) -> DbStream<'_, Activity> {
        snapshot(
            self.test_activities()
                .into_iter()
                .filter(|a| a.kind.is_comment() && a.comment_id.is_some() == with_reference)
                .collect(),
        )
    }

    async fn create_like(&self, l: &Like) -> anyhow::Result<()> {
        self.0.lock().likes.push(l.clone());
        Ok(())
    }

    async fn find_like(&self, user: UserId, collection: CollectionId) -> anyhow::Result<Option<Like>> {
        Ok(self
            .0
            .lock()
            .likes
            .iter()
            .find(|l| l.user_id == user && l.collection_id == collection)
            .cloned())
    }

    async fn delete_like(&self, user: UserId, collection: CollectionId) -> anyhow::Result<bool> {
        Ok(remove_where(&mut self.0.lock().likes, |l| {
            l.user_id == user && l.collection_id == collection
        }) > 0)
    }

    async fn likes_by(&self, user: UserId) -> anyhow::Result<Vec<Like>> {
        let res = self
            .0
            .lock()
            .likes
            .iter()
            .filter(|l| l.user_id == user)
            .cloned()
            .collect();
        Ok(newest_first(res, |l| l.created_at))
    }

    async fn likes_on(&self, collection: CollectionId) -> anyhow::Result<Vec<Like>> {
        let res = self
            .0
            .lock()
            .likes
            .iter()
            .filter(|l| l.collection_id == collection)
            .cloned()
            .collect();
        Ok(newest_first(res, |l| l.created_at))
    }

    async fn delete_likes_on(&self, collection: CollectionId) -> anyhow::Result<u64> {
        Ok(remove_where(&mut self.0.lock().likes, |l| {
            l.collection_id == collection
        }))
    }

    async fn like_counts(
        &self,
        collections: &[CollectionId],
    ) -> anyhow::Result<HashMap<CollectionId, u64>> {
        let mut res = HashMap::new();
        for l in self.0.lock().likes.iter() {
            if collections.contains(&l.collection_id) {
                *res.entry(l.collection_id).or_default() += 1;
            }
        }
        Ok(res)
    }

    async fn create_message(&self, m: &Message) -> anyhow::Result<()> {
        self.0.lock().messages.push(m.clone());
        Ok(())
    }

    async fn find_message(&self, id: MessageId) -> anyhow::Result<Option<Message>> {
        Ok(self.0.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn messages_of(&self, user: UserId) -> anyhow::Result<Vec<Message>> {
        let res = self
            .0
            .lock()
            .messages
            .iter()
            .filter(|m| m.sender == user || m.receiver == user)
            .cloned()
            .collect();
        Ok(newest_first(res, |m| m.created_at))
    }

    async fn conversation(&self, a: UserId, b: UserId) -> anyhow::Result<Vec<Message>> {
        let res = self
            .0
            .lock()
            .messages
            .iter()
            .filter(|m| m.between(a, b))
            .cloned()
            .collect();
        Ok(oldest_first(res, |m| m.created_at))
    }

    async fn last_message(&self, a: UserId, b: UserId) -> anyhow::Result<Option<Message>> {
        Ok(self.conversation(a, b).await?.pop())
    }

    async fn count_unread(&self, receiver: UserId, sender: Option<UserId>) -> anyhow::Result<u64> {
        Ok(self
            .0
            .lock()
            .messages
            .iter()
            .filter(|m| {
                !m.read && m.receiver == receiver && sender.map_or(true, |s| m.sender == s)
            })
            .count() as u64)
    }

    async fn last_unread(&self, receiver: UserId) -> anyhow::Result<Option<Message>> {
        let res = self
            .0
            .lock()
            .messages
            .iter()
            .filter(|m| !m.read && m.receiver == receiver)
            .cloned()
            .collect();
        Ok(newest_first(res, |m| m.created_at).into_iter().next())
    }

    async fn mark_read(&self, receiver: UserId, sender: UserId) -> anyhow::Result<u64> {
        let mut updated = 0;
        for m in self.0.lock().messages.iter_mut() {
            if !m.read && m.receiver == receiver && m.sender == sender {
                m.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_message(&self, id: MessageId) -> anyhow::Result<bool> {
        Ok(remove_where(&mut self.0.lock().messages, |m| m.id == id) > 0)
    }

    async fn delete_conversation(&self, a: UserId, b: UserId) -> anyhow::Result<u64> {
        Ok(remove_where(&mut self.0.lock().messages, |m| m.between(a, b)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use arcana_api::{ActivityKind, Visibility, DEFAULT_AVATAR};
    use chrono::{Duration, Utc};
    use futures::TryStreamExt;

    use super::*;

    fn user(name: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            username: String::from(name),
            email: format!("{name}@example.com"),
            password_hash: String::new(),
            first_name: String::from(name),
            last_name: String::from(name),
            bio: None,
            avatar: String::from(DEFAULT_AVATAR),
            token: Some(String::from("tok")),
            followers: HashMap::new(),
            following: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn update_user_keeps_relationships() {
        let db = MockDb::new();
        let mut u = user("alice");
        db.create_user(&u).await.unwrap();
        let peer = UserId::new();
        db.add_follower(u.id, peer, Utc::now()).await.unwrap();
        u.bio = Some(String::from("reader"));
        u.token = None;
        db.update_user(&u).await.unwrap();
        let stored = db.find_user(u.id).await.unwrap().unwrap();
        assert_eq!(stored.bio.as_deref(), Some("reader"));
        assert_eq!(stored.token.as_deref(), Some("tok"));
        assert!(stored.followers.contains_key(&peer));
    }

    #[tokio::test]
    async fn conflicts_ignore_the_user_itself() {
        let db = MockDb::new();
        let u = user("bob");
        db.create_user(&u).await.unwrap();
        assert!(db
            .find_conflicting_user("bob", "x@y.z", None)
            .await
            .unwrap()
            .is_some());
        assert!(db
            .find_conflicting_user("bob", "bob@example.com", Some(u.id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            db.find_user_by_login("bob@example.com").await.unwrap().map(|u| u.id),
            Some(u.id)
        );
    }

    #[tokio::test]
    async fn delete_one_activity_takes_oldest() {
        let db = MockDb::new();
        let actor = UserId::new();
        let c = CollectionId::new();
        let now = Utc::now();
        let old = Activity::new(ActivityKind::Like, actor, now - Duration::seconds(10))
            .on_collection(c);
        let new = Activity::new(ActivityKind::Like, actor, now).on_collection(c);
        db.create_activity(&new).await.unwrap();
        db.create_activity(&old).await.unwrap();
        let filter = ActivityFilter {
            kinds: Some(vec![ActivityKind::Like]),
            actors: Some(vec![actor]),
            collection: Some(c),
            ..Default::default()
        };
        assert!(db.delete_one_activity(&filter).await.unwrap());
        assert_eq!(db.test_activities(), vec![new]);
        assert!(db.delete_one_activity(&filter).await.unwrap());
        assert!(!db.delete_one_activity(&filter).await.unwrap());
    }

    #[tokio::test]
    async fn comment_activity_streams_split_on_reference() {
        let db = MockDb::new();
        let actor = UserId::new();
        let now = Utc::now();
        let with = Activity::new(ActivityKind::Reply, actor, now)
            .on_comment(CommentId::new(), String::from("hey"));
        let without = Activity::new(ActivityKind::Comment, actor, now);
        let like = Activity::new(ActivityKind::Like, actor, now);
        for a in [&with, &without, &like] {
            db.create_activity(a).await.unwrap();
        }
        let got: Vec<Activity> = db.comment_activities(true).try_collect().await.unwrap();
        assert_eq!(got, vec![with]);
        let got: Vec<Activity> = db.comment_activities(false).try_collect().await.unwrap();
        assert_eq!(got, vec![without]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let db = MockDb::new();
        let now = Utc::now();
        let c = Collection {
            id: CollectionId::new(),
            owner: UserId::new(),
            title: String::from("Space Opera"),
            description: String::new(),
            cover: String::new(),
            visibility: Visibility::Public,
            collaborators: vec![],
            elements: vec![],
            tags: vec![String::from("SciFi")],
            created_at: now,
            updated_at: now,
        };
        db.create_collection(&c).await.unwrap();
        assert_eq!(db.search_collections("opera", 10).await.unwrap().len(), 1);
        assert_eq!(db.search_collections("scif", 10).await.unwrap().len(), 1);
        assert!(db.search_collections("western", 10).await.unwrap().is_empty());
    }
}
