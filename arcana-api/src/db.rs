use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    Activity, ActivityFilter, ActivityId, Collection, CollectionFilter, CollectionId, Comment,
    CommentId, Element, ElementId, Like, Message, MessageId, Time, User, UserId,
};

pub type DbStream<'a, T> = BoxStream<'a, anyhow::Result<T>>;

/// Document store holding every record set. References between records are
/// plain ids: nothing here checks that they point at something.
///
/// Lists are returned newest first unless stated otherwise.
#[async_trait]
pub trait Db: Send + Sync {
    async fn create_user(&self, u: &User) -> anyhow::Result<()>;
    async fn find_user(&self, id: UserId) -> anyhow::Result<Option<User>>;
    async fn find_users(&self, ids: &[UserId]) -> anyhow::Result<Vec<User>>;
    /// Matches either the username or the email, both already normalized
    async fn find_user_by_login(&self, login: &str) -> anyhow::Result<Option<User>>;
    /// Any user other than `except` owning this username or this email
    async fn find_conflicting_user(
        &self,
        username: &str,
        email: &str,
        except: Option<UserId>,
    ) -> anyhow::Result<Option<User>>;
    async fn set_user_token(&self, id: UserId, token: Option<&str>) -> anyhow::Result<()>;
    /// Stores the profile fields, leaving tokens and relationships alone
    async fn update_user(&self, u: &User) -> anyhow::Result<()>;
    async fn search_users(&self, term: &str, limit: usize) -> anyhow::Result<Vec<User>>;
    async fn user_ids(&self) -> anyhow::Result<Vec<UserId>>;
    fn users(&self) -> DbStream<'_, User>;

    async fn add_following(&self, user: UserId, peer: UserId, at: Time) -> anyhow::Result<()>;
    async fn add_follower(&self, user: UserId, peer: UserId, at: Time) -> anyhow::Result<()>;
    async fn remove_following(&self, user: UserId, peer: UserId) -> anyhow::Result<bool>;
    async fn remove_follower(&self, user: UserId, peer: UserId) -> anyhow::Result<bool>;

    async fn create_collection(&self, c: &Collection) -> anyhow::Result<()>;
    async fn find_collection(&self, id: CollectionId) -> anyhow::Result<Option<Collection>>;
    async fn find_collections(&self, ids: &[CollectionId]) -> anyhow::Result<Vec<Collection>>;
    async fn list_collections(&self, filter: &CollectionFilter) -> anyhow::Result<Vec<Collection>>;
    /// Collections whose title or one of the tags contains `term`, ignoring case
    async fn search_collections(&self, term: &str, limit: usize) -> anyhow::Result<Vec<Collection>>;
    async fn update_collection(&self, c: &Collection) -> anyhow::Result<()>;
    async fn delete_collection(&self, id: CollectionId) -> anyhow::Result<bool>;
    async fn push_element(&self, c: CollectionId, e: ElementId) -> anyhow::Result<()>;
    async fn pull_element(&self, c: CollectionId, e: ElementId) -> anyhow::Result<()>;
    async fn collection_ids(&self) -> anyhow::Result<Vec<CollectionId>>;
    fn collections(&self) -> DbStream<'_, Collection>;

    async fn create_element(&self, e: &Element) -> anyhow::Result<()>;
    async fn find_element(&self, id: ElementId) -> anyhow::Result<Option<Element>>;
    /// Oldest first
    async fn elements_in(&self, collections: &[CollectionId]) -> anyhow::Result<Vec<Element>>;
    async fn update_element(&self, e: &Element) -> anyhow::Result<()>;
    async fn delete_element(&self, id: ElementId) -> anyhow::Result<bool>;

    async fn create_comment(&self, c: &Comment) -> anyhow::Result<()>;
    async fn find_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>>;
    /// Oldest first
    async fn comments_in(&self, collection: CollectionId) -> anyhow::Result<Vec<Comment>>;
    /// Oldest first
    async fn replies_to(&self, id: CommentId) -> anyhow::Result<Vec<Comment>>;
    async fn comments_by(
        &self,
        author: UserId,
        skip: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<Comment>>;
    async fn count_comments_by(&self, author: UserId) -> anyhow::Result<u64>;
    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<bool>;
    async fn comment_ids(&self) -> anyhow::Result<Vec<CommentId>>;

    async fn create_activity(&self, a: &Activity) -> anyhow::Result<()>;
    async fn list_activities(&self, filter: &ActivityFilter) -> anyhow::Result<Vec<Activity>>;
    async fn delete_activity(&self, id: ActivityId) -> anyhow::Result<bool>;
    async fn delete_activities(&self, filter: &ActivityFilter) -> anyhow::Result<u64>;
    /// Deletes the oldest matching activity, if any
    async fn delete_one_activity(&self, filter: &ActivityFilter) -> anyhow::Result<bool>;
    /// Every activity carrying a collection reference
    fn activities_with_collection(&self) -> DbStream<'_, Activity>;
    /// Comment and reply activities, either those with or those without a comment reference
    fn comment_activities(&self, with_reference: bool) -> DbStream<'_, Activity>;

    async fn create_like(&self, l: &Like) -> anyhow::Result<()>;
    async fn find_like(&self, user: UserId, collection: CollectionId) -> anyhow::Result<Option<Like>>;
    async fn delete_like(&self, user: UserId, collection: CollectionId) -> anyhow::Result<bool>;
    async fn likes_by(&self, user: UserId) -> anyhow::Result<Vec<Like>>;
    async fn likes_on(&self, collection: CollectionId) -> anyhow::Result<Vec<Like>>;
    async fn delete_likes_on(&self, collection: CollectionId) -> anyhow::Result<u64>;
    /// Collections without likes are absent from the result
    async fn like_counts(
        &self,
        collections: &[CollectionId],
    ) -> anyhow::Result<HashMap<CollectionId, u64>>;

    async fn create_message(&self, m: &Message) -> anyhow::Result<()>;
    async fn find_message(&self, id: MessageId) -> anyhow::Result<Option<Message>>;
    /// Every message sent or received by `user`
    async fn messages_of(&self, user: UserId) -> anyhow::Result<Vec<Message>>;
    /// Oldest first
    async fn conversation(&self, a: UserId, b: UserId) -> anyhow::Result<Vec<Message>>;
    async fn last_message(&self, a: UserId, b: UserId) -> anyhow::Result<Option<Message>>;
    /// Unread messages addressed to `receiver`, optionally only those from `sender`
    async fn count_unread(&self, receiver: UserId, sender: Option<UserId>) -> anyhow::Result<u64>;
    async fn last_unread(&self, receiver: UserId) -> anyhow::Result<Option<Message>>;
    async fn mark_read(&self, receiver: UserId, sender: UserId) -> anyhow::Result<u64>;
    async fn delete_message(&self, id: MessageId) -> anyhow::Result<bool>;
    async fn delete_conversation(&self, a: UserId, b: UserId) -> anyhow::Result<u64>;
}
