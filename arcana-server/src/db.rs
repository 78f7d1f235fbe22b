use std::collections::HashMap;

use anyhow::Context;
use arcana_api::{
    Activity, ActivityFilter, ActivityId, Collection, CollectionFilter, CollectionId, Comment,
    CommentId, Db, DbStream, Element, ElementId, Like, LikeId, Message, MessageId, Time, User,
    UserId, Uuid,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::{postgres::PgRow, Postgres, Row};

use crate::query;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, bio, avatar, token, created_at, updated_at";
const COLLECTION_COLUMNS: &str = "id, owner_id, title, description, cover, visibility, collaborators, elements, tags, created_at, updated_at";
const ELEMENT_COLUMNS: &str = "id, collection_id, type, title, description, cover, release_date, author, rating, review, status, favorite, tags, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, collection_id, user_id, content, reply_to, created_at, updated_at";
const ACTIVITY_COLUMNS: &str =
    "id, type, user_id, collection_id, comment_id, content, is_private, created_at";
const LIKE_COLUMNS: &str = "id, user_id, collection_id, created_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, read, created_at";

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PostgresDb {
    pool: sqlx::PgPool,
}

impl PostgresDb {
    pub fn new(pool: sqlx::PgPool) -> PostgresDb {
        PostgresDb { pool }
    }

    /// Fills the followers and following maps, that live in their own tables
    async fn load_relations(&self, users: &mut [User]) -> anyhow::Result<()> {
        if users.is_empty() {
            return Ok(());
        }
        let ids = users.iter().map(|u| u.id.0).collect::<Vec<_>>();
        for table in ["user_followers", "user_following"] {
            let rows = sqlx::query(&format!(
                "SELECT user_id, peer_id, date FROM {table} WHERE user_id = ANY($1)"
            ))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("querying {table} table"))?;
            let mut peers = HashMap::<UserId, HashMap<UserId, Time>>::new();
            for r in rows {
                peers
                    .entry(UserId(get(&r, "user_id")?))
                    .or_default()
                    .insert(UserId(get(&r, "peer_id")?), get(&r, "date")?);
            }
            for u in users.iter_mut() {
                let p = peers.remove(&u.id).unwrap_or_default();
                match table {
                    "user_followers" => u.followers = p,
                    _ => u.following = p,
                }
            }
        }
        Ok(())
    }

    async fn fetch_users(&self, rows: Vec<PgRow>) -> anyhow::Result<Vec<User>> {
        let mut users = rows
            .iter()
            .map(user_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.load_relations(&mut users).await?;
        Ok(users)
    }

    async fn fetch_user(&self, row: Option<PgRow>) -> anyhow::Result<Option<User>> {
        Ok(self
            .fetch_users(row.into_iter().collect())
            .await?
            .into_iter()
            .next())
    }
}

fn get<'r, T>(row: &'r PgRow, col: &str) -> anyhow::Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(col)
        .with_context(|| format!("retrieving the {col} field"))
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn uuids<T>(ids: &[T], f: impl Fn(&T) -> Uuid) -> Vec<Uuid> {
    ids.iter().map(f).collect()
}

fn user_from_row(r: &PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: UserId(get(r, "id")?),
        username: get(r, "username")?,
        email: get(r, "email")?,
        password_hash: get(r, "password_hash")?,
        first_name: get(r, "first_name")?,
        last_name: get(r, "last_name")?,
        bio: get(r, "bio")?,
        avatar: get(r, "avatar")?,
        token: get(r, "token")?,
        followers: HashMap::new(),
        following: HashMap::new(),
        created_at: get(r, "created_at")?,
        updated_at: get(r, "updated_at")?,
    })
}

fn collection_from_row(r: &PgRow) -> anyhow::Result<Collection> {
    Ok(Collection {
        id: CollectionId(get(r, "id")?),
        owner: UserId(get(r, "owner_id")?),
        title: get(r, "title")?,
        description: get(r, "description")?,
        cover: get(r, "cover")?,
        visibility: get::<String>(r, "visibility")?
            .parse()
            .context("parsing the visibility field")?,
        collaborators: get::<Vec<Uuid>>(r, "collaborators")?
            .into_iter()
            .map(UserId)
            .collect(),
        elements: get::<Vec<Uuid>>(r, "elements")?
            .into_iter()
            .map(ElementId)
            .collect(),
        tags: get(r, "tags")?,
        created_at: get(r, "created_at")?,
        updated_at: get(r, "updated_at")?,
    })
}

fn element_from_row(r: &PgRow) -> anyhow::Result<Element> {
    Ok(Element {
        id: ElementId(get(r, "id")?),
        collection_id: CollectionId(get(r, "collection_id")?),
        kind: get::<Option<String>>(r, "type")?
            .map(|k| k.parse())
            .transpose()
            .context("parsing the type field")?,
        title: get(r, "title")?,
        description: get(r, "description")?,
        cover: get(r, "cover")?,
        release_date: get(r, "release_date")?,
        author: get(r, "author")?,
        rating: get(r, "rating")?,
        review: get(r, "review")?,
        status: get(r, "status")?,
        favorite: get(r, "favorite")?,
        tags: get(r, "tags")?,
        created_at: get(r, "created_at")?,
        updated_at: get(r, "updated_at")?,
    })
}

fn comment_from_row(r: &PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(get(r, "id")?),
        collection_id: CollectionId(get(r, "collection_id")?),
        author: UserId(get(r, "user_id")?),
        content: get(r, "content")?,
        reply_to: get::<Option<Uuid>>(r, "reply_to")?.map(CommentId),
        created_at: get(r, "created_at")?,
        updated_at: get(r, "updated_at")?,
    })
}

fn activity_from_row(r: &PgRow) -> anyhow::Result<Activity> {
    Ok(Activity {
        id: ActivityId(get(r, "id")?),
        kind: get::<String>(r, "type")?
            .parse()
            .context("parsing the type field")?,
        actor: UserId(get(r, "user_id")?),
        collection_id: get::<Option<Uuid>>(r, "collection_id")?.map(CollectionId),
        comment_id: get::<Option<Uuid>>(r, "comment_id")?.map(CommentId),
        content: get(r, "content")?,
        is_private: get(r, "is_private")?,
        created_at: get(r, "created_at")?,
    })
}

fn like_from_row(r: &PgRow) -> anyhow::Result<Like> {
    Ok(Like {
        id: LikeId(get(r, "id")?),
        user_id: UserId(get(r, "user_id")?),
        collection_id: CollectionId(get(r, "collection_id")?),
        created_at: get(r, "created_at")?,
    })
}

fn message_from_row(r: &PgRow) -> anyhow::Result<Message> {
    Ok(Message {
        id: MessageId(get(r, "id")?),
        sender: UserId(get(r, "sender_id")?),
        receiver: UserId(get(r, "receiver_id")?),
        content: get(r, "content")?,
        read: get(r, "read")?,
        created_at: get(r, "created_at")?,
    })
}

fn all<T>(rows: Vec<PgRow>, f: fn(&PgRow) -> anyhow::Result<T>) -> anyhow::Result<Vec<T>> {
    rows.iter().map(f).collect()
}

#[async_trait]
impl Db for PostgresDb {
    async fn create_user(&self, u: &User) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(u.id.0)
        .bind(&u.username)
        .bind(&u.email)
        .bind(&u.password_hash)
        .bind(&u.first_name)
        .bind(&u.last_name)
        .bind(&u.bio)
        .bind(&u.avatar)
        .bind(&u.token)
        .bind(u.created_at)
        .bind(u.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting user {}", u.id))?;
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying user {id}"))?;
        self.fetch_user(row).await
    }

    async fn find_users(&self, ids: &[UserId]) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(uuids(ids, |u| u.0))
        .fetch_all(&self.pool)
        .await
        .context("querying users by id")?;
        self.fetch_users(rows).await
    }

    async fn find_user_by_login(&self, login: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1 LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .context("querying user by login")?;
        self.fetch_user(row).await
    }

    async fn find_conflicting_user(
        &self,
        username: &str,
        email: &str,
        except: Option<UserId>,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(&format!(
            "
                SELECT {USER_COLUMNS}
                    FROM users
                WHERE (username = $1 OR email = $2)
                    AND ($3::UUID IS NULL OR id != $3)
                LIMIT 1
            "
        ))
        .bind(username)
        .bind(email)
        .bind(except.map(|u| u.0))
        .fetch_optional(&self.pool)
        .await
        .context("querying users with conflicting login")?;
        self.fetch_user(row).await
    }

    async fn set_user_token(&self, id: UserId, token: Option<&str>) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET token = $2 WHERE id = $1")
            .bind(id.0)
            .bind(token)
            .execute(&self.pool)
            .await
            .with_context(|| format!("setting token of user {id}"))?;
        Ok(())
    }

    async fn update_user(&self, u: &User) -> anyhow::Result<()> {
        sqlx::query(
            "
                UPDATE users
                SET username = $2, email = $3, password_hash = $4, first_name = $5,
                    last_name = $6, bio = $7, avatar = $8, updated_at = $9
                WHERE id = $1
            ",
        )
        .bind(u.id.0)
        .bind(&u.username)
        .bind(&u.email)
        .bind(&u.password_hash)
        .bind(&u.first_name)
        .bind(&u.last_name)
        .bind(&u.bio)
        .bind(&u.avatar)
        .bind(u.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating user {}", u.id))?;
        Ok(())
    }

    async fn search_users(&self, term: &str, lim: usize) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username ILIKE $1 ORDER BY username LIMIT $2"
        ))
        .bind(query::contains_pattern(term))
        .bind(limit(lim))
        .fetch_all(&self.pool)
        .await
        .context("searching users")?;
        self.fetch_users(rows).await
    }

    async fn user_ids(&self) -> anyhow::Result<Vec<UserId>> {
        sqlx::query("SELECT id FROM users")
            .fetch(&self.pool)
            .map(|r| {
                r.context("querying user ids")
                    .and_then(|r| Ok(UserId(get(&r, "id")?)))
            })
            .try_collect()
            .await
    }

    fn users(&self) -> DbStream<'_, User> {
        sqlx::query(
            "SELECT id, username, email, password_hash, first_name, last_name, bio, avatar, token, created_at, updated_at FROM users",
        )
        .fetch(&self.pool)
        .map(|r| r.context("querying users table"))
        .and_then(move |r| async move {
            let mut u = [user_from_row(&r)?];
            self.load_relations(&mut u).await?;
            let [u] = u;
            Ok(u)
        })
        .boxed()
    }

    async fn add_following(&self, user: UserId, peer: UserId, at: Time) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO user_following (user_id, peer_id, date) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(user.0)
        .bind(peer.0)
        .bind(at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("adding {peer} to the followed users of {user}"))?;
        Ok(())
    }

    async fn add_follower(&self, user: UserId, peer: UserId, at: Time) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO user_followers (user_id, peer_id, date) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(user.0)
        .bind(peer.0)
        .bind(at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("adding {peer} to the followers of {user}"))?;
        Ok(())
    }

    async fn remove_following(&self, user: UserId, peer: UserId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM user_following WHERE user_id = $1 AND peer_id = $2")
            .bind(user.0)
            .bind(peer.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("removing {peer} from the followed users of {user}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn remove_follower(&self, user: UserId, peer: UserId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM user_followers WHERE user_id = $1 AND peer_id = $2")
            .bind(user.0)
            .bind(peer.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("removing {peer} from the followers of {user}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_collection(&self, c: &Collection) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO collections ({COLLECTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(c.id.0)
        .bind(c.owner.0)
        .bind(&c.title)
        .bind(&c.description)
        .bind(&c.cover)
        .bind(c.visibility.as_str())
        .bind(uuids(&c.collaborators, |u| u.0))
        .bind(uuids(&c.elements, |e| e.0))
        .bind(&c.tags)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting collection {}", c.id))?;
        Ok(())
    }

    async fn find_collection(&self, id: CollectionId) -> anyhow::Result<Option<Collection>> {
        sqlx::query(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("querying collection {id}"))?
        .as_ref()
        .map(collection_from_row)
        .transpose()
    }

    async fn find_collections(&self, ids: &[CollectionId]) -> anyhow::Result<Vec<Collection>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ANY($1)"
        ))
        .bind(uuids(ids, |c| c.0))
        .fetch_all(&self.pool)
        .await
        .context("querying collections by id")?;
        all(rows, collection_from_row)
    }

    async fn list_collections(&self, filter: &CollectionFilter) -> anyhow::Result<Vec<Collection>> {
        let sql = query::collection_filter(filter, 1);
        let q = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE {} ORDER BY created_at DESC",
            sql.where_clause
        );
        let rows = sql
            .bind_to(sqlx::query(&q))
            .fetch_all(&self.pool)
            .await
            .context("listing collections")?;
        all(rows, collection_from_row)
    }

    async fn search_collections(&self, term: &str, lim: usize) -> anyhow::Result<Vec<Collection>> {
        let rows = sqlx::query(&format!(
            "
                SELECT {COLLECTION_COLUMNS}
                    FROM collections
                WHERE title ILIKE $1
                    OR EXISTS (SELECT 1 FROM unnest(tags) AS t(tag) WHERE t.tag ILIKE $1)
                ORDER BY created_at DESC
                LIMIT $2
            "
        ))
        .bind(query::contains_pattern(term))
        .bind(limit(lim))
        .fetch_all(&self.pool)
        .await
        .context("searching collections")?;
        all(rows, collection_from_row)
    }

    async fn update_collection(&self, c: &Collection) -> anyhow::Result<()> {
        sqlx::query(
            "
                UPDATE collections
                SET owner_id = $2, title = $3, description = $4, cover = $5, visibility = $6,
                    collaborators = $7, elements = $8, tags = $9, updated_at = $10
                WHERE id = $1
            ",
        )
        .bind(c.id.0)
        .bind(c.owner.0)
        .bind(&c.title)
        .bind(&c.description)
        .bind(&c.cover)
        .bind(c.visibility.as_str())
        .bind(uuids(&c.collaborators, |u| u.0))
        .bind(uuids(&c.elements, |e| e.0))
        .bind(&c.tags)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating collection {}", c.id))?;
        Ok(())
    }

    async fn delete_collection(&self, id: CollectionId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting collection {id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn push_element(&self, c: CollectionId, e: ElementId) -> anyhow::Result<()> {
        sqlx::query("UPDATE collections SET elements = array_append(elements, $2) WHERE id = $1")
            .bind(c.0)
            .bind(e.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("adding element {e} to collection {c}"))?;
        Ok(())
    }

    async fn pull_element(&self, c: CollectionId, e: ElementId) -> anyhow::Result<()> {
        sqlx::query("UPDATE collections SET elements = array_remove(elements, $2) WHERE id = $1")
            .bind(c.0)
            .bind(e.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("removing element {e} from collection {c}"))?;
        Ok(())
    }

    async fn collection_ids(&self) -> anyhow::Result<Vec<CollectionId>> {
        sqlx::query("SELECT id FROM collections")
            .fetch(&self.pool)
            .map(|r| {
                r.context("querying collection ids")
                    .and_then(|r| Ok(CollectionId(get(&r, "id")?)))
            })
            .try_collect()
            .await
    }

    fn collections(&self) -> DbStream<'_, Collection> {
        sqlx::query(
            "SELECT id, owner_id, title, description, cover, visibility, collaborators, elements, tags, created_at, updated_at FROM collections",
        )
        .fetch(&self.pool)
        .map(|r| {
            r.context("querying collections table")
                .and_then(|r| collection_from_row(&r))
        })
        .boxed()
    }

    async fn create_element(&self, e: &Element) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO elements ({ELEMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(e.id.0)
        .bind(e.collection_id.0)
        .bind(e.kind.map(|k| k.as_str()))
        .bind(&e.title)
        .bind(&e.description)
        .bind(&e.cover)
        .bind(e.release_date)
        .bind(&e.author)
        .bind(e.rating)
        .bind(&e.review)
        .bind(&e.status)
        .bind(e.favorite)
        .bind(&e.tags)
        .bind(e.created_at)
        .bind(e.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting element {}", e.id))?;
        Ok(())
    }

    async fn find_element(&self, id: ElementId) -> anyhow::Result<Option<Element>> {
        sqlx::query(&format!("SELECT {ELEMENT_COLUMNS} FROM elements WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying element {id}"))?
            .as_ref()
            .map(element_from_row)
            .transpose()
    }

    async fn elements_in(&self, collections: &[CollectionId]) -> anyhow::Result<Vec<Element>> {
        let rows = sqlx::query(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM elements WHERE collection_id = ANY($1) ORDER BY created_at ASC"
        ))
        .bind(uuids(collections, |c| c.0))
        .fetch_all(&self.pool)
        .await
        .context("querying elements of collections")?;
        all(rows, element_from_row)
    }

    async fn update_element(&self, e: &Element) -> anyhow::Result<()> {
        sqlx::query(
            "
                UPDATE elements
                SET type = $2, title = $3, description = $4, cover = $5, release_date = $6,
                    author = $7, rating = $8, review = $9, status = $10, favorite = $11,
                    tags = $12, updated_at = $13
                WHERE id = $1
            ",
        )
        .bind(e.id.0)
        .bind(e.kind.map(|k| k.as_str()))
        .bind(&e.title)
        .bind(&e.description)
        .bind(&e.cover)
        .bind(e.release_date)
        .bind(&e.author)
        .bind(e.rating)
        .bind(&e.review)
        .bind(&e.status)
        .bind(e.favorite)
        .bind(&e.tags)
        .bind(e.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating element {}", e.id))?;
        Ok(())
    }

    async fn delete_element(&self, id: ElementId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM elements WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting element {id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_comment(&self, c: &Comment) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO comments ({COMMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(c.id.0)
        .bind(c.collection_id.0)
        .bind(c.author.0)
        .bind(&c.content)
        .bind(c.reply_to.map(|r| r.0))
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting comment {}", c.id))?;
        Ok(())
    }

    async fn find_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying comment {id}"))?
            .as_ref()
            .map(comment_from_row)
            .transpose()
    }

    async fn comments_in(&self, collection: CollectionId) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE collection_id = $1 ORDER BY created_at ASC"
        ))
        .bind(collection.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying comments of collection {collection}"))?;
        all(rows, comment_from_row)
    }

    async fn replies_to(&self, id: CommentId) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE reply_to = $1 ORDER BY created_at ASC"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying replies to comment {id}"))?;
        all(rows, comment_from_row)
    }

    async fn comments_by(
        &self,
        author: UserId,
        skip: usize,
        lim: usize,
    ) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE user_id = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3"
        ))
        .bind(author.0)
        .bind(limit(skip))
        .bind(limit(lim))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying comments of user {author}"))?;
        all(rows, comment_from_row)
    }

    async fn count_comments_by(&self, author: UserId) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM comments WHERE user_id = $1")
            .bind(author.0)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("counting comments of user {author}"))?
            .try_get("count")
            .context("retrieving the count field")?;
        Ok(count as u64)
    }

    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting comment {id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn comment_ids(&self) -> anyhow::Result<Vec<CommentId>> {
        sqlx::query("SELECT id FROM comments")
            .fetch(&self.pool)
            .map(|r| {
                r.context("querying comment ids")
                    .and_then(|r| Ok(CommentId(get(&r, "id")?)))
            })
            .try_collect()
            .await
    }

    async fn create_activity(&self, a: &Activity) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO activities ({ACTIVITY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(a.id.0)
        .bind(a.kind.as_str())
        .bind(a.actor.0)
        .bind(a.collection_id.map(|c| c.0))
        .bind(a.comment_id.map(|c| c.0))
        .bind(&a.content)
        .bind(a.is_private)
        .bind(a.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting activity {}", a.id))?;
        Ok(())
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> anyhow::Result<Vec<Activity>> {
        let sql = query::activity_filter(filter, 1);
        let q = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE {} ORDER BY created_at DESC",
            sql.where_clause
        );
        let rows = sql
            .bind_to(sqlx::query(&q))
            .fetch_all(&self.pool)
            .await
            .context("listing activities")?;
        all(rows, activity_from_row)
    }

    async fn delete_activity(&self, id: ActivityId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting activity {id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_activities(&self, filter: &ActivityFilter) -> anyhow::Result<u64> {
        let sql = query::activity_filter(filter, 1);
        let q = format!("DELETE FROM activities WHERE {}", sql.where_clause);
        let res = sql
            .bind_to(sqlx::query(&q))
            .execute(&self.pool)
            .await
            .context("deleting activities")?;
        Ok(res.rows_affected())
    }

    async fn delete_one_activity(&self, filter: &ActivityFilter) -> anyhow::Result<bool> {
        let sql = query::activity_filter(filter, 1);
        let q = format!(
            "
                DELETE FROM activities
                WHERE id = (
                    SELECT id FROM activities WHERE {} ORDER BY created_at ASC LIMIT 1
                )
            ",
            sql.where_clause
        );
        let res = sql
            .bind_to(sqlx::query(&q))
            .execute(&self.pool)
            .await
            .context("deleting one activity")?;
        Ok(res.rows_affected() > 0)
    }

    fn activities_with_collection(&self) -> DbStream<'_, Activity> {
        sqlx::query(
            "SELECT id, type, user_id, collection_id, comment_id, content, is_private, created_at FROM activities WHERE collection_id IS NOT NULL",
        )
        .fetch(&self.pool)
        .map(|r| {
            r.context("querying activities with a collection")
                .and_then(|r| activity_from_row(&r))
        })
        .boxed()
    }

    fn comment_activities(&self, with_reference: bool) -> DbStream<'_, Activity> {
        let q = match with_reference {
            true => "SELECT id, type, user_id, collection_id, comment_id, content, is_private, created_at FROM activities WHERE type IN ('comment', 'reply') AND comment_id IS NOT NULL",
            false => "SELECT id, type, user_id, collection_id, comment_id, content, is_private, created_at FROM activities WHERE type IN ('comment', 'reply') AND comment_id IS NULL",
        };
        sqlx::query(q)
            .fetch(&self.pool)
            .map(|r| {
                r.context("querying comment activities")
                    .and_then(|r| activity_from_row(&r))
            })
            .boxed()
    }

    async fn create_like(&self, l: &Like) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO likes ({LIKE_COLUMNS}) VALUES ($1, $2, $3, $4)"
        ))
        .bind(l.id.0)
        .bind(l.user_id.0)
        .bind(l.collection_id.0)
        .bind(l.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting like {}", l.id))?;
        Ok(())
    }

    async fn find_like(&self, user: UserId, collection: CollectionId) -> anyhow::Result<Option<Like>> {
        sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE user_id = $1 AND collection_id = $2 LIMIT 1"
        ))
        .bind(user.0)
        .bind(collection.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("querying like of {user} on {collection}"))?
        .as_ref()
        .map(like_from_row)
        .transpose()
    }

    async fn delete_like(&self, user: UserId, collection: CollectionId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND collection_id = $2")
            .bind(user.0)
            .bind(collection.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting like of {user} on {collection}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn likes_by(&self, user: UserId) -> anyhow::Result<Vec<Like>> {
        let rows = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying likes of user {user}"))?;
        all(rows, like_from_row)
    }

    async fn likes_on(&self, collection: CollectionId) -> anyhow::Result<Vec<Like>> {
        let rows = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE collection_id = $1 ORDER BY created_at DESC"
        ))
        .bind(collection.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying likes on collection {collection}"))?;
        all(rows, like_from_row)
    }

    async fn delete_likes_on(&self, collection: CollectionId) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM likes WHERE collection_id = $1")
            .bind(collection.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting likes on collection {collection}"))?;
        Ok(res.rows_affected())
    }

    async fn like_counts(
        &self,
        collections: &[CollectionId],
    ) -> anyhow::Result<HashMap<CollectionId, u64>> {
        let rows = sqlx::query(
            "
                SELECT collection_id, COUNT(*) AS count
                    FROM likes
                WHERE collection_id = ANY($1)
                GROUP BY collection_id
            ",
        )
        .bind(uuids(collections, |c| c.0))
        .fetch_all(&self.pool)
        .await
        .context("counting likes")?;
        rows.iter()
            .map(|r| {
                Ok((
                    CollectionId(get(r, "collection_id")?),
                    get::<i64>(r, "count")? as u64,
                ))
            })
            .collect()
    }

    async fn create_message(&self, m: &Message) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(m.id.0)
        .bind(m.sender.0)
        .bind(m.receiver.0)
        .bind(&m.content)
        .bind(m.read)
        .bind(m.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting message {}", m.id))?;
        Ok(())
    }

    async fn find_message(&self, id: MessageId) -> anyhow::Result<Option<Message>> {
        sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("querying message {id}"))?
            .as_ref()
            .map(message_from_row)
            .transpose()
    }

    async fn messages_of(&self, user: UserId) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE sender_id = $1 OR receiver_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying messages of user {user}"))?;
        all(rows, message_from_row)
    }

    async fn conversation(&self, a: UserId, b: UserId) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "
                SELECT {MESSAGE_COLUMNS}
                    FROM messages
                WHERE (sender_id = $1 AND receiver_id = $2)
                    OR (sender_id = $2 AND receiver_id = $1)
                ORDER BY created_at ASC
            "
        ))
        .bind(a.0)
        .bind(b.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("querying conversation between {a} and {b}"))?;
        all(rows, message_from_row)
    }

    async fn last_message(&self, a: UserId, b: UserId) -> anyhow::Result<Option<Message>> {
        sqlx::query(&format!(
            "
                SELECT {MESSAGE_COLUMNS}
                    FROM messages
                WHERE (sender_id = $1 AND receiver_id = $2)
                    OR (sender_id = $2 AND receiver_id = $1)
                ORDER BY created_at DESC
                LIMIT 1
            "
        ))
        .bind(a.0)
        .bind(b.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("querying last message between {a} and {b}"))?
        .as_ref()
        .map(message_from_row)
        .transpose()
    }

    async fn count_unread(&self, receiver: UserId, sender: Option<UserId>) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query(
            "
                SELECT COUNT(*) AS count
                    FROM messages
                WHERE receiver_id = $1
                    AND NOT read
                    AND ($2::UUID IS NULL OR sender_id = $2)
            ",
        )
        .bind(receiver.0)
        .bind(sender.map(|s| s.0))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("counting unread messages of {receiver}"))?
        .try_get("count")
        .context("retrieving the count field")?;
        Ok(count as u64)
    }

    async fn last_unread(&self, receiver: UserId) -> anyhow::Result<Option<Message>> {
        sqlx::query(&format!(
            "
                SELECT {MESSAGE_COLUMNS}
                    FROM messages
                WHERE receiver_id = $1 AND NOT read
                ORDER BY created_at DESC
                LIMIT 1
            "
        ))
        .bind(receiver.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("querying last unread message of {receiver}"))?
        .as_ref()
        .map(message_from_row)
        .transpose()
    }

    async fn mark_read(&self, receiver: UserId, sender: UserId) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "UPDATE messages SET read = true WHERE receiver_id = $1 AND sender_id = $2 AND NOT read",
        )
        .bind(receiver.0)
        .bind(sender.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("marking messages from {sender} to {receiver} read"))?;
        Ok(res.rows_affected())
    }

    async fn delete_message(&self, id: MessageId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting message {id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_conversation(&self, a: UserId, b: UserId) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "
                DELETE FROM messages
                WHERE (sender_id = $1 AND receiver_id = $2)
                    OR (sender_id = $2 AND receiver_id = $1)
            ",
        )
        .bind(a.0)
        .bind(b.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("deleting conversation between {a} and {b}"))?;
        Ok(res.rows_affected())
    }
}
