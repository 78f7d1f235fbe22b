use anyhow::Context;
use arcana_api::{
    build_thread, validate_content, Activity, ActivityKind, Collection, CollectionId, Comment,
    CommentEntry, CommentId, CommentPage, CommentThread, CommentView, NewComment, NewReply,
    Error as ApiError, PageQuery, User, UserId, DEFAULT_THREAD_LIMIT, MAX_REPLY_DEPTH,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use super::{collection_refs, collections, now, summaries};
use crate::{cascade, extractors::*, Error};

const DEFAULT_USER_COMMENTS_LIMIT: u64 = 20;

async fn find(db: &DbHandle, id: CommentId) -> Result<Comment, Error> {
    db.find_comment(id)
        .await
        .with_context(|| format!("fetching comment {id}"))?
        .ok_or_else(|| Error::not_found("comment"))
}

/// Rejects a reply to `parent` that would nest deeper than the thread shows
async fn check_depth(db: &DbHandle, parent: &Comment) -> Result<(), Error> {
    let mut depth = 1;
    let mut up = parent.reply_to;
    while let Some(id) = up {
        depth += 1;
        if depth > MAX_REPLY_DEPTH {
            return Err(Error::Api(ApiError::ReplyTooDeep(MAX_REPLY_DEPTH)));
        }
        up = db
            .find_comment(id)
            .await
            .with_context(|| format!("fetching ancestor comment {id}"))?
            .and_then(|c| c.reply_to);
    }
    Ok(())
}

/// Stores the comment along with its comment or reply activity
async fn post(
    db: &DbHandle,
    author: &User,
    collection: &Collection,
    content: String,
    reply_to: Option<CommentId>,
) -> Result<CommentView, Error> {
    let at = now();
    let comment = Comment::new(collection.id, author.id, content, reply_to, at);
    db.create_comment(&comment).await?;
    let kind = match reply_to {
        None => ActivityKind::Comment,
        Some(_) => ActivityKind::Reply,
    };
    db.create_activity(
        &Activity::new(kind, author.id, at)
            .on_collection(collection.id)
            .on_comment(comment.id, comment.content.clone())
            .private(!collection.is_public()),
    )
    .await
    .with_context(|| format!("recording activity of comment {}", comment.id))?;
    Ok(CommentView {
        comment,
        author: Some(author.summary()),
    })
}

pub async fn create(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Json(data): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentView>), Error> {
    let (collection_id, content) = data.validate()?;
    let collection = collections::find(&db, collection_id).await?;
    if let Some(parent) = data.reply_to {
        check_depth(&db, &find(&db, parent).await?).await?;
    }
    let view = post(&db, &me, &collection, content, data.reply_to).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn reply(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(parent): Id<CommentId>,
    Json(data): Json<NewReply>,
) -> Result<(StatusCode, Json<CommentView>), Error> {
    let content = validate_content(&data.content)?;
    let parent = find(&db, parent).await?;
    check_depth(&db, &parent).await?;
    let collection = collections::find(&db, parent.collection_id).await?;
    let view = post(&db, &me, &collection, content, Some(parent.id)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get(
    State(db): State<DbHandle>,
    Id(id): Id<CommentId>,
) -> Result<Json<CommentView>, Error> {
    let comment = find(&db, id).await?;
    let author = db.find_user(comment.author).await?.map(|u| u.summary());
    Ok(Json(CommentView { comment, author }))
}

async fn views(db: &DbHandle, comments: Vec<Comment>) -> Result<Vec<CommentView>, Error> {
    let authors = summaries(&**db, comments.iter().map(|c| c.author).collect()).await?;
    Ok(comments
        .into_iter()
        .map(|comment| CommentView {
            author: authors.get(&comment.author).cloned(),
            comment,
        })
        .collect())
}

pub async fn of_collection(
    State(db): State<DbHandle>,
    Id(id): Id<CollectionId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CommentThread>, Error> {
    let comments = db
        .comments_in(id)
        .await
        .with_context(|| format!("fetching comments of collection {id}"))?;
    let views = views(&db, comments).await?;
    Ok(Json(build_thread(views, page.resolve(DEFAULT_THREAD_LIMIT))))
}

async fn written_by(db: &DbHandle, author: UserId, page: &PageQuery) -> Result<CommentPage, Error> {
    let page = page.resolve(DEFAULT_USER_COMMENTS_LIMIT);
    let comments = db.comments_by(author, page.skip(), page.take()).await?;
    let total = db.count_comments_by(author).await?;
    let titles = collection_refs(&**db, comments.iter().map(|c| c.collection_id).collect()).await?;
    let comments = views(db, comments)
        .await?
        .into_iter()
        .map(|view| CommentEntry {
            collection_title: titles
                .get(&view.comment.collection_id)
                .map(|c| c.title.clone()),
            view,
        })
        .collect();
    Ok(CommentPage {
        comments,
        pagination: page.describe(total),
    })
}

pub async fn of_user(
    State(db): State<DbHandle>,
    Id(id): Id<UserId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CommentPage>, Error> {
    Ok(Json(written_by(&db, id, &page).await?))
}

pub async fn mine(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Query(page): Query<PageQuery>,
) -> Result<Json<CommentPage>, Error> {
    Ok(Json(written_by(&db, me.id, &page).await?))
}

pub async fn delete(
    Auth(me): Auth,
    State(db): State<DbHandle>,
    Id(id): Id<CommentId>,
) -> Result<Json<serde_json::Value>, Error> {
    let comment = find(&db, id).await?;
    if comment.author != me.id {
        return Err(Error::permission_denied());
    }
    let deleted = cascade::delete_comment(&*db, id)
        .await
        .with_context(|| format!("deleting comment {id} and its replies"))?;
    tracing::info!(comment = %id, deleted, "comment thread deleted");
    Ok(Json(serde_json::json!({ "message": "comment and its replies deleted" })))
}
