#![cfg(test)]

use std::{fmt::Debug, panic::AssertUnwindSafe, sync::Arc};

use arcana_api::{
    ActivityKind, Collection, CollectionId, Comment, CommentThread, CommentView, Error as ApiError,
    Feed, FollowAction, FollowOutcome, Like, Liker, Message, NewCollection, Profile, Session,
    SignedUp, SweepReport, UnreadTotal, UserId, Uuid, Visibility,
};
use arcana_mock_db::MockDb;
use axum::{
    extract::FromRequestParts,
    http::{self, request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::{Service, ServiceExt};

use crate::{
    auth::JwtKeys,
    covers::{CoverUpload, CoverUploader},
    extractors::*,
    metadata::MetadataClient,
    *,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(PreAuth(t)) => assert!(!t.is_empty() && !t.contains(' ')),
            Err(Error::Api(ApiError::Unauthenticated)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

const JSON: &str = "application/json";

async fn run_raw(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    body: Vec<u8>,
) -> (StatusCode, hyper::body::Bytes) {
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, content_type);
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(body))
        .expect("building request");
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    (status, body)
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: for<'de> serde::Deserialize<'de>,
{
    let body = serde_json::to_vec(req_body).expect("serializing request body to json");
    let (status, body) = run_raw(app, method, uri, token, JSON, body).await;
    if status.is_success() {
        // unit responses come back with an empty body
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };
        return Ok(serde_json::from_slice(body).unwrap_or_else(|err| {
            panic!(
                r#"
                    Failed parsing resp body!

                    The error is the following:
                    ---
                    {err}
                    ---

                    Response body is:
                    ---
                    {body:?}
                    ---

                    Request was:
                    ---
                    {method} {uri} {req_body:?}
                    ---
                "#
            )
        }));
    }
    let err = ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}"));
    assert_eq!(status, err.status_code(), "status does not match error {err:?}");
    Err(err)
}

/// Pretends to host covers, serving each at a URL built from its name and size
struct StubCovers;

#[axum::async_trait]
impl CoverUploader for StubCovers {
    async fn upload(&self, cover: CoverUpload) -> anyhow::Result<String> {
        Ok(format!(
            "https://covers.test/{}/{}",
            cover.file_name,
            cover.bytes.len()
        ))
    }
}

const BOUNDARY: &str = "arcana-form-boundary";

/// `(name, file name, contents)` fields encoded as a multipart/form-data body
fn form_body(fields: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file, contents) in fields {
        let disposition = match file {
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
            Some(file) => format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\n\
                 Content-Type: image/png\r\n\r\n"
            ),
        };
        body.extend_from_slice(format!("--{BOUNDARY}\r\n{disposition}").as_bytes());
        body.extend_from_slice(contents.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

struct TestApp {
    app: Router,
    db: Arc<MockDb>,
    admin_token: String,
}

impl TestApp {
    fn new() -> TestApp {
        let db = Arc::new(MockDb::new());
        let admin_token = Uuid::new_v4();
        let app = app(AppState {
            db: db.clone() as DbHandle,
            keys: JwtKeys::new(b"test secret", Duration::hours(24)),
            metadata: MetadataClient::new(None, None),
            covers: Arc::new(StubCovers),
            admin_token: Some(arcana_api::AuthToken(admin_token)),
        });
        TestApp {
            app,
            db,
            admin_token: admin_token.to_string(),
        }
    }

    async fn run<Resp: for<'de> serde::Deserialize<'de>>(
        &mut self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Result<Resp, ApiError> {
        run_on_app(&mut self.app, method, uri, token, &body).await
    }

    /// Signs a new user up then in, returning their id and session token
    async fn user(&mut self, name: &str) -> (UserId, String) {
        let signed: SignedUp = self
            .run(
                "POST",
                "/users/signup",
                None,
                json!({
                    "username": name,
                    "password": "password",
                    "email": format!("{name}@example.com"),
                    "firstName": name,
                    "lastName": "Test",
                }),
            )
            .await
            .expect("signing up");
        let session: Session = self
            .run(
                "POST",
                "/users/signin",
                None,
                json!({"identification": name, "password": "password"}),
            )
            .await
            .expect("signing in");
        assert_eq!(session.user_id, signed.user_id);
        (signed.user_id, session.token)
    }

    async fn collection(&mut self, token: &str, title: &str, visibility: &str) -> Collection {
        self.run(
            "POST",
            "/collections",
            Some(token),
            json!({"title": title, "visibility": visibility}),
        )
        .await
        .expect("creating collection")
    }
}

#[tokio::test]
async fn sessions_end_at_logout() {
    let mut t = TestApp::new();
    let (alice, token) = t.user("alice").await;
    let me: Profile = t
        .run("GET", "/users/me", Some(&token), json!(null))
        .await
        .unwrap();
    assert_eq!(me.id, alice);
    assert_eq!(me.email, "alice@example.com");

    let () = t
        .run("POST", "/users/logout", Some(&token), json!(null))
        .await
        .unwrap();
    assert_eq!(
        t.run::<Profile>("GET", "/users/me", Some(&token), json!(null))
            .await,
        Err(ApiError::Unauthenticated)
    );
    assert_eq!(
        t.run::<Profile>("GET", "/users/me", None, json!(null)).await,
        Err(ApiError::Unauthenticated)
    );
}

#[tokio::test]
async fn signup_and_signin_failures() {
    let mut t = TestApp::new();
    t.user("alice").await;
    let dup = t
        .run::<SignedUp>(
            "POST",
            "/users/signup",
            None,
            json!({
                "username": " ALICE ",
                "password": "x",
                "email": "other@example.com",
                "firstName": "a",
                "lastName": "b",
            }),
        )
        .await;
    assert_eq!(dup, Err(ApiError::NameAlreadyUsed(String::from("alice"))));

    let missing = t
        .run::<SignedUp>("POST", "/users/signup", None, json!({"username": "bob"}))
        .await;
    assert_eq!(missing, Err(ApiError::MissingFields));

    let wrong = t
        .run::<Session>(
            "POST",
            "/users/signin",
            None,
            json!({"identification": "alice@example.com", "password": "nope"}),
        )
        .await;
    assert_eq!(wrong, Err(ApiError::PermissionDenied));
}

#[tokio::test]
async fn follow_toggles() {
    let mut t = TestApp::new();
    let (alice, token) = t.user("alice").await;
    let (bob, _) = t.user("bob").await;
    let body = json!({ "targetUserId": bob });

    let res: FollowOutcome = t
        .run("PUT", "/users/follow", Some(&token), body.clone())
        .await
        .unwrap();
    assert_eq!(res.action, FollowAction::Followed);
    let conns: arcana_api::Connections = t
        .run("GET", &format!("/users/connections/{bob}"), None, json!(null))
        .await
        .unwrap();
    assert_eq!(conns.followers, vec![alice]);

    let res: FollowOutcome = t
        .run("PUT", "/users/follow", Some(&token), body)
        .await
        .unwrap();
    assert_eq!(res.action, FollowAction::Unfollowed);
    assert!(t.db.test_users().iter().all(|u| u.followers.is_empty()));

    let own = t
        .run::<FollowOutcome>(
            "PUT",
            "/users/follow",
            Some(&token),
            json!({ "targetUserId": alice }),
        )
        .await;
    assert_eq!(own, Err(ApiError::SelfTarget));
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let mut t = TestApp::new();
    let res = t
        .run::<Collection>("GET", "/collections/not-an-id", None, json!(null))
        .await;
    assert_eq!(res, Err(ApiError::InvalidId(String::from("not-an-id"))));
    let res = t
        .run::<Collection>(
            "GET",
            &format!("/collections/{}", CollectionId::new()),
            None,
            json!(null),
        )
        .await;
    assert_eq!(res, Err(ApiError::NotFound(String::from("collection"))));
}

#[tokio::test]
async fn deleting_a_comment_cascades() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let (_, bob) = t.user("bob").await;
    let coll = t.collection(&alice, "Books", "public").await;

    let c1: CommentView = t
        .run(
            "POST",
            "/comments",
            Some(&alice),
            json!({"collectionId": coll.id, "content": "first"}),
        )
        .await
        .unwrap();
    let c2: CommentView = t
        .run(
            "POST",
            &format!("/comments/{}/reply", c1.comment.id),
            Some(&bob),
            json!({"content": "second"}),
        )
        .await
        .unwrap();
    let c3: CommentView = t
        .run(
            "POST",
            "/comments",
            Some(&alice),
            json!({"collectionId": coll.id, "content": "third", "replyTo": c2.comment.id}),
        )
        .await
        .unwrap();
    let other: CommentView = t
        .run(
            "POST",
            "/comments",
            Some(&bob),
            json!({"collectionId": coll.id, "content": "unrelated"}),
        )
        .await
        .unwrap();
    assert_eq!(t.db.test_activities().len(), 5);

    let denied = t
        .run::<serde_json::Value>(
            "DELETE",
            &format!("/comments/{}", c1.comment.id),
            Some(&bob),
            json!(null),
        )
        .await;
    assert_eq!(denied, Err(ApiError::PermissionDenied));

    let done: serde_json::Value = t
        .run(
            "DELETE",
            &format!("/comments/{}", c1.comment.id),
            Some(&alice),
            json!(null),
        )
        .await
        .unwrap();
    assert_eq!(done, json!({"message": "comment and its replies deleted"}));

    let comments = t.db.test_comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, other.comment.id);
    let gone = [c1.comment.id, c2.comment.id, c3.comment.id];
    let activities = t.db.test_activities();
    assert_eq!(activities.len(), 2);
    assert!(activities
        .iter()
        .all(|a| a.comment_id.map_or(true, |c| !gone.contains(&c))));
    assert!(activities
        .iter()
        .any(|a| a.kind == ActivityKind::CreateCollection));
}

#[tokio::test]
async fn comment_content_is_bounded() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let coll = t.collection(&alice, "Books", "public").await;
    let res = t
        .run::<CommentView>(
            "POST",
            "/comments",
            Some(&alice),
            json!({"collectionId": coll.id, "content": "x".repeat(501)}),
        )
        .await;
    assert_eq!(res, Err(ApiError::ContentTooLong(500)));
    let res = t
        .run::<CommentView>(
            "POST",
            "/comments",
            Some(&alice),
            json!({"collectionId": coll.id, "content": "hi", "replyTo": Uuid::new_v4()}),
        )
        .await;
    assert_eq!(res, Err(ApiError::NotFound(String::from("comment"))));
}

#[tokio::test]
async fn replies_stop_at_the_nesting_limit() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let coll = t.collection(&alice, "Books", "public").await;
    let root: CommentView = t
        .run(
            "POST",
            "/comments",
            Some(&alice),
            json!({"collectionId": coll.id, "content": "root"}),
        )
        .await
        .unwrap();
    let mut chain = vec![root.comment.id];
    for depth in 1..=arcana_api::MAX_REPLY_DEPTH {
        let parent = chain[depth - 1];
        let reply: CommentView = t
            .run(
                "POST",
                &format!("/comments/{parent}/reply"),
                Some(&alice),
                json!({"content": depth.to_string()}),
            )
            .await
            .unwrap();
        chain.push(reply.comment.id);
    }
    let deepest = chain[arcana_api::MAX_REPLY_DEPTH];
    let res = t
        .run::<CommentView>(
            "POST",
            &format!("/comments/{deepest}/reply"),
            Some(&alice),
            json!({"content": "too deep"}),
        )
        .await;
    assert_eq!(res, Err(ApiError::ReplyTooDeep(arcana_api::MAX_REPLY_DEPTH)));
    let res = t
        .run::<CommentView>(
            "POST",
            "/comments",
            Some(&alice),
            json!({"collectionId": coll.id, "content": "too deep", "replyTo": deepest}),
        )
        .await;
    assert_eq!(res, Err(ApiError::ReplyTooDeep(arcana_api::MAX_REPLY_DEPTH)));

    let thread: CommentThread = t
        .run(
            "GET",
            &format!("/comments/collection/{}", coll.id),
            None,
            json!(null),
        )
        .await
        .unwrap();
    let mut node = &thread.comments[0];
    let mut depth = 0;
    while let Some(next) = node.replies.first() {
        node = next;
        depth += 1;
    }
    assert_eq!(depth, arcana_api::MAX_REPLY_DEPTH);
}

#[tokio::test]
async fn thread_route_drops_orphans() {
    let mut t = TestApp::new();
    let coll = CollectionId::new();
    let author = UserId::new();
    let t1 = Utc::now();
    let c1 = Comment::new(coll, author, String::from("1"), None, t1);
    let c2 = Comment::new(
        coll,
        author,
        String::from("2"),
        Some(c1.id),
        t1 + Duration::seconds(1),
    );
    let c3 = Comment::new(
        coll,
        author,
        String::from("3"),
        Some(arcana_api::CommentId::new()),
        t1 + Duration::seconds(2),
    );
    for c in [&c1, &c2, &c3] {
        arcana_api::Db::create_comment(&*t.db, c).await.unwrap();
    }

    let thread: CommentThread = t
        .run(
            "GET",
            &format!("/comments/collection/{coll}?page=1&limit=10"),
            None,
            json!(null),
        )
        .await
        .unwrap();
    assert_eq!(thread.pagination.total, 1);
    assert_eq!(thread.comments.len(), 1);
    assert_eq!(thread.comments[0].view.comment.id, c1.id);
    assert_eq!(thread.comments[0].view.author, None);
    let replies = &thread.comments[0].replies;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].view.comment.id, c2.id);

    // garbage paging falls back to the defaults
    let thread: CommentThread = t
        .run(
            "GET",
            &format!("/comments/collection/{coll}?page=zero&limit=-1"),
            None,
            json!(null),
        )
        .await
        .unwrap();
    assert_eq!(thread.pagination.page, 1);
    assert_eq!(thread.pagination.limit, 50);
}

#[tokio::test]
async fn likes_are_unique_and_undoable() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let (bob_id, bob) = t.user("bob").await;
    let coll = t.collection(&alice, "Games", "public").await;
    let body = json!({ "collectionId": coll.id });

    let like: Like = t
        .run("POST", "/likes/like", Some(&bob), body.clone())
        .await
        .unwrap();
    assert_eq!(like.user_id, bob_id);
    assert_eq!(
        t.run::<Like>("POST", "/likes/like", Some(&bob), body).await,
        Err(ApiError::AlreadyLiked)
    );
    let likers: Vec<Liker> = t
        .run(
            "GET",
            &format!("/likes/collection/{}", coll.id),
            None,
            json!(null),
        )
        .await
        .unwrap();
    assert_eq!(likers.len(), 1);
    assert_eq!(likers[0].user.as_ref().map(|u| u.id), Some(bob_id));

    let unlike = format!("/likes/{}", coll.id);
    let () = t.run("DELETE", &unlike, Some(&bob), json!(null)).await.unwrap();
    assert!(t
        .db
        .test_activities()
        .iter()
        .all(|a| a.kind != ActivityKind::Like));
    assert_eq!(
        t.run::<()>("DELETE", &unlike, Some(&bob), json!(null)).await,
        Err(ApiError::NotLiked)
    );
}

#[tokio::test]
async fn deleting_a_collection_drops_its_likes() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let (_, bob) = t.user("bob").await;
    let coll = t.collection(&alice, "Films", "public").await;
    let _: Like = t
        .run(
            "POST",
            "/likes/like",
            Some(&bob),
            json!({ "collectionId": coll.id }),
        )
        .await
        .unwrap();
    let path = format!("/collections/{}", coll.id);
    assert_eq!(
        t.run::<()>("DELETE", &path, Some(&bob), json!(null)).await,
        Err(ApiError::PermissionDenied)
    );
    let () = t.run("DELETE", &path, Some(&alice), json!(null)).await.unwrap();
    assert!(t.db.test_collections().is_empty());
    assert!(t.db.test_likes().is_empty());
    let left = t.db.test_activities();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].kind, ActivityKind::Like);
}

#[tokio::test]
async fn feed_hides_private_collections() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let (bob_id, bob) = t.user("bob").await;
    let _: FollowOutcome = t
        .run(
            "PUT",
            "/users/follow",
            Some(&alice),
            json!({ "targetUserId": bob_id }),
        )
        .await
        .unwrap();
    let public = t.collection(&bob, "Shown", "public").await;
    t.collection(&bob, "Hidden", "private").await;

    let feed: Feed = t
        .run("GET", "/activity/feed", Some(&alice), json!(null))
        .await
        .unwrap();
    assert_eq!(feed.activities.len(), 1);
    assert_eq!(feed.activities[0].activity.collection_id, Some(public.id));
    assert_eq!(
        feed.activities[0].user.as_ref().map(|u| u.username.as_str()),
        Some("bob")
    );

    let feed: Feed = t
        .run("GET", "/activity/feed?type=like", Some(&alice), json!(null))
        .await
        .unwrap();
    assert!(feed.activities.is_empty());
    let feed: Feed = t
        .run(
            "GET",
            "/activity/feed?type=all&onlyFollowing=true",
            Some(&alice),
            json!(null),
        )
        .await
        .unwrap();
    assert_eq!(feed.activities.len(), 1);
}

#[tokio::test]
async fn conversations() {
    let mut t = TestApp::new();
    let (alice_id, alice) = t.user("alice").await;
    let (bob_id, bob) = t.user("bob").await;
    let start = serde_json::to_vec(&json!({ "userId": bob_id })).unwrap();

    let (status, _) = run_raw(
        &mut t.app,
        "POST",
        "/messages/start-conversation",
        Some(&alice),
        JSON,
        start.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let msg: Message = t
        .run(
            "POST",
            "/messages",
            Some(&alice),
            json!({"receiverId": bob_id, "content": "hello"}),
        )
        .await
        .unwrap();
    let (status, _) = run_raw(
        &mut t.app,
        "POST",
        "/messages/start-conversation",
        Some(&alice),
        JSON,
        start,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let unread: UnreadTotal = t
        .run("GET", "/messages/unread/total", Some(&bob), json!(null))
        .await
        .unwrap();
    assert_eq!(unread.total, 1);
    assert_eq!(unread.last_message.map(|m| m.id), Some(msg.id));

    let () = t
        .run(
            "POST",
            &format!("/messages/with/{alice_id}/mark-read"),
            Some(&bob),
            json!(null),
        )
        .await
        .unwrap();
    let unread: UnreadTotal = t
        .run("GET", "/messages/unread/total", Some(&bob), json!(null))
        .await
        .unwrap();
    assert_eq!(unread.total, 0);

    let delete = format!("/messages/{}", msg.id);
    assert_eq!(
        t.run::<()>("DELETE", &delete, Some(&bob), json!(null)).await,
        Err(ApiError::PermissionDenied)
    );
    let () = t.run("DELETE", &delete, Some(&alice), json!(null)).await.unwrap();
    assert!(t.db.test_messages().is_empty());
}

#[tokio::test]
async fn admin_sweeps_need_the_admin_token() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let kept = t.collection(&alice, "Mine", "public").await;
    let orphan = NewCollection {
        title: String::from("Lost"),
        visibility: Some(Visibility::Public),
        ..Default::default()
    }
    .into_collection(UserId::new(), Utc::now());
    arcana_api::Db::create_collection(&*t.db, &orphan)
        .await
        .unwrap();

    let path = "/admin/cleanup-orphan-collections";
    assert_eq!(
        t.run::<SweepReport>("POST", path, None, json!(null)).await,
        Err(ApiError::Unauthenticated)
    );
    assert_eq!(
        t.run::<SweepReport>("POST", path, Some(&alice), json!(null))
            .await,
        Err(ApiError::PermissionDenied)
    );
    let admin = t.admin_token.clone();
    let report: SweepReport = t
        .run("POST", path, Some(&admin), json!(null))
        .await
        .unwrap();
    assert_eq!(report.removed, 1);
    let left = t.db.test_collections();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, kept.id);

    let report: SweepReport = t
        .run("POST", path, Some(&admin), json!(null))
        .await
        .unwrap();
    assert_eq!(report.removed, 0);
}

#[tokio::test]
async fn autocomplete_validates_before_lookup() {
    let mut t = TestApp::new();
    assert_eq!(
        t.run::<Vec<arcana_api::MediaMetadata>>("GET", "/autocomplete/movie", None, json!(null))
            .await,
        Err(ApiError::MissingFields)
    );
    assert_eq!(
        t.run::<Vec<arcana_api::MediaMetadata>>(
            "GET",
            "/autocomplete/podcast?query=x",
            None,
            json!(null)
        )
        .await,
        Err(ApiError::NotFound(String::from("media kind")))
    );
}

#[tokio::test]
async fn search_matches_titles_tags_and_usernames() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let _: Collection = t
        .run(
            "POST",
            "/collections",
            Some(&alice),
            json!({"title": "Space Opera", "visibility": "public", "tags": ["scifi"]}),
        )
        .await
        .unwrap();
    let _: Collection = t
        .run(
            "POST",
            "/collections",
            Some(&alice),
            json!({"title": "Cooking", "visibility": "public", "tags": ["SciFi-adjacent"]}),
        )
        .await
        .unwrap();

    let res: arcana_api::SearchResults = t
        .run("GET", "/search?q=scifi", None, json!(null))
        .await
        .unwrap();
    assert_eq!(res.collections.len(), 2);
    assert!(res
        .collections
        .iter()
        .all(|c| c.owner_username.as_deref() == Some("alice")));
    let res: arcana_api::SearchResults = t
        .run("GET", "/search?q=ALI", None, json!(null))
        .await
        .unwrap();
    assert_eq!(res.users.len(), 1);
    assert_eq!(
        t.run::<arcana_api::SearchResults>("GET", "/search", None, json!(null))
            .await,
        Err(ApiError::MissingFields)
    );

    let tags: Vec<arcana_api::PopularTag> = t
        .run("GET", "/search/popular-tags", None, json!(null))
        .await
        .unwrap();
    assert_eq!(tags.len(), 2);
}

#[tokio::test]
async fn collection_covers_upload_from_forms() {
    let mut t = TestApp::new();
    let (_, alice) = t.user("alice").await;
    let form = format!("multipart/form-data; boundary={BOUNDARY}");

    let body = form_body(&[
        ("title", None, "Films"),
        ("visibility", None, "public"),
        ("tags[]", None, "noir"),
        ("tags[]", None, "classic"),
        ("cover", Some("poster.png"), "PNG fake"),
    ]);
    let (status, resp) = run_raw(&mut t.app, "POST", "/collections", Some(&alice), &form, body).await;
    assert_eq!(status, StatusCode::OK);
    let c: Collection = serde_json::from_slice(&resp).unwrap();
    assert_eq!(c.title, "Films");
    assert_eq!(c.tags, vec![String::from("noir"), String::from("classic")]);
    assert_eq!(c.cover, "https://covers.test/poster.png/8");

    let body = form_body(&[
        ("tags", None, r#"["one","two"]"#),
        ("cover", Some("new.png"), "png"),
    ]);
    let uri = format!("/collections/{}", c.id);
    let (status, resp) = run_raw(&mut t.app, "PUT", &uri, Some(&alice), &form, body).await;
    assert_eq!(status, StatusCode::OK);
    let c: Collection = serde_json::from_slice(&resp).unwrap();
    assert_eq!(c.title, "Films");
    assert_eq!(c.tags, vec![String::from("one"), String::from("two")]);
    assert_eq!(c.cover, "https://covers.test/new.png/3");

    let body = form_body(&[("description", None, "Old films")]);
    let (status, resp) = run_raw(&mut t.app, "PUT", &uri, Some(&alice), &form, body).await;
    assert_eq!(status, StatusCode::OK);
    let c: Collection = serde_json::from_slice(&resp).unwrap();
    assert_eq!(c.description, "Old films");
    assert_eq!(c.cover, "https://covers.test/new.png/3");
    assert_eq!(t.db.test_collections()[0].cover, c.cover);

    let body = form_body(&[("visibility", None, "public")]);
    let (status, _) = run_raw(&mut t.app, "POST", "/collections", Some(&alice), &form, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
