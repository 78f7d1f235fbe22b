use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use arcana_api::{AuthToken, Sweep};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use structopt::StructOpt;
use tower_http::trace::TraceLayer;

mod auth;
mod cascade;
mod covers;
mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;
mod metadata;
mod query;
mod sweeps;

use db::{PostgresDb, MIGRATOR};
use error::Error;
use extractors::AppState;
use handlers::*;

#[derive(StructOpt)]
struct Opt {
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Bearer token for the /admin routes, which deny everything when unset
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<uuid::Uuid>,

    #[structopt(long, env = "JWT_SECRET_KEY", hide_env_values = true)]
    jwt_secret: String,

    #[structopt(long, default_value = "24")]
    token_ttl_hours: i64,

    #[structopt(long, env = "TMDB_API_KEY", hide_env_values = true)]
    tmdb_api_key: Option<String>,

    #[structopt(long, env = "RAWG_API_KEY", hide_env_values = true)]
    rawg_api_key: Option<String>,

    /// Image host endpoint collection covers are uploaded to
    #[structopt(long, env = "COVER_UPLOAD_URL")]
    cover_upload_url: Option<String>,

    #[structopt(long, env = "COVER_UPLOAD_PRESET")]
    cover_upload_preset: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/users/signup", post(users::signup))
        .route("/users/signin", post(users::signin))
        .route("/users/logout", post(users::logout))
        .route("/users/me", get(users::me))
        .route("/users/follow", put(users::follow))
        .route("/users/connections/:userId", get(users::connections_of))
        .route("/users/followers/:userId", get(users::followers))
        .route("/users/following/:userId", get(users::following))
        .route("/users/:userId", get(users::get).put(users::update))
        .route(
            "/collections",
            get(collections::list).post(collections::create),
        )
        .route("/collections/top", get(collections::top))
        .route("/collections/recent", get(collections::recent))
        .route("/collections/random", get(collections::random))
        .route("/collections/top/:userId", get(collections::top_of_user))
        .route("/collections/user/:userId", get(collections::of_user))
        .route("/collections/mine", get(collections::mine))
        .route(
            "/collections/:id",
            get(collections::get)
                .put(collections::update)
                .delete(collections::delete),
        )
        .route("/elements", post(elements::create))
        .route(
            "/elements/collection/:collectionId",
            get(elements::of_collection),
        )
        .route("/elements/user/:userId", get(elements::of_user))
        .route(
            "/elements/:id",
            get(elements::get)
                .put(elements::update)
                .delete(elements::delete),
        )
        .route("/likes/like", post(likes::like))
        .route("/likes/mine", get(likes::mine))
        .route("/likes/user/:userId", get(likes::of_user))
        .route(
            "/likes/collection/:collectionId",
            get(likes::on_collection),
        )
        .route("/likes/:collectionId", delete(likes::unlike))
        .route("/comments", post(comments::create))
        .route("/comments/mine", get(comments::mine))
        .route(
            "/comments/collection/:collectionId",
            get(comments::of_collection),
        )
        .route("/comments/user/:userId", get(comments::of_user))
        .route("/comments/:id/reply", post(comments::reply))
        .route(
            "/comments/:id",
            get(comments::get).delete(comments::delete),
        )
        .route("/activity/feed", get(activity::feed))
        .route("/activity/user/:userId", get(activity::of_user))
        .route("/search", get(search::search))
        .route("/search/popular-tags", get(search::popular_tags))
        .route("/messages", post(messages::send))
        .route("/messages/conversations", get(messages::conversations))
        .route("/messages/unread/total", get(messages::unread_total))
        .route("/messages/start-conversation", post(messages::start))
        .route("/messages/with/:userId", get(messages::with))
        .route("/messages/with/:userId/last", get(messages::last))
        .route(
            "/messages/with/:userId/unread/count",
            get(messages::unread_count),
        )
        .route(
            "/messages/with/:userId/mark-read",
            post(messages::mark_read),
        )
        .route(
            "/messages/conversation/:userId",
            delete(messages::delete_conversation),
        )
        .route("/messages/:messageId", delete(messages::delete))
        .route("/autocomplete/:kind", get(autocomplete::lookup))
        .route(&Sweep::Followers.path(), post(admin::cleanup_followers))
        .route(
            &Sweep::CollectionActivity.path(),
            post(admin::cleanup_collection_activity),
        )
        .route(
            &Sweep::CommentActivity.path(),
            post(admin::cleanup_comment_activity),
        )
        .route(
            &Sweep::OrphanCollections.path(),
            post(admin::cleanup_orphan_collections),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn create_sqlx_pool(url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(url)
        .await
        .with_context(|| format!("opening database {url:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::from_args();
    if opt.admin_token.is_none() {
        tracing::warn!("no admin token set, admin routes are disabled");
    }
    if opt.cover_upload_url.is_none() {
        tracing::warn!("no cover upload url set, cover files will be refused");
    }

    let pool = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("running pending migrations")?;

    let state = AppState {
        db: Arc::new(PostgresDb::new(pool)),
        keys: auth::JwtKeys::new(
            opt.jwt_secret.as_bytes(),
            chrono::Duration::hours(opt.token_ttl_hours),
        ),
        metadata: metadata::MetadataClient::new(opt.tmdb_api_key, opt.rawg_api_key),
        covers: Arc::new(covers::HttpUploader::new(
            opt.cover_upload_url,
            opt.cover_upload_preset,
        )),
        admin_token: opt.admin_token.map(AuthToken),
    };

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app(state).into_make_service())
        .await
        .context("serving axum webserver")
}
