use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use crate::auth::{PasswordHasher, TokenSigner};
use crate::media::DiskMediaStore;
use crate::store::Store;

// Video uploads; multipart bodies up to 512 MiB.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: DiskMediaStore,
    pub signer: TokenSigner,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, media: DiskMediaStore, signer: TokenSigner) -> Self {
        Self {
            store,
            media,
            signer,
            hasher: PasswordHasher::new(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/media/{asset_id}", get(super::media::serve_asset))
        .nest("/api/v1/users", super::users::users_router())
        .nest("/api/v1/videos", super::videos::videos_router())
        .nest("/api/v1/comments", super::comments::comments_router())
        .nest("/api/v1/likes", super::likes::likes_router())
        .nest(
            "/api/v1/subscriptions",
            super::subscriptions::subscriptions_router(),
        )
        .nest("/api/v1/playlists", super::playlists::playlists_router())
        .nest("/api/v1/tweets", super::tweets::tweets_router())
        .nest("/api/v1/dashboard", super::dashboard::dashboard_router())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
