use std::sync::Arc;

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use serde_json::json;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::types::LikeTargetKind;
use crate::views::Pipeline;

pub fn dashboard_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(channel_stats))
        .route("/videos", get(channel_videos))
}

async fn channel_stats(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let stats = state
        .store
        .channel_stats(&user.id)
        .api_err("Failed to compute channel stats")?;

    Ok::<_, ApiError>(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

/// All of the channel's videos, drafts included, with per-video like
/// counts.
async fn channel_videos(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let roots = state
        .store
        .find_docs("videos", "ownerId", &[json!(user.id)])
        .api_err("Failed to list videos")?;

    let videos = Pipeline::new()
        .sort_desc("createdAt")
        .expand(
            "id",
            "likes",
            "targetId",
            "likeRows",
            Pipeline::new().select("targetKind", LikeTargetKind::Video.as_str()),
        )
        .count("likeRows", "totalLikes")
        .drop_fields(&["likeRows"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble videos")?;

    Ok::<_, ApiError>(ApiResponse::ok(videos, "Channel videos fetched successfully"))
}
