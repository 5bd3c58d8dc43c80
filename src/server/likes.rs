use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::store::Store;
use crate::types::{Like, LikeTargetKind};
use crate::views::{Pipeline, user_summary};

pub fn likes_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/toggle/{kind}/{id}", post(toggle_like))
        .route("/videos", get(liked_videos))
}

fn target_exists(store: &dyn Store, kind: LikeTargetKind, id: &str) -> Result<bool, ApiError> {
    let found = match kind {
        LikeTargetKind::Video => store.get_video(id).api_err("Failed to look up target")?.is_some(),
        LikeTargetKind::Comment => store
            .get_comment(id)
            .api_err("Failed to look up target")?
            .is_some(),
        LikeTargetKind::Tweet => store.get_tweet(id).api_err("Failed to look up target")?.is_some(),
    };
    Ok(found)
}

async fn toggle_like(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let kind = LikeTargetKind::parse(&kind)
        .ok_or_else(|| ApiError::bad_request("Unknown like target kind"))?;

    if !target_exists(state.store.as_ref(), kind, &id)? {
        return Err(ApiError::not_found("Like target does not exist"));
    }

    let existing = state
        .store
        .get_like(kind, &id, &user.id)
        .api_err("Failed to look up like")?;

    let liked = match existing {
        Some(like) => {
            state.store.delete_like(&like.id).api_err("Failed to remove like")?;
            false
        }
        None => {
            state
                .store
                .create_like(&Like {
                    id: Uuid::new_v4().to_string(),
                    target_kind: kind,
                    target_id: id,
                    liked_by: user.id,
                    created_at: Utc::now(),
                })
                .api_err("Failed to create like")?;
            true
        }
    };

    Ok::<_, ApiError>(ApiResponse::ok(
        json!({ "liked": liked }),
        if liked { "Liked successfully" } else { "Like removed successfully" },
    ))
}

async fn liked_videos(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let roots = state
        .store
        .find_docs("likes", "likedBy", &[json!(user.id)])
        .api_err("Failed to list likes")?;

    // Likes whose video has since been deleted resolve to a null video
    // and are dropped from the listing.
    let videos: Vec<_> = Pipeline::new()
        .select("targetKind", LikeTargetKind::Video.as_str())
        .sort_desc("createdAt")
        .expand(
            "targetId",
            "videos",
            "id",
            "video",
            Pipeline::new()
                .expand("ownerId", "users", "id", "owner", user_summary())
                .first("owner"),
        )
        .first("video")
        .keep(&["id", "video", "createdAt"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble liked videos")?
        .into_iter()
        .filter(|row| !row.get("video").is_none_or(serde_json::Value::is_null))
        .collect();

    Ok::<_, ApiError>(ApiResponse::ok(videos, "Liked videos fetched successfully"))
}
