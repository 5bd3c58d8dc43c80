use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::patch,
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::{RequireUser, Viewer};
use crate::server::AppState;
use crate::server::dto::ContentRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_content;
use crate::types::{Comment, LikeTargetKind};
use crate::views::{Pipeline, user_summary};

pub fn comments_router() -> Router<Arc<AppState>> {
    Router::new().route("/{id}", patch(update_comment).delete(delete_comment))
}

/// GET /videos/{id}/comments
pub async fn list_comments(
    Viewer(viewer): Viewer,
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_video(&video_id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;

    let viewer_id = viewer.map_or(Value::Null, |u| json!(u.id));
    let roots = state
        .store
        .find_docs("comments", "videoId", &[json!(video_id)])
        .api_err("Failed to list comments")?;

    let comments = Pipeline::new()
        .sort_desc("createdAt")
        .expand("ownerId", "users", "id", "owner", user_summary())
        .first("owner")
        .expand(
            "id",
            "likes",
            "targetId",
            "likeRows",
            Pipeline::new().select("targetKind", LikeTargetKind::Comment.as_str()),
        )
        .count("likeRows", "totalLikes")
        .flag("likeRows", "likedBy", viewer_id, "isLiked")
        .drop_fields(&["likeRows"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble comments")?;

    Ok::<_, ApiError>(ApiResponse::ok(comments, "Comments fetched successfully"))
}

/// POST /videos/{id}/comments
pub async fn add_comment(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    validate_content(&req.content, "Comment")?;
    state
        .store
        .get_video(&video_id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;

    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        video_id,
        owner_id: user.id,
        content: req.content,
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .create_comment(&comment)
        .api_err("Failed to create comment")?;

    Ok::<_, ApiError>(ApiResponse::created(comment, "Comment added successfully"))
}

async fn update_comment(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    validate_content(&req.content, "Comment")?;
    let comment = state
        .store
        .get_comment(&id)
        .api_err("Failed to look up comment")?
        .or_not_found("Comment does not exist")?;
    if comment.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this comment"));
    }

    let updated = state
        .store
        .update_comment(&id, &req.content)
        .api_err("Failed to update comment")?
        .or_not_found("Comment does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Comment updated successfully"))
}

async fn delete_comment(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let comment = state
        .store
        .get_comment(&id)
        .api_err("Failed to look up comment")?
        .or_not_found("Comment does not exist")?;
    if comment.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this comment"));
    }

    // Comment row first; its likes follow best-effort.
    state
        .store
        .delete_comment(&id)
        .api_err("Failed to delete comment")?;
    if let Err(e) = state.store.delete_target_likes(LikeTargetKind::Comment, &id) {
        tracing::warn!("Failed to delete likes of comment {}: {}", id, e);
    }

    Ok::<_, ApiError>(ApiResponse::ok(Value::Null, "Comment deleted successfully"))
}
