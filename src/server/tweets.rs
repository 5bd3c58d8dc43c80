use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::{RequireUser, Viewer};
use crate::server::AppState;
use crate::server::dto::ContentRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_content;
use crate::types::{LikeTargetKind, Tweet};
use crate::views::{Pipeline, user_summary};

pub fn tweets_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_tweet))
        .route("/user/{user_id}", get(user_tweets))
        .route("/{id}", patch(update_tweet).delete(delete_tweet))
}

async fn create_tweet(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    validate_content(&req.content, "Tweet")?;

    let now = Utc::now();
    let tweet = Tweet {
        id: Uuid::new_v4().to_string(),
        owner_id: user.id,
        content: req.content,
        created_at: now,
        updated_at: now,
    };
    state.store.create_tweet(&tweet).api_err("Failed to create tweet")?;

    Ok::<_, ApiError>(ApiResponse::created(tweet, "Tweet created successfully"))
}

async fn user_tweets(
    Viewer(viewer): Viewer,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_user(&user_id)
        .api_err("Failed to look up user")?
        .or_not_found("User does not exist")?;

    let viewer_id = viewer.map_or(Value::Null, |u| json!(u.id));
    let roots = state
        .store
        .find_docs("tweets", "ownerId", &[json!(user_id)])
        .api_err("Failed to list tweets")?;

    let tweets = Pipeline::new()
        .sort_desc("createdAt")
        .expand("ownerId", "users", "id", "owner", user_summary())
        .first("owner")
        .expand(
            "id",
            "likes",
            "targetId",
            "likeRows",
            Pipeline::new().select("targetKind", LikeTargetKind::Tweet.as_str()),
        )
        .count("likeRows", "totalLikes")
        .flag("likeRows", "likedBy", viewer_id, "isLiked")
        .drop_fields(&["likeRows"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble tweets")?;

    Ok::<_, ApiError>(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

async fn update_tweet(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    validate_content(&req.content, "Tweet")?;
    let tweet = state
        .store
        .get_tweet(&id)
        .api_err("Failed to look up tweet")?
        .or_not_found("Tweet does not exist")?;
    if tweet.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this tweet"));
    }

    let updated = state
        .store
        .update_tweet(&id, &req.content)
        .api_err("Failed to update tweet")?
        .or_not_found("Tweet does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Tweet updated successfully"))
}

async fn delete_tweet(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let tweet = state
        .store
        .get_tweet(&id)
        .api_err("Failed to look up tweet")?
        .or_not_found("Tweet does not exist")?;
    if tweet.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this tweet"));
    }

    // Tweet row first; its likes follow best-effort.
    state.store.delete_tweet(&id).api_err("Failed to delete tweet")?;
    if let Err(e) = state.store.delete_target_likes(LikeTargetKind::Tweet, &id) {
        tracing::warn!("Failed to delete likes of tweet {}: {}", id, e);
    }

    Ok::<_, ApiError>(ApiResponse::ok(Value::Null, "Tweet deleted successfully"))
}
