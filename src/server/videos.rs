use std::sync::Arc;

use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::server::AppState;
use crate::server::dto::ListVideosParams;
use crate::server::media::collect_fields;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_content;
use crate::auth::{RequireUser, Viewer};
use crate::store::VideoUpdate;
use crate::types::{LikeTargetKind, User, Video};
use crate::views::{Pipeline, user_summary};

pub fn videos_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_videos).post(publish_video))
        .route(
            "/{id}",
            get(get_video).patch(update_video).delete(delete_video),
        )
        .route("/{id}/toggle-publish", patch(toggle_publish))
        .route(
            "/{id}/comments",
            get(super::comments::list_comments).post(super::comments::add_comment),
        )
}

fn viewer_value(viewer: &Option<User>) -> Value {
    viewer.as_ref().map_or(Value::Null, |u| json!(u.id))
}

/// Owner summary enriched with channel facts, relative to the viewer.
fn channel_owner(viewer: Value) -> Pipeline {
    Pipeline::new()
        .expand("id", "subscriptions", "channelId", "subscriberRows", Pipeline::new())
        .count("subscriberRows", "subscribersCount")
        .flag("subscriberRows", "subscriberId", viewer, "isSubscribed")
        .keep(&["id", "username", "fullName", "avatar", "subscribersCount", "isSubscribed"])
}

fn like_facts(viewer: Value) -> Pipeline {
    Pipeline::new()
        .expand(
            "id",
            "likes",
            "targetId",
            "likeRows",
            Pipeline::new().select("targetKind", LikeTargetKind::Video.as_str()),
        )
        .count("likeRows", "totalLikes")
        .flag("likeRows", "likedBy", viewer, "isLiked")
        .drop_fields(&["likeRows"])
}

async fn list_videos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListVideosParams>,
) -> impl IntoResponse {
    let roots = match params.user_id {
        Some(ref user_id) => state
            .store
            .find_docs("videos", "ownerId", &[json!(user_id)])
            .api_err("Failed to list videos")?
            .into_iter()
            .filter(|v| v.get("isPublished") == Some(&Value::Bool(true)))
            .collect(),
        None => state
            .store
            .find_docs("videos", "isPublished", &[json!(true)])
            .api_err("Failed to list videos")?,
    };

    let roots = match params.query {
        Some(ref query) if !query.trim().is_empty() => {
            let needle = query.to_lowercase();
            roots
                .into_iter()
                .filter(|v| {
                    ["title", "description"].iter().any(|field| {
                        v.get(field)
                            .and_then(Value::as_str)
                            .is_some_and(|s| s.to_lowercase().contains(&needle))
                    })
                })
                .collect()
        }
        _ => roots,
    };

    let videos = Pipeline::new()
        .sort_desc("createdAt")
        .expand("ownerId", "users", "id", "owner", user_summary())
        .first("owner")
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble videos")?;

    Ok::<_, ApiError>(ApiResponse::ok(videos, "Videos fetched successfully"))
}

async fn publish_video(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let fields = collect_fields(&mut multipart).await?;

    let title = fields
        .get("title")
        .and_then(super::media::UploadField::text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Title is required"))?;
    validate_content(&title, "Title")?;
    let description = fields
        .get("description")
        .and_then(super::media::UploadField::text)
        .unwrap_or_default();
    let duration = fields
        .get("duration")
        .and_then(super::media::UploadField::text)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let video_upload = fields
        .get("videoFile")
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("Video file is required"))?;
    let thumbnail_upload = fields
        .get("thumbnail")
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("Thumbnail is required"))?;

    let video_file = state
        .media
        .store(&video_upload.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to store video").with_detail(e.to_string()))?;
    let thumbnail = state
        .media
        .store(&thumbnail_upload.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to store thumbnail").with_detail(e.to_string()))?;

    let now = Utc::now();
    let video = Video {
        id: Uuid::new_v4().to_string(),
        owner_id: user.id,
        title,
        description,
        video_file,
        thumbnail,
        duration,
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    };

    state.store.create_video(&video).api_err("Failed to create video")?;

    Ok::<_, ApiError>(ApiResponse::created(video, "Video published successfully"))
}

async fn get_video(
    Viewer(viewer): Viewer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_video(&id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;

    state.store.increment_views(&id).api_err("Failed to count view")?;
    if let Some(ref user) = viewer {
        state
            .store
            .add_watch_entry(&user.id, &id)
            .api_err("Failed to record watch")?;
    }

    let viewer_id = viewer_value(&viewer);
    let roots = state
        .store
        .find_docs("videos", "id", &[json!(id)])
        .api_err("Failed to load video")?;

    let composed = like_facts(viewer_id.clone())
        .expand("ownerId", "users", "id", "owner", channel_owner(viewer_id))
        .first("owner")
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble video")?;

    let video = composed.into_iter().next().or_not_found("Video does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(video, "Video fetched successfully"))
}

async fn update_video(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;
    if video.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this video"));
    }

    let fields = collect_fields(&mut multipart).await?;
    let title = fields
        .get("title")
        .and_then(super::media::UploadField::text)
        .filter(|t| !t.trim().is_empty());
    let description = fields
        .get("description")
        .and_then(super::media::UploadField::text);

    let thumbnail = match fields.get("thumbnail").filter(|f| !f.bytes.is_empty()) {
        Some(upload) => Some(state.media.store(&upload.bytes).await.map_err(|e| {
            ApiError::internal("Failed to store thumbnail").with_detail(e.to_string())
        })?),
        None => None,
    };

    if title.is_none() && description.is_none() && thumbnail.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let replaced_thumbnail = thumbnail.as_ref().map(|_| video.thumbnail.asset_id.clone());

    let updated = state
        .store
        .update_video(
            &id,
            &VideoUpdate {
                title,
                description,
                thumbnail,
                is_published: None,
            },
        )
        .api_err("Failed to update video")?
        .or_not_found("Video does not exist")?;

    if let Some(asset_id) = replaced_thumbnail
        && let Err(e) = state.media.delete(&asset_id).await
    {
        tracing::warn!("Failed to delete replaced thumbnail {}: {}", asset_id, e);
    }

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Video updated successfully"))
}

async fn delete_video(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;
    if video.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this video"));
    }

    // The video row is authoritative; it goes first. Likes on the video,
    // its comments, likes on those comments, and the media files follow
    // best-effort. A leaked row or file is better than a half-deleted
    // video that still lists.
    state.store.delete_video(&id).api_err("Failed to delete video")?;

    if let Err(e) = state.store.delete_target_likes(LikeTargetKind::Video, &id) {
        tracing::warn!("Failed to delete likes of video {}: {}", id, e);
    }
    match state.store.delete_video_comments(&id) {
        Ok(comment_ids) => {
            for comment_id in comment_ids {
                if let Err(e) = state
                    .store
                    .delete_target_likes(LikeTargetKind::Comment, &comment_id)
                {
                    tracing::warn!("Failed to delete likes of comment {}: {}", comment_id, e);
                }
            }
        }
        Err(e) => tracing::warn!("Failed to delete comments of video {}: {}", id, e),
    }
    for asset_id in [&video.video_file.asset_id, &video.thumbnail.asset_id] {
        if let Err(e) = state.media.delete(asset_id).await {
            tracing::warn!("Failed to delete asset {}: {}", asset_id, e);
        }
    }

    Ok::<_, ApiError>(ApiResponse::ok(Value::Null, "Video deleted successfully"))
}

async fn toggle_publish(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;
    if video.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this video"));
    }

    let updated = state
        .store
        .update_video(
            &id,
            &VideoUpdate {
                is_published: Some(!video.is_published),
                ..VideoUpdate::default()
            },
        )
        .api_err("Failed to toggle publish state")?
        .or_not_found("Video does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(
        updated,
        "Publish state toggled successfully",
    ))
}
