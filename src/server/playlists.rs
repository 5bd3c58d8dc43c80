use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreatePlaylistRequest, UpdatePlaylistRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_content;
use crate::store::PlaylistUpdate;
use crate::types::Playlist;
use crate::views::{Pipeline, user_summary};

pub fn playlists_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_playlist))
        .route("/user/{user_id}", get(user_playlists))
        .route(
            "/{id}",
            get(get_playlist).patch(update_playlist).delete(delete_playlist),
        )
        .route(
            "/{id}/videos/{video_id}",
            post(add_video).delete(remove_video),
        )
}

async fn create_playlist(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePlaylistRequest>,
) -> impl IntoResponse {
    validate_content(&req.name, "Playlist name")?;

    let now = Utc::now();
    let playlist = Playlist {
        id: Uuid::new_v4().to_string(),
        owner_id: user.id,
        name: req.name,
        description: req.description,
        video_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .create_playlist(&playlist)
        .api_err("Failed to create playlist")?;

    Ok::<_, ApiError>(ApiResponse::created(
        playlist,
        "Playlist created successfully",
    ))
}

async fn user_playlists(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let roots = state
        .store
        .find_docs("playlists", "ownerId", &[json!(user_id)])
        .api_err("Failed to list playlists")?;

    let playlists = Pipeline::new()
        .sort_desc("updatedAt")
        .expand("videoIds", "videos", "id", "videos", Pipeline::new())
        .count("videos", "totalVideos")
        .sum("videos", "views", "totalViews")
        .drop_fields(&["videos"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble playlists")?;

    Ok::<_, ApiError>(ApiResponse::ok(playlists, "Playlists fetched successfully"))
}

async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let roots = state
        .store
        .find_docs("playlists", "id", &[json!(id)])
        .api_err("Failed to look up playlist")?;
    if roots.is_empty() {
        return Err(ApiError::not_found("Playlist does not exist"));
    }

    // Members keep playlist order; a deleted video simply drops out of
    // the expansion.
    let composed = Pipeline::new()
        .expand(
            "videoIds",
            "videos",
            "id",
            "videos",
            Pipeline::new()
                .expand("ownerId", "users", "id", "owner", user_summary())
                .first("owner"),
        )
        .count("videos", "totalVideos")
        .sum("videos", "views", "totalViews")
        .expand("ownerId", "users", "id", "owner", user_summary())
        .first("owner")
        .drop_fields(&["videoIds"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble playlist")?;

    let playlist = composed
        .into_iter()
        .next()
        .or_not_found("Playlist does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

async fn update_playlist(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePlaylistRequest>,
) -> impl IntoResponse {
    let playlist = state
        .store
        .get_playlist(&id)
        .api_err("Failed to look up playlist")?
        .or_not_found("Playlist does not exist")?;
    if playlist.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this playlist"));
    }
    if let Some(ref name) = req.name {
        validate_content(name, "Playlist name")?;
    }

    let updated = state
        .store
        .update_playlist(
            &id,
            &PlaylistUpdate {
                name: req.name,
                description: req.description,
            },
        )
        .api_err("Failed to update playlist")?
        .or_not_found("Playlist does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Playlist updated successfully"))
}

async fn delete_playlist(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let playlist = state
        .store
        .get_playlist(&id)
        .api_err("Failed to look up playlist")?
        .or_not_found("Playlist does not exist")?;
    if playlist.owner_id != user.id {
        return Err(ApiError::forbidden("You do not own this playlist"));
    }

    state
        .store
        .delete_playlist(&id)
        .api_err("Failed to delete playlist")?;

    Ok::<_, ApiError>(ApiResponse::ok(Value::Null, "Playlist deleted successfully"))
}

async fn add_video(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, video_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let playlist = owned_playlist(&state, &id, &user.id)?;
    state
        .store
        .get_video(&video_id)
        .api_err("Failed to look up video")?
        .or_not_found("Video does not exist")?;

    state
        .store
        .add_playlist_video(&playlist.id, &video_id)
        .api_err("Failed to add video to playlist")?;

    let updated = state
        .store
        .get_playlist(&id)
        .api_err("Failed to reload playlist")?
        .or_not_found("Playlist does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Video added to playlist"))
}

async fn remove_video(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, video_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let playlist = owned_playlist(&state, &id, &user.id)?;

    state
        .store
        .remove_playlist_video(&playlist.id, &video_id)
        .api_err("Failed to remove video from playlist")?;

    let updated = state
        .store
        .get_playlist(&id)
        .api_err("Failed to reload playlist")?
        .or_not_found("Playlist does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Video removed from playlist"))
}

fn owned_playlist(state: &AppState, id: &str, user_id: &str) -> Result<Playlist, ApiError> {
    let playlist = state
        .store
        .get_playlist(id)
        .api_err("Failed to look up playlist")?
        .or_not_found("Playlist does not exist")?;
    if playlist.owner_id != user_id {
        return Err(ApiError::forbidden("You do not own this playlist"));
    }
    Ok(playlist)
}
