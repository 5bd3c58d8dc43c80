use std::sync::Arc;

use axum::{
    Router,
    extract::{Multipart, Path, State},
    http::header::SET_COOKIE,
    http::request::Parts,
    response::{AppendHeaders, IntoResponse},
    routing::{get, patch, post},
    Json,
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::{
    ACCESS_COOKIE, REFRESH_COOKIE, RequireUser, TokenKind, Viewer, cookie_value,
};
use crate::server::AppState;
use crate::server::dto::{
    ChangePasswordRequest, LoginRequest, RefreshRequest, UpdateAccountRequest,
};
use crate::server::media::collect_fields;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{validate_email, validate_password, validate_username};
use crate::store::AccountUpdate;
use crate::types::{AssetRef, User};
use crate::views::{Pipeline, doc, user_summary};

pub fn users_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/change-password", post(change_password))
        .route("/current", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .route("/channel/{username}", get(channel_profile))
        .route("/watch-history", get(watch_history))
}

fn set_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; HttpOnly; Secure; SameSite=None; Path=/; Max-Age={max_age_secs}")
}

fn clear_cookie(name: &str) -> String {
    format!("{name}=; HttpOnly; Secure; SameSite=None; Path=/; Max-Age=0")
}

const ACCESS_MAX_AGE: i64 = 24 * 60 * 60;
const REFRESH_MAX_AGE: i64 = 10 * 24 * 60 * 60;

/// Issues both credentials and persists the refresh side so stale
/// refresh credentials fail closed.
fn issue_session(state: &AppState, user_id: &str) -> Result<(String, String), ApiError> {
    let access = state
        .signer
        .issue(user_id, TokenKind::Access)
        .api_err("Failed to issue credential")?;
    let refresh = state
        .signer
        .issue(user_id, TokenKind::Refresh)
        .api_err("Failed to issue credential")?;
    state
        .store
        .set_refresh_token(user_id, Some(&refresh))
        .api_err("Failed to persist session")?;
    Ok((access, refresh))
}

async fn register(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let fields = collect_fields(&mut multipart).await?;

    let text = |name: &str| -> Result<String, ApiError> {
        fields
            .get(name)
            .and_then(super::media::UploadField::text)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("Field '{name}' is required")))
    };

    let username = text("username")?.to_lowercase();
    let email = text("email")?;
    let full_name = text("fullName")?;
    let password = text("password")?;

    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&password)?;

    let avatar_upload = fields
        .get("avatar")
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("Avatar image is required"))?;

    if state
        .store
        .user_exists(&username, &email)
        .api_err("Failed to check user")?
    {
        return Err(ApiError::conflict(
            "User with this username or email already exists",
        ));
    }

    let avatar = state
        .media
        .store(&avatar_upload.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to store avatar").with_detail(e.to_string()))?;

    let cover_image = match fields.get("coverImage").filter(|f| !f.bytes.is_empty()) {
        Some(upload) => Some(state.media.store(&upload.bytes).await.map_err(|e| {
            ApiError::internal("Failed to store cover image").with_detail(e.to_string())
        })?),
        None => None,
    };

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        email,
        full_name,
        password_hash: state.hasher.hash(&password).api_err("Failed to hash password")?,
        refresh_token: None,
        avatar,
        cover_image,
        created_at: now,
        updated_at: now,
    };

    state.store.create_user(&user).api_err("Failed to create user")?;

    Ok::<_, ApiError>(ApiResponse::created(user, "User registered successfully"))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user_by_login(&req.username)
        .api_err("Failed to look up user")?
        .or_not_found("User does not exist")?;

    if !state
        .hasher
        .verify(&req.password, &user.password_hash)
        .api_err("Failed to verify password")?
    {
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let (access, refresh) = issue_session(&state, &user.id)?;

    let headers = AppendHeaders([
        (SET_COOKIE, set_cookie(ACCESS_COOKIE, &access, ACCESS_MAX_AGE)),
        (SET_COOKIE, set_cookie(REFRESH_COOKIE, &refresh, REFRESH_MAX_AGE)),
    ]);
    let data = json!({
        "user": doc(&user),
        "accessToken": access,
        "refreshToken": refresh,
    });

    Ok::<_, ApiError>((headers, ApiResponse::ok(data, "User logged in successfully")))
}

async fn logout(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state
        .store
        .set_refresh_token(&user.id, None)
        .api_err("Failed to clear session")?;

    let headers = AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE)),
    ]);

    Ok::<_, ApiError>((
        headers,
        ApiResponse::ok(Value::Null, "User logged out successfully"),
    ))
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    parts: Parts,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    // Cookie first, then a JSON body for clients that do not hold cookies.
    let presented = cookie_value(&parts, REFRESH_COOKIE)
        .or_else(|| {
            serde_json::from_slice::<RefreshRequest>(&body)
                .ok()
                .and_then(|req| req.refresh_token)
        })
        .ok_or_else(|| ApiError::unauthorized("Refresh credential required"))?;

    let claims = state
        .signer
        .verify(&presented, TokenKind::Refresh)
        .map_err(|e| match e {
            crate::error::Error::CredentialExpired => {
                ApiError::unauthorized("Refresh credential expired")
            }
            _ => ApiError::unauthorized("Invalid refresh credential"),
        })?;

    let user = state
        .store
        .get_user(&claims.sub)
        .api_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh credential"))?;

    // Rotation: only the most recently issued refresh credential is
    // honored, so a replayed older one fails even though its signature
    // still verifies.
    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        return Err(ApiError::unauthorized("Refresh credential is no longer valid"));
    }

    let (access, refresh) = issue_session(&state, &user.id)?;

    let headers = AppendHeaders([
        (SET_COOKIE, set_cookie(ACCESS_COOKIE, &access, ACCESS_MAX_AGE)),
        (SET_COOKIE, set_cookie(REFRESH_COOKIE, &refresh, REFRESH_MAX_AGE)),
    ]);
    let data = json!({ "accessToken": access, "refreshToken": refresh });

    Ok::<_, ApiError>((headers, ApiResponse::ok(data, "Credentials refreshed")))
}

async fn change_password(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangePasswordRequest>,
) -> impl IntoResponse {
    if !state
        .hasher
        .verify(&req.old_password, &user.password_hash)
        .api_err("Failed to verify password")?
    {
        return Err(ApiError::bad_request("Invalid old password"));
    }
    validate_password(&req.new_password)?;
    if req.new_password == req.old_password {
        return Err(ApiError::bad_request(
            "New password must differ from the old one",
        ));
    }

    let hash = state
        .hasher
        .hash(&req.new_password)
        .api_err("Failed to hash password")?;
    state
        .store
        .set_password_hash(&user.id, &hash)
        .api_err("Failed to update password")?;

    Ok::<_, ApiError>(ApiResponse::ok(Value::Null, "Password changed successfully"))
}

async fn current_user(RequireUser(user): RequireUser) -> impl IntoResponse {
    ApiResponse::ok(user, "Current user fetched successfully")
}

async fn update_account(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateAccountRequest>,
) -> impl IntoResponse {
    if req.full_name.is_none() && req.email.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }
    if let Some(ref email) = req.email {
        validate_email(email)?;
    }

    let updated = state
        .store
        .update_account(
            &user.id,
            &AccountUpdate {
                full_name: req.full_name,
                email: req.email,
            },
        )
        .api_err("Failed to update account")?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(ApiResponse::ok(updated, "Account updated successfully"))
}

async fn update_avatar(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> impl IntoResponse {
    replace_user_image(&state, &user, multipart, "avatar").await
}

async fn update_cover_image(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> impl IntoResponse {
    replace_user_image(&state, &user, multipart, "coverImage").await
}

async fn replace_user_image(
    state: &AppState,
    user: &User,
    mut multipart: Multipart,
    field: &str,
) -> Result<ApiResponse<User>, ApiError> {
    let fields = collect_fields(&mut multipart).await?;
    let upload = fields
        .get(field)
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Field '{field}' is required")))?;

    let asset = state
        .media
        .store(&upload.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to store image").with_detail(e.to_string()))?;

    let (updated, previous) = if field == "avatar" {
        let previous = Some(user.avatar.clone());
        let updated = state
            .store
            .set_avatar(&user.id, &asset)
            .api_err("Failed to update avatar")?
            .or_not_found("User not found")?;
        (updated, previous)
    } else {
        let previous = user.cover_image.clone();
        let updated = state
            .store
            .set_cover_image(&user.id, &asset)
            .api_err("Failed to update cover image")?
            .or_not_found("User not found")?;
        (updated, previous)
    };

    if let Some(AssetRef { asset_id, .. }) = previous
        && let Err(e) = state.media.delete(&asset_id).await
    {
        tracing::warn!("Failed to delete replaced asset {}: {}", asset_id, e);
    }

    Ok(ApiResponse::ok(updated, "Image updated successfully"))
}

async fn channel_profile(
    Viewer(viewer): Viewer,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let channel = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to look up channel")?
        .or_not_found("Channel does not exist")?;
    let roots = state
        .store
        .find_docs("users", "id", &[json!(channel.id)])
        .api_err("Failed to look up channel")?;

    let viewer_id = viewer.map_or(Value::Null, |u| json!(u.id));

    let profiles = Pipeline::new()
        .expand("id", "subscriptions", "channelId", "subscriberRows", Pipeline::new())
        .count("subscriberRows", "subscribersCount")
        .flag("subscriberRows", "subscriberId", viewer_id, "isSubscribed")
        .expand("id", "subscriptions", "subscriberId", "subscribedRows", Pipeline::new())
        .count("subscribedRows", "channelsSubscribedToCount")
        .keep(&[
            "id",
            "username",
            "email",
            "fullName",
            "avatar",
            "coverImage",
            "subscribersCount",
            "channelsSubscribedToCount",
            "isSubscribed",
            "createdAt",
        ])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble channel profile")?;

    let profile = profiles
        .into_iter()
        .next()
        .or_not_found("Channel does not exist")?;

    Ok::<_, ApiError>(ApiResponse::ok(profile, "Channel fetched successfully"))
}

async fn watch_history(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let video_ids = state
        .store
        .watch_history(&user.id)
        .api_err("Failed to load watch history")?;

    let root = json!({ "watchHistory": video_ids });
    let composed = Pipeline::new()
        .expand(
            "watchHistory",
            "videos",
            "id",
            "watchHistory",
            Pipeline::new()
                .expand("ownerId", "users", "id", "owner", user_summary())
                .first("owner"),
        )
        .run(state.store.docs(), vec![root])
        .api_err("Failed to assemble watch history")?;

    let history = composed
        .into_iter()
        .next()
        .and_then(|mut v| v.get_mut("watchHistory").map(Value::take))
        .unwrap_or_else(|| Value::Array(Vec::new()));

    Ok::<_, ApiError>(ApiResponse::ok(history, "Watch history fetched successfully"))
}
