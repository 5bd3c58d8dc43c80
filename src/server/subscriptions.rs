use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};

use crate::auth::{RequireUser, Viewer};
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::Subscription;
use crate::views::Pipeline;

pub fn subscriptions_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/channel/{channel_id}/toggle", post(toggle_subscription))
        .route("/channel/{channel_id}/subscribers", get(channel_subscribers))
        .route("/user/{subscriber_id}/channels", get(subscribed_channels))
}

async fn toggle_subscription(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_user(&channel_id)
        .api_err("Failed to look up channel")?
        .or_not_found("Channel does not exist")?;

    let subscribed = if state
        .store
        .get_subscription(&channel_id, &user.id)
        .api_err("Failed to look up subscription")?
        .is_some()
    {
        state
            .store
            .delete_subscription(&channel_id, &user.id)
            .api_err("Failed to unsubscribe")?;
        false
    } else {
        state
            .store
            .create_subscription(&Subscription {
                channel_id,
                subscriber_id: user.id,
                created_at: Utc::now(),
            })
            .api_err("Failed to subscribe")?;
        true
    };

    Ok::<_, ApiError>(ApiResponse::ok(
        json!({ "subscribed": subscribed }),
        if subscribed {
            "Subscribed successfully"
        } else {
            "Unsubscribed successfully"
        },
    ))
}

async fn channel_subscribers(
    Viewer(viewer): Viewer,
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_user(&channel_id)
        .api_err("Failed to look up channel")?
        .or_not_found("Channel does not exist")?;

    let viewer_id = viewer.map_or(Value::Null, |u| json!(u.id));
    let roots = state
        .store
        .find_docs("subscriptions", "channelId", &[json!(channel_id)])
        .api_err("Failed to list subscribers")?;

    // Each subscriber carries their own audience size and whether the
    // viewer already subscribes to them.
    let subscribers = Pipeline::new()
        .sort_desc("createdAt")
        .expand(
            "subscriberId",
            "users",
            "id",
            "subscriber",
            Pipeline::new()
                .expand("id", "subscriptions", "channelId", "subscriberRows", Pipeline::new())
                .flag("subscriberRows", "subscriberId", viewer_id, "subscribedToSubscriber")
                .count("subscriberRows", "totalSubscribersOfSubscriber")
                .keep(&[
                    "id",
                    "username",
                    "email",
                    "fullName",
                    "avatar",
                    "subscribedToSubscriber",
                    "totalSubscribersOfSubscriber",
                ]),
        )
        .first("subscriber")
        .keep(&["subscriber", "createdAt"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble subscribers")?;

    Ok::<_, ApiError>(ApiResponse::ok(
        subscribers,
        "Subscribers fetched successfully",
    ))
}

async fn subscribed_channels(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<String>,
) -> impl IntoResponse {
    state
        .store
        .get_user(&subscriber_id)
        .api_err("Failed to look up user")?
        .or_not_found("User does not exist")?;

    let roots = state
        .store
        .find_docs("subscriptions", "subscriberId", &[json!(subscriber_id)])
        .api_err("Failed to list subscriptions")?;

    // Each channel carries its latest published upload.
    let channels = Pipeline::new()
        .sort_desc("createdAt")
        .expand(
            "channelId",
            "users",
            "id",
            "channel",
            Pipeline::new()
                .expand(
                    "id",
                    "videos",
                    "ownerId",
                    "latestVideo",
                    Pipeline::new()
                        .select("isPublished", true)
                        .sort_desc("createdAt"),
                )
                .first("latestVideo")
                .keep(&["id", "username", "fullName", "avatar", "latestVideo"]),
        )
        .first("channel")
        .keep(&["channel", "createdAt"])
        .run(state.store.docs(), roots)
        .api_err("Failed to assemble channels")?;

    Ok::<_, ApiError>(ApiResponse::ok(
        channels,
        "Subscribed channels fetched successfully",
    ))
}
