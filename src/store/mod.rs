mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::Result;
use crate::types::{
    AssetRef, ChannelStats, Comment, Like, LikeTargetKind, Playlist, Subscription, Tweet, User,
    Video,
};
use crate::views::DocumentSource;

/// Profile fields a user may change after registration.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Mutable video metadata. `None` leaves the current value in place.
#[derive(Debug, Clone, Default)]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<AssetRef>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Persistence boundary for the whole service.
///
/// One method per operation the handlers need; implementations are
/// responsible for their own locking. Every mutating method bumps
/// `updated_at` where the row carries one.
pub trait Store: DocumentSource + Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// The same store viewed as a pipeline document source.
    fn docs(&self) -> &dyn DocumentSource;

    // Users
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Lookup by username or email, whichever matches.
    fn get_user_by_login(&self, login: &str) -> Result<Option<User>>;
    fn user_exists(&self, username: &str, email: &str) -> Result<bool>;
    fn update_account(&self, id: &str, update: &AccountUpdate) -> Result<Option<User>>;
    fn set_avatar(&self, id: &str, avatar: &AssetRef) -> Result<Option<User>>;
    fn set_cover_image(&self, id: &str, cover: &AssetRef) -> Result<Option<User>>;
    fn set_password_hash(&self, id: &str, hash: &str) -> Result<()>;
    /// `None` clears the stored token (logout).
    fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<()>;

    // Watch history
    /// Records a watch; re-watching the same video refreshes its
    /// timestamp instead of duplicating the entry.
    fn add_watch_entry(&self, user_id: &str, video_id: &str) -> Result<()>;
    /// Video ids, most recently watched first.
    fn watch_history(&self, user_id: &str) -> Result<Vec<String>>;

    // Videos
    fn create_video(&self, video: &Video) -> Result<()>;
    fn get_video(&self, id: &str) -> Result<Option<Video>>;
    fn update_video(&self, id: &str, update: &VideoUpdate) -> Result<Option<Video>>;
    fn delete_video(&self, id: &str) -> Result<bool>;
    fn increment_views(&self, id: &str) -> Result<()>;

    // Comments
    fn create_comment(&self, comment: &Comment) -> Result<()>;
    fn get_comment(&self, id: &str) -> Result<Option<Comment>>;
    fn update_comment(&self, id: &str, content: &str) -> Result<Option<Comment>>;
    fn delete_comment(&self, id: &str) -> Result<bool>;
    /// Removes all comments on a video, returning the deleted ids so the
    /// caller can cascade their likes.
    fn delete_video_comments(&self, video_id: &str) -> Result<Vec<String>>;

    // Likes
    fn get_like(
        &self,
        kind: LikeTargetKind,
        target_id: &str,
        liked_by: &str,
    ) -> Result<Option<Like>>;
    fn create_like(&self, like: &Like) -> Result<()>;
    fn delete_like(&self, id: &str) -> Result<bool>;
    fn delete_target_likes(&self, kind: LikeTargetKind, target_id: &str) -> Result<()>;

    // Subscriptions
    fn get_subscription(&self, channel_id: &str, subscriber_id: &str)
    -> Result<Option<Subscription>>;
    fn create_subscription(&self, sub: &Subscription) -> Result<()>;
    fn delete_subscription(&self, channel_id: &str, subscriber_id: &str) -> Result<bool>;

    // Playlists
    fn create_playlist(&self, playlist: &Playlist) -> Result<()>;
    fn get_playlist(&self, id: &str) -> Result<Option<Playlist>>;
    fn update_playlist(&self, id: &str, update: &PlaylistUpdate) -> Result<Option<Playlist>>;
    fn delete_playlist(&self, id: &str) -> Result<bool>;
    /// Appends a video to the playlist; already-present videos are left
    /// where they are.
    fn add_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<()>;
    fn remove_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<()>;

    // Tweets
    fn create_tweet(&self, tweet: &Tweet) -> Result<()>;
    fn get_tweet(&self, id: &str) -> Result<Option<Tweet>>;
    fn update_tweet(&self, id: &str, content: &str) -> Result<Option<Tweet>>;
    fn delete_tweet(&self, id: &str) -> Result<bool>;

    // Dashboard
    fn channel_stats(&self, user_id: &str) -> Result<ChannelStats>;
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}
