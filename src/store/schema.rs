use rusqlite::Connection;

use crate::error::Result;

/// Creates all tables and indexes if they do not exist.
///
/// Referential integrity between tables is enforced by the application,
/// not by SQL foreign keys: deletes cascade through explicit store calls
/// so that dangling references (for example a playlist entry whose video
/// was removed) degrade to null in read models instead of failing.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            refresh_token TEXT,
            avatar_url TEXT NOT NULL,
            avatar_asset_id TEXT NOT NULL,
            cover_image_url TEXT,
            cover_image_asset_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS watch_history (
            user_id TEXT NOT NULL,
            video_id TEXT NOT NULL,
            watched_at TEXT NOT NULL,
            PRIMARY KEY (user_id, video_id)
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            video_file_url TEXT NOT NULL,
            video_file_asset_id TEXT NOT NULL,
            thumbnail_url TEXT NOT NULL,
            thumbnail_asset_id TEXT NOT NULL,
            duration REAL NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_videos_owner ON videos (owner_id);

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            video_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments (video_id);

        CREATE TABLE IF NOT EXISTS likes (
            id TEXT PRIMARY KEY,
            target_kind TEXT NOT NULL CHECK (target_kind IN ('video', 'comment', 'tweet')),
            target_id TEXT NOT NULL,
            liked_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (target_kind, target_id, liked_by)
        );
        CREATE INDEX IF NOT EXISTS idx_likes_target ON likes (target_id);
        CREATE INDEX IF NOT EXISTS idx_likes_actor ON likes (liked_by);

        CREATE TABLE IF NOT EXISTS subscriptions (
            channel_id TEXT NOT NULL,
            subscriber_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (channel_id, subscriber_id)
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_subscriber ON subscriptions (subscriber_id);

        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_playlists_owner ON playlists (owner_id);

        CREATE TABLE IF NOT EXISTS playlist_videos (
            playlist_id TEXT NOT NULL,
            video_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (playlist_id, video_id)
        );

        CREATE TABLE IF NOT EXISTS tweets (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tweets_owner ON tweets (owner_id);
        "#,
    )?;
    Ok(())
}
