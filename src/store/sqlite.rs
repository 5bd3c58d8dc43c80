use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde_json::Value;

use super::{AccountUpdate, PlaylistUpdate, Store, VideoUpdate, format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::types::{
    AssetRef, ChannelStats, Comment, Like, LikeTargetKind, Playlist, Subscription, Tweet, User,
    Video,
};
use crate::views::{DocumentSource, doc};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn playlist_video_ids(conn: &Connection, playlist_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT video_id FROM playlist_videos WHERE playlist_id = ?1 ORDER BY position",
        )?;
        let ids = stmt
            .query_map(params![playlist_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, refresh_token, \
     avatar_url, avatar_asset_id, cover_image_url, cover_image_asset_id, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let cover_url: Option<String> = row.get(8)?;
    let cover_asset: Option<String> = row.get(9)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        password_hash: row.get(4)?,
        refresh_token: row.get(5)?,
        avatar: AssetRef {
            url: row.get(6)?,
            asset_id: row.get(7)?,
        },
        cover_image: match (cover_url, cover_asset) {
            (Some(url), Some(asset_id)) => Some(AssetRef { url, asset_id }),
            _ => None,
        },
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

const VIDEO_COLUMNS: &str = "id, owner_id, title, description, video_file_url, \
     video_file_asset_id, thumbnail_url, thumbnail_asset_id, duration, views, is_published, \
     created_at, updated_at";

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        video_file: AssetRef {
            url: row.get(4)?,
            asset_id: row.get(5)?,
        },
        thumbnail: AssetRef {
            url: row.get(6)?,
            asset_id: row.get(7)?,
        },
        duration: row.get(8)?,
        views: row.get(9)?,
        is_published: row.get(10)?,
        created_at: parse_datetime(&row.get::<_, String>(11)?),
        updated_at: parse_datetime(&row.get::<_, String>(12)?),
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        video_id: row.get(1)?,
        owner_id: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn like_from_row(row: &Row<'_>) -> rusqlite::Result<Like> {
    let kind: String = row.get(1)?;
    Ok(Like {
        id: row.get(0)?,
        target_kind: LikeTargetKind::parse(&kind).unwrap_or(LikeTargetKind::Video),
        target_id: row.get(2)?,
        liked_by: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn playlist_from_row(row: &Row<'_>) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        video_ids: Vec::new(),
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn tweet_from_row(row: &Row<'_>) -> rusqlite::Result<Tweet> {
    Ok(Tweet {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

/// Unique-index violations on inserts surface as [`Error::AlreadyExists`].
fn insert_err(e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(f, _) = &e
        && f.code == rusqlite::ErrorCode::ConstraintViolation
    {
        return Error::AlreadyExists;
    }
    Error::Database(e)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        super::schema::initialize(&self.conn())
    }

    fn docs(&self) -> &dyn DocumentSource {
        self
    }

    // Users

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                user.id,
                user.username,
                user.email,
                user.full_name,
                user.password_hash,
                user.refresh_token,
                user.avatar.url,
                user.avatar.asset_id,
                user.cover_image.as_ref().map(|c| c.url.as_str()),
                user.cover_image.as_ref().map(|c| c.asset_id.as_str()),
                format_datetime(user.created_at),
                format_datetime(user.updated_at),
            ],
        ).map_err(insert_err)?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?1"),
                params![login],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn update_account(&self, id: &str, update: &AccountUpdate) -> Result<Option<User>> {
        {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE users SET
                     full_name = COALESCE(?2, full_name),
                     email = COALESCE(?3, email),
                     updated_at = ?4
                 WHERE id = ?1",
                params![
                    id,
                    update.full_name,
                    update.email,
                    format_datetime(chrono::Utc::now()),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_user(id)
    }

    fn set_avatar(&self, id: &str, avatar: &AssetRef) -> Result<Option<User>> {
        self.conn().execute(
            "UPDATE users SET avatar_url = ?2, avatar_asset_id = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                avatar.url,
                avatar.asset_id,
                format_datetime(chrono::Utc::now())
            ],
        )?;
        self.get_user(id)
    }

    fn set_cover_image(&self, id: &str, cover: &AssetRef) -> Result<Option<User>> {
        self.conn().execute(
            "UPDATE users SET cover_image_url = ?2, cover_image_asset_id = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id,
                cover.url,
                cover.asset_id,
                format_datetime(chrono::Utc::now())
            ],
        )?;
        self.get_user(id)
    }

    fn set_password_hash(&self, id: &str, hash: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, hash, format_datetime(chrono::Utc::now())],
        )?;
        Ok(())
    }

    fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
            params![id, token],
        )?;
        Ok(())
    }

    // Watch history

    fn add_watch_entry(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO watch_history (user_id, video_id, watched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, video_id) DO UPDATE SET watched_at = excluded.watched_at",
            params![user_id, video_id, format_datetime(chrono::Utc::now())],
        )?;
        Ok(())
    }

    fn watch_history(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT video_id FROM watch_history WHERE user_id = ?1 ORDER BY watched_at DESC",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    // Videos

    fn create_video(&self, video: &Video) -> Result<()> {
        self.conn().execute(
            &format!("INSERT INTO videos ({VIDEO_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
            params![
                video.id,
                video.owner_id,
                video.title,
                video.description,
                video.video_file.url,
                video.video_file.asset_id,
                video.thumbnail.url,
                video.thumbnail.asset_id,
                video.duration,
                video.views,
                video.is_published,
                format_datetime(video.created_at),
                format_datetime(video.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_video(&self, id: &str) -> Result<Option<Video>> {
        self.conn()
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1"),
                params![id],
                video_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_video(&self, id: &str, update: &VideoUpdate) -> Result<Option<Video>> {
        {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE videos SET
                     title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     thumbnail_url = COALESCE(?4, thumbnail_url),
                     thumbnail_asset_id = COALESCE(?5, thumbnail_asset_id),
                     is_published = COALESCE(?6, is_published),
                     updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    update.title,
                    update.description,
                    update.thumbnail.as_ref().map(|t| t.url.as_str()),
                    update.thumbnail.as_ref().map(|t| t.asset_id.as_str()),
                    update.is_published,
                    format_datetime(chrono::Utc::now()),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_video(id)
    }

    fn delete_video(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM playlist_videos WHERE video_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM watch_history WHERE video_id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn increment_views(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE videos SET views = views + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // Comments

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO comments (id, video_id, owner_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id,
                comment.video_id,
                comment.owner_id,
                comment.content,
                format_datetime(comment.created_at),
                format_datetime(comment.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        self.conn()
            .query_row(
                "SELECT id, video_id, owner_id, content, created_at, updated_at
                 FROM comments WHERE id = ?1",
                params![id],
                comment_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_comment(&self, id: &str, content: &str) -> Result<Option<Comment>> {
        {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, format_datetime(chrono::Utc::now())],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_comment(id)
    }

    fn delete_comment(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn delete_video_comments(&self, video_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM comments WHERE video_id = ?1")?;
        let ids = stmt
            .query_map(params![video_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        drop(stmt);
        conn.execute("DELETE FROM comments WHERE video_id = ?1", params![video_id])?;
        Ok(ids)
    }

    // Likes

    fn get_like(
        &self,
        kind: LikeTargetKind,
        target_id: &str,
        liked_by: &str,
    ) -> Result<Option<Like>> {
        self.conn()
            .query_row(
                "SELECT id, target_kind, target_id, liked_by, created_at FROM likes
                 WHERE target_kind = ?1 AND target_id = ?2 AND liked_by = ?3",
                params![kind.as_str(), target_id, liked_by],
                like_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn create_like(&self, like: &Like) -> Result<()> {
        self.conn().execute(
            "INSERT INTO likes (id, target_kind, target_id, liked_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                like.id,
                like.target_kind.as_str(),
                like.target_id,
                like.liked_by,
                format_datetime(like.created_at),
            ],
        ).map_err(insert_err)?;
        Ok(())
    }

    fn delete_like(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM likes WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn delete_target_likes(&self, kind: LikeTargetKind, target_id: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM likes WHERE target_kind = ?1 AND target_id = ?2",
            params![kind.as_str(), target_id],
        )?;
        Ok(())
    }

    // Subscriptions

    fn get_subscription(
        &self,
        channel_id: &str,
        subscriber_id: &str,
    ) -> Result<Option<Subscription>> {
        self.conn()
            .query_row(
                "SELECT channel_id, subscriber_id, created_at FROM subscriptions
                 WHERE channel_id = ?1 AND subscriber_id = ?2",
                params![channel_id, subscriber_id],
                |row| {
                    Ok(Subscription {
                        channel_id: row.get(0)?,
                        subscriber_id: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn create_subscription(&self, sub: &Subscription) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO subscriptions (channel_id, subscriber_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                sub.channel_id,
                sub.subscriber_id,
                format_datetime(sub.created_at)
            ],
        )?;
        Ok(())
    }

    fn delete_subscription(&self, channel_id: &str, subscriber_id: &str) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM subscriptions WHERE channel_id = ?1 AND subscriber_id = ?2",
            params![channel_id, subscriber_id],
        )?;
        Ok(deleted > 0)
    }

    // Playlists

    fn create_playlist(&self, playlist: &Playlist) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO playlists (id, owner_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                playlist.id,
                playlist.owner_id,
                playlist.name,
                playlist.description,
                format_datetime(playlist.created_at),
                format_datetime(playlist.updated_at),
            ],
        )?;
        for (position, video_id) in playlist.video_ids.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO playlist_videos (playlist_id, video_id, position)
                 VALUES (?1, ?2, ?3)",
                params![playlist.id, video_id, position as i64],
            )?;
        }
        Ok(())
    }

    fn get_playlist(&self, id: &str) -> Result<Option<Playlist>> {
        let conn = self.conn();
        let playlist = conn
            .query_row(
                "SELECT id, owner_id, name, description, created_at, updated_at
                 FROM playlists WHERE id = ?1",
                params![id],
                playlist_from_row,
            )
            .optional()?;
        match playlist {
            Some(mut p) => {
                p.video_ids = Self::playlist_video_ids(&conn, id)?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    fn update_playlist(&self, id: &str, update: &PlaylistUpdate) -> Result<Option<Playlist>> {
        {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE playlists SET
                     name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     updated_at = ?4
                 WHERE id = ?1",
                params![
                    id,
                    update.name,
                    update.description,
                    format_datetime(chrono::Utc::now()),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_playlist(id)
    }

    fn delete_playlist(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM playlists WHERE id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM playlist_videos WHERE playlist_id = ?1",
            params![id],
        )?;
        Ok(deleted > 0)
    }

    fn add_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO playlist_videos (playlist_id, video_id, position)
             SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0) FROM playlist_videos
             WHERE playlist_id = ?1",
            params![playlist_id, video_id],
        )?;
        Ok(())
    }

    fn remove_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2",
            params![playlist_id, video_id],
        )?;
        Ok(())
    }

    // Tweets

    fn create_tweet(&self, tweet: &Tweet) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tweets (id, owner_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tweet.id,
                tweet.owner_id,
                tweet.content,
                format_datetime(tweet.created_at),
                format_datetime(tweet.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_tweet(&self, id: &str) -> Result<Option<Tweet>> {
        self.conn()
            .query_row(
                "SELECT id, owner_id, content, created_at, updated_at FROM tweets WHERE id = ?1",
                params![id],
                tweet_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_tweet(&self, id: &str, content: &str) -> Result<Option<Tweet>> {
        {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE tweets SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, format_datetime(chrono::Utc::now())],
            )?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_tweet(id)
    }

    fn delete_tweet(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM tweets WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // Dashboard

    fn channel_stats(&self, user_id: &str) -> Result<ChannelStats> {
        let conn = self.conn();
        let total_subscribers: i64 = conn.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let (total_videos, total_views): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(views), 0) FROM videos WHERE owner_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_likes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes l
             JOIN videos v ON v.id = l.target_id AND l.target_kind = 'video'
             WHERE v.owner_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(ChannelStats {
            total_subscribers,
            total_videos,
            total_views,
            total_likes,
        })
    }
}

/// Maps a queryable document field to its backing column. Pipelines may
/// only join on fields listed here, which keeps every expansion on an
/// indexed or key column.
fn doc_field_column(collection: &str, field: &str) -> Result<&'static str> {
    let column = match collection {
        "users" => match field {
            "id" => "id",
            "username" => "username",
            _ => return unindexed(collection, field),
        },
        "videos" => match field {
            "id" => "id",
            "ownerId" => "owner_id",
            "isPublished" => "is_published",
            _ => return unindexed(collection, field),
        },
        "comments" => match field {
            "id" => "id",
            "videoId" => "video_id",
            "ownerId" => "owner_id",
            _ => return unindexed(collection, field),
        },
        "likes" => match field {
            "id" => "id",
            "targetId" => "target_id",
            "likedBy" => "liked_by",
            "targetKind" => "target_kind",
            _ => return unindexed(collection, field),
        },
        "subscriptions" => match field {
            "channelId" => "channel_id",
            "subscriberId" => "subscriber_id",
            _ => return unindexed(collection, field),
        },
        "playlists" => match field {
            "id" => "id",
            "ownerId" => "owner_id",
            _ => return unindexed(collection, field),
        },
        "tweets" => match field {
            "id" => "id",
            "ownerId" => "owner_id",
            _ => return unindexed(collection, field),
        },
        _ => return Err(Error::UnknownCollection(collection.to_string())),
    };
    Ok(column)
}

fn unindexed(collection: &str, field: &str) -> Result<&'static str> {
    Err(Error::UnindexedField {
        collection: collection.to_string(),
        field: field.to_string(),
    })
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(rusqlite::types::Value::Integer)
            .or_else(|| n.as_f64().map(rusqlite::types::Value::Real))
            .unwrap_or(rusqlite::types::Value::Null),
        _ => rusqlite::types::Value::Null,
    }
}

impl DocumentSource for SqliteStore {
    fn find_docs(&self, collection: &str, field: &str, values: &[Value]) -> Result<Vec<Value>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let column = doc_field_column(collection, field)?;
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql_values = values.iter().map(to_sql_value);

        let conn = self.conn();
        let docs = match collection {
            "users" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE {column} IN ({placeholders})"
                ))?;
                stmt.query_map(params_from_iter(sql_values), user_from_row)?
                    .map(|r| r.map(|u| doc(&u)))
                    .collect::<rusqlite::Result<Vec<Value>>>()?
            }
            "videos" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VIDEO_COLUMNS} FROM videos WHERE {column} IN ({placeholders})"
                ))?;
                stmt.query_map(params_from_iter(sql_values), video_from_row)?
                    .map(|r| r.map(|v| doc(&v)))
                    .collect::<rusqlite::Result<Vec<Value>>>()?
            }
            "comments" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, video_id, owner_id, content, created_at, updated_at
                     FROM comments WHERE {column} IN ({placeholders})"
                ))?;
                stmt.query_map(params_from_iter(sql_values), comment_from_row)?
                    .map(|r| r.map(|c| doc(&c)))
                    .collect::<rusqlite::Result<Vec<Value>>>()?
            }
            "likes" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, target_kind, target_id, liked_by, created_at
                     FROM likes WHERE {column} IN ({placeholders})"
                ))?;
                stmt.query_map(params_from_iter(sql_values), like_from_row)?
                    .map(|r| r.map(|l| doc(&l)))
                    .collect::<rusqlite::Result<Vec<Value>>>()?
            }
            "subscriptions" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT channel_id, subscriber_id, created_at
                     FROM subscriptions WHERE {column} IN ({placeholders})"
                ))?;
                stmt.query_map(params_from_iter(sql_values), |row| {
                    Ok(Subscription {
                        channel_id: row.get(0)?,
                        subscriber_id: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                })?
                .map(|r| r.map(|s| doc(&s)))
                .collect::<rusqlite::Result<Vec<Value>>>()?
            }
            "playlists" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, owner_id, name, description, created_at, updated_at
                     FROM playlists WHERE {column} IN ({placeholders})"
                ))?;
                let playlists = stmt
                    .query_map(params_from_iter(sql_values), playlist_from_row)?
                    .collect::<rusqlite::Result<Vec<Playlist>>>()?;
                drop(stmt);
                let mut docs = Vec::with_capacity(playlists.len());
                for mut playlist in playlists {
                    playlist.video_ids = Self::playlist_video_ids(&conn, &playlist.id)?;
                    docs.push(doc(&playlist));
                }
                docs
            }
            "tweets" => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, owner_id, content, created_at, updated_at
                     FROM tweets WHERE {column} IN ({placeholders})"
                ))?;
                stmt.query_map(params_from_iter(sql_values), tweet_from_row)?
                    .map(|r| r.map(|t| doc(&t)))
                    .collect::<rusqlite::Result<Vec<Value>>>()?
            }
            _ => return Err(Error::UnknownCollection(collection.to_string())),
        };
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    fn sample_user(id: &str, username: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            full_name: username.to_uppercase(),
            password_hash: "hash".to_string(),
            refresh_token: None,
            avatar: AssetRef {
                url: format!("/media/{username}-avatar"),
                asset_id: format!("{username}-avatar"),
            },
            cover_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_video(id: &str, owner_id: &str, title: &str) -> Video {
        let now = Utc::now();
        Video {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: String::new(),
            video_file: AssetRef {
                url: format!("/media/{id}-file"),
                asset_id: format!("{id}-file"),
            },
            thumbnail: AssetRef {
                url: format!("/media/{id}-thumb"),
                asset_id: format!("{id}-thumb"),
            },
            duration: 12.5,
            views: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn user_round_trip_and_lookup() {
        let (_dir, store) = test_store();
        store.create_user(&sample_user("u1", "alice")).unwrap();

        let by_id = store.get_user("u1").unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert!(by_id.cover_image.is_none());

        let by_email = store
            .get_user_by_login("alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, "u1");

        assert!(store.user_exists("alice", "other@example.com").unwrap());
        assert!(!store.user_exists("bob", "bob@example.com").unwrap());
    }

    #[test]
    fn duplicate_username_insert_reports_already_exists() {
        let (_dir, store) = test_store();
        store.create_user(&sample_user("u1", "alice")).unwrap();

        let result = store.create_user(&sample_user("u2", "alice"));
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[test]
    fn account_update_leaves_unset_fields() {
        let (_dir, store) = test_store();
        store.create_user(&sample_user("u1", "alice")).unwrap();

        let updated = store
            .update_account(
                "u1",
                &AccountUpdate {
                    full_name: Some("Alice Liddell".to_string()),
                    email: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.email, "alice@example.com");

        assert!(
            store
                .update_account(
                    "missing",
                    &AccountUpdate {
                        full_name: None,
                        email: None
                    }
                )
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn refresh_token_set_and_clear() {
        let (_dir, store) = test_store();
        store.create_user(&sample_user("u1", "alice")).unwrap();

        store.set_refresh_token("u1", Some("tok")).unwrap();
        assert_eq!(
            store.get_user("u1").unwrap().unwrap().refresh_token,
            Some("tok".to_string())
        );

        store.set_refresh_token("u1", None).unwrap();
        assert!(store.get_user("u1").unwrap().unwrap().refresh_token.is_none());
    }

    #[test]
    fn watch_history_dedupes_and_orders() {
        let (_dir, store) = test_store();
        store.add_watch_entry("u1", "v1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_watch_entry("u1", "v2").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_watch_entry("u1", "v1").unwrap();

        let history = store.watch_history("u1").unwrap();
        assert_eq!(history, vec!["v1".to_string(), "v2".to_string()]);
    }

    #[test]
    fn video_update_and_views() {
        let (_dir, store) = test_store();
        store.create_video(&sample_video("v1", "u1", "first")).unwrap();

        store.increment_views("v1").unwrap();
        store.increment_views("v1").unwrap();

        let updated = store
            .update_video(
                "v1",
                &VideoUpdate {
                    title: Some("renamed".to_string()),
                    is_published: Some(false),
                    ..VideoUpdate::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.views, 2);
        assert!(!updated.is_published);
    }

    #[test]
    fn deleting_video_clears_playlist_and_history_rows() {
        let (_dir, store) = test_store();
        store.create_video(&sample_video("v1", "u1", "first")).unwrap();
        store
            .create_playlist(&Playlist {
                id: "p1".to_string(),
                owner_id: "u1".to_string(),
                name: "mix".to_string(),
                description: String::new(),
                video_ids: vec!["v1".to_string()],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        store.add_watch_entry("u1", "v1").unwrap();

        assert!(store.delete_video("v1").unwrap());
        assert!(store.get_playlist("p1").unwrap().unwrap().video_ids.is_empty());
        assert!(store.watch_history("u1").unwrap().is_empty());
        assert!(!store.delete_video("v1").unwrap());
    }

    #[test]
    fn comment_cascade_returns_deleted_ids() {
        let (_dir, store) = test_store();
        let now = Utc::now();
        for id in ["c1", "c2"] {
            store
                .create_comment(&Comment {
                    id: id.to_string(),
                    video_id: "v1".to_string(),
                    owner_id: "u1".to_string(),
                    content: "hi".to_string(),
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        }

        let mut deleted = store.delete_video_comments("v1").unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["c1".to_string(), "c2".to_string()]);
        assert!(store.get_comment("c1").unwrap().is_none());
    }

    #[test]
    fn like_lookup_by_identity() {
        let (_dir, store) = test_store();
        store
            .create_like(&Like {
                id: "l1".to_string(),
                target_kind: LikeTargetKind::Comment,
                target_id: "c1".to_string(),
                liked_by: "u1".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        assert!(
            store
                .get_like(LikeTargetKind::Comment, "c1", "u1")
                .unwrap()
                .is_some()
        );
        // Same target id under a different kind is a different like.
        assert!(
            store
                .get_like(LikeTargetKind::Video, "c1", "u1")
                .unwrap()
                .is_none()
        );

        store.delete_target_likes(LikeTargetKind::Comment, "c1").unwrap();
        assert!(
            store
                .get_like(LikeTargetKind::Comment, "c1", "u1")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn playlist_membership_is_idempotent_and_ordered() {
        let (_dir, store) = test_store();
        store
            .create_playlist(&Playlist {
                id: "p1".to_string(),
                owner_id: "u1".to_string(),
                name: "mix".to_string(),
                description: String::new(),
                video_ids: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();

        store.add_playlist_video("p1", "v1").unwrap();
        store.add_playlist_video("p1", "v2").unwrap();
        store.add_playlist_video("p1", "v1").unwrap();

        let playlist = store.get_playlist("p1").unwrap().unwrap();
        assert_eq!(playlist.video_ids, vec!["v1".to_string(), "v2".to_string()]);

        store.remove_playlist_video("p1", "v1").unwrap();
        assert_eq!(
            store.get_playlist("p1").unwrap().unwrap().video_ids,
            vec!["v2".to_string()]
        );
    }

    #[test]
    fn channel_stats_aggregates() {
        let (_dir, store) = test_store();
        let mut v1 = sample_video("v1", "u1", "first");
        v1.views = 7;
        let mut v2 = sample_video("v2", "u1", "second");
        v2.views = 3;
        store.create_video(&v1).unwrap();
        store.create_video(&v2).unwrap();
        store
            .create_subscription(&Subscription {
                channel_id: "u1".to_string(),
                subscriber_id: "u2".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .create_like(&Like {
                id: "l1".to_string(),
                target_kind: LikeTargetKind::Video,
                target_id: "v1".to_string(),
                liked_by: "u2".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        // Tweet likes never count toward channel stats.
        store
            .create_like(&Like {
                id: "l2".to_string(),
                target_kind: LikeTargetKind::Tweet,
                target_id: "v1".to_string(),
                liked_by: "u2".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        let stats = store.channel_stats("u1").unwrap();
        assert_eq!(stats.total_subscribers, 1);
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.total_views, 10);
        assert_eq!(stats.total_likes, 1);
    }

    #[test]
    fn find_docs_respects_field_allowlist() {
        let (_dir, store) = test_store();
        store.create_video(&sample_video("v1", "u1", "first")).unwrap();

        let docs = store
            .find_docs("videos", "ownerId", &[json!("u1")])
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], "v1");
        assert_eq!(docs[0]["isPublished"], true);
        assert!(docs[0].get("owner_id").is_none());

        assert!(matches!(
            store.find_docs("videos", "title", &[json!("first")]),
            Err(Error::UnindexedField { .. })
        ));
        assert!(matches!(
            store.find_docs("channels", "id", &[json!("u1")]),
            Err(Error::UnknownCollection(_))
        ));
    }

    #[test]
    fn user_docs_never_carry_secrets() {
        let (_dir, store) = test_store();
        let mut user = sample_user("u1", "alice");
        user.refresh_token = Some("tok".to_string());
        store.create_user(&user).unwrap();

        let docs = store.find_docs("users", "id", &[json!("u1")]).unwrap();
        assert!(docs[0].get("passwordHash").is_none());
        assert!(docs[0].get("password_hash").is_none());
        assert!(docs[0].get("refreshToken").is_none());
    }
}
