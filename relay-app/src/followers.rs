//! Follower state store: one record per platform user, created on first
//! follow, refreshed on re-follow, stamped (never deleted) on unfollow.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_messaging::Profile;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct FollowerRecord {
    pub user_id: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub language: Option<String>,
    pub status_message: Option<String>,
    pub followed_at: DateTime<Utc>,
    pub unfollowed_at: Option<DateTime<Utc>>,
}

/// Read-modify-write contract the dispatcher depends on. Implementations must
/// provide per-key atomic upsert; the dispatcher performs no locking of its own.
#[async_trait]
pub trait FollowerStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<FollowerRecord>>;

    /// Create the record on first contact, refresh profile fields and
    /// `followed_at` on re-follow. A previous `unfollowed_at` stamp is left in
    /// place; history is retained.
    async fn upsert_follow(
        &self,
        user_id: &str,
        profile: &Profile,
        followed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Stamp `unfollowed_at`. Unfollowing a user without a record is an error;
    /// the record is never deleted.
    async fn mark_unfollowed(&self, user_id: &str, unfollowed_at: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteFollowerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFollowerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).with_context(|| {
            format!("open follower store at {}", path.as_ref().display())
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS follower (
                user_id        TEXT PRIMARY KEY,
                display_name   TEXT,
                picture_url    TEXT,
                language       TEXT,
                status_message TEXT,
                followed_at    TEXT NOT NULL,
                unfollowed_at  TEXT
            );",
        )
        .context("create follower schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Arc<Mutex<Connection>>) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; the connection itself
        // is still usable for independent statements.
        conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FollowerStore for SqliteFollowerStore {
    async fn get(&self, user_id: &str) -> Result<Option<FollowerRecord>> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let row = conn
                .query_row(
                    "SELECT user_id, display_name, picture_url, language, status_message,
                            followed_at, unfollowed_at
                     FROM follower WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, Option<String>>(6)?,
                        ))
                    },
                )
                .optional()?;

            let Some((
                user_id,
                display_name,
                picture_url,
                language,
                status_message,
                followed_at,
                unfollowed_at,
            )) = row
            else {
                return Ok(None);
            };

            Ok(Some(FollowerRecord {
                user_id,
                display_name,
                picture_url,
                language,
                status_message,
                followed_at: parse_timestamp(&followed_at)?,
                unfollowed_at: unfollowed_at.as_deref().map(parse_timestamp).transpose()?,
            }))
        })
        .await?
    }

    async fn upsert_follow(
        &self,
        user_id: &str,
        profile: &Profile,
        followed_at: DateTime<Utc>,
    ) -> Result<()> {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(anyhow!("follower upsert requires a user id"));
        }
        let conn = self.conn.clone();
        let profile = profile.clone();
        let followed_at = followed_at.to_rfc3339();
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            conn.execute(
                "INSERT INTO follower
                     (user_id, display_name, picture_url, language, status_message, followed_at, unfollowed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
                 ON CONFLICT(user_id) DO UPDATE SET
                     display_name   = excluded.display_name,
                     picture_url    = excluded.picture_url,
                     language       = excluded.language,
                     status_message = excluded.status_message,
                     followed_at    = excluded.followed_at",
                params![
                    user_id,
                    profile.display_name,
                    profile.picture_url,
                    profile.language,
                    profile.status_message,
                    followed_at,
                ],
            )
            .context("upsert follower")?;
            Ok(())
        })
        .await?
    }

    async fn mark_unfollowed(&self, user_id: &str, unfollowed_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        let unfollowed_at = unfollowed_at.to_rfc3339();
        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let updated = conn
                .execute(
                    "UPDATE follower SET unfollowed_at = ?1 WHERE user_id = ?2",
                    params![unfollowed_at, user_id],
                )
                .context("stamp unfollow")?;
            if updated == 0 {
                return Err(anyhow!("cannot record unfollow for unknown user {user_id}"));
            }
            Ok(())
        })
        .await?
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp {raw:?}"))?
        .with_timezone(&Utc))
}
