//! SQLite store implementation

use async_trait::async_trait;
use profile_digest_domain::{
    Category, Classification, InsertOutcome, JobRun, NewNotification, NewPost, NewProfile,
    Notification, NotificationId, Post, Profile, ProfileId, ProfileKind, RunState, Store,
    StoreError, User, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn format_ts(ts: OffsetDateTime) -> Result<String, StoreError> {
    ts.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn format_opt_ts(ts: Option<OffsetDateTime>) -> Result<Option<String>, StoreError> {
    ts.map(format_ts).transpose()
}

fn parse_ts(value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<OffsetDateTime>, StoreError> {
    value.as_deref().map(parse_ts).transpose()
}

fn epoch_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_opt_uuid(value: Option<String>) -> Result<Option<Uuid>, StoreError> {
    value.as_deref().map(parse_uuid).transpose()
}

const PROFILE_COLUMNS: &str =
    "id, user_id, name, source_url, kind, automation_job_id, created_at";

const POST_COLUMNS: &str = "id, profile_id, text, url, fingerprint, published_at, summary, \
     category, suggested_reply, run_id, created_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, body, kind, is_read, run_id, created_at";

fn profile_from_row(row: &SqliteRow) -> Result<Profile, StoreError> {
    let kind: String = row.try_get("kind").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;

    Ok(Profile {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        source_url: row.try_get("source_url").map_err(db_err)?,
        kind: ProfileKind::parse(&kind)
            .ok_or_else(|| StoreError::Serialization(format!("Unknown profile kind: {}", kind)))?,
        automation_job_id: row.try_get("automation_job_id").map_err(db_err)?,
        created_at: parse_ts(&created_at)?,
    })
}

fn post_from_row(row: &SqliteRow) -> Result<Post, StoreError> {
    let category: String = row.try_get("category").map_err(db_err)?;
    let published_at: Option<String> = row.try_get("published_at").map_err(db_err)?;
    let run_id: Option<String> = row.try_get("run_id").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;

    Ok(Post {
        id: row.try_get("id").map_err(db_err)?,
        profile_id: row.try_get("profile_id").map_err(db_err)?,
        text: row.try_get("text").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        fingerprint: row.try_get("fingerprint").map_err(db_err)?,
        published_at: parse_opt_ts(published_at)?,
        classification: Classification {
            summary: row.try_get("summary").map_err(db_err)?,
            category: Category::from_label(&category),
            suggested_reply: row.try_get("suggested_reply").map_err(db_err)?,
        },
        run_id: parse_opt_uuid(run_id)?,
        created_at: parse_ts(&created_at)?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StoreError> {
    let run_id: Option<String> = row.try_get("run_id").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;

    Ok(Notification {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        body: row.try_get("body").map_err(db_err)?,
        kind: row.try_get("kind").map_err(db_err)?,
        is_read: row.try_get("is_read").map_err(db_err)?,
        run_id: parse_opt_uuid(run_id)?,
        created_at: parse_ts(&created_at)?,
    })
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                source_url TEXT NOT NULL,
                kind TEXT NOT NULL,
                automation_job_id TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, source_url)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                url TEXT,
                fingerprint TEXT NOT NULL,
                published_at TEXT,
                summary TEXT NOT NULL,
                category TEXT NOT NULL,
                suggested_reply TEXT NOT NULL,
                run_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            // Empty URLs never participate in URL uniqueness
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_profile_url
            ON posts(profile_id, url) WHERE url IS NOT NULL AND url != ''
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_profile_fingerprint
            ON posts(profile_id, fingerprint)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_run ON posts(run_id)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                run_id TEXT UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS job_runs (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                state TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                error TEXT
            )
            "#,
            // Expiry is stored as epoch milliseconds so leases compare numerically
            r#"
            CREATE TABLE IF NOT EXISTS run_leases (
                user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                run_id TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }

        Ok(())
    }

    async fn fetch_post(&self, post_id: i64) -> Result<Post, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("post {}", post_id)))?;
        post_from_row(&row)
    }

    async fn notification_where(
        &self,
        clause: &str,
        id: Option<i64>,
        run_id: Option<&str>,
    ) -> Result<Option<Notification>, StoreError> {
        let sql = format!("SELECT {} FROM notifications WHERE {}", NOTIFICATION_COLUMNS, clause);
        let query = match (id, run_id) {
            (Some(id), _) => sqlx::query(&sql).bind(id),
            (None, run_id) => sqlx::query(&sql).bind(run_id),
        };
        let row = query.fetch_optional(&self.pool).await.map_err(db_err)?;

        row.as_ref().map(notification_from_row).transpose()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_or_create_user(&self, username: &str) -> Result<User, StoreError> {
        let created_at = format_ts(OffsetDateTime::now_utc())?;

        sqlx::query(
            "INSERT INTO users (username, created_at) VALUES (?, ?) ON CONFLICT(username) DO NOTHING",
        )
        .bind(username)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let (id, username, created_at): (i64, String, String) =
            sqlx::query_as("SELECT id, username, created_at FROM users WHERE username = ?")
                .bind(username)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(User {
            id,
            username,
            created_at: parse_ts(&created_at)?,
        })
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, username, created_at FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.into_iter()
            .map(|(id, username, created_at)| {
                Ok(User {
                    id,
                    username,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }

    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let created_at = format_ts(OffsetDateTime::now_utc())?;

        let result = sqlx::query(
            r#"
            INSERT INTO profiles (user_id, name, source_url, kind, automation_job_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.name)
        .bind(&profile.source_url)
        .bind(profile.kind.as_str())
        .bind(&profile.automation_job_id)
        .bind(&created_at)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(format!(
                    "profile {} is already tracked",
                    profile.source_url
                )));
            }
            Err(e) => return Err(db_err(e)),
        };

        let row = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        profile_from_row(&row)
    }

    async fn list_profiles(&self, user_id: UserId) -> Result<Vec<Profile>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE user_id = ? ORDER BY id",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn delete_profile(
        &self,
        user_id: UserId,
        profile_id: ProfileId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = ? AND user_id = ?")
            .bind(profile_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_post_by_url(
        &self,
        profile_id: ProfileId,
        url: &str,
    ) -> Result<Option<Post>, StoreError> {
        if url.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE profile_id = ? AND url = ? LIMIT 1",
            POST_COLUMNS
        ))
        .bind(profile_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn find_post_by_fingerprint(
        &self,
        profile_id: ProfileId,
        fingerprint: &str,
    ) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE profile_id = ? AND fingerprint = ? LIMIT 1",
            POST_COLUMNS
        ))
        .bind(profile_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError> {
        let published_at = format_opt_ts(post.published_at)?;
        let created_at = format_ts(post.created_at)?;
        let url = post.url.as_deref().filter(|u| !u.is_empty());

        let result = sqlx::query(
            r#"
            INSERT INTO posts
            (profile_id, text, url, fingerprint, published_at, summary, category,
             suggested_reply, run_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(post.profile_id)
        .bind(&post.text)
        .bind(url)
        .bind(&post.fingerprint)
        .bind(&published_at)
        .bind(&post.classification.summary)
        .bind(post.classification.category.as_str())
        .bind(&post.classification.suggested_reply)
        .bind(post.run_id.map(|id| id.to_string()))
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::AlreadyStored);
        }

        let stored = self.fetch_post(result.last_insert_rowid()).await?;
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn list_posts_for_run(&self, run_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE run_id = ? ORDER BY id",
            POST_COLUMNS
        ))
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(post_from_row).collect()
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, StoreError> {
        let created_at = format_ts(notification.created_at)?;
        let run_id = notification.run_id.map(|id| id.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, body, kind, is_read, run_id, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(run_id) DO NOTHING
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.kind)
        .bind(&run_id)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let existing = if result.rows_affected() == 0 {
            match &run_id {
                Some(run_id) => {
                    self.notification_where("run_id = ?", None, Some(run_id))
                        .await?
                }
                None => None,
            }
        } else {
            self.notification_where("id = ?", Some(result.last_insert_rowid()), None)
                .await?
        };

        existing.ok_or_else(|| StoreError::NotFound("notification after insert".to_string()))
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_notifications_read(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, StoreError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(count.0.max(0) as u64)
    }

    async fn get_setting(&self, user_id: UserId, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM settings WHERE user_id = ? AND key = ?")
                .bind(user_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(row.map(|(value,)| value))
    }

    async fn set_setting(&self, user_id: UserId, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (user_id, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn begin_run(&self, run: &JobRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_runs (id, user_id, state, started_at, finished_at, error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.user_id)
        .bind(run.state.as_str())
        .bind(format_ts(run.started_at)?)
        .bind(format_opt_ts(run.finished_at)?)
        .bind(&run.error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        state: RunState,
        finished_at: OffsetDateTime,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE job_runs SET state = ?, finished_at = ?, error = ? WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(format_ts(finished_at)?)
        .bind(error)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job run {}", run_id)));
        }
        Ok(())
    }

    async fn list_running_runs(&self) -> Result<Vec<JobRun>, StoreError> {
        let rows: Vec<(String, i64, String, String, Option<String>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT id, user_id, state, started_at, finished_at, error
                FROM job_runs
                WHERE state = ?
                ORDER BY started_at, rowid
                "#,
            )
            .bind(RunState::Running.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(id, user_id, state, started_at, finished_at, error)| {
                Ok(JobRun {
                    id: parse_uuid(&id)?,
                    user_id,
                    state: RunState::parse(&state).ok_or_else(|| {
                        StoreError::Serialization(format!("Unknown run state: {}", state))
                    })?,
                    started_at: parse_ts(&started_at)?,
                    finished_at: parse_opt_ts(finished_at)?,
                    error,
                })
            })
            .collect()
    }

    async fn acquire_run_lease(
        &self,
        user_id: UserId,
        run_id: Uuid,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO run_leases (user_id, run_id, expires_at_ms) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE
                SET run_id = excluded.run_id, expires_at_ms = excluded.expires_at_ms
                WHERE run_leases.expires_at_ms < ?
            "#,
        )
        .bind(user_id)
        .bind(run_id.to_string())
        .bind(epoch_millis(expires_at))
        .bind(epoch_millis(now))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn renew_run_lease(
        &self,
        user_id: UserId,
        run_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE run_leases SET expires_at_ms = ? WHERE user_id = ? AND run_id = ?",
        )
        .bind(epoch_millis(expires_at))
        .bind(user_id)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_run_lease(&self, user_id: UserId, run_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM run_leases WHERE user_id = ? AND run_id = ?")
            .bind(user_id)
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile_digest_domain::{compute_fingerprint, setting_keys};

    async fn store_with_profile() -> (SqliteStore, Profile) {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();
        let profile = store
            .create_profile(&NewProfile {
                user_id: user.id,
                name: "Acme".to_string(),
                source_url: "https://www.linkedin.com/company/acme".to_string(),
                kind: ProfileKind::Company,
                automation_job_id: None,
            })
            .await
            .unwrap();
        (store, profile)
    }

    fn new_post(profile_id: ProfileId, text: &str, url: Option<&str>) -> NewPost {
        NewPost {
            profile_id,
            text: text.to_string(),
            url: url.map(String::from),
            fingerprint: compute_fingerprint(profile_id, text),
            published_at: Some(OffsetDateTime::now_utc()),
            classification: Classification {
                summary: "Acme raised money".to_string(),
                category: Category::Funding,
                suggested_reply: "Congrats!".to_string(),
            },
            run_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn notification(user_id: UserId, title: &str, run_id: Option<Uuid>) -> NewNotification {
        NewNotification {
            user_id,
            title: title.to_string(),
            body: "body".to_string(),
            kind: NewNotification::KIND_DIGEST.to_string(),
            run_id,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_find_or_create_user_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();

        let first = store.find_or_create_user("alice").await.unwrap();
        let second = store.find_or_create_user("alice").await.unwrap();
        store.find_or_create_user("bob").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_profile_url_conflicts() {
        let (store, profile) = store_with_profile().await;

        let err = store
            .create_profile(&NewProfile {
                user_id: profile.user_id,
                name: "Acme again".to_string(),
                source_url: profile.source_url.clone(),
                kind: ProfileKind::Company,
                automation_job_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_post_roundtrip_and_lookups() {
        let (store, profile) = store_with_profile().await;
        let run_id = Uuid::new_v4();
        let mut post = new_post(profile.id, "We raised $10M", Some("https://x/1"));
        post.run_id = Some(run_id);

        let InsertOutcome::Inserted(stored) = store.insert_post(&post).await.unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(stored.classification.category, Category::Funding);
        assert_eq!(stored.run_id, Some(run_id));

        let by_url = store.find_post_by_url(profile.id, "https://x/1").await.unwrap();
        assert_eq!(by_url.unwrap().id, stored.id);

        let by_fp = store
            .find_post_by_fingerprint(profile.id, &post.fingerprint)
            .await
            .unwrap();
        assert_eq!(by_fp.unwrap().id, stored.id);

        assert_eq!(store.list_posts_for_run(run_id).await.unwrap().len(), 1);
        assert!(store.find_post_by_url(profile.id, "").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_indexes_report_already_stored() {
        let (store, profile) = store_with_profile().await;

        let first = new_post(profile.id, "First text", Some("https://x/1"));
        assert!(matches!(
            store.insert_post(&first).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));

        // Same URL, different text
        let same_url = new_post(profile.id, "Edited text", Some("https://x/1"));
        assert!(matches!(
            store.insert_post(&same_url).await.unwrap(),
            InsertOutcome::AlreadyStored
        ));

        // Same text, different URL
        let same_text = new_post(profile.id, "First text", Some("https://x/2"));
        assert!(matches!(
            store.insert_post(&same_text).await.unwrap(),
            InsertOutcome::AlreadyStored
        ));
    }

    #[tokio::test]
    async fn test_empty_urls_do_not_clash() {
        let (store, profile) = store_with_profile().await;

        let a = new_post(profile.id, "Post A", Some(""));
        let b = new_post(profile.id, "Post B", Some(""));
        let c = new_post(profile.id, "Post C", None);

        for post in [&a, &b, &c] {
            assert!(matches!(
                store.insert_post(post).await.unwrap(),
                InsertOutcome::Inserted(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_profile_cascades_to_posts() {
        let (store, profile) = store_with_profile().await;
        let post = new_post(profile.id, "We raised $10M", Some("https://x/1"));
        store.insert_post(&post).await.unwrap();

        assert!(!store.delete_profile(profile.user_id + 1, profile.id).await.unwrap());
        assert!(store.delete_profile(profile.user_id, profile.id).await.unwrap());

        assert!(store.list_profiles(profile.user_id).await.unwrap().is_empty());
        assert!(
            store
                .find_post_by_fingerprint(profile.id, &post.fingerprint)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_notification_idempotent_per_run() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();
        let run_id = Uuid::new_v4();

        let first = store
            .create_notification(&notification(user.id, "Daily Update", Some(run_id)))
            .await
            .unwrap();
        let second = store
            .create_notification(&notification(user.id, "Daily Update", Some(run_id)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_notifications(user.id, 10).await.unwrap().len(), 1);

        // Notifications without a run are plain appends
        store
            .create_notification(&notification(user.id, "Manual", None))
            .await
            .unwrap();
        store
            .create_notification(&notification(user.id, "Manual", None))
            .await
            .unwrap();
        assert_eq!(store.list_notifications(user.id, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_notifications_newest_first_and_read_flags() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();

        let mut older = notification(user.id, "Older", None);
        older.created_at = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let older = store.create_notification(&older).await.unwrap();
        store
            .create_notification(&notification(user.id, "Newer", None))
            .await
            .unwrap();

        let listed = store.list_notifications(user.id, 10).await.unwrap();
        assert_eq!(listed[0].title, "Newer");
        assert_eq!(listed[1].title, "Older");
        assert_eq!(store.list_notifications(user.id, 1).await.unwrap().len(), 1);
        assert_eq!(store.unread_count(user.id).await.unwrap(), 2);

        assert!(store.mark_notification_read(user.id, older.id).await.unwrap());
        assert!(!store.mark_notification_read(user.id + 1, older.id).await.unwrap());
        assert_eq!(store.unread_count(user.id).await.unwrap(), 1);

        assert_eq!(store.mark_all_notifications_read(user.id).await.unwrap(), 1);
        assert_eq!(store.unread_count(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_upsert_and_email_settings() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();

        store
            .set_setting(user.id, setting_keys::NOTIFY_EMAIL, "old@example.com")
            .await
            .unwrap();
        store
            .set_setting(user.id, setting_keys::NOTIFY_EMAIL, "me@example.com")
            .await
            .unwrap();
        store
            .set_setting(user.id, setting_keys::SMTP_USER, "bot@example.com")
            .await
            .unwrap();

        assert_eq!(
            store
                .get_setting(user.id, setting_keys::NOTIFY_EMAIL)
                .await
                .unwrap()
                .as_deref(),
            Some("me@example.com")
        );

        let settings = store.load_email_settings(user.id).await.unwrap();
        assert_eq!(settings.notify_email.as_deref(), Some("me@example.com"));
        assert_eq!(settings.smtp_port, Some(587));
        assert_eq!(settings.missing_fields(), vec!["smtp_password"]);
    }

    #[tokio::test]
    async fn test_job_run_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();
        let run = JobRun {
            id: Uuid::new_v4(),
            user_id: user.id,
            state: RunState::Running,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
            error: None,
        };

        store.begin_run(&run).await.unwrap();
        let running = store.list_running_runs().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, run.id);

        store
            .finish_run(run.id, RunState::Failed, OffsetDateTime::now_utc(), Some("boom"))
            .await
            .unwrap();
        assert!(store.list_running_runs().await.unwrap().is_empty());

        let err = store
            .finish_run(Uuid::new_v4(), RunState::Completed, OffsetDateTime::now_utc(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_run_lease_excludes_second_run_until_expiry() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(
            store
                .acquire_run_lease(user.id, first, now, now + time::Duration::minutes(10))
                .await
                .unwrap()
        );
        assert!(
            !store
                .acquire_run_lease(user.id, second, now, now + time::Duration::minutes(10))
                .await
                .unwrap()
        );

        // Renewal only works for the holder
        assert!(
            store
                .renew_run_lease(user.id, first, now + time::Duration::minutes(20))
                .await
                .unwrap()
        );
        assert!(
            !store
                .renew_run_lease(user.id, second, now + time::Duration::minutes(20))
                .await
                .unwrap()
        );

        // Past the expiry another run takes over
        let later = now + time::Duration::minutes(30);
        assert!(
            store
                .acquire_run_lease(user.id, second, later, later + time::Duration::minutes(10))
                .await
                .unwrap()
        );
        assert!(
            !store
                .renew_run_lease(user.id, first, later + time::Duration::minutes(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_release_run_lease_only_by_holder() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.find_or_create_user("alice").await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (holder, other) = (Uuid::new_v4(), Uuid::new_v4());
        let expires = now + time::Duration::minutes(10);

        store.acquire_run_lease(user.id, holder, now, expires).await.unwrap();
        store.release_run_lease(user.id, other).await.unwrap();
        assert!(!store.acquire_run_lease(user.id, other, now, expires).await.unwrap());

        store.release_run_lease(user.id, holder).await.unwrap();
        assert!(store.acquire_run_lease(user.id, other, now, expires).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("digest.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.find_or_create_user("alice").await.unwrap();
        }

        let reopened = SqliteStore::new(&path).await.unwrap();
        assert_eq!(reopened.list_users().await.unwrap().len(), 1);
    }
}
