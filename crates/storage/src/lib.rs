use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{ActivityId, CollectionKind, Role, UserId};

#[derive(Debug, Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub is_public: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// One collection element as persisted: the item id plus its JSON payload.
/// Position is implied by the element's index in the surrounding slice.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub item_id: String,
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct StoredCollection {
    pub items: Vec<StoredItem>,
    pub revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced { revision: i64 },
    RevisionMismatch { current: i64 },
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct StoredActivity {
    pub activity_id: ActivityId,
    pub actor_user_id: UserId,
    pub action: String,
    pub target_user_id: Option<UserId>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str =
    "id, username, display_name, headline, bio, is_public, role, created_at_ms";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // every pooled connection to `sqlite::memory:` would open its own empty database
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username, created_at_ms) VALUES (?, ?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    /// Inserts a new user with credentials. `None` when the username is taken.
    pub async fn register_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<UserId>> {
        let row = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(username) DO NOTHING
             RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserId(r.get::<i64, _>(0))))
    }

    pub async fn password_hash(&self, user_id: UserId) -> Result<Option<String>> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
                .bind(user_id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash.flatten())
    }

    pub async fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    pub async fn list_users(&self) -> Result<Vec<StoredUser>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY lower(username) ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn update_profile(&self, user_id: UserId, fields: &ProfileFields) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET display_name = ?, headline = ?, bio = ?, is_public = ? WHERE id = ?",
        )
        .bind(fields.display_name.as_deref())
        .bind(fields.headline.as_deref())
        .bind(fields.bio.as_deref())
        .bind(fields.is_public)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role(&self, user_id: UserId, role: Role) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes the user together with every collection they own.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM collection_items WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collection_revisions WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn load_collection(
        &self,
        user_id: UserId,
        kind: CollectionKind,
    ) -> Result<StoredCollection> {
        let rows = sqlx::query(
            "SELECT item_id, payload FROM collection_items
             WHERE user_id = ? AND kind = ?
             ORDER BY position ASC",
        )
        .bind(user_id.0)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        let revision = self.collection_revision(user_id, kind).await?;

        Ok(StoredCollection {
            items: rows
                .into_iter()
                .map(|r| StoredItem {
                    item_id: r.get::<String, _>(0),
                    payload: r.get::<String, _>(1),
                })
                .collect(),
            revision,
        })
    }

    pub async fn collection_revision(&self, user_id: UserId, kind: CollectionKind) -> Result<i64> {
        let revision: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM collection_revisions WHERE user_id = ? AND kind = ?",
        )
        .bind(user_id.0)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(revision.unwrap_or(0))
    }

    /// Replaces the whole collection in one transaction. Either every row is
    /// rewritten and the revision bumped, or nothing changes.
    pub async fn replace_collection(
        &self,
        user_id: UserId,
        kind: CollectionKind,
        items: &[StoredItem],
        expected_revision: Option<i64>,
    ) -> Result<ReplaceOutcome> {
        let mut tx = self.pool.begin().await?;

        let current: i64 = sqlx::query_scalar(
            "SELECT revision FROM collection_revisions WHERE user_id = ? AND kind = ?",
        )
        .bind(user_id.0)
        .bind(kind.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

        if let Some(expected) = expected_revision {
            if expected != current {
                tx.rollback().await?;
                return Ok(ReplaceOutcome::RevisionMismatch { current });
            }
        }

        sqlx::query("DELETE FROM collection_items WHERE user_id = ? AND kind = ?")
            .bind(user_id.0)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO collection_items (user_id, kind, position, item_id, payload)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user_id.0)
            .bind(kind.as_str())
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&item.item_id)
            .bind(&item.payload)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to store {kind} item '{}'", item.item_id))?;
        }

        let revision = current + 1;
        sqlx::query(
            "INSERT INTO collection_revisions (user_id, kind, revision) VALUES (?, ?, ?)
             ON CONFLICT(user_id, kind) DO UPDATE SET revision = excluded.revision",
        )
        .bind(user_id.0)
        .bind(kind.as_str())
        .bind(revision)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReplaceOutcome::Replaced { revision })
    }

    pub async fn record_activity(
        &self,
        actor_user_id: UserId,
        action: &str,
        target_user_id: Option<UserId>,
        detail: Option<&str>,
    ) -> Result<ActivityId> {
        self.record_activity_at(actor_user_id, action, target_user_id, detail, Utc::now())
            .await
    }

    pub async fn record_activity_at(
        &self,
        actor_user_id: UserId,
        action: &str,
        target_user_id: Option<UserId>,
        detail: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ActivityId> {
        let rec = sqlx::query(
            "INSERT INTO admin_activity (actor_user_id, action, target_user_id, detail, created_at_ms)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(actor_user_id.0)
        .bind(action)
        .bind(target_user_id.map(|id| id.0))
        .bind(detail)
        .bind(at.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(ActivityId(rec.get::<i64, _>(0)))
    }

    /// Newest first.
    pub async fn list_activity(&self, limit: u32) -> Result<Vec<StoredActivity>> {
        let rows = sqlx::query(
            "SELECT id, actor_user_id, action, target_user_id, detail, created_at_ms
             FROM admin_activity
             ORDER BY created_at_ms DESC, id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StoredActivity {
                activity_id: ActivityId(r.get::<i64, _>(0)),
                actor_user_id: UserId(r.get::<i64, _>(1)),
                action: r.get::<String, _>(2),
                target_user_id: r.get::<Option<i64>, _>(3).map(UserId),
                detail: r.get::<Option<String>, _>(4),
                created_at: millis_to_datetime(r.get::<i64, _>(5)),
            })
            .collect())
    }

    /// Deletes activity rows strictly older than `cutoff`; returns how many went.
    pub async fn delete_activity_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM admin_activity WHERE created_at_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn user_from_row(r: &SqliteRow) -> StoredUser {
    StoredUser {
        user_id: UserId(r.get::<i64, _>(0)),
        username: r.get::<String, _>(1),
        display_name: r.get::<Option<String>, _>(2),
        headline: r.get::<Option<String>, _>(3),
        bio: r.get::<Option<String>, _>(4),
        is_public: r.get::<bool, _>(5),
        role: Role::from_db(&r.get::<String, _>(6)),
        created_at: millis_to_datetime(r.get::<i64, _>(7)),
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
