//! SQLite-backed persistence for connected accounts and in-flight
//! authorization attempts.
//!
//! This is the single source of truth for both tables; nothing else in the
//! process caches account or state rows. Correlating a callback with its
//! initiation happens here, through `take_pending`, never through process
//! memory.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, StoreError};
use crate::types::{ConnectedAccount, PendingAuthorization, SocialPlatform};

#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

impl AccountStore {
    /// Open (creating if needed) the database at `db_path` and run migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
        }

        // Forward slashes work for SQLite URLs on every platform; mode=rwc
        // creates the file on first run.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    /// In-memory store for tests and ephemeral runs. Capped to a single
    /// connection: every pooled `:memory:` connection would otherwise open
    /// its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    // ========================================================================
    // Connected accounts
    // ========================================================================

    /// Insert or replace the (user, platform) row.
    ///
    /// Every supplied field overwrites the stored one; only metadata is
    /// merged, so provider extras written by an earlier connect survive a
    /// token-only rewrite.
    pub async fn upsert(&self, account: &ConnectedAccount) -> Result<()> {
        let existing: Option<String> = sqlx::query(
            r#"
            SELECT metadata FROM connected_accounts WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?
        .map(|r| r.get("metadata"));

        let mut metadata = existing
            .and_then(|raw| {
                serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&raw).ok()
            })
            .unwrap_or_default();
        for (key, value) in &account.metadata {
            metadata.insert(key.clone(), value.clone());
        }
        let metadata_json = serde_json::Value::Object(metadata).to_string();

        sqlx::query(
            r#"
            INSERT INTO connected_accounts
                (user_id, platform, platform_user_id, display_name, access_token,
                 refresh_token, token_expires_at, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                platform_user_id = excluded.platform_user_id,
                display_name = excluded.display_name,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.platform_user_id)
        .bind(&account.display_name)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires_at)
        .bind(metadata_json)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    pub async fn get(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<Option<ConnectedAccount>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, platform_user_id, display_name, access_token,
                   refresh_token, token_expires_at, metadata, created_at, updated_at
            FROM connected_accounts
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        row.map(row_to_account).transpose()
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<ConnectedAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, platform, platform_user_id, display_name, access_token,
                   refresh_token, token_expires_at, metadata, created_at, updated_at
            FROM connected_accounts
            WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.into_iter().map(row_to_account).collect()
    }

    /// Hard delete; returns the number of rows removed (0 is not an error).
    pub async fn delete(&self, user_id: &str, platform: SocialPlatform) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM connected_accounts WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // Pending authorizations
    // ========================================================================

    pub async fn put_pending(&self, pending: &PendingAuthorization) -> Result<()> {
        // Opportunistic cleanup keeps the table bounded without a worker.
        self.purge_expired(pending.created_at).await?;

        sqlx::query(
            r#"
            INSERT INTO pending_authorizations
                (state, code_verifier, user_id, platform, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&pending.state)
        .bind(&pending.code_verifier)
        .bind(&pending.user_id)
        .bind(pending.platform.as_str())
        .bind(pending.created_at)
        .bind(pending.expires_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    /// Claim the attempt for `state`, removing it in the same statement so a
    /// second callback with the same value can never match. Expired rows are
    /// removed but reported as absent.
    pub async fn take_pending(&self, state: &str) -> Result<Option<PendingAuthorization>> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query(
            r#"
            DELETE FROM pending_authorizations
            WHERE state = ?
            RETURNING state, code_verifier, user_id, platform, created_at, expires_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let pending = row_to_pending(row)?;
        if pending.is_expired(now) {
            return Ok(None);
        }
        Ok(Some(pending))
    }

    pub async fn purge_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM pending_authorizations WHERE expires_at <= ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

fn parse_platform(raw: &str) -> Result<SocialPlatform> {
    SocialPlatform::from_str(raw)
        .map_err(|_| StoreError::Corrupt(format!("unknown platform '{raw}'")).into())
}

fn row_to_account(row: SqliteRow) -> Result<ConnectedAccount> {
    let platform = parse_platform(&row.get::<String, _>("platform"))?;
    let metadata_raw: String = row.get("metadata");
    let metadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| StoreError::Corrupt(format!("bad metadata JSON: {e}")))?;

    Ok(ConnectedAccount {
        user_id: row.get("user_id"),
        platform,
        platform_user_id: row.get("platform_user_id"),
        display_name: row.get("display_name"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        token_expires_at: row.get("token_expires_at"),
        metadata,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_pending(row: SqliteRow) -> Result<PendingAuthorization> {
    let platform = parse_platform(&row.get::<String, _>("platform"))?;

    Ok(PendingAuthorization {
        state: row.get("state"),
        code_verifier: row.get("code_verifier"),
        user_id: row.get("user_id"),
        platform,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PENDING_AUTHORIZATION_TTL_SECS;

    fn sample_account(user: &str, platform: SocialPlatform) -> ConnectedAccount {
        let mut account = ConnectedAccount::new(user, platform);
        account.platform_user_id = Some("remote-1".to_string());
        account.display_name = Some("Test User".to_string());
        account.access_token = Some("access-1".to_string());
        account.refresh_token = Some("refresh-1".to_string());
        account.token_expires_at = Some(account.created_at + 3600);
        account
    }

    #[tokio::test]
    async fn test_file_backed_store_creates_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("accounts.db");
        let store = AccountStore::new(db_path.to_str().unwrap()).await.unwrap();

        store
            .upsert(&sample_account("u1", SocialPlatform::Youtube))
            .await
            .unwrap();
        assert!(store
            .get("u1", SocialPlatform::Youtube)
            .await
            .unwrap()
            .is_some());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_upsert_then_get_roundtrip() {
        let store = AccountStore::in_memory().await.unwrap();
        let account = sample_account("u1", SocialPlatform::Linkedin);

        store.upsert(&account).await.unwrap();

        let fetched = store
            .get("u1", SocialPlatform::Linkedin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert_eq!(fetched.platform, SocialPlatform::Linkedin);
        assert_eq!(fetched.access_token.as_deref(), Some("access-1"));
        assert_eq!(fetched.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(fetched.platform_user_id.as_deref(), Some("remote-1"));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_not_duplicates() {
        let store = AccountStore::in_memory().await.unwrap();
        let mut account = sample_account("u1", SocialPlatform::Twitter);
        store.upsert(&account).await.unwrap();

        account.access_token = Some("access-2".to_string());
        account.display_name = None;
        store.upsert(&account).await.unwrap();

        let all = store.list("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].access_token.as_deref(), Some("access-2"));
        // Non-metadata fields are overwritten, including back to empty.
        assert_eq!(all[0].display_name, None);
    }

    #[tokio::test]
    async fn test_upsert_merges_metadata() {
        let store = AccountStore::in_memory().await.unwrap();
        let mut account = sample_account("u1", SocialPlatform::Twitter);
        account
            .metadata
            .insert("username".to_string(), serde_json::json!("@old"));
        account
            .metadata
            .insert("kept".to_string(), serde_json::json!(true));
        store.upsert(&account).await.unwrap();

        let mut rewrite = sample_account("u1", SocialPlatform::Twitter);
        rewrite
            .metadata
            .insert("username".to_string(), serde_json::json!("@new"));
        store.upsert(&rewrite).await.unwrap();

        let fetched = store
            .get("u1", SocialPlatform::Twitter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.metadata["username"], serde_json::json!("@new"));
        assert_eq!(fetched.metadata["kept"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_accounts_are_scoped_per_user_and_platform() {
        let store = AccountStore::in_memory().await.unwrap();
        store
            .upsert(&sample_account("u1", SocialPlatform::Twitter))
            .await
            .unwrap();
        store
            .upsert(&sample_account("u1", SocialPlatform::Linkedin))
            .await
            .unwrap();
        store
            .upsert(&sample_account("u2", SocialPlatform::Twitter))
            .await
            .unwrap();

        assert_eq!(store.list("u1").await.unwrap().len(), 2);
        assert_eq!(store.list("u2").await.unwrap().len(), 1);
        assert!(store
            .get("u2", SocialPlatform::Linkedin)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_serialize_to_one_row() {
        let store = AccountStore::in_memory().await.unwrap();
        let mut a = sample_account("u1", SocialPlatform::Twitter);
        a.access_token = Some("from-a".to_string());
        let mut b = sample_account("u1", SocialPlatform::Twitter);
        b.access_token = Some("from-b".to_string());

        let (ra, rb) = tokio::join!(store.upsert(&a), store.upsert(&b));
        ra.unwrap();
        rb.unwrap();

        let all = store.list("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        let token = all[0].access_token.as_deref().unwrap();
        assert!(token == "from-a" || token == "from-b");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = AccountStore::in_memory().await.unwrap();
        store
            .upsert(&sample_account("u1", SocialPlatform::Telegram))
            .await
            .unwrap();

        let first = store.delete("u1", SocialPlatform::Telegram).await.unwrap();
        assert_eq!(first, 1);

        let second = store.delete("u1", SocialPlatform::Telegram).await.unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_take_pending_is_single_use() {
        let store = AccountStore::in_memory().await.unwrap();
        let pending = PendingAuthorization::new(
            SocialPlatform::Twitter,
            Some("u1".to_string()),
            "state-abc".to_string(),
            Some("verifier".to_string()),
        );
        store.put_pending(&pending).await.unwrap();

        let first = store.take_pending("state-abc").await.unwrap();
        assert!(first.is_some());
        let taken = first.unwrap();
        assert_eq!(taken.code_verifier.as_deref(), Some("verifier"));
        assert_eq!(taken.user_id.as_deref(), Some("u1"));

        let second = store.take_pending("state-abc").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_take_pending_rejects_expired() {
        let store = AccountStore::in_memory().await.unwrap();
        let now = chrono::Utc::now().timestamp();
        let pending = PendingAuthorization {
            state: "stale".to_string(),
            code_verifier: None,
            user_id: Some("u1".to_string()),
            platform: SocialPlatform::Linkedin,
            created_at: now - PENDING_AUTHORIZATION_TTL_SECS - 5,
            expires_at: now - 5,
        };
        store.put_pending(&pending).await.unwrap();

        assert!(store.take_pending("stale").await.unwrap().is_none());
        // The expired row is gone, not merely skipped.
        assert!(store.take_pending("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_pending_purges_expired_rows() {
        let store = AccountStore::in_memory().await.unwrap();
        let now = chrono::Utc::now().timestamp();
        let stale = PendingAuthorization {
            state: "old".to_string(),
            code_verifier: None,
            user_id: None,
            platform: SocialPlatform::Twitter,
            created_at: now - 1200,
            expires_at: now - 600,
        };
        store.put_pending(&stale).await.unwrap();

        let fresh = PendingAuthorization::new(
            SocialPlatform::Twitter,
            None,
            "new".to_string(),
            None,
        );
        store.put_pending(&fresh).await.unwrap();

        assert!(store.take_pending("old").await.unwrap().is_none());
        assert!(store.take_pending("new").await.unwrap().is_some());
    }
}
