//! Per-user preference records. The core only ever reads them (`get`); the
//! write paths exist for the profiles HTTP surface.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Result, TvAgentError};

fn default_profile_index() -> i32 {
    1
}

/// Stored preferences for one user: which slot to pick when a stateful app
/// opens its profile/account gate, plus an optional PIN and an optional
/// account label used for on-screen lookup instead of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    #[serde(default = "default_profile_index")]
    pub netflix_profile_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netflix_pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_account_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_account_name: Option<String>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The only read path the core consumes.
    async fn get(&self, user_id: &str) -> Result<Option<UserPreference>>;

    async fn list(&self) -> Result<Vec<UserPreference>>;

    /// Returns false if the user already exists.
    async fn create(&self, preference: &UserPreference) -> Result<bool>;

    /// Returns false if the user does not exist.
    async fn update(&self, preference: &UserPreference) -> Result<bool>;

    /// Returns false if the user does not exist.
    async fn delete(&self, user_id: &str) -> Result<bool>;
}

// ── Postgres store ──────────────────────────────────────────────────────

pub struct PgProfileStore {
    pool: Pool,
}

impl PgProfileStore {
    /// Build the store and create the table if it is missing.
    pub async fn new(pool: Pool) -> Result<Self> {
        let store = Self { pool };
        let client = store.client().await?;
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS user_profiles (
                    id SERIAL PRIMARY KEY,
                    user_id VARCHAR(50) UNIQUE NOT NULL,
                    netflix_profile_index INT DEFAULT 1,
                    netflix_pin VARCHAR(10),
                    youtube_account_index INT,
                    youtube_account_name VARCHAR(100),
                    created_at TIMESTAMP DEFAULT NOW(),
                    updated_at TIMESTAMP DEFAULT NOW()
                )",
                &[],
            )
            .await
            .map_err(|e| TvAgentError::Store(e.to_string()))?;
        info!("profile table ready");
        Ok(store)
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| TvAgentError::Store(format!("pool connection: {e}")))
    }

    fn row_to_preference(row: &tokio_postgres::Row) -> UserPreference {
        UserPreference {
            user_id: row.get("user_id"),
            netflix_profile_index: row.get("netflix_profile_index"),
            netflix_pin: row.get("netflix_pin"),
            youtube_account_index: row.get("youtube_account_index"),
            youtube_account_name: row.get("youtube_account_name"),
        }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreference>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT user_id, netflix_profile_index, netflix_pin,
                        youtube_account_index, youtube_account_name
                 FROM user_profiles WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| TvAgentError::Store(e.to_string()))?;
        Ok(row.as_ref().map(Self::row_to_preference))
    }

    async fn list(&self) -> Result<Vec<UserPreference>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT user_id, netflix_profile_index, netflix_pin,
                        youtube_account_index, youtube_account_name
                 FROM user_profiles ORDER BY user_id",
                &[],
            )
            .await
            .map_err(|e| TvAgentError::Store(e.to_string()))?;
        Ok(rows.iter().map(Self::row_to_preference).collect())
    }

    async fn create(&self, preference: &UserPreference) -> Result<bool> {
        let client = self.client().await?;
        let inserted = client
            .execute(
                "INSERT INTO user_profiles
                    (user_id, netflix_profile_index, netflix_pin,
                     youtube_account_index, youtube_account_name)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id) DO NOTHING",
                &[
                    &preference.user_id,
                    &preference.netflix_profile_index,
                    &preference.netflix_pin,
                    &preference.youtube_account_index,
                    &preference.youtube_account_name,
                ],
            )
            .await
            .map_err(|e| TvAgentError::Store(e.to_string()))?;
        Ok(inserted == 1)
    }

    async fn update(&self, preference: &UserPreference) -> Result<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE user_profiles
                 SET netflix_profile_index = $2, netflix_pin = $3,
                     youtube_account_index = $4, youtube_account_name = $5,
                     updated_at = NOW()
                 WHERE user_id = $1",
                &[
                    &preference.user_id,
                    &preference.netflix_profile_index,
                    &preference.netflix_pin,
                    &preference.youtube_account_index,
                    &preference.youtube_account_name,
                ],
            )
            .await
            .map_err(|e| TvAgentError::Store(e.to_string()))?;
        Ok(updated == 1)
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute("DELETE FROM user_profiles WHERE user_id = $1", &[&user_id])
            .await
            .map_err(|e| TvAgentError::Store(e.to_string()))?;
        Ok(deleted == 1)
    }
}

// ── In-memory store ─────────────────────────────────────────────────────

/// Used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryProfileStore {
    records: RwLock<HashMap<String, UserPreference>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserPreference>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn list(&self) -> Result<Vec<UserPreference>> {
        let mut all: Vec<UserPreference> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }

    async fn create(&self, preference: &UserPreference) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&preference.user_id) {
            return Ok(false);
        }
        records.insert(preference.user_id.clone(), preference.clone());
        Ok(true)
    }

    async fn update(&self, preference: &UserPreference) -> Result<bool> {
        let mut records = self.records.write().await;
        if !records.contains_key(&preference.user_id) {
            return Ok(false);
        }
        records.insert(preference.user_id.clone(), preference.clone());
        Ok(true)
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(user_id).is_some())
    }
}
