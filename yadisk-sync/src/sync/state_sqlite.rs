use std::{fs, path::Path};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};

use super::model::{EntryKind, Timestamp};
use super::state::{DirectoryIdentity, PreviousState, StateEntry, StateError, StateStore};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// [`StateStore`] keeping one row per remembered entry in SQLite.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StateError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Opens (creating if needed) `state.db` inside `dir`.
    pub async fn open_in(dir: &Path) -> Result<Self, StateError> {
        fs::create_dir_all(dir)?;
        let options = SqliteConnectOptions::new()
            .filename(dir.join("state.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StateError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, identity: &DirectoryIdentity) -> Result<PreviousState, StateError> {
        let rows = sqlx::query(
            "SELECT name, kind, digest, size, modified
             FROM previous_state
             WHERE identity = ?1
             ORDER BY name ASC",
        )
        .bind(identity.as_str())
        .fetch_all(&self.pool)
        .await?;

        let corrupt = |reason: String| StateError::Corrupt {
            identity: identity.to_string(),
            reason,
        };

        let mut state = PreviousState::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let kind: String = row.try_get("kind")?;
            let kind = EntryKind::parse(&kind)
                .ok_or_else(|| corrupt(format!("invalid kind {kind:?} for {name}")))?;
            let size: Option<i64> = row.try_get("size")?;
            let size = size
                .map(u64::try_from)
                .transpose()
                .map_err(|_| corrupt(format!("negative size for {name}")))?;
            let modified: Option<i64> = row.try_get("modified")?;
            state.insert(
                name,
                StateEntry {
                    kind,
                    digest: row.try_get("digest")?,
                    size,
                    modified: modified.map(Timestamp::from_unix_nanos),
                },
            );
        }
        Ok(state)
    }

    async fn save(
        &self,
        identity: &DirectoryIdentity,
        state: &PreviousState,
    ) -> Result<(), StateError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM previous_state WHERE identity = ?1")
            .bind(identity.as_str())
            .execute(&mut *tx)
            .await?;
        for (name, entry) in state.iter() {
            sqlx::query(
                "INSERT INTO previous_state (identity, name, kind, digest, size, modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(identity.as_str())
            .bind(name)
            .bind(entry.kind.as_str())
            .bind(entry.digest.as_deref())
            .bind(entry.size.map(|size| i64::try_from(size).unwrap_or(i64::MAX)))
            .bind(entry.modified.map(Timestamp::unix_nanos))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
