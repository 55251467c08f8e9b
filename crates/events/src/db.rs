//! SQLite storage for contract events and listener cursors.

use chainwatch_core::ContractEvent;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

type EventRow = (i64, Option<i64>, String, i64, String, String, String);

/// Database connection for contract events.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Connect to the SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every in-memory connection is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contract_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL,
                block_timestamp INTEGER,
                tx_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                address TEXT NOT NULL,
                topics TEXT NOT NULL DEFAULT '[]',
                data TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(tx_hash, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_contract_events_block
            ON contract_events(block_number)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store events, skipping ones already present.
    /// Returns the events that were newly inserted.
    pub async fn insert_events<'a>(
        &self,
        events: &'a [ContractEvent],
    ) -> Result<Vec<&'a ContractEvent>, StoreError> {
        let mut inserted = Vec::new();
        let mut tx = self.pool.begin().await?;

        for event in events {
            let topics = serde_json::to_string(&event.topics)?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO contract_events
                    (block_number, block_timestamp, tx_hash, log_index, address, topics, data)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.block_number as i64)
            .bind(event.block_timestamp)
            .bind(&event.tx_hash)
            .bind(event.log_index as i64)
            .bind(&event.address)
            .bind(&topics)
            .bind(&event.data)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted.push(event);
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<ContractEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT block_number, block_timestamp, tx_hash, log_index, address, topics, data
            FROM contract_events
            ORDER BY block_number DESC, log_index DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_event).collect()
    }

    pub async fn count_events(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM contract_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Last fully processed block for a cursor key.
    pub async fn get_cursor(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.map(|v| v as u64))
    }

    pub async fn set_cursor(&self, key: &str, block: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(block as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_event(row: EventRow) -> Result<ContractEvent, StoreError> {
    let (block_number, block_timestamp, tx_hash, log_index, address, topics_json, data) = row;
    Ok(ContractEvent {
        block_number: block_number as u64,
        block_timestamp,
        tx_hash,
        log_index: log_index as u64,
        address,
        topics: serde_json::from_str(&topics_json)?,
        data,
    })
}
