//! Local SQLite store for inventory records
//!
//! Provides:
//! - Durable keyed storage with sequential, never-reused ids
//! - Full-scan and point reads
//! - Indexed query for records that still need uploading
//! - Per-installation node id used to build upload idempotency keys
//!
//! Every public operation is a single SQL statement, so it either persists
//! fully or fails without a partial write.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::record::{InventoryRecord, LineItem, NewInventoryRecord, RecordId};

const DATE_FORMAT: &str = "%Y-%m-%d";
const NODE_ID_KEY: &str = "node_id";

const RECORD_COLUMNS: &str = "id, camp, entry_by, entry_date, inventory_type, warehouse, \
                              supplier, po, grn, items, synced, created_at";

/// Configuration for the local store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file
    pub db_path: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to enable WAL mode
    pub enable_wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "campstock.db".to_string(),
            max_connections: 5,
            enable_wal: true,
        }
    }
}

/// Derived counts over the whole collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total: u64,
    pub synced: u64,
    pub unsynced: u64,
}

/// Local store handle
pub struct LocalStore {
    pool: SqlitePool,
    node_id: Uuid,
}

impl LocalStore {
    /// Open (creating if needed) the store described by `config`
    pub async fn open(config: &StoreConfig) -> SyncResult<Self> {
        let journal_mode = if config.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(journal_mode);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        initialize_schema(&pool).await?;
        let node_id = load_node_id(&pool).await?;

        tracing::info!(
            db_path = %config.db_path,
            node_id = %node_id,
            "Opened local inventory store"
        );

        Ok(Self { pool, node_id })
    }

    /// Persist a new record and return its assigned id.
    ///
    /// `synced` starts false and `created_at` is taken from the store's clock,
    /// never from the caller.
    pub async fn create(&self, record: &NewInventoryRecord) -> SyncResult<RecordId> {
        let created_at = Utc::now();
        let items = serde_json::to_string(&record.items)?;

        let result = sqlx::query(
            r#"
            INSERT INTO entries (
                camp, entry_by, entry_date, inventory_type, warehouse,
                supplier, po, grn, items, synced, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&record.camp)
        .bind(&record.entry_by)
        .bind(record.entry_date.format(DATE_FORMAT).to_string())
        .bind(record.inventory_type.as_str())
        .bind(&record.warehouse)
        .bind(&record.supplier)
        .bind(&record.po)
        .bind(&record.grn)
        .bind(items)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = RecordId(result.last_insert_rowid());

        tracing::debug!(
            record_id = %id,
            camp = %record.camp,
            inventory_type = %record.inventory_type,
            items = record.items.len(),
            "Created inventory record"
        );

        Ok(id)
    }

    /// Every record, in no particular order
    pub async fn get_all(&self) -> SyncResult<Vec<InventoryRecord>> {
        let rows = sqlx::query(&format!("SELECT {} FROM entries", RECORD_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn get_by_id(&self, id: RecordId) -> SyncResult<InventoryRecord> {
        let row = sqlx::query(&format!("SELECT {} FROM entries WHERE id = ?", RECORD_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(SyncError::NotFound(id)),
        }
    }

    /// Replace the stored document for `id`.
    ///
    /// `id` and `created_at` of the supplied record are ignored, and a record
    /// that is already synced stays synced.
    pub async fn update(&self, id: RecordId, record: &InventoryRecord) -> SyncResult<()> {
        let items = serde_json::to_string(&record.items)?;

        let result = sqlx::query(
            r#"
            UPDATE entries
            SET camp = ?,
                entry_by = ?,
                entry_date = ?,
                inventory_type = ?,
                warehouse = ?,
                supplier = ?,
                po = ?,
                grn = ?,
                items = ?,
                synced = MAX(synced, ?)
            WHERE id = ?
            "#,
        )
        .bind(&record.camp)
        .bind(&record.entry_by)
        .bind(record.entry_date.format(DATE_FORMAT).to_string())
        .bind(record.inventory_type.as_str())
        .bind(&record.warehouse)
        .bind(&record.supplier)
        .bind(&record.po)
        .bind(&record.grn)
        .bind(items)
        .bind(i64::from(record.synced))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(id));
        }

        tracing::debug!(record_id = %id, synced = record.synced, "Updated inventory record");

        Ok(())
    }

    /// Flip the synced flag for one record
    pub async fn mark_synced(&self, id: RecordId) -> SyncResult<()> {
        let result = sqlx::query("UPDATE entries SET synced = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(id));
        }

        tracing::debug!(record_id = %id, "Marked record as synced");

        Ok(())
    }

    /// Remove a record. Deleting a missing id is not an error.
    pub async fn delete(&self, id: RecordId) -> SyncResult<()> {
        let result = sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        tracing::debug!(
            record_id = %id,
            removed = result.rows_affected() > 0,
            "Deleted inventory record"
        );

        Ok(())
    }

    /// Records still waiting for upload, read through the `synced` index
    pub async fn get_unsynced(&self) -> SyncResult<Vec<InventoryRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM entries INDEXED BY idx_entries_synced WHERE synced = 0 ORDER BY id",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn get_sync_stats(&self) -> SyncResult<SyncStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(synced), 0) AS synced FROM entries",
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let synced: i64 = row.try_get("synced")?;
        let total = u64::try_from(total).unwrap_or_default();
        let synced = u64::try_from(synced).unwrap_or_default();

        Ok(SyncStats {
            total,
            synced,
            unsynced: total.saturating_sub(synced),
        })
    }

    /// Installation id, stable across restarts
    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reclaim space left behind by deleted records
    pub async fn vacuum(&self) -> SyncResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Close database connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn initialize_schema(pool: &SqlitePool) -> SyncResult<()> {
    // AUTOINCREMENT keeps SQLite from handing out the id of a deleted row again.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            camp TEXT NOT NULL,
            entry_by TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            inventory_type TEXT NOT NULL,
            warehouse TEXT,
            supplier TEXT,
            po TEXT,
            grn TEXT,
            items TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_entries_synced ON entries(synced)",
        "CREATE INDEX IF NOT EXISTS idx_entries_camp ON entries(camp)",
        "CREATE INDEX IF NOT EXISTS idx_entries_inventory_type ON entries(inventory_type)",
        "CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn load_node_id(pool: &SqlitePool) -> SyncResult<Uuid> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO store_metadata (key, value, updated_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(NODE_ID_KEY)
    .bind(Uuid::new_v4().to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT value FROM store_metadata WHERE key = ?")
        .bind(NODE_ID_KEY)
        .fetch_one(pool)
        .await?;
    let value: String = row.try_get("value")?;

    Uuid::parse_str(&value).map_err(|e| SyncError::Config(format!("Invalid node id: {}", e)))
}

fn record_from_row(row: &SqliteRow) -> SyncResult<InventoryRecord> {
    let id = RecordId(row.try_get::<i64, _>("id")?);
    let corrupt = |reason: String| SyncError::CorruptRecord { id, reason };

    let entry_date: String = row.try_get("entry_date")?;
    let inventory_type: String = row.try_get("inventory_type")?;
    let items: String = row.try_get("items")?;
    let synced: i64 = row.try_get("synced")?;
    let created_at: String = row.try_get("created_at")?;

    let items: Vec<LineItem> =
        serde_json::from_str(&items).map_err(|e| corrupt(format!("items: {}", e)))?;

    Ok(InventoryRecord {
        id,
        camp: row.try_get("camp")?,
        entry_by: row.try_get("entry_by")?,
        entry_date: NaiveDate::parse_from_str(&entry_date, DATE_FORMAT)
            .map_err(|e| corrupt(format!("entry_date: {}", e)))?,
        inventory_type: inventory_type
            .parse()
            .map_err(|e: SyncError| corrupt(e.to_string()))?,
        warehouse: row.try_get("warehouse")?,
        supplier: row.try_get("supplier")?,
        po: row.try_get("po")?,
        grn: row.try_get("grn")?,
        items,
        synced: synced != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| corrupt(format!("created_at: {}", e)))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::record;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn create_test_store() -> (LocalStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("campstock.db").to_str().unwrap().to_string(),
            max_connections: 5,
            enable_wal: true,
        };

        (LocalStore::open(&config).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn test_create_assigns_store_fields() {
        let (store, _dir) = create_test_store().await;
        let before = Utc::now();

        let id = store.create(&record("Alpha")).await.unwrap();
        let stored = store.get_by_id(id).await.unwrap();

        assert_eq!(id, RecordId(1));
        assert_eq!(stored.id, id);
        assert!(!stored.synced);
        assert!(stored.created_at >= before - chrono::Duration::seconds(1));
        assert_eq!(stored.camp, "Alpha");
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].quantity, 50.0);
    }

    #[tokio::test]
    async fn test_ids_are_distinct_and_never_reused() {
        let (store, _dir) = create_test_store().await;

        let mut ids = HashSet::new();
        for i in 0..5 {
            ids.insert(store.create(&record(&format!("Camp {}", i))).await.unwrap());
        }
        assert_eq!(ids.len(), 5);

        store.delete(RecordId(5)).await.unwrap();
        let next = store.create(&record("Late")).await.unwrap();
        assert_eq!(next, RecordId(6));
    }

    #[tokio::test]
    async fn test_get_by_id_missing_is_not_found() {
        let (store, _dir) = create_test_store().await;

        let err = store.get_by_id(RecordId(42)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(RecordId(42))));
    }

    #[tokio::test]
    async fn test_delete_removes_from_scan_index_and_stats() {
        let (store, _dir) = create_test_store().await;
        let first = store.create(&record("Alpha")).await.unwrap();
        store.create(&record("Bravo")).await.unwrap();

        assert_eq!(store.get_sync_stats().await.unwrap().total, 2);

        store.delete(first).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert!(all.iter().all(|r| r.id != first));
        let unsynced = store.get_unsynced().await.unwrap();
        assert!(unsynced.iter().all(|r| r.id != first));
        assert_eq!(store.get_sync_stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = create_test_store().await;
        let id = store.create(&record("Alpha")).await.unwrap();

        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
        store.delete(RecordId(999)).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_unsynced_tracks_flag() {
        let (store, _dir) = create_test_store().await;
        let a = store.create(&record("Alpha")).await.unwrap();
        let b = store.create(&record("Bravo")).await.unwrap();
        let c = store.create(&record("Charlie")).await.unwrap();

        store.mark_synced(b).await.unwrap();

        let ids: Vec<RecordId> = store
            .get_unsynced()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a, c]);

        let stats = store.get_sync_stats().await.unwrap();
        assert_eq!(stats, SyncStats { total: 3, synced: 1, unsynced: 2 });
    }

    #[tokio::test]
    async fn test_unsynced_query_uses_index() {
        let (store, _dir) = create_test_store().await;

        let rows = sqlx::query(
            "EXPLAIN QUERY PLAN SELECT id FROM entries INDEXED BY idx_entries_synced WHERE synced = 0",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();

        let plan: Vec<String> = rows.iter().map(|r| r.try_get("detail").unwrap()).collect();
        assert!(plan.iter().any(|d| d.contains("idx_entries_synced")), "{:?}", plan);
    }

    #[tokio::test]
    async fn test_update_replaces_document() {
        let (store, _dir) = create_test_store().await;
        let id = store.create(&record("Alpha")).await.unwrap();

        let mut stored = store.get_by_id(id).await.unwrap();
        let created_at = stored.created_at;
        stored.camp = "Alpha North".to_string();
        stored.items[0].quantity = 12.5;
        stored.id = RecordId(77);
        stored.created_at = Utc::now() + chrono::Duration::days(3);

        store.update(id, &stored).await.unwrap();

        let reloaded = store.get_by_id(id).await.unwrap();
        assert_eq!(reloaded.id, id);
        assert_eq!(reloaded.camp, "Alpha North");
        assert_eq!(reloaded.items[0].quantity, 12.5);
        assert_eq!(reloaded.created_at, created_at);
        assert!(store.get_by_id(RecordId(77)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_never_reverts_synced() {
        let (store, _dir) = create_test_store().await;
        let id = store.create(&record("Alpha")).await.unwrap();

        let mut stored = store.get_by_id(id).await.unwrap();
        stored.synced = true;
        store.update(id, &stored).await.unwrap();
        assert!(store.get_by_id(id).await.unwrap().synced);

        stored.synced = false;
        store.update(id, &stored).await.unwrap();
        assert!(store.get_by_id(id).await.unwrap().synced);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let (store, _dir) = create_test_store().await;
        let id = store.create(&record("Alpha")).await.unwrap();
        let stored = store.get_by_id(id).await.unwrap();

        let err = store.update(RecordId(50), &stored).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.mark_synced(RecordId(50)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_node_id_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("campstock.db").to_str().unwrap().to_string(),
            enable_wal: false,
            ..Default::default()
        };

        let first = LocalStore::open(&config).await.unwrap();
        let node_id = first.node_id();
        let id = first.create(&record("Alpha")).await.unwrap();
        first.close().await;

        let second = LocalStore::open(&config).await.unwrap();
        assert_eq!(second.node_id(), node_id);
        assert_eq!(second.get_by_id(id).await.unwrap().camp, "Alpha");
    }

    #[tokio::test]
    async fn test_corrupt_items_surface_as_storage_failure() {
        let (store, _dir) = create_test_store().await;
        let id = store.create(&record("Alpha")).await.unwrap();

        sqlx::query("UPDATE entries SET items = 'not json' WHERE id = ?")
            .bind(id.0)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get_by_id(id).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageFailure);
    }

    #[tokio::test]
    async fn test_vacuum_operation() {
        let (store, _dir) = create_test_store().await;
        for i in 0..10 {
            let id = store.create(&record(&format!("Camp {}", i))).await.unwrap();
            store.delete(id).await.unwrap();
        }

        store.vacuum().await.unwrap();
        assert_eq!(store.get_sync_stats().await.unwrap(), SyncStats::default());
    }
}
