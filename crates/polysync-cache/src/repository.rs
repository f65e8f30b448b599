//! SQLite implementation of IEntryRepository
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                                   |
//! |--------------------------|----------|--------------------------------------------|
//! | EntryId, AdapterId       | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | ItemId                   | TEXT     | String via `.as_str()` / `ItemId::new()`   |
//! | EntryType                | TEXT     | `"file"` / `"directory"`                   |
//! | ContentHash (sha1, md5)  | TEXT     | Lowercase hex, one column per algorithm    |
//! | DateTime<Utc>            | TEXT     | RFC 3339 via `to_rfc3339()`                |
//! | u64 sizes                | INTEGER  | `i64` cast                                 |
//!
//! Entries are upserted in place (`ON CONFLICT ... DO UPDATE`) so their
//! adapter mappings are never dropped by a cascading replace.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use polysync_core::domain::{
    AdapterEntryData, AdapterId, ContentHash, EntryId, EntryType, HashKind, ItemId, Side,
    SyncEntry,
};
use polysync_core::ports::IEntryRepository;

use crate::CacheError;

const ENTRY_COLUMNS: &str = "id, parent_id, name, entry_type, created_at, modified_at, \
                             source_size, destination_size, sha1, md5, deleted";

/// SQLite-based implementation of the entry repository port
pub struct SqliteEntryRepository {
    pool: SqlitePool,
}

impl SqliteEntryRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored entries, deleted ones included
    pub async fn count_entries(&self) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Loads the mappings of every entry matched by `entry_ids`
    async fn load_mappings(
        &self,
        entry_ids: &[String],
    ) -> Result<HashMap<String, Vec<AdapterEntryData>>, CacheError> {
        let mut mappings: HashMap<String, Vec<AdapterEntryData>> = HashMap::new();
        for entry_id in entry_ids {
            let rows = sqlx::query(
                "SELECT entry_id, adapter_id, item_id, updated_at FROM adapter_entries \
                 WHERE entry_id = ? ORDER BY adapter_id",
            )
            .bind(entry_id)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let data = mapping_from_row(&row)?;
                mappings.entry(entry_id.clone()).or_default().push(data);
            }
        }
        Ok(mappings)
    }

    /// Turns entry rows into entries with their mappings attached
    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<SyncEntry>, CacheError> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut mappings = self.load_mappings(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| entry_from_row(row, mappings.remove(&id).unwrap_or_default()))
            .collect()
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn entry_type_to_str(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::File => "file",
        EntryType::Directory => "directory",
    }
}

fn entry_type_from_str(s: &str) -> Result<EntryType, CacheError> {
    match s {
        "file" => Ok(EntryType::File),
        "directory" => Ok(EntryType::Directory),
        other => Err(CacheError::CorruptRow(format!("Unknown entry type: {other}"))),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::CorruptRow(format!("Invalid timestamp {s:?}: {e}")))
}

fn parse_hash(kind: HashKind, hex: Option<String>) -> Result<Option<ContentHash>, CacheError> {
    hex.map(|hex| {
        ContentHash::from_hex(kind, &hex).map_err(|e| CacheError::CorruptRow(e.to_string()))
    })
    .transpose()
}

fn parse_id<T: FromStr>(s: &str) -> Result<T, CacheError>
where
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e: T::Err| CacheError::CorruptRow(format!("Invalid id {s:?}: {e}")))
}

fn mapping_from_row(row: &SqliteRow) -> Result<AdapterEntryData, CacheError> {
    let adapter_id: String = row.try_get("adapter_id")?;
    let item_id: String = row.try_get("item_id")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(AdapterEntryData {
        adapter_id: parse_id(&adapter_id)?,
        item_id: ItemId::new(item_id).map_err(|e| CacheError::CorruptRow(e.to_string()))?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn entry_from_row(
    row: &SqliteRow,
    adapter_entries: Vec<AdapterEntryData>,
) -> Result<SyncEntry, CacheError> {
    let id: String = row.try_get("id")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let entry_type: String = row.try_get("entry_type")?;
    let created_at: String = row.try_get("created_at")?;
    let modified_at: String = row.try_get("modified_at")?;
    let source_size: i64 = row.try_get("source_size")?;
    let destination_size: i64 = row.try_get("destination_size")?;

    Ok(SyncEntry::from_parts(
        parse_id(&id)?,
        parent_id.as_deref().map(parse_id::<EntryId>).transpose()?,
        row.try_get("name")?,
        entry_type_from_str(&entry_type)?,
        parse_timestamp(&created_at)?,
        parse_timestamp(&modified_at)?,
        source_size as u64,
        destination_size as u64,
        parse_hash(HashKind::Sha1, row.try_get("sha1")?)?,
        parse_hash(HashKind::Md5, row.try_get("md5")?)?,
        row.try_get("deleted")?,
        adapter_entries,
    ))
}

// ============================================================================
// IEntryRepository
// ============================================================================

#[async_trait]
impl IEntryRepository for SqliteEntryRepository {
    async fn save_entry(&self, entry: &SyncEntry) -> anyhow::Result<()> {
        let id = entry.id().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO entries \
             (id, parent_id, name, entry_type, created_at, modified_at, \
              source_size, destination_size, sha1, md5, deleted) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              parent_id = excluded.parent_id, name = excluded.name, \
              entry_type = excluded.entry_type, created_at = excluded.created_at, \
              modified_at = excluded.modified_at, source_size = excluded.source_size, \
              destination_size = excluded.destination_size, sha1 = excluded.sha1, \
              md5 = excluded.md5, deleted = excluded.deleted",
        )
        .bind(&id)
        .bind(entry.parent_id().map(|p| p.to_string()))
        .bind(entry.name())
        .bind(entry_type_to_str(entry.entry_type()))
        .bind(entry.created_at().to_rfc3339())
        .bind(entry.modified_at().to_rfc3339())
        .bind(entry.size(Side::Source) as i64)
        .bind(entry.size(Side::Destination) as i64)
        .bind(entry.hash(HashKind::Sha1).map(ContentHash::to_hex))
        .bind(entry.hash(HashKind::Md5).map(ContentHash::to_hex))
        .bind(entry.is_deleted())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM adapter_entries WHERE entry_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        for data in entry.adapter_entries() {
            sqlx::query(
                "INSERT INTO adapter_entries (entry_id, adapter_id, item_id, updated_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(data.adapter_id.to_string())
            .bind(data.item_id.as_str())
            .bind(data.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(entry_id = %id, name = entry.name(), "Saved entry");
        Ok(())
    }

    async fn get_entry(&self, id: EntryId) -> anyhow::Result<Option<SyncEntry>> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_children(&self, parent: Option<EntryId>) -> anyhow::Result<Vec<SyncEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE parent_id IS ? ORDER BY name"
        ))
        .bind(parent.map(|p| p.to_string()))
        .fetch_all(&self.pool)
        .await?;

        Ok(self.hydrate(rows).await?)
    }

    async fn upsert_adapter_entry(
        &self,
        entry_id: EntryId,
        data: &AdapterEntryData,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "INSERT INTO adapter_entries (entry_id, adapter_id, item_id, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(entry_id, adapter_id) DO UPDATE SET \
              item_id = excluded.item_id, updated_at = excluded.updated_at",
        )
        .bind(entry_id.to_string())
        .bind(data.adapter_id.to_string())
        .bind(data.item_id.as_str())
        .bind(data.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(
                    entry_id = %entry_id,
                    adapter_id = %data.adapter_id,
                    item_id = %data.item_id,
                    "Upserted adapter mapping"
                );
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                anyhow::bail!("Cannot map unknown entry {entry_id}")
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_item_id(
        &self,
        adapter_id: AdapterId,
        item_id: &ItemId,
    ) -> anyhow::Result<Option<SyncEntry>> {
        let entry_id: Option<String> = sqlx::query_scalar(
            "SELECT entry_id FROM adapter_entries WHERE adapter_id = ? AND item_id = ? LIMIT 1",
        )
        .bind(adapter_id.to_string())
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match entry_id {
            Some(id) => self.get_entry(parse_id(&id)?).await,
            None => Ok(None),
        }
    }
}
