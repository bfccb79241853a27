use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::debug;

use super::ZoteroError;
use super::record::{ItemRecord, extract_year};

/// Zotero field ID of an item's title.
pub const TITLE_FIELD_ID: i64 = 110;

/// Zotero field ID of an item's raw date.
pub const DATE_FIELD_ID: i64 = 115;

/// Read-only handle on a Zotero SQLite database.
///
/// The connection is closed when the store is dropped.
pub struct ZoteroStore {
    conn: Connection,
}

impl ZoteroStore {
    /// Opens an existing Zotero database read-only.
    ///
    /// # Errors
    ///
    /// Returns `ZoteroError::NotFound` if `path` does not exist, or
    /// `ZoteroError::Sqlite` if SQLite cannot open it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ZoteroError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ZoteroError::NotFound(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(path = %path.display(), "opened zotero database");

        Ok(Self { conn })
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns every collection name once, sorted ascending.
    pub fn list_collections(&self) -> Result<Vec<String>, ZoteroError> {
        let mut stmt = self.conn.prepare("SELECT collectionName FROM collections")?;
        let names = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let unique: BTreeSet<String> = names.into_iter().flatten().collect();
        Ok(unique.into_iter().collect())
    }

    /// Resolves a collection name to its ID, lowest ID first on duplicates.
    pub fn collection_id(&self, collection_name: &str) -> Result<Option<i64>, ZoteroError> {
        let id = self
            .conn
            .query_row(
                "SELECT collectionID FROM collections WHERE collectionName = ?1
                 ORDER BY collectionID LIMIT 1",
                params![collection_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Returns the member item IDs of a collection in collection order.
    pub fn collection_item_ids(&self, collection_id: i64) -> Result<Vec<i64>, ZoteroError> {
        let mut stmt = self.conn.prepare(
            "SELECT itemID FROM collectionItems WHERE collectionID = ?1
             ORDER BY orderIndex, itemID",
        )?;
        let ids = stmt
            .query_map(params![collection_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Builds the metadata records of every item in the named collection.
    ///
    /// An unknown collection yields an empty list. With `require_attachment`
    /// items without a key are left out.
    pub fn get_collection_items(
        &self,
        collection_name: &str,
        require_attachment: bool,
    ) -> Result<Vec<ItemRecord>, ZoteroError> {
        let Some(collection_id) = self.collection_id(collection_name)? else {
            debug!(collection_name, "no such collection");
            return Ok(Vec::new());
        };

        let item_ids = self.collection_item_ids(collection_id)?;
        debug!(collection_name, collection_id, items = item_ids.len(), "resolved collection");

        let mut records = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let record = self.item_record(item_id)?;
            if require_attachment && !record.has_attachment() {
                continue;
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Joins key, title, creators and date for one item.
    pub fn item_record(&self, item_id: i64) -> Result<ItemRecord, ZoteroError> {
        let key = self.item_key(item_id)?.unwrap_or_default();
        let title = self.field_value(item_id, TITLE_FIELD_ID)?.unwrap_or_default();
        let date = self.field_value(item_id, DATE_FIELD_ID)?.unwrap_or_default();
        let authors = self.creator_surnames(item_id)?.join("; ");

        Ok(ItemRecord {
            item_id,
            title,
            authors,
            year: extract_year(&date),
            key,
        })
    }

    fn item_key(&self, item_id: i64) -> Result<Option<String>, ZoteroError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key FROM items WHERE itemID = ?1")?;
        let key = stmt
            .query_row(params![item_id], |row| row.get::<_, Option<String>>(0))
            .optional()?;
        Ok(key.flatten())
    }

    fn field_value(&self, item_id: i64, field_id: i64) -> Result<Option<String>, ZoteroError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT itemDataValues.value
             FROM itemData
             JOIN itemDataValues ON itemData.valueID = itemDataValues.valueID
             WHERE itemData.itemID = ?1 AND itemData.fieldID = ?2",
        )?;
        let value = stmt
            .query_row(params![item_id, field_id], |row| row.get::<_, Value>(0))
            .optional()?;
        Ok(value.and_then(value_to_string))
    }

    fn creator_surnames(&self, item_id: i64) -> Result<Vec<String>, ZoteroError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT creators.lastName
             FROM itemCreators
             JOIN creators ON itemCreators.creatorID = creators.creatorID
             WHERE itemCreators.itemID = ?1
             ORDER BY itemCreators.orderIndex",
        )?;
        let names = stmt
            .query_map(params![item_id], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        // NULL surnames are skipped; empty ones still take a slot.
        Ok(names.into_iter().flatten().collect())
    }
}

/// `itemDataValues.value` is untyped; render whatever is stored as text.
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
