use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Leading four-digit run of a raw date field, e.g. `2023` in `2023-05-01 2023-05-01`.
static LEADING_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([0-9]{4})").unwrap());

/// Metadata for one item of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(rename = "itemID")]
    pub item_id: i64,
    pub title: String,
    /// Creator surnames in author order, joined with `"; "`
    pub authors: String,
    /// Four-digit year or empty
    pub year: String,
    /// Attachment folder name under `storage/`, or empty
    pub key: String,
}

impl ItemRecord {
    /// Returns true if the item has a resolvable attachment key.
    pub fn has_attachment(&self) -> bool {
        !self.key.is_empty()
    }

    /// Returns the folder holding the item's files inside a Zotero data directory.
    ///
    /// ```
    /// use std::path::Path;
    /// use papertrail::zotero::ItemRecord;
    ///
    /// let record = ItemRecord {
    ///     item_id: 1,
    ///     title: "A".into(),
    ///     authors: String::new(),
    ///     year: String::new(),
    ///     key: "ABCD1234".into(),
    /// };
    /// assert_eq!(
    ///     record.storage_dir(Path::new("/home/me/Zotero")),
    ///     Some(Path::new("/home/me/Zotero/storage/ABCD1234").to_path_buf())
    /// );
    /// ```
    pub fn storage_dir(&self, zotero_dir: &Path) -> Option<PathBuf> {
        if self.has_attachment() {
            Some(zotero_dir.join("storage").join(&self.key))
        } else {
            None
        }
    }
}

/// Extracts the year from a raw Zotero date value.
///
/// Returns the leading four-digit run, or an empty string when the value does
/// not start with four digits.
pub fn extract_year(date: &str) -> String {
    LEADING_YEAR
        .captures(date)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
