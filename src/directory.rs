//! Student directory: identifier → display information.
//!
//! Loaded once from a CSV with a header row containing `uid` and `info`
//! columns. Rosters exported from spreadsheet tools on Chinese-locale systems
//! are often GBK rather than UTF-8, so decoding tries UTF-8 first and falls
//! back to GBK.
//!
//! The recommendation engine never looks at this table; only the serving
//! layers use it to turn identifiers into something readable.

use crate::error::{FriendRecError, Result};
use crate::model::{UserEntry, UserId};
use encoding_rs::GBK;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Text encoding a directory file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Gbk,
}

impl TextEncoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Gbk => "gbk",
        }
    }
}

/// Decode CSV bytes as UTF-8 (BOM stripped), falling back to GBK.
fn decode_text(bytes: &[u8]) -> Option<(Cow<'_, str>, TextEncoding)> {
    let without_bom = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(without_bom) {
        return Some((Cow::Borrowed(text), TextEncoding::Utf8));
    }
    GBK.decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| (text, TextEncoding::Gbk))
}

/// Placeholder shown for identifiers with no directory entry.
#[must_use]
pub fn placeholder(id: UserId) -> String {
    format!("Student {id} (no info)")
}

/// Identifier → display string table.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    entries: BTreeMap<UserId, String>,
    encoding: TextEncoding,
    skipped_rows: usize,
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::empty()
    }
}

impl UserDirectory {
    /// A directory with no entries; every lookup yields the placeholder.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            encoding: TextEncoding::Utf8,
            skipped_rows: 0,
        }
    }

    /// Build a directory from in-memory pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, info)| (UserId(id), info))
                .collect(),
            ..Self::empty()
        }
    }

    /// Load a `uid,info` CSV.
    ///
    /// Rows whose `uid` is not an integer are skipped with a warning. When a
    /// uid repeats, the last row wins.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::DirectoryLoad`] if the file cannot be read,
    /// is neither UTF-8 nor GBK, is not valid CSV, or lacks a `uid` or `info`
    /// column.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).map_err(|e| FriendRecError::directory_load(path, e.to_string()))?;

        let (text, encoding) = decode_text(&bytes).ok_or_else(|| {
            FriendRecError::directory_load(path, "file is neither valid UTF-8 nor GBK")
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| FriendRecError::directory_load(path, format!("failed to read header: {e}")))?
            .clone();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let (Some(uid_col), Some(info_col)) = (column("uid"), column("info")) else {
            let found: Vec<&str> = headers.iter().collect();
            return Err(FriendRecError::directory_load(
                path,
                format!("expected 'uid' and 'info' columns, found [{}]", found.join(", ")),
            ));
        };

        let mut entries = BTreeMap::new();
        let mut skipped_rows = 0usize;
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                FriendRecError::directory_load(path, format!("malformed CSV: {e}"))
            })?;
            // +2: one for the header, one for 1-based line numbers
            let line = row + 2;

            let Some(uid) = record.get(uid_col).and_then(|v| v.parse::<i64>().ok()) else {
                warn!(path = %path.display(), line, "Skipping row with non-integer uid");
                skipped_rows += 1;
                continue;
            };
            let info = record.get(info_col).unwrap_or_default().to_string();
            entries.insert(UserId(uid), info);
        }

        info!(
            path = %path.display(),
            entries = entries.len(),
            skipped = skipped_rows,
            encoding = encoding.as_str(),
            "Loaded user directory"
        );

        Ok(Self {
            entries,
            encoding,
            skipped_rows,
        })
    }

    /// Load a directory, degrading to an empty one on any failure.
    ///
    /// Used at startup: a missing or broken roster only costs display
    /// names, so it is logged and the service keeps going.
    #[must_use]
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No user directory configured; showing identifiers only");
            return Self::empty();
        };

        match crate::timed!(crate::perf::DIRECTORY_LOAD, Self::load(path)) {
            Ok(directory) => directory,
            Err(e) => {
                warn!(error = %e, "User directory unavailable; showing identifiers only");
                Self::empty()
            }
        }
    }

    /// Display info for `id`, if present.
    #[must_use]
    pub fn get(&self, id: UserId) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    /// Display info for `id`, or the placeholder.
    #[must_use]
    pub fn display(&self, id: UserId) -> String {
        self.get(id).map_or_else(|| placeholder(id), ToString::to_string)
    }

    /// All entries in ascending identifier order.
    pub fn entries(&self) -> impl Iterator<Item = UserEntry> + '_ {
        self.entries.iter().map(|(uid, info)| UserEntry {
            uid: *uid,
            info: info.clone(),
        })
    }

    /// All identifiers in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoding the source file was decoded with.
    #[must_use]
    pub const fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Rows dropped for having a non-integer uid.
    #[must_use]
    pub const fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}
