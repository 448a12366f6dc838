//! Column files: one append-only `(id, value)` log per field and kind
//!
//! A column file is named `<field>.<kind>` where the kind extension is the
//! type tag fixed by the field's first write. Rows are only written for
//! events that carry the field, so columns are sparse and must be searched
//! by id, never indexed by position. Ids within a column strictly increase.
//!
//! Format per row (UTF-8 text):
//! ```text
//! <id>,<value>\n
//! ```
//!
//! Rows are not escaped. The id never contains a comma, so rows split at the
//! first comma and commas inside text survive. A text value containing a
//! line break would split the row in two, and is refused at staging time
//! (see `StoreError::UnencodableValue`).

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::index::INDEX_FILE;
use crate::storage::tail::{self, BLOCK_SIZE};
use crate::storage::types::{Value, ValueKind};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Read, Take, Write};
use std::path::{Path, PathBuf};

/// Field name reserved for the index timestamp in filters
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Identity of a column file
///
/// Keys order by field, then kind. Within one field this is the order of a
/// sorted directory listing, which decides which column is "first".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub field: String,
    pub kind: ValueKind,
}

impl ColumnKey {
    pub fn new(field: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// File name inside the data directory
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.field, self.kind)
    }

    /// Recognize a column file name; other files yield `None`
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name == INDEX_FILE {
            return None;
        }
        let (field, ext) = name.rsplit_once('.')?;
        if field.is_empty() {
            return None;
        }
        Some(Self::new(field, ValueKind::from_extension(ext)?))
    }

    /// Check that this key maps to a safe, unambiguous file
    pub fn validate(&self) -> StoreResult<()> {
        let invalid = |reason| {
            Err(StoreError::InvalidField {
                field: self.field.clone(),
                reason,
            })
        };

        if self.field.is_empty() {
            return invalid("field name is empty");
        }
        if self.field == TIMESTAMP_FIELD {
            return invalid("'timestamp' is reserved for the event timestamp");
        }
        if self
            .field
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\n' | '\r' | '\0'))
        {
            return invalid("field name contains a path separator or control character");
        }
        if self.file_name() == INDEX_FILE {
            return invalid("column file would collide with the index log");
        }
        Ok(())
    }
}

/// One stored row, value still in text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u64,
    pub text: String,
}

impl Row {
    fn parse(line: &str, path: &Path) -> StoreResult<Self> {
        let malformed = || StoreError::Parse {
            path: path.to_path_buf(),
            kind: "row",
            text: line.to_string(),
        };

        let (id, text) = line.split_once(',').ok_or_else(malformed)?;
        let id = id.parse().map_err(|_| malformed())?;
        Ok(Self {
            id,
            text: text.to_string(),
        })
    }
}

/// Streaming iterator over the committed rows of a column
pub struct RowIter {
    lines: Lines<BufReader<Take<File>>>,
    path: PathBuf,
}

impl Iterator for RowIter {
    type Item = StoreResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(StoreError::io(&self.path, "read")(e))),
        };
        Some(Row::parse(&line, &self.path))
    }
}

/// An open column file
pub struct ColumnFile {
    key: ColumnKey,
    path: PathBuf,
    /// Append handle, held for the store's lifetime
    file: File,
    /// Committed length in bytes
    len: u64,
}

impl ColumnFile {
    fn open(key: ColumnKey, path: PathBuf) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::io(&path, "open"))?;
        let len = file.metadata().map_err(StoreError::io(&path, "stat"))?.len();

        Ok(Self {
            key,
            path,
            file,
            len,
        })
    }

    pub fn key(&self) -> &ColumnKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Committed size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one encoded row. On failure the file is cut back to its previous length.
    pub(crate) fn append(&mut self, row: &[u8]) -> StoreResult<()> {
        if let Err(e) = self.file.write_all(row) {
            if let Err(trunc) = self.file.set_len(self.len) {
                tracing::error!("Failed to roll back column {:?}: {}", self.path, trunc);
            }
            return Err(StoreError::io(&self.path, "append")(e));
        }
        self.len += row.len() as u64;
        Ok(())
    }

    /// Cut the file back to `len` bytes
    pub(crate) fn truncate(&mut self, len: u64) -> StoreResult<()> {
        self.file
            .set_len(len)
            .map_err(StoreError::io(&self.path, "truncate"))?;
        self.len = len;
        Ok(())
    }

    /// Drop torn and uncommitted rows at the end of the file.
    ///
    /// Rows with an id above `last_id` belong to a save whose index record
    /// was never written. Returns the number of rows dropped.
    fn repair(&mut self, last_id: u64) -> StoreResult<usize> {
        self.len = tail::repair_torn_tail(&mut self.file, &self.path)?;

        let mut dropped = 0;
        while let Some(record) = tail::last_record(&mut self.file, self.len, BLOCK_SIZE)
            .map_err(StoreError::io(&self.path, "read"))?
        {
            let row = Row::parse(&record.line, &self.path)?;
            if row.id <= last_id {
                break;
            }
            self.truncate(record.start)?;
            dropped += 1;
        }

        if dropped > 0 {
            tracing::warn!(
                "Dropped {} uncommitted rows from {:?} (index ends at id {})",
                dropped,
                self.path,
                last_id
            );
        }
        Ok(dropped)
    }

    /// Stream committed rows in file (id) order
    pub fn rows(&self) -> StoreResult<RowIter> {
        let file = File::open(&self.path).map_err(StoreError::io(&self.path, "open"))?;
        Ok(RowIter {
            lines: BufReader::new(file.take(self.len)).lines(),
            path: self.path.clone(),
        })
    }

    /// Convert a row's text to this column's kind
    pub fn decode(&self, row: &Row) -> StoreResult<Value> {
        self.key
            .kind
            .decode(&row.text)
            .ok_or_else(|| StoreError::Parse {
                path: self.path.clone(),
                kind: self.key.kind.as_str(),
                text: row.text.clone(),
            })
    }

    /// Find the value stored for `id`, stopping once ids pass it
    pub fn find(&self, id: u64) -> StoreResult<Option<Value>> {
        for row in self.rows()? {
            let row = row?;
            if row.id == id {
                return self.decode(&row).map(Some);
            }
            if row.id > id {
                break;
            }
        }
        Ok(None)
    }

    pub fn sync(&self) -> StoreResult<()> {
        self.file
            .sync_data()
            .map_err(StoreError::io(&self.path, "sync"))
    }
}

/// All column files of a data directory
pub struct ColumnStore {
    dir: PathBuf,
    columns: BTreeMap<ColumnKey, ColumnFile>,
}

impl ColumnStore {
    /// Open every column file in `dir`, repairing tails against the index
    pub fn open(dir: impl AsRef<Path>, last_id: u64) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut columns = BTreeMap::new();

        for entry in std::fs::read_dir(&dir).map_err(StoreError::io(&dir, "read_dir"))? {
            let entry = entry.map_err(StoreError::io(&dir, "read_dir"))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(ColumnKey::from_file_name) else {
                tracing::debug!("Ignoring non-column file {:?}", path);
                continue;
            };

            let mut column = ColumnFile::open(key.clone(), path)?;
            column.repair(last_id)?;
            columns.insert(key, column);
        }

        Ok(Self { dir, columns })
    }

    /// Kind fixed by the field's first write, if the field exists
    pub fn established_kind(&self, field: &str) -> Option<ValueKind> {
        self.columns_for(field).next().map(|c| c.key.kind)
    }

    /// Column files backing a logical field, first-found first
    pub fn columns_for(&self, field: &str) -> impl Iterator<Item = &ColumnFile> + '_ {
        let lo = ColumnKey::new(field, ValueKind::Bool);
        let hi = ColumnKey::new(field, ValueKind::Text);
        self.columns.range(lo..=hi).map(|(_, column)| column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnFile> + '_ {
        self.columns.values()
    }

    pub fn get(&self, key: &ColumnKey) -> Option<&ColumnFile> {
        self.columns.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &ColumnKey) -> Option<&mut ColumnFile> {
        self.columns.get_mut(key)
    }

    /// Number of column files
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Field name to established kind
    pub fn schema(&self) -> BTreeMap<String, ValueKind> {
        let mut schema = BTreeMap::new();
        for key in self.columns.keys() {
            schema.entry(key.field.clone()).or_insert(key.kind);
        }
        schema
    }

    /// Total committed bytes across all columns
    pub fn size_bytes(&self) -> u64 {
        self.columns.values().map(|c| c.len).sum()
    }

    /// Open the column for `key`, creating its file on first use.
    ///
    /// Returns the column and whether this call created the file.
    pub(crate) fn get_or_create(&mut self, key: &ColumnKey) -> StoreResult<(&mut ColumnFile, bool)> {
        match self.columns.entry(key.clone()) {
            Entry::Occupied(entry) => Ok((entry.into_mut(), false)),
            Entry::Vacant(entry) => {
                let path = self.dir.join(key.file_name());

                let created = match OpenOptions::new().write(true).create_new(true).open(&path) {
                    Ok(_) => true,
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
                    Err(e) => return Err(StoreError::io(&path, "create")(e)),
                };
                if created {
                    tracing::debug!("Created column {:?}", path);
                }

                let column = ColumnFile::open(key.clone(), path)?;
                Ok((entry.insert(column), created))
            }
        }
    }

    /// Close and delete a column created by a save that is being rolled back
    pub(crate) fn discard(&mut self, key: &ColumnKey) -> StoreResult<()> {
        if let Some(column) = self.columns.remove(key) {
            let path = column.path.clone();
            drop(column);
            std::fs::remove_file(&path).map_err(StoreError::io(&path, "remove"))?;
        }
        Ok(())
    }

    /// Force sync of every column to disk
    pub fn sync_all(&self) -> StoreResult<()> {
        for column in self.columns.values() {
            column.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_names() {
        let key = ColumnKey::new("response_time", ValueKind::Float);
        assert_eq!(key.file_name(), "response_time.float");
        assert_eq!(ColumnKey::from_file_name("response_time.float"), Some(key));

        assert_eq!(
            ColumnKey::from_file_name("http.status.int"),
            Some(ColumnKey::new("http.status", ValueKind::Int))
        );
        assert_eq!(ColumnKey::from_file_name(INDEX_FILE), None);
        assert_eq!(ColumnKey::from_file_name(".keep"), None);
        assert_eq!(ColumnKey::from_file_name("notes.txt"), None);
        assert_eq!(ColumnKey::from_file_name("noext"), None);
    }

    #[test]
    fn test_validate() {
        assert!(ColumnKey::new("status", ValueKind::Int).validate().is_ok());
        assert!(ColumnKey::new("index", ValueKind::Float).validate().is_ok());

        for key in [
            ColumnKey::new("", ValueKind::Int),
            ColumnKey::new("timestamp", ValueKind::Int),
            ColumnKey::new("../etc", ValueKind::Text),
            ColumnKey::new("a\nb", ValueKind::Text),
            ColumnKey::new("index", ValueKind::Int),
        ] {
            assert!(
                matches!(key.validate(), Err(StoreError::InvalidField { .. })),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_lazy_create_and_find() {
        let dir = tempdir().unwrap();
        let mut store = ColumnStore::open(dir.path(), 0).unwrap();
        assert!(store.is_empty());

        let key = ColumnKey::new("duration", ValueKind::Int);
        let (column, created) = store.get_or_create(&key).unwrap();
        assert!(created);
        column.append(b"1,100\n").unwrap();
        column.append(b"3,300\n").unwrap();

        let (_, created) = store.get_or_create(&key).unwrap();
        assert!(!created);

        let column = store.get(&key).unwrap();
        assert_eq!(column.find(1).unwrap(), Some(Value::Integer(100)));
        assert_eq!(column.find(2).unwrap(), None);
        assert_eq!(column.find(3).unwrap(), Some(Value::Integer(300)));
        assert_eq!(column.find(4).unwrap(), None);
        assert!(dir.path().join("duration.int").exists());
    }

    #[test]
    fn test_find_stops_before_malformed_tail() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.int"), "1,1\n2,2\n3,3\n").unwrap();
        std::fs::write(dir.path().join("count.int"), "1,10\n2,20\n3,oops\n").unwrap();

        let store = ColumnStore::open(dir.path(), 3).unwrap();
        let column = store.get(&ColumnKey::new("count", ValueKind::Int)).unwrap();

        assert_eq!(column.find(1).unwrap(), Some(Value::Integer(10)));
        assert!(matches!(column.find(3), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_open_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".keep"), "").unwrap();
        std::fs::write(dir.path().join("index.int"), "1,5\n").unwrap();
        std::fs::write(dir.path().join("error.string"), "1,tea pot\n").unwrap();
        std::fs::create_dir(dir.path().join("nested.int")).unwrap();

        let store = ColumnStore::open(dir.path(), 1).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.established_kind("error"), Some(ValueKind::Text));
    }

    #[test]
    fn test_open_trims_uncommitted_rows() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("duration.int"), "1,100\n2,200\n3,300\n4,4").unwrap();

        let store = ColumnStore::open(dir.path(), 2).unwrap();
        let column = store.get(&ColumnKey::new("duration", ValueKind::Int)).unwrap();

        assert_eq!(column.len(), 12);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("duration.int")).unwrap(),
            "1,100\n2,200\n"
        );
    }

    #[test]
    fn test_columns_for_orders_by_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("latency.int"), "1,5\n").unwrap();
        std::fs::write(dir.path().join("latency.float"), "2,5.5\n").unwrap();
        std::fs::write(dir.path().join("latency_p99.float"), "1,9.5\n").unwrap();

        let store = ColumnStore::open(dir.path(), 2).unwrap();
        let kinds: Vec<ValueKind> = store.columns_for("latency").map(|c| c.key().kind).collect();

        assert_eq!(kinds, vec![ValueKind::Float, ValueKind::Int]);
        assert_eq!(store.established_kind("latency"), Some(ValueKind::Float));
        assert_eq!(store.schema().len(), 2);
    }

    #[test]
    fn test_text_with_commas() {
        let dir = tempdir().unwrap();
        let mut store = ColumnStore::open(dir.path(), 0).unwrap();
        let key = ColumnKey::new("message", ValueKind::Text);

        let (column, _) = store.get_or_create(&key).unwrap();
        column.append(b"1,a,b,c\n").unwrap();

        let column = store.get(&key).unwrap();
        assert_eq!(column.find(1).unwrap(), Some(Value::from("a,b,c")));
    }

    #[test]
    fn test_discard_removes_file() {
        let dir = tempdir().unwrap();
        let mut store = ColumnStore::open(dir.path(), 0).unwrap();
        let key = ColumnKey::new("success", ValueKind::Bool);

        store.get_or_create(&key).unwrap();
        assert!(dir.path().join("success.bool").exists());

        store.discard(&key).unwrap();
        assert!(store.get(&key).is_none());
        assert!(!dir.path().join("success.bool").exists());
    }
}
