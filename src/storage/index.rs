//! Index log: the `(id, timestamp)` record of every committed event
//!
//! The index is the commit point of the store. An event exists once its
//! index record is appended, and ids are assigned strictly in sequence.
//!
//! Format per record (UTF-8 text):
//! ```text
//! <id>,<timestamp>\n
//! ```
//!
//! On open, only the last record is read (backward, in blocks) to resume id
//! assignment. A torn final record from an interrupted append is dropped.

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::tail::{self, BLOCK_SIZE};
use crate::storage::types::IndexEntry;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// File name of the index log inside the data directory
pub const INDEX_FILE: &str = "index.int";

/// Append-only index log
pub struct IndexLog {
    /// Append handle, held for the store's lifetime
    file: File,
    /// Path to the index file
    path: PathBuf,
    /// Committed length in bytes
    len: u64,
    /// Highest committed id (0 when empty)
    last_id: u64,
}

impl IndexLog {
    /// Open or create the index log and recover the last assigned id
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::io(&path, "open"))?;

        let len = tail::repair_torn_tail(&mut file, &path)?;

        let last_id = match tail::last_record(&mut file, len, BLOCK_SIZE)
            .map_err(StoreError::io(&path, "read"))?
        {
            Some(record) => {
                let entry = IndexEntry::parse(&record.line).ok_or_else(|| StoreError::Parse {
                    path: path.clone(),
                    kind: "index record",
                    text: record.line.clone(),
                })?;
                entry.id
            }
            None => 0,
        };

        tracing::debug!("Index {:?} recovered at id {}", path, last_id);

        Ok(Self {
            file,
            path,
            len,
            last_id,
        })
    }

    /// Highest committed id
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Id the next committed event will receive
    pub fn next_id(&self) -> StoreResult<u64> {
        self.last_id.checked_add(1).ok_or_else(|| {
            StoreError::Corruption(format!(
                "index {:?} ends at id {}, no ids left to assign",
                self.path, self.last_id
            ))
        })
    }

    /// Committed size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. This commits the event with that id.
    ///
    /// Returns the number of bytes written. On failure the file is cut back
    /// to its previous length.
    pub fn append(&mut self, entry: IndexEntry) -> StoreResult<usize> {
        let expected = self.next_id()?;
        if entry.id != expected {
            return Err(StoreError::Corruption(format!(
                "index append out of sequence: expected id {}, got {}",
                expected, entry.id
            )));
        }

        let line = entry.to_line();
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            if let Err(trunc) = self.file.set_len(self.len) {
                tracing::error!("Failed to roll back index {:?}: {}", self.path, trunc);
            }
            return Err(StoreError::io(&self.path, "append")(e));
        }

        self.len += line.len() as u64;
        self.last_id = entry.id;
        Ok(line.len())
    }

    /// Read all committed records in file order
    pub fn entries(&self) -> StoreResult<Vec<IndexEntry>> {
        let file = File::open(&self.path).map_err(StoreError::io(&self.path, "open"))?;
        let reader = BufReader::new(file.take(self.len));
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(StoreError::io(&self.path, "read"))?;
            let entry = IndexEntry::parse(&line).ok_or_else(|| StoreError::Parse {
                path: self.path.clone(),
                kind: "index record",
                text: line.clone(),
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Resolve the record for `id`
    pub fn entry_at(&self, id: u64) -> StoreResult<IndexEntry> {
        if id == 0 || id > self.last_id {
            return Err(StoreError::NotFound(id));
        }

        let entries = self.entries()?;
        let entry = entries
            .get((id - 1) as usize)
            .copied()
            .ok_or(StoreError::NotFound(id))?;

        if entry.id != id {
            return Err(StoreError::Corruption(format!(
                "index record {} holds id {}",
                id, entry.id
            )));
        }

        Ok(entry)
    }

    /// Force sync to disk
    pub fn sync(&self) -> StoreResult<()> {
        self.file
            .sync_data()
            .map_err(StoreError::io(&self.path, "sync"))
    }
}
