//! Event write path: stage, then promote
//!
//! Saving an event never leaves a partial event behind:
//!
//! ```text
//! stage:   validate names → infer kinds → check type tags → encode rows   (memory only)
//! promote: append column rows → append index record (commit point)
//!          └─ any failure: truncate touched columns, delete created ones
//! ```
//!
//! Both steps run under the store's write lock, so readers see either the
//! whole event or none of it.

use crate::storage::column::{ColumnKey, ColumnStore};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::index::IndexLog;
use crate::storage::types::{Fields, IndexEntry, Value, ValueKind};

/// One encoded column row waiting to be appended
#[derive(Debug, Clone)]
struct StagedRow {
    key: ColumnKey,
    line: String,
}

/// An event fully encoded in memory
#[derive(Debug, Clone)]
pub(crate) struct StagedEvent {
    entry: IndexEntry,
    rows: Vec<StagedRow>,
}

/// Outcome of a successful promotion
#[derive(Debug, Clone)]
pub(crate) struct Commit {
    pub id: u64,
    /// Bytes appended across all logs
    pub bytes: usize,
    /// Columns that received a row
    pub touched: Vec<ColumnKey>,
}

/// Undo record for one column touched during promotion
struct Undo {
    key: ColumnKey,
    prev_len: u64,
    created: bool,
}

impl StagedEvent {
    /// Encode every field of an event without touching disk
    pub(crate) fn stage(columns: &ColumnStore, entry: IndexEntry, fields: &Fields) -> StoreResult<Self> {
        let mut rows = Vec::with_capacity(fields.len());

        for (name, value) in fields {
            let key = ColumnKey::new(name.as_str(), ValueKind::of(value));
            key.validate()?;

            if let Some(established) = columns.established_kind(name) {
                if established != key.kind {
                    return Err(StoreError::TypeMismatch {
                        field: name.clone(),
                        established,
                        attempted: key.kind,
                    });
                }
            }

            if let Value::Text(text) = value {
                if text.contains(|c: char| c == '\n' || c == '\r') {
                    return Err(StoreError::UnencodableValue {
                        field: name.clone(),
                        reason: "text contains a line break, which is the row delimiter",
                    });
                }
            }

            rows.push(StagedRow {
                key,
                line: format!("{},{}\n", entry.id, value),
            });
        }

        Ok(Self { entry, rows })
    }

    pub(crate) fn id(&self) -> u64 {
        self.entry.id
    }

    /// Append the staged rows, then the index record.
    ///
    /// On failure every column touched is restored before the error is returned.
    pub(crate) fn promote(self, index: &mut IndexLog, columns: &mut ColumnStore) -> StoreResult<Commit> {
        let mut journal: Vec<Undo> = Vec::with_capacity(self.rows.len());
        let mut bytes = 0;

        for row in &self.rows {
            let result = columns.get_or_create(&row.key).and_then(|(column, created)| {
                journal.push(Undo {
                    key: row.key.clone(),
                    prev_len: column.len(),
                    created,
                });
                column.append(row.line.as_bytes())
            });

            if let Err(e) = result {
                return Err(rollback(columns, journal, self.entry.id, e));
            }
            bytes += row.line.len();
        }

        match index.append(self.entry) {
            Ok(written) => bytes += written,
            Err(e) => return Err(rollback(columns, journal, self.entry.id, e)),
        }

        Ok(Commit {
            id: self.entry.id,
            bytes,
            touched: journal.into_iter().map(|undo| undo.key).collect(),
        })
    }
}

/// Restore touched columns, newest first, and return the error to report.
///
/// If any step fails the uncommitted rows of event `id` stay on disk while
/// the id is free again, so the error becomes `Poisoned`. Reopening the
/// store drops those rows.
fn rollback(columns: &mut ColumnStore, journal: Vec<Undo>, id: u64, cause: StoreError) -> StoreError {
    let mut failed = 0;
    for undo in journal.into_iter().rev() {
        let result = if undo.created {
            columns.discard(&undo.key)
        } else {
            match columns.get_mut(&undo.key) {
                Some(column) => column.truncate(undo.prev_len),
                None => Ok(()),
            }
        };

        if let Err(e) = result {
            tracing::error!("Rollback of column {} failed: {}", undo.key.file_name(), e);
            failed += 1;
        }
    }

    if failed == 0 {
        return cause;
    }
    StoreError::Poisoned(format!(
        "save of event {} failed ({}) and {} column(s) could not be rolled back",
        id, cause, failed
    ))
}
