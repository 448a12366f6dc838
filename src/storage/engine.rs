//! colstore Storage Engine
//!
//! The event store orchestrates all components:
//! - Write path: Fields → Stage → Column rows → Index record (commit)
//! - Read path: Index → Column files → Event
//!
//! Thread-safe via Tokio's async RwLock: a save holds the write guard for the
//! whole operation, reads hold a read guard, so no reader ever observes a
//! partially written event.

use crate::storage::clock::Clock;
use crate::storage::column::ColumnStore;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::filter::Query;
use crate::storage::index::{IndexLog, INDEX_FILE};
use crate::storage::reader::Reader;
use crate::storage::types::{Event, Fields, IndexEntry, ValueKind};
use crate::storage::writer::{Commit, StagedEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// When appended rows are forced to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fsync every touched file on each save (safest, slowest)
    EveryWrite,
    /// Fsync all files once enough bytes accumulate (balanced)
    #[default]
    Batched,
    /// Only fsync on explicit flush or close (fastest, risk of loss)
    None,
}

/// Configuration for the event store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the index and column files
    pub data_dir: PathBuf,
    /// Fsync strategy
    pub sync_mode: SyncMode,
    /// Bytes between syncs in `SyncMode::Batched` (default: 64KB)
    pub sync_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("colstore_data"),
            sync_mode: SyncMode::Batched,
            sync_threshold: 64 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Builder: set the sync mode
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Get path to the index log
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE)
    }
}

/// Open logs; dropped on close
struct StoreState {
    index: IndexLog,
    columns: ColumnStore,
    bytes_since_sync: usize,
    /// Set when a failed save left rows behind; cleared by reopening
    poisoned: bool,
}

impl StoreState {
    fn reader(&self) -> Reader<'_> {
        Reader::new(&self.index, &self.columns)
    }

    fn sync_all(&mut self) -> StoreResult<()> {
        self.index.sync()?;
        self.columns.sync_all()?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Apply the sync policy to a finished commit
    fn after_commit(&mut self, config: &StoreConfig, commit: &Commit) -> StoreResult<()> {
        match config.sync_mode {
            SyncMode::EveryWrite => {
                for key in &commit.touched {
                    if let Some(column) = self.columns.get(key) {
                        column.sync()?;
                    }
                }
                self.index.sync()?;
            }
            SyncMode::Batched => {
                self.bytes_since_sync += commit.bytes;
                if self.bytes_since_sync >= config.sync_threshold {
                    self.sync_all()?;
                }
            }
            SyncMode::None => {}
        }
        Ok(())
    }
}

/// The column-oriented event store
pub struct EventStore {
    /// Configuration
    config: StoreConfig,
    /// Source of ingestion timestamps
    clock: Arc<dyn Clock>,
    /// Open logs, `None` once closed
    state: RwLock<Option<StoreState>>,
}

impl EventStore {
    /// Open the store, creating the data directory if needed.
    ///
    /// Reopening an existing directory recovers the last assigned id and
    /// drops any rows of a save that never committed.
    pub async fn open(config: StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(StoreError::io(&config.data_dir, "create_dir"))?;

        let index = IndexLog::open(config.index_path())?;
        let columns = ColumnStore::open(&config.data_dir, index.last_id())?;

        tracing::info!(
            "Opened store at {:?}: {} events, {} columns",
            config.data_dir,
            index.last_id(),
            columns.len()
        );

        Ok(Self {
            config,
            clock,
            state: RwLock::new(Some(StoreState {
                index,
                columns,
                bytes_since_sync: 0,
                poisoned: false,
            })),
        })
    }

    /// Save one event and return its id.
    ///
    /// The event is all-or-nothing: on error no row of it is visible and its
    /// id is not consumed. A sync failure under `SyncMode::EveryWrite` is
    /// reported after the event has committed.
    pub async fn save_event(&self, fields: &Fields) -> StoreResult<u64> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        if state.poisoned {
            return Err(StoreError::Poisoned(
                "an earlier save could not be rolled back".to_string(),
            ));
        }

        let entry = IndexEntry::new(state.index.next_id()?, self.clock.now());
        let staged = StagedEvent::stage(&state.columns, entry, fields)?;
        let commit = match staged.promote(&mut state.index, &mut state.columns) {
            Ok(commit) => commit,
            Err(e) => {
                if matches!(e, StoreError::Poisoned(_)) {
                    tracing::error!("Refusing further saves until reopen: {}", e);
                    state.poisoned = true;
                }
                return Err(e);
            }
        };

        tracing::debug!(
            "Saved event {} ({} fields, {} bytes)",
            commit.id,
            fields.len(),
            commit.bytes
        );

        state.after_commit(&self.config, &commit)?;
        Ok(commit.id)
    }

    /// Look up one event by id
    pub async fn get_event(&self, id: u64) -> StoreResult<Event> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        state.reader().get_event(id)
    }

    /// Average of a numeric field
    pub async fn avg(&self, field: &str) -> StoreResult<f64> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        state.reader().avg(field)
    }

    /// Events matching every predicate of `query`, in id order.
    ///
    /// An empty query returns no events.
    pub async fn filter(&self, query: &Query) -> StoreResult<Vec<Event>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        state.reader().filter(query)
    }

    /// Highest committed id (0 for an empty store)
    pub async fn last_id(&self) -> StoreResult<u64> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state.index.last_id())
    }

    /// Field name to established kind
    pub async fn schema(&self) -> StoreResult<BTreeMap<String, ValueKind>> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state.columns.schema())
    }

    /// Get storage statistics
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;

        Ok(StoreStats {
            event_count: state.index.last_id(),
            column_count: state.columns.len(),
            storage_size_bytes: state.index.len() + state.columns.size_bytes(),
        })
    }

    /// Force every log to disk
    pub async fn flush(&self) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        state.sync_all()
    }

    /// Sync and release every file handle. Closing twice is a no-op.
    pub async fn close(&self) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        if let Some(mut state) = guard.take() {
            state.sync_all()?;
            tracing::info!(
                "Closed store at {:?} at id {}",
                self.config.data_dir,
                state.index.last_id()
            );
        }
        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }
}

/// Storage statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub event_count: u64,
    pub column_count: usize,
    pub storage_size_bytes: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Events: {}, Columns: {}, Size: {:.2} MB",
            self.event_count,
            self.column_count,
            self.storage_size_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}
