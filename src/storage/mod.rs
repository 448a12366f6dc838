//! colstore Storage Engine
//!
//! This module provides the column-oriented event storage:
//!
//! - **types**: Core data structures (Value, ValueKind, Event, IndexEntry)
//! - **clock**: Timestamp source, injectable for tests
//! - **index**: The `index.int` log of `(id, timestamp)` records
//! - **column**: One append-only file per `(field, kind)`
//! - **filter**: Predicates and queries for `EventStore::filter`
//! - **engine**: The event store orchestrating all components
//! - **error**: Error types
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//!   index.int            1,1700000000
//!                        2,1700000010
//!   status.int           1,200
//!   error.string         2,tea pot
//!   response_time.float  1,46.3
//!                        2,12.5
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use colstore::storage::{EventStore, StoreConfig, SystemClock, Event, Operator, Query};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EventStore::open(StoreConfig::new("./data"), Arc::new(SystemClock)).await?;
//!
//!     let fields = Event::new(0, 0).field("status", 200).field("error", "tea pot").fields;
//!     let id = store.save_event(&fields).await?;
//!
//!     let event = store.get_event(id).await?;
//!     let teapots = store.filter(&Query::new().filter("status", Operator::Eq, 200)).await?;
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod column;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
mod reader;
pub(crate) mod tail;
pub mod types;
mod writer;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use column::{ColumnKey, TIMESTAMP_FIELD};
pub use engine::{EventStore, StoreConfig, StoreStats, SyncMode};
pub use error::{StoreError, StoreResult};
pub use filter::{Operator, Predicate, Query};
pub use index::INDEX_FILE;
pub use types::{Event, Fields, IndexEntry, Value, ValueKind};
