//! colstore Filter Language
//!
//! Parses the textual form of a [`Query`](crate::storage::Query), used by the
//! command line tool:
//!
//! ```text
//! field op literal [AND field op literal ...]
//!
//! op      := = | < | <= | > | >=
//! literal := 42 | -1.5 | true | false | 'quoted text'
//! ```
//!
//! # Examples
//!
//! ```rust
//! use colstore::query::parse_query;
//!
//! let query = parse_query("timestamp > 510 AND error = 'tea pot'").unwrap();
//! assert_eq!(query.len(), 2);
//! ```

mod error;
mod parser;

pub use crate::storage::filter::{Operator, Predicate, Query};
pub use error::{QueryError, QueryResult};
pub use parser::{parse_query, parse_value};
