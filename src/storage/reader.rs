//! Read path: point lookup, average and filter
//!
//! All reads join the index with the column files by id. Column files are
//! sparse, so every lookup searches rows by id, stopping early once ids pass
//! the target.
//!
//! ```text
//! get_event: index.entry_at(id) → every column: find(id) → Event
//! avg:       first numeric column of field → sum / count
//! filter:    index entries → load filtered fields → match all → assemble
//! ```

use crate::storage::column::{ColumnStore, TIMESTAMP_FIELD};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::filter::Query;
use crate::storage::index::IndexLog;
use crate::storage::types::{Event, IndexEntry, Value};
use std::collections::HashMap;

/// Borrowed view over the logs, valid while the caller holds the read lock
pub(crate) struct Reader<'a> {
    index: &'a IndexLog,
    columns: &'a ColumnStore,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(index: &'a IndexLog, columns: &'a ColumnStore) -> Self {
        Self { index, columns }
    }

    /// Rebuild one event from the index and every column file
    pub(crate) fn get_event(&self, id: u64) -> StoreResult<Event> {
        let entry = self.index.entry_at(id)?;
        let mut event = Event::new(entry.id, entry.timestamp);

        for column in self.columns.iter() {
            if let Some(value) = column.find(id)? {
                event
                    .fields
                    .entry(column.key().field.clone())
                    .or_insert(value);
            }
        }

        tracing::debug!("Rebuilt event {} with {} fields", id, event.fields.len());
        Ok(event)
    }

    /// Average of a numeric field.
    ///
    /// When a field has both an `int` and a `float` column only the first
    /// (`float`) is aggregated; the two are never merged.
    pub(crate) fn avg(&self, field: &str) -> StoreResult<f64> {
        let mut numeric = self.columns.columns_for(field).filter(|c| c.key().kind.is_numeric());

        let Some(column) = numeric.next() else {
            return Err(StoreError::EmptyAggregate(field.to_string()));
        };
        if let Some(other) = numeric.next() {
            tracing::warn!(
                "Field '{}' has several numeric columns, averaging {:?} and ignoring {:?}",
                field,
                column.path(),
                other.path()
            );
        }

        let mut sum = 0.0;
        let mut count = 0u64;
        for row in column.rows()? {
            let value = column.decode(&row?)?;
            if let Some(v) = value.as_f64() {
                sum += v;
                count += 1;
            }
        }

        if count == 0 {
            return Err(StoreError::EmptyAggregate(field.to_string()));
        }
        Ok(sum / count as f64)
    }

    /// Events satisfying every predicate, in id order. An empty query matches nothing.
    pub(crate) fn filter(&self, query: &Query) -> StoreResult<Vec<Event>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut loaded: HashMap<&str, HashMap<u64, Value>> = HashMap::new();
        for (field, _) in query.iter() {
            if field != TIMESTAMP_FIELD {
                loaded.insert(field, self.load_field(field)?);
            }
        }

        let mut matched = Vec::new();
        'events: for entry in self.index.entries()? {
            for (field, predicate) in query.iter() {
                let timestamp;
                let value = if field == TIMESTAMP_FIELD {
                    timestamp = Value::Integer(entry.timestamp);
                    &timestamp
                } else {
                    match loaded.get(field).and_then(|values| values.get(&entry.id)) {
                        Some(value) => value,
                        None => continue 'events,
                    }
                };

                if !predicate.matches(field, value)? {
                    continue 'events;
                }
            }
            matched.push(entry);
        }

        tracing::debug!("Filter '{}' matched {} events", query, matched.len());
        self.assemble(&matched)
    }

    /// All values of one logical field, keyed by id. First-found column wins.
    fn load_field(&self, field: &str) -> StoreResult<HashMap<u64, Value>> {
        let mut values = HashMap::new();
        for column in self.columns.columns_for(field) {
            for row in column.rows()? {
                let row = row?;
                if !values.contains_key(&row.id) {
                    let value = column.decode(&row)?;
                    values.insert(row.id, value);
                }
            }
        }
        Ok(values)
    }

    /// Rebuild many events with one pass over each column. `entries` must be in id order.
    fn assemble(&self, entries: &[IndexEntry]) -> StoreResult<Vec<Event>> {
        let Some(last) = entries.last() else {
            return Ok(Vec::new());
        };

        let mut events: Vec<Event> = entries
            .iter()
            .map(|entry| Event::new(entry.id, entry.timestamp))
            .collect();
        let positions: HashMap<u64, usize> = entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.id, pos))
            .collect();

        for column in self.columns.iter() {
            for row in column.rows()? {
                let row = row?;
                if row.id > last.id {
                    break;
                }
                if let Some(&pos) = positions.get(&row.id) {
                    let value = column.decode(&row)?;
                    events[pos]
                        .fields
                        .entry(column.key().field.clone())
                        .or_insert(value);
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::filter::Operator;
    use crate::storage::index::INDEX_FILE;
    use tempfile::{tempdir, TempDir};

    /// Lay out a data directory by hand and open its logs
    fn fixture(files: &[(&str, &str)]) -> (TempDir, IndexLog, ColumnStore) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let index = IndexLog::open(dir.path().join(INDEX_FILE)).unwrap();
        let columns = ColumnStore::open(dir.path(), index.last_id()).unwrap();
        (dir, index, columns)
    }

    #[test]
    fn test_get_event_sparse() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n2,510\n3,520\n"),
            ("duration.int", "1,100\n3,300\n"),
            ("error.string", "2,tea pot\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        let event = reader.get_event(2).unwrap();
        assert_eq!(event, Event::new(2, 510).field("error", "tea pot"));

        let event = reader.get_event(3).unwrap();
        assert_eq!(event, Event::new(3, 520).field("duration", 300));

        assert!(matches!(reader.get_event(0), Err(StoreError::NotFound(0))));
        assert!(matches!(reader.get_event(4), Err(StoreError::NotFound(4))));
    }

    #[test]
    fn test_get_event_malformed_value() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n"),
            ("success.bool", "1,maybe\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        assert!(matches!(reader.get_event(1), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_avg_first_numeric_column_only() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n2,510\n3,520\n4,530\n"),
            ("latency.float", "1,1.5\n2,2.5\n"),
            ("latency.int", "3,100\n4,200\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        assert_eq!(reader.avg("latency").unwrap(), 2.0);
    }

    #[test]
    fn test_fields_match_by_exact_name() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n2,510\n"),
            ("duration.int", "1,100\n2,300\n"),
            ("dur.int", "1,7\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        assert_eq!(reader.avg("dur").unwrap(), 7.0);
        assert_eq!(reader.avg("duration").unwrap(), 200.0);
        assert!(matches!(reader.avg("d"), Err(StoreError::EmptyAggregate(_))));

        let query = Query::new().filter("dur", Operator::Gte, 0);
        let ids: Vec<u64> = reader.filter(&query).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_avg_non_numeric_field() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n"),
            ("error.string", "1,tea pot\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        assert!(matches!(reader.avg("error"), Err(StoreError::EmptyAggregate(_))));
        assert!(matches!(reader.avg("missing"), Err(StoreError::EmptyAggregate(_))));
    }

    #[test]
    fn test_filter_on_fields_and_timestamp() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n2,510\n3,520\n4,530\n"),
            ("duration.int", "1,100\n2,200\n4,400\n"),
            ("error.string", "2,tea pot\n3,tea pot\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        let query = Query::new().filter("duration", Operator::Gte, 200);
        let ids: Vec<u64> = reader.filter(&query).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 4]);

        let query = Query::new()
            .filter("error", Operator::Eq, "tea pot")
            .filter("timestamp", Operator::Lt, 520);
        let events = reader.filter(&query).unwrap();
        assert_eq!(
            events,
            vec![Event::new(2, 510).field("duration", 200).field("error", "tea pot")]
        );
    }

    #[test]
    fn test_filter_type_mismatch() {
        let (_dir, index, columns) = fixture(&[
            (INDEX_FILE, "1,500\n"),
            ("error.string", "1,tea pot\n"),
        ]);
        let reader = Reader::new(&index, &columns);

        let query = Query::new().filter("error", Operator::Gt, 5);
        assert!(matches!(reader.filter(&query), Err(StoreError::TypeMismatch { .. })));
    }

    #[test]
    fn test_filter_empty_query() {
        let (_dir, index, columns) = fixture(&[(INDEX_FILE, "1,500\n")]);
        let reader = Reader::new(&index, &columns);

        assert!(reader.filter(&Query::new()).unwrap().is_empty());
    }
}
