//! Reverse tail scanning for newline-delimited logs
//!
//! Recovery only ever needs the end of a log: the last record of the index
//! (to resume id assignment) and the last rows of each column (to drop rows
//! of a commit that never reached the index). Both are found by reading
//! fixed-size blocks backward from EOF instead of replaying the file.

use crate::storage::error::{StoreError, StoreResult};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Block size for backward reads
pub(crate) const BLOCK_SIZE: usize = 4096;

/// Final record of a log
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LastRecord {
    /// Offset of the record's first byte
    pub start: u64,
    /// Record text without its newline
    pub line: String,
}

/// Offset of the last `\n` strictly before `end`
pub(crate) fn rfind_newline<R: Read + Seek>(
    reader: &mut R,
    end: u64,
    block: usize,
) -> io::Result<Option<u64>> {
    let mut buf = vec![0u8; block];
    let mut pos = end;

    while pos > 0 {
        let start = pos.saturating_sub(block as u64);
        let chunk = &mut buf[..(pos - start) as usize];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(chunk)?;

        if let Some(i) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(Some(start + i as u64));
        }
        pos = start;
    }

    Ok(None)
}

/// Length of the longest prefix of the first `len` bytes that ends on a record boundary
pub(crate) fn complete_len<R: Read + Seek>(reader: &mut R, len: u64, block: usize) -> io::Result<u64> {
    if len == 0 {
        return Ok(0);
    }
    Ok(rfind_newline(reader, len, block)?.map_or(0, |nl| nl + 1))
}

/// Last record among the first `len` bytes, which must end with `\n`.
///
/// A single-record log has no preceding delimiter, so its record starts at 0.
pub(crate) fn last_record<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    block: usize,
) -> io::Result<Option<LastRecord>> {
    if len == 0 {
        return Ok(None);
    }

    let end = len - 1;
    let start = rfind_newline(reader, end, block)?.map_or(0, |nl| nl + 1);

    let mut bytes = vec![0u8; (end - start) as usize];
    reader.seek(SeekFrom::Start(start))?;
    reader.read_exact(&mut bytes)?;

    let line = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(LastRecord { start, line }))
}

/// Truncate a torn final record left by an interrupted append.
///
/// Returns the repaired length.
pub(crate) fn repair_torn_tail(file: &mut File, path: &Path) -> StoreResult<u64> {
    let len = file.metadata().map_err(StoreError::io(path, "stat"))?.len();
    let complete = complete_len(file, len, BLOCK_SIZE).map_err(StoreError::io(path, "read"))?;

    if complete < len {
        tracing::warn!(
            "Dropping {} bytes of torn record at end of {:?}",
            len - complete,
            path
        );
        file.set_len(complete).map_err(StoreError::io(path, "truncate"))?;
    }

    Ok(complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    fn last(content: &str, block: usize) -> Option<LastRecord> {
        let mut cursor = Cursor::new(content.as_bytes().to_vec());
        last_record(&mut cursor, content.len() as u64, block).unwrap()
    }

    #[test]
    fn test_last_record_multi() {
        let record = last("1,200\n2,210\n", BLOCK_SIZE).unwrap();
        assert_eq!(record.line, "2,210");
        assert_eq!(record.start, 6);
    }

    #[test]
    fn test_last_record_single() {
        let record = last("7,123\n", BLOCK_SIZE).unwrap();
        assert_eq!(record.line, "7,123");
        assert_eq!(record.start, 0);
    }

    #[test]
    fn test_last_record_empty() {
        assert_eq!(last("", BLOCK_SIZE), None);
    }

    #[test]
    fn test_last_record_across_blocks() {
        let content = "1,100\n22,2200\n333,33300\n";
        for block in 1..=content.len() + 1 {
            let record = last(content, block).unwrap();
            assert_eq!(record.line, "333,33300", "block size {block}");
            assert_eq!(record.start, 14, "block size {block}");
        }

        for block in 1..=8 {
            let record = last("7,123\n", block).unwrap();
            assert_eq!(record.line, "7,123");
            assert_eq!(record.start, 0);
        }
    }

    #[test]
    fn test_last_record_large_file() {
        let mut content = String::new();
        for i in 1..=5000 {
            content.push_str(&format!("{},{}\n", i, 1000 + i));
        }
        let record = last(&content, BLOCK_SIZE).unwrap();
        assert_eq!(record.line, "5000,6000");
    }

    #[test]
    fn test_complete_len() {
        let mut cursor = Cursor::new(b"1,200\n2,21".to_vec());
        assert_eq!(complete_len(&mut cursor, 10, 3).unwrap(), 6);

        let mut cursor = Cursor::new(b"1,200\n".to_vec());
        assert_eq!(complete_len(&mut cursor, 6, 3).unwrap(), 6);

        let mut cursor = Cursor::new(b"1,20".to_vec());
        assert_eq!(complete_len(&mut cursor, 4, 3).unwrap(), 0);
    }

    #[test]
    fn test_repair_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.int");
        std::fs::write(&path, "1,200\n2,210\n3,2").unwrap();

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .unwrap();
        assert_eq!(repair_torn_tail(&mut file, &path).unwrap(), 12);

        file.write_all(b"3,220\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1,200\n2,210\n3,220\n");
    }
}
