//! JSONL reading operations.
//!
//! This module provides async functionality for reading JSONL files line-by-line
//! with efficient buffering and line number tracking for error reporting.

use crate::{Error, Result, Warning};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

/// Async reader for JSONL (JSON Lines) data.
///
/// `JsonlReader` wraps an async reader and parses one record per line. It
/// tracks line numbers (blank lines included) so errors and warnings point at
/// the physical line in the file.
///
/// # Examples
///
/// ```no_run
/// use trellis_jsonl::JsonlReader;
/// use tokio::fs::File;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::open("events.jsonl").await?;
/// let mut reader = JsonlReader::new(file);
/// while let Some(value) = reader.read_value::<serde_json::Value>().await? {
///     println!("{value}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct JsonlReader<R> {
    /// Buffered reader wrapping the underlying async reader.
    reader: BufReader<R>,
    /// 1-based number of the last line read, 0 before any line is read.
    line_number: usize,
}

impl<R: AsyncRead + Unpin> JsonlReader<R> {
    /// Creates a new `JsonlReader` wrapping the given async reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
        }
    }

    /// Creates a new `JsonlReader` with a custom buffer capacity.
    #[must_use]
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            line_number: 0,
        }
    }

    /// Returns the 1-based line number of the last line read.
    ///
    /// Returns 0 before any lines have been read.
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next non-blank line as raw bytes, without surrounding whitespace.
    ///
    /// Returns `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reader fails.
    pub async fn next_raw_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let mut buf = Vec::new();
            let read = self.reader.read_until(b'\n', &mut buf).await?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = buf.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_vec()));
        }
    }

    /// Reads and deserializes the next record.
    ///
    /// Blank lines are skipped. Returns `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLine`] if the line is not valid UTF-8 or does
    /// not deserialize into `T`, and [`Error::Io`] if reading fails.
    pub async fn read_value<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let Some(raw) = self.next_raw_line().await? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| Error::InvalidLine {
                line_number: self.line_number,
                message: e.to_string(),
            })
    }

    /// Consumes the reader, returning the underlying buffered reader.
    #[must_use]
    pub fn into_inner(self) -> BufReader<R> {
        self.reader
    }
}

/// Reads every record from a JSONL file, skipping lines that fail to parse.
///
/// Malformed lines (invalid JSON, wrong shape, invalid UTF-8, or a record
/// truncated by an interrupted append) do not abort the read. Each one is
/// reported as a [`Warning`] carrying its physical line number.
///
/// # Errors
///
/// Returns an error only if the file cannot be opened or read.
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).await?;
    let mut reader = JsonlReader::new(file);

    let mut values = Vec::new();
    let mut warnings = Vec::new();

    while let Some(raw) = reader.next_raw_line().await? {
        let line_number = reader.line_number();
        let warning = match std::str::from_utf8(&raw) {
            Err(e) => Warning::SkippedLine {
                line_number,
                reason: format!("invalid UTF-8: {e}"),
            },
            Ok(text) => match serde_json::from_str::<T>(text) {
                Ok(value) => {
                    values.push(value);
                    continue;
                }
                Err(e) => Warning::MalformedJson {
                    line_number,
                    error: e.to_string(),
                },
            },
        };
        warn!(path = %path.display(), warning = %warning.description(), "Skipping unreadable JSONL line");
        warnings.push(warning);
    }

    Ok((values, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Record {
        id: u32,
    }

    #[test]
    fn new_reader_starts_at_line_zero() {
        let reader = JsonlReader::new(Cursor::new(b""));
        assert_eq!(reader.line_number(), 0);
    }

    #[tokio::test]
    async fn read_value_skips_blank_lines_and_counts_them() {
        let data = Cursor::new(b"{\"id\":1}\n\n   \n{\"id\":2}\n".to_vec());
        let mut reader = JsonlReader::new(data);

        assert_eq!(reader.read_value::<Record>().await.unwrap(), Some(Record { id: 1 }));
        assert_eq!(reader.line_number(), 1);
        assert_eq!(reader.read_value::<Record>().await.unwrap(), Some(Record { id: 2 }));
        assert_eq!(reader.line_number(), 4);
        assert_eq!(reader.read_value::<Record>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_value_handles_missing_trailing_newline() {
        let mut reader = JsonlReader::new(Cursor::new(b"{\"id\":7}".to_vec()));
        assert_eq!(reader.read_value::<Record>().await.unwrap(), Some(Record { id: 7 }));
        assert_eq!(reader.read_value::<Record>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_value_reports_line_number_of_bad_record() {
        let data = Cursor::new(b"{\"id\":1}\n{\"id\":\n".to_vec());
        let mut reader = JsonlReader::new(data);

        reader.read_value::<Record>().await.unwrap();
        match reader.read_value::<Record>().await {
            Err(Error::InvalidLine { line_number, .. }) => assert_eq!(line_number, 2),
            other => panic!("expected InvalidLine, got {other:?}"),
        }
    }
}
