//! Durable appends to append-only JSONL logs.

use crate::Result;
use serde::Serialize;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

/// Appends a batch of records to `path`, creating the file if needed.
///
/// The whole batch is serialized up front and handed to the OS in one write,
/// then synced. After a crash at most one truncated trailing line remains,
/// which resilient reads skip. If the file does not end in a newline the
/// batch starts on a fresh line so the fragment cannot swallow the first new
/// record. An empty batch does not touch the file.
///
/// # Errors
///
/// Returns an error if a record fails to serialize or the file cannot be
/// opened, written, or synced. Serialization happens before the file is
/// opened, so a serialization failure writes nothing.
pub async fn append_jsonl<T, P>(path: P, records: &[T]) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    if records.is_empty() {
        return Ok(());
    }

    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(path)
        .await?;

    if !ends_with_newline(&mut file).await? {
        warn!(path = %path.display(), "JSONL file has an unterminated last line; starting a new line");
        buf.insert(0, b'\n');
    }

    file.write_all(&buf).await?;
    file.sync_data().await?;
    Ok(())
}

/// Returns true for an empty file or one whose last byte is `\n`.
async fn ends_with_newline(file: &mut File) -> Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}
