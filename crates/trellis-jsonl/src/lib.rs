//! Async JSON Lines (JSONL) I/O for trellis project stores.
//!
//! Every record lives on its own line, so files can be parsed one record at a
//! time without loading the whole file. The crate offers:
//!
//! - [`JsonlReader`]: buffered line-by-line parsing with line tracking
//! - [`read_jsonl_resilient`]: read a whole file, skipping malformed lines as
//!   [`Warning`]s instead of failing
//! - [`JsonlWriter`]: buffered serialization, one value per line
//! - [`write_jsonl_atomic`]: crash-safe rewrite via temp file and rename
//! - [`append_jsonl`]: durable append of a batch of records in a single write

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod append;
pub mod atomic;
pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use append::append_jsonl;
pub use atomic::{write_jsonl_atomic, write_jsonl_atomic_iter};
pub use error::{Error, Result};
pub use reader::{read_jsonl_resilient, JsonlReader};
pub use warning::Warning;
pub use writer::JsonlWriter;
