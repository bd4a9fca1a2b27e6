//! Foundational low-level utilities shared across brain crates.
//!
//! Provides the atomic file-write helper used for ledger and note writes and
//! the UTC clock helpers used for capture stamps and completion annotations.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{
    current_unix_timestamp_ms, filename_stamp, iso_date, iso_timestamp, parse_iso_timestamp,
};
