//! Shared infrastructure utilities for toolhost.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename) used by the
//!   patch engine so a failed write never leaves a half-edited source file.

mod atomic_write;

pub use atomic_write::{AtomicWriteOptions, PersistMode, atomic_write_with_options, existing_mode};
