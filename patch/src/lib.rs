//! Patch engine for the `*** Begin Patch` envelope format.
//!
//! ```text
//! *** Begin Patch
//! *** Update File: src/lib.rs
//! @@ fn main
//! -    old();
//! +    new();
//! *** End Patch
//! ```
//!
//! [`parse_patch`] turns text into [`PatchOperation`]s, [`apply_hunks`] rewrites an
//! in-memory file, and [`apply_patch`] does both against a directory root.

mod apply;
mod error;
mod parser;
mod resolve;
mod seek;

pub use apply::{ApplySummary, FileChange, apply_operations, apply_patch};
pub use error::{FORMAT_HINT, PatchError};
pub use parser::{PatchHunk, PatchOperation, parse_patch};
pub use resolve::apply_hunks;
