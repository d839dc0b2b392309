//! Text envelope returned by `start` and `write`.

use std::fmt::Write as _;
use std::time::Duration;

/// One delivered slice of session output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputChunk {
    pub output: String,
    /// Estimated tokens of the whole undelivered delta before truncation.
    pub original_token_count: usize,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkStatus {
    /// `None` when the process died from a signal or never started.
    Exited(Option<i32>),
    Running(u32),
}

fn chunk_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

pub(crate) fn render(chunk: &OutputChunk, wall_time: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Chunk ID: {}", chunk_id());
    let _ = writeln!(out, "Wall time: {:.4} seconds", wall_time.as_secs_f64());
    match chunk.status {
        ChunkStatus::Exited(code) => {
            let _ = writeln!(out, "Process exited with code {}", code.unwrap_or(-1));
        }
        ChunkStatus::Running(id) => {
            let _ = writeln!(out, "Process running with session ID {id}");
        }
    }
    let _ = writeln!(out, "Original token count: {}", chunk.original_token_count);
    out.push_str("Output:\n");
    out.push_str(&chunk.output);
    out
}
