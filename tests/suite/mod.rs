//! Integration test suite modules

#[cfg(unix)]
mod exec;
mod orchestrator;
mod patch;
