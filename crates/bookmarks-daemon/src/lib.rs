//! bookmarks-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the harness components,
//! allowing unit tests to access internal types.

pub mod commands;

pub use commands::Command;
