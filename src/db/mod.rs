//! Database module for healthmon.
//!
//! Provides SQLite storage with embedded migrations.

mod store;

pub use store::*;
