//! Infrastructure layer for Waystone.
//!
//! Contains implementations of the checkpoint store trait defined in
//! `waystone-core`: durable SQLite storage and an in-process store, plus the
//! `config.toml` loader.

pub mod config;
pub mod memory;
pub mod sqlite;
