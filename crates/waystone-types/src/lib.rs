//! Shared domain types for Waystone.
//!
//! This crate contains the data that flows between the workflow engine, its
//! storage adapters and its callers: checkpoints, live status, run results,
//! engine configuration, benchmark records and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod benchmark;
pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
