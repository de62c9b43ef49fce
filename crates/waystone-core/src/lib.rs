//! Business logic and repository trait definitions for Waystone.
//!
//! This crate defines the checkpoint store "port" that the infrastructure
//! layer implements, the durable workflow engine built on top of it, and the
//! Tower-of-Hanoi benchmark harness used to validate the engine end-to-end.
//! It depends only on `waystone-types` -- never on `waystone-infra` or any
//! database/IO crate.

pub mod benchmark;
pub mod event;
pub mod repository;
pub mod workflow;
