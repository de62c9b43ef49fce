//! Workflow engine core: definitions, retry, durable checkpointing and execution.
//!
//! - `definition` -- workflow/step definitions and the step unit capability
//! - `gate` -- optional approval hook for workflows that are not pre-approved
//! - `retry` -- bounded exponential backoff and attempt classification
//! - `checkpoint` -- checkpoint manager over a `CheckpointStore`
//! - `registry` -- live status, definitions and cancellation handles
//! - `executor` -- the sequential step loop with resume and cancellation

pub mod checkpoint;
pub mod definition;
pub mod executor;
pub mod gate;
pub mod registry;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;
