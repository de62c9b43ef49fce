//! MAKER benchmark: Tower-of-Hanoi workflows used to stress the engine.
//!
//! - `hanoi` -- iterative move generation and move validation
//! - `workflow` -- one pre-approved step per move
//! - `score` -- completion and difficulty scoring
//! - `harness` -- single, resumed and progressive runs

pub mod harness;
pub mod hanoi;
pub mod score;
pub mod workflow;
