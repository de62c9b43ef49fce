//! Engine event distribution.

pub mod bus;
