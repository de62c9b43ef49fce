//! In-process storage, for tests and throwaway benchmark runs.

pub mod checkpoint;
