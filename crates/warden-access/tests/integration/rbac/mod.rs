//! Store integration tests.

pub mod snapshot;
