//! Property-based tests

pub mod backoff_proptest;
pub mod status_proptest;
