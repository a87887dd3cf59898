//! Test suite for Courier Track
//!
//! This module organizes all tests

pub mod common;
pub mod property;
