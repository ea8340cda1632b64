//! Shared test utilities for ultrabatch integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a `Session` to in-memory fakes of the remote
//!   collaborators and an on-disk database in a temp directory
//! - Builders for result records, status responses and upload files

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
