//! Common test utilities for pgwarden-extensions
//!
//! This module provides shared test infrastructure including:
//! - Signed package and repository index fixtures
//! - Canned-response web client and recording filesystem
//! - Status writer doubles for persistence tests

#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
