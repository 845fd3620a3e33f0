//! Core library for pgwarden
//!
//! This crate holds what every other pgwarden crate shares:
//! - Cluster custom resource types (spec, status, installed extensions)
//! - Repository index document types
//! - The error taxonomy of the extension reconciliation engine
//! - Reconciliation configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::ExtensionsConfig;
pub use error::{Error, Result};
