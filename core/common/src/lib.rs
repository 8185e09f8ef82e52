//! Common utilities and types shared across DriveGate crates.
//!
//! This module provides the error taxonomy, the parsed client path type
//! and the redacting secret wrapper used by the token manager.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{DrivePath, Secret};
