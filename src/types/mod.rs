//! Shared types for the FYP portal

pub mod error;

pub use error::{ErrorCategory, PortalError, Result};
