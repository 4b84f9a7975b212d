//! Logging infrastructure for the portal
//!
//! Structured audit records of every state change, alongside `tracing`.

pub mod audit;

pub use audit::{AuditEvent, AuditLogger, Operation};
