//! FYP portal - final-year-project supervision service
//!
//! Students request an advisor for a two-person project group, advisors
//! accept or reject and track a logform of tasks, an administrator groups
//! accepted projects into evaluation panels, and each party records marks.
//!
//! ## Modules
//!
//! - **auth**: roles, JWT tokens, password hashing and caller context
//! - **db**: `PortalStore` over MongoDB, with an in-memory store for dev mode
//! - **services**: contract lifecycle, panels, marks, logform and accounts
//! - **routes**: per-role HTTP surfaces and the JSON envelope
//! - **server**: hyper accept loop and shared state

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{PortalError, Result};
