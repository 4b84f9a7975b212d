//! Persistence layer
//!
//! `PortalStore` is the seam between services and storage. `MongoStore` is the
//! production implementation; `MemoryStore` backs dev mode and tests.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection};
pub use mongo_store::MongoStore;
pub use store::{AcceptOutcome, ContractQuery, PortalStore};
