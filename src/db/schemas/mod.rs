//! Database schemas for the FYP portal
//!
//! Defines MongoDB document structures for users, contracts, panels and
//! logform tasks.

mod contract;
mod metadata;
mod panel;
mod task;
mod user;

pub use contract::{
    AcceptanceStatus, AdvisorForm, AdvisorFormDetails, ContractDoc, EvaluatorMark, Marks,
    MarksChannel, Project, StudentSlot, Tools, CONTRACT_COLLECTION,
};
pub use metadata::Metadata;
pub use panel::{PanelDoc, MAX_PANEL_MEMBERS, PANEL_COLLECTION};
pub use task::{TaskDoc, TASK_COLLECTION, TASK_DUE_DAYS};
pub use user::{UserDoc, USER_COLLECTION};

/// Maximum number of open accepted contracts per advisor
pub const MAX_ACCEPTED_CONTRACTS: u64 = 5;
