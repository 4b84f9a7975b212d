//! Services layer for the FYP portal
//!
//! Business logic between the HTTP routes and the persistence collaborator.
//! Every operation takes the caller's `AuthContext` and enforces role and
//! ownership before touching the store.
//!
//! ## Services
//!
//! - **Contracts**: advisor requests, accept/reject/close lifecycle, advisor form
//! - **Panels**: panel assembly, contract assignment and closure
//! - **Marks**: four-channel marks with role-scoped writers and panel projections
//! - **Logform**: weekly task assignment and advisor sign-off
//! - **Accounts**: signup, signin, profile and user listings

pub mod accounts;
pub mod contracts;
pub mod logform;
pub mod marks;
pub mod panels;
pub mod views;

pub use accounts::{AccountService, SigninRequest, SignupRequest};
pub use contracts::{ContractService, NewContract};
pub use logform::LogformService;
pub use marks::{project_for_panel_member, MarksService};
pub use panels::PanelService;
