//! Persistence collaborator
//!
//! `PortalStore` is the only way services touch stored state. Every primitive
//! that can race under concurrent requests is a single atomic operation here:
//! implementations must not split the check and the write across calls.

use async_trait::async_trait;
use bson::oid::ObjectId;

use crate::auth::Role;
use crate::db::schemas::{
    AcceptanceStatus, AdvisorForm, ContractDoc, MarksChannel, PanelDoc, TaskDoc, UserDoc,
};
use crate::types::PortalError;

/// Equality filter over contracts; `None` fields are unconstrained
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractQuery {
    pub student: Option<ObjectId>,
    pub advisor: Option<ObjectId>,
    pub acceptance: Option<AcceptanceStatus>,
    pub is_closed: Option<bool>,
    pub in_panel: Option<bool>,
}

impl ContractQuery {
    /// Accepted and not closed
    pub fn open_accepted() -> Self {
        Self {
            acceptance: Some(AcceptanceStatus::Accepted),
            is_closed: Some(false),
            ..Default::default()
        }
    }

    pub fn student(mut self, student: ObjectId) -> Self {
        self.student = Some(student);
        self
    }

    pub fn advisor(mut self, advisor: ObjectId) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn acceptance(mut self, acceptance: AcceptanceStatus) -> Self {
        self.acceptance = Some(acceptance);
        self
    }

    pub fn in_panel(mut self, in_panel: bool) -> Self {
        self.in_panel = Some(in_panel);
        self
    }

    /// Evaluate the filter against a document
    pub fn matches(&self, contract: &ContractDoc) -> bool {
        self.student.map_or(true, |s| contract.student == s)
            && self.advisor.map_or(true, |a| contract.advisor == a)
            && self.acceptance.map_or(true, |a| contract.acceptance == a)
            && self.is_closed.map_or(true, |c| contract.is_closed == c)
            && self.in_panel.map_or(true, |p| contract.in_panel == p)
    }
}

/// Result of the atomic accept primitive
#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    /// The contract moved to ACCEPTED
    Accepted(ContractDoc),
    /// The advisor already holds the maximum number of open accepted contracts
    CapacityExceeded,
    /// The contract is missing, not the advisor's, closed, or not NOT_RESPONDED
    NotTransitionable,
}

/// Storage operations used by the portal services
#[async_trait]
pub trait PortalStore: Send + Sync {
    // Users

    async fn insert_user(&self, user: UserDoc) -> Result<ObjectId, PortalError>;

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>, PortalError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>, PortalError>;

    async fn find_user_by_student_id(&self, student_id: &str)
        -> Result<Option<UserDoc>, PortalError>;

    /// Users with the given ids, missing ids skipped
    async fn find_users(&self, ids: &[ObjectId]) -> Result<Vec<UserDoc>, PortalError>;

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<UserDoc>, PortalError>;

    /// Advisor and Panel users not currently in an open panel
    async fn list_eligible_staff(&self) -> Result<Vec<UserDoc>, PortalError>;

    // Contracts

    async fn insert_contract(&self, contract: ContractDoc) -> Result<ObjectId, PortalError>;

    async fn find_contract(&self, id: &ObjectId) -> Result<Option<ContractDoc>, PortalError>;

    /// Contracts with the given ids, missing ids skipped
    async fn find_contracts(&self, ids: &[ObjectId]) -> Result<Vec<ContractDoc>, PortalError>;

    async fn query_contracts(&self, query: &ContractQuery)
        -> Result<Vec<ContractDoc>, PortalError>;

    /// Live count of the advisor's accepted, non-closed contracts
    async fn count_open_accepted(&self, advisor: &ObjectId) -> Result<u64, PortalError>;

    /// An open (NOT_RESPONDED or ACCEPTED, not closed) contract filed by
    /// `requester` or naming `student_id` in either slot
    async fn find_open_engagement(
        &self,
        requester: Option<&ObjectId>,
        student_id: &str,
    ) -> Result<Option<ContractDoc>, PortalError>;

    /// Count the advisor's open accepted contracts and move the contract from
    /// NOT_RESPONDED to ACCEPTED as one atomic unit
    async fn accept_contract(
        &self,
        contract: &ObjectId,
        advisor: &ObjectId,
        limit: u64,
    ) -> Result<AcceptOutcome, PortalError>;

    /// Move an open contract from `from` to `to`; `None` if it was not in `from`
    async fn transition_contract(
        &self,
        id: &ObjectId,
        from: AcceptanceStatus,
        to: AcceptanceStatus,
    ) -> Result<Option<ContractDoc>, PortalError>;

    /// Close an open contract currently in `from`
    async fn close_contract(
        &self,
        id: &ObjectId,
        from: AcceptanceStatus,
    ) -> Result<Option<ContractDoc>, PortalError>;

    /// Attach the advisor form; `None` if one is already attached
    async fn set_advisor_form(
        &self,
        id: &ObjectId,
        form: AdvisorForm,
    ) -> Result<Option<ContractDoc>, PortalError>;

    /// Overwrite one scalar channel, leaving siblings untouched
    async fn set_scalar_mark(
        &self,
        id: &ObjectId,
        channel: MarksChannel,
        value: f64,
    ) -> Result<Option<ContractDoc>, PortalError>;

    /// Replace or append the evaluator's entry in a list channel, atomically
    /// per (contract, channel, evaluator)
    async fn upsert_evaluator_mark(
        &self,
        id: &ObjectId,
        channel: MarksChannel,
        evaluator: &ObjectId,
        value: f64,
    ) -> Result<Option<ContractDoc>, PortalError>;

    /// Add a task reference if not already present; false if the contract is missing
    async fn push_logform_entry(
        &self,
        contract: &ObjectId,
        task: &ObjectId,
    ) -> Result<bool, PortalError>;

    async fn pull_logform_entry(
        &self,
        contract: &ObjectId,
        task: &ObjectId,
    ) -> Result<bool, PortalError>;

    // Panels

    /// Insert the panel and flag every member in one unit. Fails with
    /// `MemberAlreadyAssigned` without effect if any member is already flagged.
    async fn create_panel(&self, panel: PanelDoc) -> Result<PanelDoc, PortalError>;

    /// Close an open panel and release its members in one unit
    async fn close_panel(&self, id: &ObjectId) -> Result<PanelDoc, PortalError>;

    /// Replace the panel's contract set and update contract mirrors in one unit
    async fn assign_contracts(
        &self,
        panel: &ObjectId,
        contracts: &[ObjectId],
    ) -> Result<PanelDoc, PortalError>;

    async fn find_panel(&self, id: &ObjectId) -> Result<Option<PanelDoc>, PortalError>;

    async fn list_open_panels(&self) -> Result<Vec<PanelDoc>, PortalError>;

    async fn find_open_panel_for_member(
        &self,
        member: &ObjectId,
    ) -> Result<Option<PanelDoc>, PortalError>;

    async fn find_open_panel_for_contract(
        &self,
        contract: &ObjectId,
    ) -> Result<Option<PanelDoc>, PortalError>;

    // Tasks

    async fn insert_task(&self, task: TaskDoc) -> Result<ObjectId, PortalError>;

    async fn find_task(&self, id: &ObjectId) -> Result<Option<TaskDoc>, PortalError>;

    /// Tasks with the given ids in the given order, dangling ids skipped
    async fn find_tasks(&self, ids: &[ObjectId]) -> Result<Vec<TaskDoc>, PortalError>;

    /// Flip `advisor_signed` atomically
    async fn toggle_task_sign(&self, id: &ObjectId) -> Result<Option<TaskDoc>, PortalError>;

    async fn delete_task(&self, id: &ObjectId) -> Result<bool, PortalError>;
}
