//! Contract lifecycle engine
//!
//! Creation, acceptance, rejection and closing of supervision contracts, plus
//! the advisor form and the contract listings built on top of them.
//!
//! ## Transitions
//!
//! - `NOT_RESPONDED -> ACCEPTED` by the owning advisor, capacity re-checked atomically
//! - `NOT_RESPONDED -> REJECTED` by the owning advisor
//! - `ACCEPTED -> closed` by the owning advisor
//! - `NOT_RESPONDED -> closed` by the requesting student (cancel)

use bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{AuthContext, Role};
use crate::db::schemas::{
    AcceptanceStatus, AdvisorForm, AdvisorFormDetails, ContractDoc, Project, StudentSlot,
    MAX_ACCEPTED_CONTRACTS,
};
use crate::db::{AcceptOutcome, ContractQuery, PortalStore};
use crate::services::views::{
    AdvisorFormView, ContractDetail, ContractFormView, ContractSummary, MarksView, UserSummary,
};
use crate::types::PortalError;

const ADVISOR_FULL: &str = "Advisor can no more accept any fyp group!";

// =============================================================================
// Types
// =============================================================================

/// A student's request for supervision
#[derive(Debug, Clone)]
pub struct NewContract {
    pub advisor: ObjectId,
    pub project: Project,
    pub student_one: StudentSlot,
    pub student_two: StudentSlot,
}

// =============================================================================
// Service
// =============================================================================

pub struct ContractService {
    store: Arc<dyn PortalStore>,
}

impl ContractService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    /// Load a contract the calling advisor owns
    pub async fn owned_by_advisor(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractDoc, PortalError> {
        ctx.require(Role::Advisor)?;
        let contract = self.load(id).await?;
        if contract.advisor != ctx.identity {
            return Err(PortalError::Unauthorized("Unauthorized Access!".into()));
        }
        Ok(contract)
    }

    /// Load a contract the calling student filed
    pub async fn owned_by_student(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractDoc, PortalError> {
        ctx.require(Role::Student)?;
        let contract = self.load(id).await?;
        if contract.student != ctx.identity {
            return Err(PortalError::Unauthorized("Unauthorized Access!".into()));
        }
        Ok(contract)
    }

    async fn load(&self, id: &ObjectId) -> Result<ContractDoc, PortalError> {
        self.store
            .find_contract(id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Entity does not exist!".into()))
    }

    /// File a new request to an advisor
    pub async fn request_advisor(
        &self,
        ctx: &AuthContext,
        request: NewContract,
    ) -> Result<ContractDoc, PortalError> {
        ctx.require(Role::Student)?;

        let my_id = ctx
            .student_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PortalError::Validation("Student registration ID is missing!".into())
            })?;

        if request.project.name.trim().is_empty() {
            return Err(PortalError::Validation("Project name must be entered!".into()));
        }
        if request.student_one.id.is_empty() || request.student_two.id.is_empty() {
            return Err(PortalError::Validation(
                "Both students must have a registration ID!".into(),
            ));
        }

        match self.store.find_user(&request.advisor).await? {
            Some(user) if user.role == Role::Advisor => {}
            _ => return Err(PortalError::NotFound("Advisor does not exist!".into())),
        }

        if self.store.count_open_accepted(&request.advisor).await? >= MAX_ACCEPTED_CONTRACTS {
            return Err(PortalError::CapacityExceeded(ADVISOR_FULL.into()));
        }

        if let Some(existing) = self
            .store
            .find_open_engagement(Some(&ctx.identity), my_id)
            .await?
        {
            return Err(PortalError::DuplicateEngagement(
                match existing.acceptance {
                    AcceptanceStatus::Accepted => "You have already selected an advisor or may be your group mate! Ask your advisor to close the request if you want to request another advisor!",
                    _ => "You have already requested an advisor or may be your group mate! Close that request to request another advisor!",
                }
                .into(),
            ));
        }

        let partner = if request.student_one.id != my_id {
            &request.student_one
        } else {
            &request.student_two
        };
        if let Some(existing) = self.store.find_open_engagement(None, &partner.id).await? {
            return Err(PortalError::DuplicateEngagement(
                match existing.acceptance {
                    AcceptanceStatus::Accepted => "Your other member has already selected an advisor! Ask your advisor to close his/her request if you want to request advisor!",
                    _ => "Your other member has already requested an advisor! Ask him to close that request to request advisor!",
                }
                .into(),
            ));
        }

        let is_me = |slot: &StudentSlot| {
            slot.id == my_id && slot.name.to_lowercase() == ctx.name.to_lowercase()
        };
        if !is_me(&request.student_one) && !is_me(&request.student_two) {
            return Err(PortalError::IdentityMismatch(
                "Student can only fill his/her request form! One of the student must be him/her. Enter exact ID as entered upon signing up.".into(),
            ));
        }
        if request.student_one.id == request.student_two.id {
            return Err(PortalError::SelfPairing);
        }

        let mut contract = ContractDoc::new(
            ctx.identity,
            request.advisor,
            request.project,
            request.student_one,
            request.student_two,
        );
        let id = self.store.insert_contract(contract.clone()).await?;
        contract._id = Some(id);

        info!(contract = %id, advisor = %request.advisor, "advisor requested");
        Ok(contract)
    }

    /// Accept a pending request, re-checking advisor capacity atomically
    pub async fn accept(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractDoc, PortalError> {
        self.owned_by_advisor(ctx, id).await?;

        match self
            .store
            .accept_contract(id, &ctx.identity, MAX_ACCEPTED_CONTRACTS)
            .await?
        {
            AcceptOutcome::Accepted(contract) => {
                info!(contract = %id, advisor = %ctx.identity, "request accepted");
                Ok(contract)
            }
            AcceptOutcome::CapacityExceeded => {
                warn!(contract = %id, advisor = %ctx.identity, "advisor at capacity");
                Err(PortalError::CapacityExceeded(ADVISOR_FULL.into()))
            }
            AcceptOutcome::NotTransitionable => Err(PortalError::InvalidTransition(
                "Only pending requests can be accepted!".into(),
            )),
        }
    }

    /// Reject a pending request
    pub async fn reject(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractDoc, PortalError> {
        self.owned_by_advisor(ctx, id).await?;

        self.store
            .transition_contract(id, AcceptanceStatus::NotResponded, AcceptanceStatus::Rejected)
            .await?
            .ok_or_else(|| {
                PortalError::InvalidTransition("Only pending requests can be rejected!".into())
            })
    }

    /// Close a contract: advisors close accepted ones, students cancel pending ones
    pub async fn close(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractDoc, PortalError> {
        let from = match ctx.role {
            Role::Advisor => {
                self.owned_by_advisor(ctx, id).await?;
                AcceptanceStatus::Accepted
            }
            Role::Student => {
                self.owned_by_student(ctx, id).await?;
                AcceptanceStatus::NotResponded
            }
            Role::Admin | Role::Panel => {
                return Err(PortalError::Unauthorized("Unauthorized Access!".into()))
            }
        };

        self.store.close_contract(id, from).await?.ok_or_else(|| {
            PortalError::InvalidTransition(format!(
                "Only open {} requests can be closed by {}!",
                from,
                ctx.role.to_string().to_lowercase()
            ))
        })
    }

    /// Attach the advisor form; write-once
    pub async fn submit_advisor_form(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        details: AdvisorFormDetails,
    ) -> Result<ContractDoc, PortalError> {
        let contract = self.owned_by_student(ctx, id).await?;
        if contract.advisor_form.is_some() {
            return Err(already_submitted());
        }

        let advisor_name = self
            .store
            .find_user(&contract.advisor)
            .await?
            .map(|advisor| advisor.name)
            .unwrap_or_default();

        let form = AdvisorForm {
            id: ObjectId::new(),
            advisor_name,
            project: contract.project.clone(),
            student_one: contract.student_one.clone(),
            student_two: contract.student_two.clone(),
            details,
        };

        self.store
            .set_advisor_form(id, form)
            .await?
            .ok_or_else(already_submitted)
    }

    /// The advisor form; advisors also see their own mark
    pub async fn advisor_form(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractFormView, PortalError> {
        let contract = match ctx.role {
            Role::Student => self.owned_by_student(ctx, id).await?,
            Role::Advisor => self.owned_by_advisor(ctx, id).await?,
            Role::Admin | Role::Panel => {
                return Err(PortalError::Unauthorized("Unauthorized Access!".into()))
            }
        };

        Ok(ContractFormView {
            id: id.to_hex(),
            advisor_form: contract.advisor_form.as_ref().map(AdvisorFormView::from),
            advisor_marks: match ctx.role {
                Role::Advisor => contract.marks.advisor,
                _ => None,
            },
        })
    }

    /// The caller's contracts with exactly the given acceptance token
    pub async fn requests(
        &self,
        ctx: &AuthContext,
        status: &str,
    ) -> Result<Vec<ContractSummary>, PortalError> {
        let acceptance: AcceptanceStatus = status.parse()?;

        let query = ContractQuery::default().acceptance(acceptance);
        let (query, with_student, with_advisor) = match ctx.role {
            Role::Student => (query.student(ctx.identity), false, true),
            Role::Advisor => (query.advisor(ctx.identity), true, false),
            Role::Admin | Role::Panel => {
                return Err(PortalError::Unauthorized("Unauthorized Access!".into()))
            }
        };

        let contracts = self.store.query_contracts(&query).await?;
        self.summaries(&contracts, with_student, with_advisor).await
    }

    /// One contract with the counter-party populated
    pub async fn request(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<ContractDetail, PortalError> {
        let (contract, with_student, with_advisor) = match ctx.role {
            Role::Student => (self.owned_by_student(ctx, id).await?, false, true),
            Role::Advisor => (self.owned_by_advisor(ctx, id).await?, true, false),
            Role::Admin | Role::Panel => {
                return Err(PortalError::Unauthorized("Unauthorized Access!".into()))
            }
        };

        let summary = self
            .summaries(std::slice::from_ref(&contract), with_student, with_advisor)
            .await?
            .pop()
            .ok_or_else(|| PortalError::Internal("summary lost".into()))?;

        Ok(ContractDetail {
            summary,
            marks: MarksView::from(&contract.marks),
            logform_entries: contract
                .logform_entries
                .iter()
                .map(|t| t.to_hex())
                .collect(),
        })
    }

    // -------------------------------------------------------------------------
    // Admin views
    // -------------------------------------------------------------------------

    /// Open accepted contracts of one advisor
    pub async fn advisor_details(
        &self,
        ctx: &AuthContext,
        advisor: &ObjectId,
    ) -> Result<Vec<ContractSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        let contracts = self
            .store
            .query_contracts(&ContractQuery::open_accepted().advisor(*advisor))
            .await?;
        self.summaries(&contracts, true, true).await
    }

    /// The student's open accepted contract, if any
    pub async fn student_request(
        &self,
        ctx: &AuthContext,
        student: &ObjectId,
    ) -> Result<Option<ContractSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        let contracts = self
            .store
            .query_contracts(&ContractQuery::open_accepted().student(*student))
            .await?;
        let first = contracts.into_iter().next();
        match first {
            Some(contract) => Ok(self
                .summaries(std::slice::from_ref(&contract), true, true)
                .await?
                .pop()),
            None => Ok(None),
        }
    }

    /// All open accepted contracts
    pub async fn all_contracts(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<ContractSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        let contracts = self
            .store
            .query_contracts(&ContractQuery::open_accepted())
            .await?;
        self.summaries(&contracts, true, true).await
    }

    /// Open accepted contracts not yet assigned to a panel
    pub async fn contracts_not_in_panel(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<ContractSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        let contracts = self
            .store
            .query_contracts(&ContractQuery::open_accepted().in_panel(false))
            .await?;
        self.summaries(&contracts, true, true).await
    }

    /// Project contracts, populating the requested parties
    async fn summaries(
        &self,
        contracts: &[ContractDoc],
        with_student: bool,
        with_advisor: bool,
    ) -> Result<Vec<ContractSummary>, PortalError> {
        let mut ids: Vec<ObjectId> = Vec::new();
        for contract in contracts {
            if with_student && !ids.contains(&contract.student) {
                ids.push(contract.student);
            }
            if with_advisor && !ids.contains(&contract.advisor) {
                ids.push(contract.advisor);
            }
        }

        let users: HashMap<ObjectId, _> = self
            .store
            .find_users(&ids)
            .await?
            .into_iter()
            .filter_map(|u| u._id.map(|id| (id, u)))
            .collect();

        Ok(contracts
            .iter()
            .map(|contract| {
                let student = with_student
                    .then(|| users.get(&contract.student).map(UserSummary::student))
                    .flatten();
                let advisor = with_advisor
                    .then(|| users.get(&contract.advisor).map(UserSummary::staff))
                    .flatten();
                ContractSummary::new(contract, student, advisor)
            })
            .collect())
    }
}

fn already_submitted() -> PortalError {
    PortalError::AlreadySubmitted("Already submitted advisor form!".into())
}
