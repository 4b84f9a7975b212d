//! Marks aggregation engine
//!
//! Four independent channels per contract, each with its own writer:
//!
//! | channel | writer | range |
//! |---------|--------|-------|
//! | admin   | Admin | 0-10 |
//! | advisor | owning Advisor | 0-30 |
//! | mid     | member of the contract's open panel | 0-20 per evaluator |
//! | final   | member of the contract's open panel | 0-40 per evaluator |
//!
//! Every write touches one channel only. List channels hold at most one entry
//! per evaluator; resubmission replaces the caller's entry.

use bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{AuthContext, MarksCapability, Role};
use crate::db::schemas::{ContractDoc, MarksChannel, PanelDoc};
use crate::db::PortalStore;
use crate::services::contracts::ContractService;
use crate::services::views::{
    EvaluatorMarkView, MarksView, OwnMarks, PanelContractView, PanelView, UserSummary,
};
use crate::types::PortalError;

pub struct MarksService {
    store: Arc<dyn PortalStore>,
    contracts: ContractService,
}

impl MarksService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self {
            contracts: ContractService::new(store.clone()),
            store,
        }
    }

    pub async fn set_admin_marks(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        value: f64,
    ) -> Result<ContractDoc, PortalError> {
        self.require_capability(ctx, MarksCapability::Admin)?;
        let value = MarksChannel::Admin.validate(value)?;
        self.write_scalar(ctx, id, MarksChannel::Admin, value).await
    }

    pub async fn set_advisor_marks(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        value: f64,
    ) -> Result<ContractDoc, PortalError> {
        self.require_capability(ctx, MarksCapability::Advisor)?;
        self.contracts.owned_by_advisor(ctx, id).await?;
        let value = MarksChannel::Advisor.validate(value)?;
        self.write_scalar(ctx, id, MarksChannel::Advisor, value).await
    }

    pub async fn set_mid_marks(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        value: f64,
    ) -> Result<ContractDoc, PortalError> {
        self.write_evaluator(ctx, id, MarksChannel::Mid, value).await
    }

    pub async fn set_final_marks(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        value: f64,
    ) -> Result<ContractDoc, PortalError> {
        self.write_evaluator(ctx, id, MarksChannel::Final, value).await
    }

    fn require_capability(
        &self,
        ctx: &AuthContext,
        capability: MarksCapability,
    ) -> Result<(), PortalError> {
        if ctx.role.can_write(capability) {
            Ok(())
        } else {
            Err(PortalError::Unauthorized("Unauthorized Access!".into()))
        }
    }

    async fn write_scalar(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        channel: MarksChannel,
        value: f64,
    ) -> Result<ContractDoc, PortalError> {
        let contract = self
            .store
            .set_scalar_mark(id, channel, value)
            .await?
            .ok_or_else(|| PortalError::NotFound("Entity does not exist!".into()))?;

        info!(contract = %id, channel = channel.name(), by = %ctx.identity, value, "marks set");
        Ok(contract)
    }

    async fn write_evaluator(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        channel: MarksChannel,
        value: f64,
    ) -> Result<ContractDoc, PortalError> {
        self.require_capability(ctx, MarksCapability::Evaluator)?;

        let contract = self
            .store
            .find_contract(id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Entity does not exist!".into()))?;
        self.require_panel_member(ctx, &contract).await?;

        let value = channel.validate(value)?;
        let contract = self
            .store
            .upsert_evaluator_mark(id, channel, &ctx.identity, value)
            .await?
            .ok_or_else(|| PortalError::NotFound("Entity does not exist!".into()))?;

        info!(contract = %id, channel = channel.name(), evaluator = %ctx.identity, value, "evaluator marks set");
        Ok(contract)
    }

    /// The caller must sit on the open panel the contract is assigned to
    async fn require_panel_member(
        &self,
        ctx: &AuthContext,
        contract: &ContractDoc,
    ) -> Result<(), PortalError> {
        let not_in_panel = || PortalError::Unauthorized("You are not in that panel!".into());

        let panel_id = contract.panel.ok_or_else(not_in_panel)?;
        let panel = self.store.find_panel(&panel_id).await?.ok_or_else(not_in_panel)?;

        let listed = contract._id.is_some_and(|c| panel.has_contract(&c));
        if panel.is_closed || !listed || !panel.has_member(&ctx.identity) {
            debug!(panel = %panel_id, caller = %ctx.identity, "evaluator outside panel");
            return Err(not_in_panel());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Panel projections
    // -------------------------------------------------------------------------

    /// The open panel the caller sits on, with member-scoped marks
    pub async fn assigned_panel(&self, ctx: &AuthContext) -> Result<Option<PanelView>, PortalError> {
        ctx.require_any(&[Role::Advisor, Role::Panel])?;

        let Some(panel) = self.store.find_open_panel_for_member(&ctx.identity).await? else {
            return Ok(None);
        };

        let contracts = self.store.find_contracts(&panel.contracts).await?;
        let views = contracts
            .iter()
            .map(|contract| project_for_panel_member(contract, &ctx.identity))
            .collect();

        Ok(Some(self.panel_view(&panel, views).await?))
    }

    /// The open panel evaluating the student's contract, showing only that contract
    pub async fn student_panel(
        &self,
        ctx: &AuthContext,
        contract_id: &ObjectId,
    ) -> Result<Option<PanelView>, PortalError> {
        let contract = self.contracts.owned_by_student(ctx, contract_id).await?;

        let Some(panel) = self.store.find_open_panel_for_contract(contract_id).await? else {
            return Ok(None);
        };

        let view = PanelContractView {
            id: contract_id.to_hex(),
            project: contract.project.clone(),
            student_one: contract.student_one.clone(),
            student_two: contract.student_two.clone(),
            marks: MarksView::from(&contract.marks),
            user: None,
        };

        Ok(Some(self.panel_view(&panel, vec![view]).await?))
    }

    async fn panel_view(
        &self,
        panel: &PanelDoc,
        contracts: Vec<PanelContractView>,
    ) -> Result<PanelView, PortalError> {
        let users: HashMap<ObjectId, _> = self
            .store
            .find_users(&panel.members)
            .await?
            .into_iter()
            .filter_map(|u| u._id.map(|id| (id, u)))
            .collect();

        Ok(PanelView {
            id: panel._id.map(|id| id.to_hex()).unwrap_or_default(),
            name: panel.name.clone(),
            members: panel
                .members
                .iter()
                .filter_map(|m| users.get(m))
                .map(UserSummary::member)
                .collect(),
            contracts,
        })
    }
}

/// Project a contract's marks for a panel member
///
/// Admin and advisor scalars are redacted. The mid/final lists are kept
/// whole and the caller's own entries are surfaced as `user.{mid,final}`.
pub fn project_for_panel_member(contract: &ContractDoc, evaluator: &ObjectId) -> PanelContractView {
    let all = |channel: MarksChannel| -> Vec<EvaluatorMarkView> {
        contract
            .marks
            .entries(channel)
            .iter()
            .map(EvaluatorMarkView::from)
            .collect()
    };

    PanelContractView {
        id: contract._id.map(|id| id.to_hex()).unwrap_or_default(),
        project: contract.project.clone(),
        student_one: contract.student_one.clone(),
        student_two: contract.student_two.clone(),
        marks: MarksView {
            admin: None,
            advisor: None,
            mid: all(MarksChannel::Mid),
            final_: all(MarksChannel::Final),
        },
        user: Some(OwnMarks {
            mid: contract.marks.entry_for(MarksChannel::Mid, evaluator),
            final_: contract.marks.entry_for(MarksChannel::Final, evaluator),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{EvaluatorMark, Project, StudentSlot, UserDoc};
    use crate::db::MemoryStore;

    async fn user(store: &MemoryStore, name: &str, role: Role) -> AuthContext {
        let id = store
            .insert_user(UserDoc::new(
                name.into(),
                format!("{}@uni.edu", name.to_lowercase()),
                "hash".into(),
                role,
            ))
            .await
            .unwrap();
        AuthContext::from_user(&store.find_user(&id).await.unwrap().unwrap()).unwrap()
    }

    async fn contract(store: &MemoryStore, advisor: &AuthContext) -> ObjectId {
        store
            .insert_contract(ContractDoc::new(
                ObjectId::new(),
                advisor.identity,
                Project::default(),
                StudentSlot::default(),
                StudentSlot::default(),
            ))
            .await
            .unwrap()
    }

    #[test]
    fn test_projection_redacts_scalars() {
        let me = ObjectId::new();
        let other = ObjectId::new();
        let mut doc = ContractDoc::new(
            ObjectId::new(),
            ObjectId::new(),
            Project::default(),
            StudentSlot::default(),
            StudentSlot::default(),
        );
        doc.marks.admin = Some(8.0);
        doc.marks.advisor = Some(25.0);
        doc.marks.mid = vec![
            EvaluatorMark { evaluator: other, marks: 12.0 },
            EvaluatorMark { evaluator: me, marks: 15.0 },
        ];

        let view = project_for_panel_member(&doc, &me);
        assert_eq!(view.marks.admin, None);
        assert_eq!(view.marks.advisor, None);
        assert_eq!(view.marks.mid.len(), 2);
        assert_eq!(view.marks.mid[0].marks, 12.0);
        assert_eq!(view.marks.mid[1].marks, 15.0);
        assert!(view.marks.final_.is_empty());

        let own = view.user.unwrap();
        assert_eq!(own.mid, Some(15.0));
        assert_eq!(own.final_, None);
    }

    #[tokio::test]
    async fn test_admin_marks_leave_other_channels() {
        let store = Arc::new(MemoryStore::new());
        let service = MarksService::new(store.clone());
        let admin = user(&store, "Admin", Role::Admin).await;
        let advisor = user(&store, "Khan", Role::Advisor).await;
        let id = contract(&store, &advisor).await;

        service.set_advisor_marks(&advisor, &id, 22.5).await.unwrap();
        service.set_admin_marks(&admin, &id, 7.0).await.unwrap();
        let doc = service.set_admin_marks(&admin, &id, 7.0).await.unwrap();

        assert_eq!(doc.marks.admin, Some(7.0));
        assert_eq!(doc.marks.advisor, Some(22.5));
        assert!(doc.marks.mid.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = MarksService::new(store.clone());
        let admin = user(&store, "Admin", Role::Admin).await;
        let advisor = user(&store, "Khan", Role::Advisor).await;
        let id = contract(&store, &advisor).await;

        service.set_admin_marks(&admin, &id, 4.0).await.unwrap();
        for bad in [12.0, -1.0, f64::NAN] {
            assert!(matches!(
                service.set_admin_marks(&admin, &id, bad).await,
                Err(PortalError::Validation(_))
            ));
        }
        assert!(service.set_advisor_marks(&advisor, &id, 30.5).await.is_err());

        let doc = store.find_contract(&id).await.unwrap().unwrap();
        assert_eq!(doc.marks.admin, Some(4.0));
        assert_eq!(doc.marks.advisor, None);
    }

    #[tokio::test]
    async fn test_channel_writers() {
        let store = Arc::new(MemoryStore::new());
        let service = MarksService::new(store.clone());
        let admin = user(&store, "Admin", Role::Admin).await;
        let advisor = user(&store, "Khan", Role::Advisor).await;
        let other = user(&store, "Malik", Role::Advisor).await;
        let id = contract(&store, &advisor).await;

        assert!(matches!(
            service.set_admin_marks(&advisor, &id, 5.0).await,
            Err(PortalError::Unauthorized(_))
        ));
        assert!(matches!(
            service.set_advisor_marks(&other, &id, 5.0).await,
            Err(PortalError::Unauthorized(_))
        ));
        assert!(matches!(
            service.set_admin_marks(&admin, &ObjectId::new(), 5.0).await,
            Err(PortalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mid_marks_require_panel_membership() {
        let store = Arc::new(MemoryStore::new());
        let service = MarksService::new(store.clone());
        let advisor = user(&store, "Khan", Role::Advisor).await;
        let m1 = user(&store, "Ahmed", Role::Panel).await;
        let outsider = user(&store, "Zain", Role::Panel).await;
        let id = contract(&store, &advisor).await;

        // Not yet assigned to any panel
        assert!(matches!(
            service.set_mid_marks(&m1, &id, 15.0).await,
            Err(PortalError::Unauthorized(_))
        ));

        let panel = store
            .create_panel(PanelDoc::new("P1".into(), vec![m1.identity]))
            .await
            .unwrap();
        let panel_id = panel._id.unwrap();
        store.assign_contracts(&panel_id, &[id]).await.unwrap();

        service.set_mid_marks(&m1, &id, 15.0).await.unwrap();
        let doc = service.set_mid_marks(&m1, &id, 17.0).await.unwrap();
        assert_eq!(doc.marks.mid.len(), 1);
        assert_eq!(doc.marks.entry_for(MarksChannel::Mid, &m1.identity), Some(17.0));

        assert!(matches!(
            service.set_final_marks(&outsider, &id, 30.0).await,
            Err(PortalError::Unauthorized(_))
        ));
        assert!(matches!(
            service.set_final_marks(&m1, &id, 41.0).await,
            Err(PortalError::Validation(_))
        ));

        let view = service.assigned_panel(&m1).await.unwrap().unwrap();
        assert_eq!(view.members.len(), 1);
        assert_eq!(view.contracts[0].user.as_ref().unwrap().mid, Some(17.0));

        store.close_panel(&panel_id).await.unwrap();
        assert!(service.assigned_panel(&m1).await.unwrap().is_none());
        assert!(matches!(
            service.set_mid_marks(&m1, &id, 10.0).await,
            Err(PortalError::Unauthorized(_))
        ));
    }
}
