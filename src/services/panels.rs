//! Panel assembly and closure
//!
//! Panels group up to seven staff members who jointly evaluate a set of
//! contracts. A staff member sits on at most one open panel at a time; the
//! `in_panel` flag on the user mirrors that and is only written together with
//! the panel itself.

use bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::{AuthContext, Role};
use crate::db::schemas::{PanelDoc, MAX_PANEL_MEMBERS};
use crate::db::PortalStore;
use crate::services::views::{ContractBrief, PanelDetailsView, PanelSummary, UserSummary};
use crate::types::PortalError;

pub struct PanelService {
    store: Arc<dyn PortalStore>,
}

/// Drop repeated ids, keeping first occurrence order
fn dedupe(ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut out: Vec<ObjectId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

impl PanelService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    /// Create a panel and flag its members
    pub async fn create_panel(
        &self,
        ctx: &AuthContext,
        name: Option<&str>,
        members: &[ObjectId],
    ) -> Result<PanelDoc, PortalError> {
        ctx.require(Role::Admin)?;

        if members.len() > MAX_PANEL_MEMBERS {
            return Err(PortalError::CapacityExceeded(
                "Panel cannot contain more than seven members!".into(),
            ));
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(PortalError::NameRequired)?;

        let members = dedupe(members);
        if members.is_empty() {
            return Err(PortalError::Validation(
                "Panel must have at least one member!".into(),
            ));
        }

        let users = self.store.find_users(&members).await?;
        if users.len() != members.len() {
            return Err(PortalError::NotFound("User does not exist!".into()));
        }
        if users.iter().any(|u| !u.role.is_staff()) {
            return Err(PortalError::Validation(
                "Only advisors and panel members can be added to a panel!".into(),
            ));
        }
        if users.iter().any(|u| u.in_panel) {
            return Err(PortalError::MemberAlreadyAssigned);
        }

        // The store re-checks the flags inside the same unit as the insert
        let panel = self
            .store
            .create_panel(PanelDoc::new(name.to_string(), members))
            .await?;

        info!(
            panel = %panel._id.map(|id| id.to_hex()).unwrap_or_default(),
            members = panel.members.len(),
            "panel created"
        );
        Ok(panel)
    }

    /// Close an open panel and release its members
    pub async fn close_panel(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<PanelDoc, PortalError> {
        ctx.require(Role::Admin)?;
        let panel = self.store.close_panel(id).await?;
        info!(panel = %id, released = panel.members.len(), "panel closed");
        Ok(panel)
    }

    /// Replace the panel's contract set
    pub async fn add_contracts(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
        contracts: &[ObjectId],
    ) -> Result<PanelDoc, PortalError> {
        ctx.require(Role::Admin)?;
        let contracts = dedupe(contracts);
        let panel = self.store.assign_contracts(id, &contracts).await?;
        info!(panel = %id, contracts = contracts.len(), "panel contracts assigned");
        Ok(panel)
    }

    /// Staff not currently on an open panel
    pub async fn eligible_staff(&self, ctx: &AuthContext) -> Result<Vec<UserSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        Ok(self
            .store
            .list_eligible_staff()
            .await?
            .iter()
            .map(UserSummary::member)
            .collect())
    }

    pub async fn panel_details(
        &self,
        ctx: &AuthContext,
        id: &ObjectId,
    ) -> Result<PanelDetailsView, PortalError> {
        ctx.require(Role::Admin)?;

        let panel = self
            .store
            .find_panel(id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Panel does not exist!".into()))?;

        let users: HashMap<ObjectId, _> = self
            .store
            .find_users(&panel.members)
            .await?
            .into_iter()
            .filter_map(|u| u._id.map(|id| (id, u)))
            .collect();
        let contracts = self.store.find_contracts(&panel.contracts).await?;

        Ok(PanelDetailsView {
            id: id.to_hex(),
            name: panel.name.clone(),
            is_closed: panel.is_closed,
            members: panel
                .members
                .iter()
                .filter_map(|m| users.get(m))
                .map(UserSummary::member)
                .collect(),
            contracts: contracts
                .iter()
                .map(|c| ContractBrief {
                    id: c._id.map(|id| id.to_hex()).unwrap_or_default(),
                    project: c.project.clone(),
                })
                .collect(),
        })
    }

    pub async fn open_panels(&self, ctx: &AuthContext) -> Result<Vec<PanelSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        Ok(self
            .store
            .list_open_panels()
            .await?
            .iter()
            .map(PanelSummary::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::UserDoc;
    use crate::db::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: PanelService,
        admin: AuthContext,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let service = PanelService::new(store.clone());
            let admin = Self::add(&store, "admin", Role::Admin).await;
            Self {
                store,
                service,
                admin,
            }
        }

        async fn add(store: &MemoryStore, name: &str, role: Role) -> AuthContext {
            let id = store
                .insert_user(UserDoc::new(
                    name.into(),
                    format!("{name}@uni.edu"),
                    "hash".into(),
                    role,
                ))
                .await
                .unwrap();
            AuthContext::from_user(&store.find_user(&id).await.unwrap().unwrap()).unwrap()
        }

        async fn staff(&self, n: usize) -> Vec<ObjectId> {
            let mut ids = Vec::new();
            for i in 0..n {
                ids.push(Self::add(&self.store, &format!("staff{i}"), Role::Panel).await.identity);
            }
            ids
        }
    }

    #[tokio::test]
    async fn test_member_limit_and_name() {
        let fx = Fixture::new().await;
        let eight = fx.staff(8).await;

        assert!(matches!(
            fx.service.create_panel(&fx.admin, Some("P"), &eight).await,
            Err(PortalError::CapacityExceeded(_))
        ));
        assert!(matches!(
            fx.service.create_panel(&fx.admin, Some("  "), &eight[..3]).await,
            Err(PortalError::NameRequired)
        ));
        assert!(matches!(
            fx.service.create_panel(&fx.admin, None, &eight[..3]).await,
            Err(PortalError::NameRequired)
        ));

        let panel = fx
            .service
            .create_panel(&fx.admin, Some("P"), &eight[..7])
            .await
            .unwrap();
        assert_eq!(panel.members.len(), 7);
    }

    #[tokio::test]
    async fn test_member_in_one_open_panel() {
        let fx = Fixture::new().await;
        let staff = fx.staff(3).await;

        let first = fx
            .service
            .create_panel(&fx.admin, Some("P1"), &staff[..2])
            .await
            .unwrap();
        assert!(matches!(
            fx.service.create_panel(&fx.admin, Some("P2"), &staff[1..]).await,
            Err(PortalError::MemberAlreadyAssigned)
        ));

        // The failed attempt left staff[2] untouched
        let eligible = fx.service.eligible_staff(&fx.admin).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, staff[2].to_hex());

        fx.service
            .close_panel(&fx.admin, &first._id.unwrap())
            .await
            .unwrap();
        assert!(fx
            .service
            .create_panel(&fx.admin, Some("P2"), &staff[1..])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_students_cannot_sit_on_panels() {
        let fx = Fixture::new().await;
        let student = Fixture::add(&fx.store, "ali", Role::Student).await;

        assert!(matches!(
            fx.service
                .create_panel(&fx.admin, Some("P"), &[student.identity])
                .await,
            Err(PortalError::Validation(_))
        ));
        assert!(matches!(
            fx.service
                .create_panel(&fx.admin, Some("P"), &[ObjectId::new()])
                .await,
            Err(PortalError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.create_panel(&student, Some("P"), &[]).await,
            Err(PortalError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_close_unknown_panel() {
        let fx = Fixture::new().await;
        assert!(matches!(
            fx.service.close_panel(&fx.admin, &ObjectId::new()).await,
            Err(PortalError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_details_and_listing() {
        let fx = Fixture::new().await;
        let staff = fx.staff(2).await;

        let panel = fx
            .service
            .create_panel(&fx.admin, Some("Evaluation A"), &staff)
            .await
            .unwrap();
        let id = panel._id.unwrap();

        let details = fx.service.panel_details(&fx.admin, &id).await.unwrap();
        assert_eq!(details.name, "Evaluation A");
        assert_eq!(details.members.len(), 2);
        assert_eq!(details.members[0].role, Some(Role::Panel));
        assert!(details.contracts.is_empty());

        assert_eq!(fx.service.open_panels(&fx.admin).await.unwrap().len(), 1);
        fx.service.close_panel(&fx.admin, &id).await.unwrap();
        assert!(fx.service.open_panels(&fx.admin).await.unwrap().is_empty());
    }
}
