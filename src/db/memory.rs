//! In-process store
//!
//! Backs `--dev-mode` and the test suite. One async mutex guards all state, so
//! every primitive observes and writes a consistent snapshot.

use async_trait::async_trait;
use bson::oid::ObjectId;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::auth::Role;
use crate::db::schemas::{
    AcceptanceStatus, AdvisorForm, ContractDoc, MarksChannel, Metadata, PanelDoc, TaskDoc,
    UserDoc,
};
use crate::db::store::{AcceptOutcome, ContractQuery, PortalStore};
use crate::types::PortalError;

#[derive(Default)]
struct State {
    users: BTreeMap<ObjectId, UserDoc>,
    contracts: BTreeMap<ObjectId, ContractDoc>,
    panels: BTreeMap<ObjectId, PanelDoc>,
    tasks: BTreeMap<ObjectId, TaskDoc>,
}

impl State {
    fn open_accepted(&self, advisor: &ObjectId) -> u64 {
        self.contracts
            .values()
            .filter(|c| &c.advisor == advisor && c.is_open_accepted())
            .count() as u64
    }
}

/// `PortalStore` held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn assign_id(id: &mut Option<ObjectId>, metadata: &mut Metadata) -> ObjectId {
    let new_id = id.unwrap_or_else(ObjectId::new);
    *id = Some(new_id);
    *metadata = Metadata::new();
    new_id
}

#[async_trait]
impl PortalStore for MemoryStore {
    async fn insert_user(&self, mut user: UserDoc) -> Result<ObjectId, PortalError> {
        let mut state = self.state.lock().await;

        let email_taken = state.users.values().any(|u| u.email == user.email);
        let id_taken = user.student_id.as_ref().is_some_and(|sid| {
            state
                .users
                .values()
                .any(|u| u.student_id.as_ref() == Some(sid))
        });
        if email_taken || id_taken {
            return Err(PortalError::Database("duplicate key".into()));
        }

        let id = assign_id(&mut user._id, &mut user.metadata);
        state.users.insert(id, user);
        Ok(id)
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>, PortalError> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Option<UserDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.student_id.as_deref() == Some(student_id))
            .cloned())
    }

    async fn find_users(&self, ids: &[ObjectId]) -> Result<Vec<UserDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<UserDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect())
    }

    async fn list_eligible_staff(&self) -> Result<Vec<UserDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.role.is_staff() && !u.in_panel)
            .cloned()
            .collect())
    }

    async fn insert_contract(&self, mut contract: ContractDoc) -> Result<ObjectId, PortalError> {
        let mut state = self.state.lock().await;
        let id = assign_id(&mut contract._id, &mut contract.metadata);
        state.contracts.insert(id, contract);
        Ok(id)
    }

    async fn find_contract(&self, id: &ObjectId) -> Result<Option<ContractDoc>, PortalError> {
        Ok(self.state.lock().await.contracts.get(id).cloned())
    }

    async fn find_contracts(&self, ids: &[ObjectId]) -> Result<Vec<ContractDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.contracts.get(id).cloned())
            .collect())
    }

    async fn query_contracts(
        &self,
        query: &ContractQuery,
    ) -> Result<Vec<ContractDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .contracts
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect())
    }

    async fn count_open_accepted(&self, advisor: &ObjectId) -> Result<u64, PortalError> {
        Ok(self.state.lock().await.open_accepted(advisor))
    }

    async fn find_open_engagement(
        &self,
        requester: Option<&ObjectId>,
        student_id: &str,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .contracts
            .values()
            .find(|c| {
                c.is_open_engagement()
                    && (requester == Some(&c.student) || c.names_student(student_id))
            })
            .cloned())
    }

    async fn accept_contract(
        &self,
        contract: &ObjectId,
        advisor: &ObjectId,
        limit: u64,
    ) -> Result<AcceptOutcome, PortalError> {
        let mut state = self.state.lock().await;

        let pending = state.contracts.get(contract).is_some_and(|doc| {
            &doc.advisor == advisor
                && !doc.is_closed
                && doc.acceptance == AcceptanceStatus::NotResponded
        });
        if !pending {
            return Ok(AcceptOutcome::NotTransitionable);
        }
        if state.open_accepted(advisor) >= limit {
            return Ok(AcceptOutcome::CapacityExceeded);
        }

        match state.contracts.get_mut(contract) {
            Some(doc) => {
                doc.acceptance = AcceptanceStatus::Accepted;
                doc.metadata.touch();
                Ok(AcceptOutcome::Accepted(doc.clone()))
            }
            None => Ok(AcceptOutcome::NotTransitionable),
        }
    }

    async fn transition_contract(
        &self,
        id: &ObjectId,
        from: AcceptanceStatus,
        to: AcceptanceStatus,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut state = self.state.lock().await;
        Ok(match state.contracts.get_mut(id) {
            Some(doc) if !doc.is_closed && doc.acceptance == from => {
                doc.acceptance = to;
                doc.metadata.touch();
                Some(doc.clone())
            }
            _ => None,
        })
    }

    async fn close_contract(
        &self,
        id: &ObjectId,
        from: AcceptanceStatus,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut state = self.state.lock().await;
        Ok(match state.contracts.get_mut(id) {
            Some(doc) if !doc.is_closed && doc.acceptance == from => {
                doc.is_closed = true;
                doc.metadata.touch();
                Some(doc.clone())
            }
            _ => None,
        })
    }

    async fn set_advisor_form(
        &self,
        id: &ObjectId,
        form: AdvisorForm,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut state = self.state.lock().await;
        Ok(match state.contracts.get_mut(id) {
            Some(doc) if doc.advisor_form.is_none() => {
                doc.advisor_form = Some(form);
                doc.metadata.touch();
                Some(doc.clone())
            }
            _ => None,
        })
    }

    async fn set_scalar_mark(
        &self,
        id: &ObjectId,
        channel: MarksChannel,
        value: f64,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut state = self.state.lock().await;
        Ok(state.contracts.get_mut(id).map(|doc| {
            doc.marks.set_scalar(channel, value);
            doc.metadata.touch();
            doc.clone()
        }))
    }

    async fn upsert_evaluator_mark(
        &self,
        id: &ObjectId,
        channel: MarksChannel,
        evaluator: &ObjectId,
        value: f64,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut state = self.state.lock().await;
        Ok(state.contracts.get_mut(id).map(|doc| {
            doc.marks.upsert_entry(channel, *evaluator, value);
            doc.metadata.touch();
            doc.clone()
        }))
    }

    async fn push_logform_entry(
        &self,
        contract: &ObjectId,
        task: &ObjectId,
    ) -> Result<bool, PortalError> {
        let mut state = self.state.lock().await;
        Ok(match state.contracts.get_mut(contract) {
            Some(doc) => {
                if !doc.logform_entries.contains(task) {
                    doc.logform_entries.push(*task);
                }
                true
            }
            None => false,
        })
    }

    async fn pull_logform_entry(
        &self,
        contract: &ObjectId,
        task: &ObjectId,
    ) -> Result<bool, PortalError> {
        let mut state = self.state.lock().await;
        Ok(match state.contracts.get_mut(contract) {
            Some(doc) => {
                doc.logform_entries.retain(|entry| entry != task);
                true
            }
            None => false,
        })
    }

    async fn create_panel(&self, mut panel: PanelDoc) -> Result<PanelDoc, PortalError> {
        let mut state = self.state.lock().await;

        let all_free = panel
            .members
            .iter()
            .all(|m| state.users.get(m).is_some_and(|u| !u.in_panel));
        if !all_free {
            return Err(PortalError::MemberAlreadyAssigned);
        }

        let id = assign_id(&mut panel._id, &mut panel.metadata);
        for member in &panel.members {
            if let Some(user) = state.users.get_mut(member) {
                user.in_panel = true;
                user.panel = Some(id);
                user.metadata.touch();
            }
        }
        state.panels.insert(id, panel.clone());
        debug!(panel = %id, "panel created");
        Ok(panel)
    }

    async fn close_panel(&self, id: &ObjectId) -> Result<PanelDoc, PortalError> {
        let mut state = self.state.lock().await;

        let panel = match state.panels.get_mut(id) {
            Some(panel) if !panel.is_closed => {
                panel.is_closed = true;
                panel.metadata.touch();
                panel.clone()
            }
            _ => {
                return Err(PortalError::InvalidOperation(
                    "Panel does not exist or is already closed!".into(),
                ))
            }
        };

        for user in state.users.values_mut() {
            if user._id.is_some_and(|uid| panel.has_member(&uid)) || user.panel == Some(*id) {
                user.in_panel = false;
                user.panel = None;
                user.metadata.touch();
            }
        }
        Ok(panel)
    }

    async fn assign_contracts(
        &self,
        panel_id: &ObjectId,
        contracts: &[ObjectId],
    ) -> Result<PanelDoc, PortalError> {
        let mut state = self.state.lock().await;

        let previous = match state.panels.get(panel_id) {
            None => return Err(PortalError::NotFound("Panel does not exist!".into())),
            Some(panel) if panel.is_closed => {
                return Err(PortalError::InvalidOperation("Panel is closed!".into()))
            }
            Some(panel) => panel.contracts.clone(),
        };

        if !contracts.iter().all(|c| state.contracts.contains_key(c)) {
            return Err(PortalError::NotFound("Entity does not exist!".into()));
        }
        let taken = state.panels.values().any(|p| {
            p._id.as_ref() != Some(panel_id)
                && !p.is_closed
                && contracts.iter().any(|c| p.has_contract(c))
        });
        if taken {
            return Err(PortalError::InvalidOperation(
                "One or more contracts are already in another panel!".into(),
            ));
        }

        for dropped in previous.iter().filter(|c| !contracts.contains(c)) {
            if let Some(doc) = state.contracts.get_mut(dropped) {
                if doc.panel == Some(*panel_id) {
                    doc.in_panel = false;
                    doc.panel = None;
                    doc.metadata.touch();
                }
            }
        }
        for contract in contracts {
            if let Some(doc) = state.contracts.get_mut(contract) {
                doc.in_panel = true;
                doc.panel = Some(*panel_id);
                doc.metadata.touch();
            }
        }

        let panel = state
            .panels
            .get_mut(panel_id)
            .ok_or_else(|| PortalError::NotFound("Panel does not exist!".into()))?;
        panel.contracts = contracts.to_vec();
        panel.metadata.touch();
        Ok(panel.clone())
    }

    async fn find_panel(&self, id: &ObjectId) -> Result<Option<PanelDoc>, PortalError> {
        Ok(self.state.lock().await.panels.get(id).cloned())
    }

    async fn list_open_panels(&self) -> Result<Vec<PanelDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .panels
            .values()
            .filter(|p| !p.is_closed)
            .cloned()
            .collect())
    }

    async fn find_open_panel_for_member(
        &self,
        member: &ObjectId,
    ) -> Result<Option<PanelDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .panels
            .values()
            .find(|p| !p.is_closed && p.has_member(member))
            .cloned())
    }

    async fn find_open_panel_for_contract(
        &self,
        contract: &ObjectId,
    ) -> Result<Option<PanelDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(state
            .panels
            .values()
            .find(|p| !p.is_closed && p.has_contract(contract))
            .cloned())
    }

    async fn insert_task(&self, mut task: TaskDoc) -> Result<ObjectId, PortalError> {
        let mut state = self.state.lock().await;
        let id = assign_id(&mut task._id, &mut task.metadata);
        state.tasks.insert(id, task);
        Ok(id)
    }

    async fn find_task(&self, id: &ObjectId) -> Result<Option<TaskDoc>, PortalError> {
        Ok(self.state.lock().await.tasks.get(id).cloned())
    }

    async fn find_tasks(&self, ids: &[ObjectId]) -> Result<Vec<TaskDoc>, PortalError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect())
    }

    async fn toggle_task_sign(&self, id: &ObjectId) -> Result<Option<TaskDoc>, PortalError> {
        let mut state = self.state.lock().await;
        Ok(state.tasks.get_mut(id).map(|task| {
            task.advisor_signed = !task.advisor_signed;
            task.metadata.touch();
            task.clone()
        }))
    }

    async fn delete_task(&self, id: &ObjectId) -> Result<bool, PortalError> {
        Ok(self.state.lock().await.tasks.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{Project, StudentSlot};

    async fn staff(store: &MemoryStore, email: &str) -> ObjectId {
        store
            .insert_user(UserDoc::new(
                "Staff".into(),
                email.into(),
                "hash".into(),
                Role::Panel,
            ))
            .await
            .unwrap()
    }

    async fn open_contract(store: &MemoryStore, advisor: ObjectId) -> ObjectId {
        store
            .insert_contract(ContractDoc::new(
                ObjectId::new(),
                advisor,
                Project::default(),
                StudentSlot::default(),
                StudentSlot::default(),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        staff(&store, "a@uni.edu").await;
        let again = store
            .insert_user(UserDoc::new(
                "Other".into(),
                "a@uni.edu".into(),
                "hash".into(),
                Role::Advisor,
            ))
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_accept_respects_limit() {
        let store = MemoryStore::new();
        let advisor = ObjectId::new();
        let first = open_contract(&store, advisor).await;
        let second = open_contract(&store, advisor).await;

        assert!(matches!(
            store.accept_contract(&first, &advisor, 1).await.unwrap(),
            AcceptOutcome::Accepted(_)
        ));
        assert!(matches!(
            store.accept_contract(&second, &advisor, 1).await.unwrap(),
            AcceptOutcome::CapacityExceeded
        ));
        assert!(matches!(
            store.accept_contract(&first, &advisor, 5).await.unwrap(),
            AcceptOutcome::NotTransitionable
        ));
        assert_eq!(store.count_open_accepted(&advisor).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_accept_requires_owning_advisor() {
        let store = MemoryStore::new();
        let advisor = ObjectId::new();
        let contract = open_contract(&store, advisor).await;

        assert!(matches!(
            store
                .accept_contract(&contract, &ObjectId::new(), 5)
                .await
                .unwrap(),
            AcceptOutcome::NotTransitionable
        ));
    }

    #[tokio::test]
    async fn test_create_panel_is_all_or_nothing() {
        let store = MemoryStore::new();
        let m1 = staff(&store, "m1@uni.edu").await;
        let m2 = staff(&store, "m2@uni.edu").await;
        let m3 = staff(&store, "m3@uni.edu").await;

        store
            .create_panel(PanelDoc::new("P1".into(), vec![m1]))
            .await
            .unwrap();

        let result = store
            .create_panel(PanelDoc::new("P2".into(), vec![m2, m1, m3]))
            .await;
        assert!(matches!(result, Err(PortalError::MemberAlreadyAssigned)));

        let m2_doc = store.find_user(&m2).await.unwrap().unwrap();
        assert!(!m2_doc.in_panel);
        assert_eq!(store.list_open_panels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_panel_twice() {
        let store = MemoryStore::new();
        let m1 = staff(&store, "m1@uni.edu").await;
        let panel = store
            .create_panel(PanelDoc::new("P1".into(), vec![m1]))
            .await
            .unwrap();
        let id = panel._id.unwrap();

        store.close_panel(&id).await.unwrap();
        assert!(matches!(
            store.close_panel(&id).await,
            Err(PortalError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_assign_contracts_replaces_set() {
        let store = MemoryStore::new();
        let m1 = staff(&store, "m1@uni.edu").await;
        let advisor = ObjectId::new();
        let c1 = open_contract(&store, advisor).await;
        let c2 = open_contract(&store, advisor).await;
        let panel = store
            .create_panel(PanelDoc::new("P1".into(), vec![m1]))
            .await
            .unwrap()
            ._id
            .unwrap();

        store.assign_contracts(&panel, &[c1]).await.unwrap();
        let updated = store.assign_contracts(&panel, &[c2]).await.unwrap();
        assert_eq!(updated.contracts, vec![c2]);

        let c1_doc = store.find_contract(&c1).await.unwrap().unwrap();
        let c2_doc = store.find_contract(&c2).await.unwrap().unwrap();
        assert!(!c1_doc.in_panel);
        assert_eq!(c1_doc.panel, None);
        assert!(c2_doc.in_panel);
        assert_eq!(c2_doc.panel, Some(panel));
    }

    #[tokio::test]
    async fn test_logform_entries_deduplicated() {
        let store = MemoryStore::new();
        let contract = open_contract(&store, ObjectId::new()).await;
        let task = ObjectId::new();

        assert!(store.push_logform_entry(&contract, &task).await.unwrap());
        assert!(store.push_logform_entry(&contract, &task).await.unwrap());
        let doc = store.find_contract(&contract).await.unwrap().unwrap();
        assert_eq!(doc.logform_entries, vec![task]);

        store.pull_logform_entry(&contract, &task).await.unwrap();
        let doc = store.find_contract(&contract).await.unwrap().unwrap();
        assert!(doc.logform_entries.is_empty());
        assert!(!store
            .push_logform_entry(&ObjectId::new(), &task)
            .await
            .unwrap());
    }
}
