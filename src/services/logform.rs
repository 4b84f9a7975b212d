//! Task/logform tracking
//!
//! Advisors assign weekly tasks against a contract; each task is due seven
//! days after assignment and is signed off by the advisor. Deleting a task
//! also removes its reference from the contract.

use bson::oid::ObjectId;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{AuthContext, Role};
use crate::db::schemas::{ContractDoc, TaskDoc};
use crate::db::PortalStore;
use crate::services::contracts::ContractService;
use crate::services::views::TaskView;
use crate::types::PortalError;

pub struct LogformService {
    store: Arc<dyn PortalStore>,
    contracts: ContractService,
}

impl LogformService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self {
            contracts: ContractService::new(store.clone()),
            store,
        }
    }

    pub async fn assign_task(
        &self,
        ctx: &AuthContext,
        contract_id: &ObjectId,
        task: &str,
    ) -> Result<TaskView, PortalError> {
        self.contracts.owned_by_advisor(ctx, contract_id).await?;

        let task = task.trim();
        if task.is_empty() {
            return Err(PortalError::Validation("Task must be entered!".into()));
        }

        let mut doc = TaskDoc::new(*contract_id, task.to_string());
        let task_id = self.store.insert_task(doc.clone()).await?;
        doc._id = Some(task_id);

        if !self.store.push_logform_entry(contract_id, &task_id).await? {
            // Contract vanished between the ownership check and the push
            self.store.delete_task(&task_id).await?;
            return Err(PortalError::NotFound("Entity does not exist!".into()));
        }

        info!(contract = %contract_id, task = %task_id, "task assigned");
        Ok(TaskView::from(&doc))
    }

    /// Tasks referenced by the contract, in assignment order
    pub async fn list_tasks(
        &self,
        ctx: &AuthContext,
        contract_id: &ObjectId,
    ) -> Result<Vec<TaskView>, PortalError> {
        let contract = match ctx.role {
            Role::Advisor => self.contracts.owned_by_advisor(ctx, contract_id).await?,
            Role::Student => self.contracts.owned_by_student(ctx, contract_id).await?,
            Role::Admin | Role::Panel => {
                return Err(PortalError::Unauthorized("Unauthorized Access!".into()))
            }
        };

        let tasks = self.store.find_tasks(&contract.logform_entries).await?;
        if tasks.len() != contract.logform_entries.len() {
            warn!(
                contract = %contract_id,
                dangling = contract.logform_entries.len() - tasks.len(),
                "skipping unresolved logform entries"
            );
        }
        Ok(tasks.iter().map(TaskView::from).collect())
    }

    pub async fn toggle_sign(
        &self,
        ctx: &AuthContext,
        task_id: &ObjectId,
    ) -> Result<TaskView, PortalError> {
        self.owned_task(ctx, task_id).await?;

        let task = self
            .store
            .toggle_task_sign(task_id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Entity does not exist!".into()))?;

        info!(task = %task_id, signed = task.advisor_signed, "task sign toggled");
        Ok(TaskView::from(&task))
    }

    pub async fn delete_task(&self, ctx: &AuthContext, task_id: &ObjectId) -> Result<(), PortalError> {
        let (task, _) = self.owned_task(ctx, task_id).await?;

        self.store.pull_logform_entry(&task.contract, task_id).await?;
        if !self.store.delete_task(task_id).await? {
            return Err(PortalError::NotFound("Entity does not exist!".into()));
        }

        info!(task = %task_id, contract = %task.contract, "task deleted");
        Ok(())
    }

    /// Load a task whose contract belongs to the calling advisor and lists it
    async fn owned_task(
        &self,
        ctx: &AuthContext,
        task_id: &ObjectId,
    ) -> Result<(TaskDoc, ContractDoc), PortalError> {
        ctx.require(Role::Advisor)?;

        let task = self
            .store
            .find_task(task_id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Entity does not exist!".into()))?;
        let contract = self.contracts.owned_by_advisor(ctx, &task.contract).await?;

        if !contract.logform_entries.contains(task_id) {
            return Err(PortalError::NotFound("Entity does not exist!".into()));
        }
        Ok((task, contract))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{Project, StudentSlot, UserDoc};
    use crate::db::MemoryStore;

    async fn user(store: &MemoryStore, name: &str, role: Role) -> AuthContext {
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

    async fn setup() -> (Arc<MemoryStore>, LogformService, AuthContext, AuthContext, ObjectId) {
        let store = Arc::new(MemoryStore::new());
        let service = LogformService::new(store.clone());
        let advisor = user(&store, "khan", Role::Advisor).await;
        let student = user(&store, "ali", Role::Student).await;
        let contract = store
            .insert_contract(ContractDoc::new(
                student.identity,
                advisor.identity,
                Project::default(),
                StudentSlot::default(),
                StudentSlot::default(),
            ))
            .await
            .unwrap();
        (store, service, advisor, student, contract)
    }

    #[tokio::test]
    async fn test_assign_and_list() {
        let (_store, service, advisor, student, contract) = setup().await;

        let first = service
            .assign_task(&advisor, &contract, "Literature review")
            .await
            .unwrap();
        assert_eq!(first.task_status, "");
        assert!(!first.advisor_signed);
        service
            .assign_task(&advisor, &contract, "Requirements draft")
            .await
            .unwrap();

        let tasks = service.list_tasks(&student, &contract).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_assigned, "Literature review");
        assert_eq!(tasks[1].task_assigned, "Requirements draft");

        assert!(matches!(
            service.assign_task(&advisor, &ObjectId::new(), "x").await,
            Err(PortalError::NotFound(_))
        ));
        assert!(matches!(
            service.assign_task(&advisor, &contract, "   ").await,
            Err(PortalError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_sign_flips() {
        let (_store, service, advisor, _student, contract) = setup().await;
        let task = service
            .assign_task(&advisor, &contract, "Prototype")
            .await
            .unwrap();
        let id = ObjectId::parse_str(&task.id).unwrap();

        assert!(service.toggle_sign(&advisor, &id).await.unwrap().advisor_signed);
        assert!(!service.toggle_sign(&advisor, &id).await.unwrap().advisor_signed);
    }

    #[tokio::test]
    async fn test_delete_cascades_reference() {
        let (store, service, advisor, student, contract) = setup().await;
        let task = service
            .assign_task(&advisor, &contract, "Prototype")
            .await
            .unwrap();
        let id = ObjectId::parse_str(&task.id).unwrap();

        service.delete_task(&advisor, &id).await.unwrap();

        let doc = store.find_contract(&contract).await.unwrap().unwrap();
        assert!(doc.logform_entries.is_empty());
        assert!(service.list_tasks(&student, &contract).await.unwrap().is_empty());
        assert!(matches!(
            service.delete_task(&advisor, &id).await,
            Err(PortalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_advisor_cannot_touch_tasks() {
        let (store, service, advisor, _student, contract) = setup().await;
        let other = user(&store, "malik", Role::Advisor).await;
        let task = service
            .assign_task(&advisor, &contract, "Prototype")
            .await
            .unwrap();
        let id = ObjectId::parse_str(&task.id).unwrap();

        assert!(matches!(
            service.toggle_sign(&other, &id).await,
            Err(PortalError::Unauthorized(_))
        ));
        assert!(matches!(
            service.list_tasks(&other, &contract).await,
            Err(PortalError::Unauthorized(_))
        ));
    }
}
