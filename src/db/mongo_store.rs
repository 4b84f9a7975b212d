//! MongoDB-backed `PortalStore`
//!
//! Single-document conditions use `find_one_and_update` filters. Operations
//! touching several documents run in a multi-document transaction (replica set
//! required) and are retried on `TransientTransactionError`.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use mongodb::ClientSession;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::Role;
use crate::db::mongo::{touched, MongoClient, MongoCollection};
use crate::db::schemas::{
    AcceptanceStatus, AdvisorForm, ContractDoc, MarksChannel, PanelDoc, TaskDoc, UserDoc,
    CONTRACT_COLLECTION, PANEL_COLLECTION, TASK_COLLECTION, USER_COLLECTION,
};
use crate::db::store::{AcceptOutcome, ContractQuery, PortalStore};
use crate::types::PortalError;

/// Attempts before a transaction or upsert loop gives up
const MAX_ATTEMPTS: usize = 8;

/// Driver-level result wrapping a domain result: the outer error is retryable,
/// the inner one aborts the transaction and reaches the caller unchanged.
type TxnResult<T> = mongodb::error::Result<Result<T, PortalError>>;

/// Run `$body` inside a transaction, retrying transient failures
macro_rules! in_transaction {
    ($store:expr, $session:ident => $body:expr) => {{
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut $session = $store.client.start_session().await?;
            $session.start_transaction().await?;

            let outcome: TxnResult<_> = $body.await;
            match outcome {
                Ok(Ok(value)) => match commit(&mut $session).await {
                    Ok(()) => break Ok(value),
                    Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                        warn!(attempt, "transaction commit conflict, retrying");
                        continue;
                    }
                    Err(e) => break Err(PortalError::from(e)),
                },
                Ok(Err(domain)) => {
                    let _ = $session.abort_transaction().await;
                    break Err(domain);
                }
                Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                    let _ = $session.abort_transaction().await;
                    warn!(attempt, "transaction conflict, retrying");
                    continue;
                }
                Err(e) => {
                    let _ = $session.abort_transaction().await;
                    break Err(PortalError::from(e));
                }
            }
        }
    }};
}

fn is_transient(err: &mongodb::error::Error) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}

/// Backoff before the next commit retry, `None` once attempts run out
fn commit_retry_delay(attempt: usize) -> Option<Duration> {
    (attempt < MAX_ATTEMPTS).then(|| Duration::from_millis(10 << attempt.min(6)))
}

async fn commit(session: &mut ClientSession) -> mongodb::error::Result<()> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Err(e) if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                let Some(delay) = commit_retry_delay(attempt) else {
                    return Err(e);
                };
                warn!(attempt, "commit result unknown, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn id_list(ids: &[ObjectId]) -> Vec<Bson> {
    ids.iter().map(|id| Bson::ObjectId(*id)).collect()
}

fn contract_filter(query: &ContractQuery) -> Document {
    let mut filter = Document::new();
    if let Some(student) = query.student {
        filter.insert("student", student);
    }
    if let Some(advisor) = query.advisor {
        filter.insert("advisor", advisor);
    }
    if let Some(acceptance) = query.acceptance {
        filter.insert("acceptance", acceptance.as_str());
    }
    if let Some(is_closed) = query.is_closed {
        filter.insert("is_closed", is_closed);
    }
    if let Some(in_panel) = query.in_panel {
        filter.insert("in_panel", in_panel);
    }
    filter
}

/// Keep documents in the order of `ids`
fn ordered<T>(ids: &[ObjectId], mut docs: Vec<T>, id_of: impl Fn(&T) -> Option<ObjectId>) -> Vec<T> {
    let mut out = Vec::with_capacity(docs.len());
    for id in ids {
        if let Some(pos) = docs.iter().position(|d| id_of(d) == Some(*id)) {
            out.push(docs.swap_remove(pos));
        }
    }
    out
}

/// Production store on MongoDB
pub struct MongoStore {
    client: MongoClient,
    users: MongoCollection<UserDoc>,
    contracts: MongoCollection<ContractDoc>,
    panels: MongoCollection<PanelDoc>,
    tasks: MongoCollection<TaskDoc>,
}

impl MongoStore {
    /// Open all collections and apply their indexes
    pub async fn new(client: MongoClient) -> Result<Self, PortalError> {
        let users = client.collection::<UserDoc>(USER_COLLECTION).await?;
        let contracts = client.collection::<ContractDoc>(CONTRACT_COLLECTION).await?;
        let panels = client.collection::<PanelDoc>(PANEL_COLLECTION).await?;
        let tasks = client.collection::<TaskDoc>(TASK_COLLECTION).await?;

        Ok(Self {
            client,
            users,
            contracts,
            panels,
            tasks,
        })
    }

    async fn accept_body(
        &self,
        session: &mut ClientSession,
        contract: &ObjectId,
        advisor: &ObjectId,
        limit: u64,
    ) -> TxnResult<AcceptOutcome> {
        // Every accept for this advisor writes the same document, so two
        // concurrent transactions cannot both commit on a stale count.
        self.users
            .update_one_in(
                doc! { "_id": advisor },
                doc! { "$inc": { "accept_seq": 1_i64 } },
                session,
            )
            .await?;

        let pending = doc! {
            "_id": contract,
            "advisor": advisor,
            "acceptance": AcceptanceStatus::NotResponded.as_str(),
            "is_closed": false,
        };
        if self.contracts.count_in(pending.clone(), session).await? == 0 {
            return Ok(Ok(AcceptOutcome::NotTransitionable));
        }

        let open = self
            .contracts
            .count_in(
                doc! {
                    "advisor": advisor,
                    "acceptance": AcceptanceStatus::Accepted.as_str(),
                    "is_closed": false,
                },
                session,
            )
            .await?;
        if open >= limit {
            return Ok(Ok(AcceptOutcome::CapacityExceeded));
        }

        let result = self
            .contracts
            .update_one_in(
                pending,
                doc! { "$set": {
                    "acceptance": AcceptanceStatus::Accepted.as_str(),
                    "metadata.updated_at": bson::DateTime::now(),
                } },
                session,
            )
            .await?;
        if result.matched_count == 0 {
            return Ok(Ok(AcceptOutcome::NotTransitionable));
        }

        let doc = self
            .contracts
            .find_one_in(doc! { "_id": contract }, session)
            .await?;
        Ok(Ok(match doc {
            Some(doc) => AcceptOutcome::Accepted(doc),
            None => AcceptOutcome::NotTransitionable,
        }))
    }

    async fn create_panel_body(
        &self,
        session: &mut ClientSession,
        panel: &PanelDoc,
        id: ObjectId,
    ) -> TxnResult<()> {
        self.panels.insert_one_in(panel.clone(), session).await?;

        let result = self
            .users
            .update_many_in(
                doc! {
                    "_id": { "$in": id_list(&panel.members) },
                    "in_panel": { "$ne": true },
                },
                doc! { "$set": { "in_panel": true, "panel": id, "metadata.updated_at": bson::DateTime::now() } },
                session,
            )
            .await?;

        if result.modified_count != panel.members.len() as u64 {
            return Ok(Err(PortalError::MemberAlreadyAssigned));
        }
        Ok(Ok(()))
    }

    async fn close_panel_body(
        &self,
        session: &mut ClientSession,
        id: &ObjectId,
    ) -> TxnResult<PanelDoc> {
        let panel = match self
            .panels
            .find_one_in(doc! { "_id": id, "is_closed": false }, session)
            .await?
        {
            Some(panel) => panel,
            None => {
                return Ok(Err(PortalError::InvalidOperation(
                    "Panel does not exist or is already closed!".into(),
                )))
            }
        };

        self.panels
            .update_one_in(
                doc! { "_id": id },
                doc! { "$set": { "is_closed": true, "metadata.updated_at": bson::DateTime::now() } },
                session,
            )
            .await?;

        self.users
            .update_many_in(
                doc! { "$or": [
                    { "_id": { "$in": id_list(&panel.members) } },
                    { "panel": id },
                ] },
                doc! { "$set": { "in_panel": false, "panel": Bson::Null, "metadata.updated_at": bson::DateTime::now() } },
                session,
            )
            .await?;

        Ok(Ok(PanelDoc {
            is_closed: true,
            ..panel
        }))
    }

    async fn assign_body(
        &self,
        session: &mut ClientSession,
        panel_id: &ObjectId,
        contracts: &[ObjectId],
    ) -> TxnResult<PanelDoc> {
        let panel = match self
            .panels
            .find_one_in(doc! { "_id": panel_id }, session)
            .await?
        {
            None => return Ok(Err(PortalError::NotFound("Panel does not exist!".into()))),
            Some(panel) if panel.is_closed => {
                return Ok(Err(PortalError::InvalidOperation("Panel is closed!".into())))
            }
            Some(panel) => panel,
        };

        let found = self
            .contracts
            .count_in(doc! { "_id": { "$in": id_list(contracts) } }, session)
            .await?;
        if found != contracts.len() as u64 {
            return Ok(Err(PortalError::NotFound("Entity does not exist!".into())));
        }

        let taken = self
            .panels
            .count_in(
                doc! {
                    "_id": { "$ne": panel_id },
                    "is_closed": false,
                    "contracts": { "$in": id_list(contracts) },
                },
                session,
            )
            .await?;
        if taken > 0 {
            return Ok(Err(PortalError::InvalidOperation(
                "One or more contracts are already in another panel!".into(),
            )));
        }

        let now = bson::DateTime::now();
        self.contracts
            .update_many_in(
                doc! {
                    "_id": { "$in": id_list(&panel.contracts), "$nin": id_list(contracts) },
                    "panel": panel_id,
                },
                doc! { "$set": { "in_panel": false, "panel": Bson::Null, "metadata.updated_at": now } },
                session,
            )
            .await?;
        self.contracts
            .update_many_in(
                doc! { "_id": { "$in": id_list(contracts) } },
                doc! { "$set": { "in_panel": true, "panel": panel_id, "metadata.updated_at": now } },
                session,
            )
            .await?;
        self.panels
            .update_one_in(
                doc! { "_id": panel_id },
                doc! { "$set": { "contracts": id_list(contracts), "metadata.updated_at": now } },
                session,
            )
            .await?;

        Ok(Ok(PanelDoc {
            contracts: contracts.to_vec(),
            ..panel
        }))
    }
}

#[async_trait]
impl PortalStore for MongoStore {
    async fn insert_user(&self, user: UserDoc) -> Result<ObjectId, PortalError> {
        self.users.insert_one(user).await
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>, PortalError> {
        self.users.find_one(doc! { "_id": id }).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>, PortalError> {
        self.users.find_one(doc! { "email": email }).await
    }

    async fn find_user_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Option<UserDoc>, PortalError> {
        self.users.find_one(doc! { "student_id": student_id }).await
    }

    async fn find_users(&self, ids: &[ObjectId]) -> Result<Vec<UserDoc>, PortalError> {
        let docs = self
            .users
            .find_many(doc! { "_id": { "$in": id_list(ids) } })
            .await?;
        Ok(ordered(ids, docs, |u| u._id))
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<UserDoc>, PortalError> {
        self.users.find_many(doc! { "role": role.to_string() }).await
    }

    async fn list_eligible_staff(&self) -> Result<Vec<UserDoc>, PortalError> {
        self.users
            .find_many(doc! {
                "role": { "$in": [Role::Advisor.to_string(), Role::Panel.to_string()] },
                "in_panel": { "$ne": true },
            })
            .await
    }

    async fn insert_contract(&self, contract: ContractDoc) -> Result<ObjectId, PortalError> {
        self.contracts.insert_one(contract).await
    }

    async fn find_contract(&self, id: &ObjectId) -> Result<Option<ContractDoc>, PortalError> {
        self.contracts.find_one(doc! { "_id": id }).await
    }

    async fn find_contracts(&self, ids: &[ObjectId]) -> Result<Vec<ContractDoc>, PortalError> {
        let docs = self
            .contracts
            .find_many(doc! { "_id": { "$in": id_list(ids) } })
            .await?;
        Ok(ordered(ids, docs, |c| c._id))
    }

    async fn query_contracts(
        &self,
        query: &ContractQuery,
    ) -> Result<Vec<ContractDoc>, PortalError> {
        self.contracts.find_many(contract_filter(query)).await
    }

    async fn count_open_accepted(&self, advisor: &ObjectId) -> Result<u64, PortalError> {
        self.contracts
            .count(doc! {
                "advisor": advisor,
                "acceptance": AcceptanceStatus::Accepted.as_str(),
                "is_closed": false,
            })
            .await
    }

    async fn find_open_engagement(
        &self,
        requester: Option<&ObjectId>,
        student_id: &str,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut parties = vec![
            doc! { "student_one.ID": student_id },
            doc! { "student_two.ID": student_id },
        ];
        if let Some(requester) = requester {
            parties.push(doc! { "student": requester });
        }

        self.contracts
            .find_one(doc! {
                "$or": parties,
                "acceptance": {
                    "$in": [
                        AcceptanceStatus::Accepted.as_str(),
                        AcceptanceStatus::NotResponded.as_str(),
                    ]
                },
                "is_closed": false,
            })
            .await
    }

    async fn accept_contract(
        &self,
        contract: &ObjectId,
        advisor: &ObjectId,
        limit: u64,
    ) -> Result<AcceptOutcome, PortalError> {
        in_transaction!(self, session => self.accept_body(&mut session, contract, advisor, limit))
    }

    async fn transition_contract(
        &self,
        id: &ObjectId,
        from: AcceptanceStatus,
        to: AcceptanceStatus,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut set = touched();
        set.insert("acceptance", to.as_str());
        self.contracts
            .find_one_and_update(
                doc! { "_id": id, "acceptance": from.as_str(), "is_closed": false },
                doc! { "$set": set },
            )
            .await
    }

    async fn close_contract(
        &self,
        id: &ObjectId,
        from: AcceptanceStatus,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut set = touched();
        set.insert("is_closed", true);
        self.contracts
            .find_one_and_update(
                doc! { "_id": id, "acceptance": from.as_str(), "is_closed": false },
                doc! { "$set": set },
            )
            .await
    }

    async fn set_advisor_form(
        &self,
        id: &ObjectId,
        form: AdvisorForm,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut set = touched();
        set.insert("advisor_form", bson::to_bson(&form)?);
        self.contracts
            .find_one_and_update(
                doc! { "_id": id, "advisor_form._id": { "$exists": false } },
                doc! { "$set": set },
            )
            .await
    }

    async fn set_scalar_mark(
        &self,
        id: &ObjectId,
        channel: MarksChannel,
        value: f64,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let mut set = touched();
        set.insert(channel.field_path(), value);
        self.contracts
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .await
    }

    async fn upsert_evaluator_mark(
        &self,
        id: &ObjectId,
        channel: MarksChannel,
        evaluator: &ObjectId,
        value: f64,
    ) -> Result<Option<ContractDoc>, PortalError> {
        let list = channel.field_path();
        let evaluator_path = format!("{list}.evaluator");
        let positional = format!("{list}.$.marks");

        for attempt in 1..=MAX_ATTEMPTS {
            // Replace the evaluator's existing entry in place
            let mut set = touched();
            set.insert(positional.as_str(), value);
            let mut filter = doc! { "_id": id };
            filter.insert(evaluator_path.as_str(), *evaluator);
            if let Some(doc) = self
                .contracts
                .find_one_and_update(filter, doc! { "$set": set })
                .await?
            {
                return Ok(Some(doc));
            }

            // No entry yet: append, guarded against a concurrent append
            let mut filter = doc! { "_id": id };
            filter.insert(evaluator_path.as_str(), doc! { "$ne": evaluator });
            let mut push = Document::new();
            push.insert(list, doc! { "evaluator": evaluator, "marks": value });
            if let Some(doc) = self
                .contracts
                .find_one_and_update(filter, doc! { "$push": push, "$set": touched() })
                .await?
            {
                return Ok(Some(doc));
            }

            if self.find_contract(id).await?.is_none() {
                return Ok(None);
            }
            debug!(attempt, channel = channel.name(), "evaluator mark raced, retrying");
        }

        Err(PortalError::Database(format!(
            "evaluator mark upsert did not settle after {MAX_ATTEMPTS} attempts"
        )))
    }

    async fn push_logform_entry(
        &self,
        contract: &ObjectId,
        task: &ObjectId,
    ) -> Result<bool, PortalError> {
        let result = self
            .contracts
            .update_one(
                doc! { "_id": contract },
                doc! { "$addToSet": { "logform_entries": task }, "$set": touched() },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn pull_logform_entry(
        &self,
        contract: &ObjectId,
        task: &ObjectId,
    ) -> Result<bool, PortalError> {
        let result = self
            .contracts
            .update_one(
                doc! { "_id": contract },
                doc! { "$pull": { "logform_entries": task }, "$set": touched() },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn create_panel(&self, mut panel: PanelDoc) -> Result<PanelDoc, PortalError> {
        let id = panel._id.unwrap_or_else(ObjectId::new);
        panel._id = Some(id);
        in_transaction!(self, session => self.create_panel_body(&mut session, &panel, id))?;
        Ok(panel)
    }

    async fn close_panel(&self, id: &ObjectId) -> Result<PanelDoc, PortalError> {
        in_transaction!(self, session => self.close_panel_body(&mut session, id))
    }

    async fn assign_contracts(
        &self,
        panel: &ObjectId,
        contracts: &[ObjectId],
    ) -> Result<PanelDoc, PortalError> {
        in_transaction!(self, session => self.assign_body(&mut session, panel, contracts))
    }

    async fn find_panel(&self, id: &ObjectId) -> Result<Option<PanelDoc>, PortalError> {
        self.panels.find_one(doc! { "_id": id }).await
    }

    async fn list_open_panels(&self) -> Result<Vec<PanelDoc>, PortalError> {
        self.panels.find_many(doc! { "is_closed": false }).await
    }

    async fn find_open_panel_for_member(
        &self,
        member: &ObjectId,
    ) -> Result<Option<PanelDoc>, PortalError> {
        self.panels
            .find_one(doc! { "members": member, "is_closed": false })
            .await
    }

    async fn find_open_panel_for_contract(
        &self,
        contract: &ObjectId,
    ) -> Result<Option<PanelDoc>, PortalError> {
        self.panels
            .find_one(doc! { "contracts": contract, "is_closed": false })
            .await
    }

    async fn insert_task(&self, task: TaskDoc) -> Result<ObjectId, PortalError> {
        self.tasks.insert_one(task).await
    }

    async fn find_task(&self, id: &ObjectId) -> Result<Option<TaskDoc>, PortalError> {
        self.tasks.find_one(doc! { "_id": id }).await
    }

    async fn find_tasks(&self, ids: &[ObjectId]) -> Result<Vec<TaskDoc>, PortalError> {
        let docs = self
            .tasks
            .find_many(doc! { "_id": { "$in": id_list(ids) } })
            .await?;
        Ok(ordered(ids, docs, |t| t._id))
    }

    async fn toggle_task_sign(&self, id: &ObjectId) -> Result<Option<TaskDoc>, PortalError> {
        let pipeline = vec![doc! { "$set": {
            "advisor_signed": { "$not": ["$advisor_signed"] },
            "metadata.updated_at": "$$NOW",
        } }];
        self.tasks
            .find_one_and_update(doc! { "_id": id }, pipeline)
            .await
    }

    async fn delete_task(&self, id: &ObjectId) -> Result<bool, PortalError> {
        let result = self.tasks.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}
