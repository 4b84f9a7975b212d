//! Contract lifecycle, panel and marks integration tests
//!
//! Drives the services end to end over the in-memory store:
//! - Advisor capacity at request and accept time
//! - Concurrent accepts against the capacity limit
//! - Per-evaluator mid/final marks upserts
//! - Panel close and member release

use std::sync::Arc;

use bson::oid::ObjectId;
use fyp_portal::auth::{AuthContext, Role};
use fyp_portal::db::schemas::{AcceptanceStatus, MarksChannel, Project, StudentSlot, UserDoc};
use fyp_portal::db::{ContractQuery, MemoryStore, PortalStore};
use fyp_portal::services::{ContractService, MarksService, NewContract, PanelService};
use fyp_portal::PortalError;
use tokio_test::{assert_err, assert_ok};

struct Portal {
    store: Arc<MemoryStore>,
    contracts: ContractService,
    panels: PanelService,
    marks: MarksService,
}

impl Portal {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            contracts: ContractService::new(store.clone()),
            panels: PanelService::new(store.clone()),
            marks: MarksService::new(store.clone()),
            store,
        }
    }

    async fn user(&self, name: &str, role: Role, student_id: Option<&str>) -> AuthContext {
        let mut doc = UserDoc::new(
            name.into(),
            format!("{}@uni.edu", name.to_lowercase()),
            "hash".into(),
            role,
        );
        if let Some(sid) = student_id {
            doc = doc.with_student_id(sid);
        }
        let id = self.store.insert_user(doc).await.unwrap();
        AuthContext::from_user(&self.store.find_user(&id).await.unwrap().unwrap()).unwrap()
    }

    /// A student with a partner files a request to `advisor`
    async fn request(&self, student: &AuthContext, partner: &str, advisor: &AuthContext) -> ObjectId {
        let contract = self
            .contracts
            .request_advisor(
                student,
                NewContract {
                    advisor: advisor.identity,
                    project: Project {
                        name: format!("{} project", student.name),
                        description: String::new(),
                    },
                    student_one: StudentSlot {
                        name: student.name.clone(),
                        id: student.student_id.clone().unwrap(),
                    },
                    student_two: StudentSlot {
                        name: "Partner".into(),
                        id: partner.into(),
                    },
                },
            )
            .await
            .unwrap();
        contract._id.unwrap()
    }

    /// `count` fresh students, each with a pending request to `advisor`
    async fn pending(&self, advisor: &AuthContext, count: usize, tag: &str) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        for i in 0..count {
            let student = self
                .user(&format!("{tag}{i}"), Role::Student, Some(&format!("{tag}-S{i}")))
                .await;
            ids.push(self.request(&student, &format!("{tag}-P{i}"), advisor).await);
        }
        ids
    }

    async fn accepted_count(&self, advisor: &AuthContext) -> u64 {
        self.store.count_open_accepted(&advisor.identity).await.unwrap()
    }
}

// =============================================================================
// Advisor capacity
// =============================================================================

#[tokio::test]
async fn test_fifth_accept_fills_advisor() {
    let portal = Portal::new();
    let advisor = portal.user("Khan", Role::Advisor, None).await;

    let ids = portal.pending(&advisor, 6, "a").await;
    for id in &ids[..4] {
        portal.contracts.accept(&advisor, id).await.unwrap();
    }
    assert_eq!(portal.accepted_count(&advisor).await, 4);

    assert_ok!(portal.contracts.accept(&advisor, &ids[4]).await);
    assert_eq!(portal.accepted_count(&advisor).await, 5);

    // Filed while capacity remained, so only the accept is refused
    let err = assert_err!(portal.contracts.accept(&advisor, &ids[5]).await);
    assert!(matches!(err, PortalError::CapacityExceeded(_)));
    assert_eq!(portal.accepted_count(&advisor).await, 5);

    let still_pending = portal.store.find_contract(&ids[5]).await.unwrap().unwrap();
    assert_eq!(still_pending.acceptance, AcceptanceStatus::NotResponded);
}

#[tokio::test]
async fn test_request_refused_at_capacity() {
    let portal = Portal::new();
    let advisor = portal.user("Khan", Role::Advisor, None).await;

    for id in portal.pending(&advisor, 5, "b").await {
        portal.contracts.accept(&advisor, &id).await.unwrap();
    }

    let late = portal.user("Late", Role::Student, Some("L-1")).await;
    let err = portal
        .contracts
        .request_advisor(
            &late,
            NewContract {
                advisor: advisor.identity,
                project: Project {
                    name: "Late project".into(),
                    description: String::new(),
                },
                student_one: StudentSlot {
                    name: "Late".into(),
                    id: "L-1".into(),
                },
                student_two: StudentSlot {
                    name: "Other".into(),
                    id: "L-2".into(),
                },
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::CapacityExceeded(_)));
}

#[tokio::test]
async fn test_closing_frees_capacity() {
    let portal = Portal::new();
    let advisor = portal.user("Khan", Role::Advisor, None).await;

    let ids = portal.pending(&advisor, 6, "c").await;
    for id in &ids[..5] {
        portal.contracts.accept(&advisor, id).await.unwrap();
    }

    portal.contracts.close(&advisor, &ids[0]).await.unwrap();
    assert_eq!(portal.accepted_count(&advisor).await, 4);
    portal.contracts.accept(&advisor, &ids[5]).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_accepts_respect_limit() {
    let portal = Arc::new(Portal::new());
    let advisor = portal.user("Khan", Role::Advisor, None).await;
    let ids = portal.pending(&advisor, 10, "d").await;

    let mut handles = Vec::new();
    for id in ids {
        let portal = Arc::clone(&portal);
        let advisor = advisor.clone();
        handles.push(tokio::spawn(async move {
            portal.contracts.accept(&advisor, &id).await.is_ok()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(portal.accepted_count(&advisor).await, 5);
}

#[tokio::test]
async fn test_full_advisor_accept_reports_state_first() {
    let portal = Portal::new();
    let advisor = portal.user("Khan", Role::Advisor, None).await;

    let ids = portal.pending(&advisor, 6, "t").await;
    portal.contracts.reject(&advisor, &ids[5]).await.unwrap();
    for id in &ids[..5] {
        portal.contracts.accept(&advisor, id).await.unwrap();
    }
    assert_eq!(portal.accepted_count(&advisor).await, 5);

    // Rejected and already accepted contracts are not transitionable, full or not
    for id in [&ids[5], &ids[0]] {
        let err = assert_err!(portal.contracts.accept(&advisor, id).await);
        assert!(matches!(err, PortalError::InvalidTransition(_)), "{err:?}");
    }

    portal.contracts.close(&advisor, &ids[1]).await.unwrap();
    let err = assert_err!(portal.contracts.accept(&advisor, &ids[1]).await);
    assert!(matches!(err, PortalError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_rejected_contract_is_final() {
    let portal = Portal::new();
    let advisor = portal.user("Khan", Role::Advisor, None).await;
    let id = portal.pending(&advisor, 1, "x").await[0];

    portal.contracts.reject(&advisor, &id).await.unwrap();

    let err = assert_err!(portal.contracts.reject(&advisor, &id).await);
    assert!(matches!(err, PortalError::InvalidTransition(_)));
    let err = assert_err!(portal.contracts.close(&advisor, &id).await);
    assert!(matches!(err, PortalError::InvalidTransition(_)));
    let err = assert_err!(portal.contracts.accept(&advisor, &id).await);
    assert!(matches!(err, PortalError::InvalidTransition(_)));

    let doc = portal.store.find_contract(&id).await.unwrap().unwrap();
    assert_eq!(doc.acceptance, AcceptanceStatus::Rejected);
    assert!(!doc.is_closed);
}

// =============================================================================
// Marks aggregation
// =============================================================================

/// An accepted contract listed in an open panel of `members`
async fn evaluated_contract(portal: &Portal, members: &[&AuthContext]) -> ObjectId {
    let admin = portal.user("Admin", Role::Admin, None).await;
    let advisor = portal.user("Supervisor", Role::Advisor, None).await;
    let id = portal.pending(&advisor, 1, "m").await[0];
    portal.contracts.accept(&advisor, &id).await.unwrap();

    let member_ids: Vec<ObjectId> = members.iter().map(|m| m.identity).collect();
    let panel = portal
        .panels
        .create_panel(&admin, Some("Evaluation A"), &member_ids)
        .await
        .unwrap();
    portal
        .panels
        .add_contracts(&admin, &panel._id.unwrap(), &[id])
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_mid_marks_upsert_per_evaluator() {
    let portal = Portal::new();
    let m1 = portal.user("Mem1", Role::Panel, None).await;
    let m2 = portal.user("Mem2", Role::Advisor, None).await;
    let id = evaluated_contract(&portal, &[&m1, &m2]).await;

    portal.marks.set_mid_marks(&m1, &id, 15.0).await.unwrap();
    portal.marks.set_mid_marks(&m2, &id, 18.0).await.unwrap();
    let doc = portal.marks.set_mid_marks(&m1, &id, 17.0).await.unwrap();

    assert_eq!(doc.marks.mid.len(), 2);
    assert_eq!(doc.marks.entry_for(MarksChannel::Mid, &m1.identity), Some(17.0));
    assert_eq!(doc.marks.entry_for(MarksChannel::Mid, &m2.identity), Some(18.0));
}

#[tokio::test]
async fn test_concurrent_final_marks_keep_one_entry() {
    let portal = Arc::new(Portal::new());
    let m1 = portal.user("Mem1", Role::Panel, None).await;
    let id = evaluated_contract(&portal, &[&m1]).await;

    let mut handles = Vec::new();
    for value in [10.0, 20.0, 30.0, 40.0] {
        let portal = Arc::clone(&portal);
        let m1 = m1.clone();
        handles.push(tokio::spawn(async move {
            portal.marks.set_final_marks(&m1, &id, value).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let doc = portal.store.find_contract(&id).await.unwrap().unwrap();
    assert_eq!(doc.marks.final_.len(), 1);
    assert!([10.0, 20.0, 30.0, 40.0].contains(&doc.marks.final_[0].marks));
}

#[tokio::test]
async fn test_admin_marks_out_of_range_unchanged() {
    let portal = Portal::new();
    let admin = portal.user("Admin", Role::Admin, None).await;
    let advisor = portal.user("Khan", Role::Advisor, None).await;
    let id = portal.pending(&advisor, 1, "r").await[0];

    assert_ok!(portal.marks.set_admin_marks(&admin, &id, 8.0).await);
    let err = assert_err!(portal.marks.set_admin_marks(&admin, &id, 12.0).await);
    assert!(matches!(err, PortalError::Validation(_)));

    let doc = portal.store.find_contract(&id).await.unwrap().unwrap();
    assert_eq!(doc.marks.admin, Some(8.0));
}

#[tokio::test]
async fn test_admin_marks_idempotent() {
    let portal = Portal::new();
    let admin = portal.user("Admin", Role::Admin, None).await;
    let advisor = portal.user("Khan", Role::Advisor, None).await;
    let evaluator = ObjectId::new();
    let id = portal.pending(&advisor, 1, "i").await[0];

    portal.marks.set_advisor_marks(&advisor, &id, 24.0).await.unwrap();
    for (channel, value) in [(MarksChannel::Mid, 14.0), (MarksChannel::Final, 33.0)] {
        portal
            .store
            .upsert_evaluator_mark(&id, channel, &evaluator, value)
            .await
            .unwrap();
    }
    let before = portal.store.find_contract(&id).await.unwrap().unwrap().marks;

    let first = portal.marks.set_admin_marks(&admin, &id, 6.5).await.unwrap();
    let second = portal.marks.set_admin_marks(&admin, &id, 6.5).await.unwrap();
    assert_eq!(first.marks, second.marks);

    let after = second.marks;
    assert_eq!(after.admin, Some(6.5));
    assert_eq!(after.advisor, before.advisor);
    assert_eq!(after.mid, before.mid);
    assert_eq!(after.final_, before.final_);
    assert_eq!(after.entry_for(MarksChannel::Final, &evaluator), Some(33.0));
}

// =============================================================================
// Panels
// =============================================================================

#[tokio::test]
async fn test_closed_panel_releases_members() {
    let portal = Portal::new();
    let admin = portal.user("Admin", Role::Admin, None).await;
    let m1 = portal.user("Mem1", Role::Panel, None).await;
    let m2 = portal.user("Mem2", Role::Advisor, None).await;

    let panel = portal
        .panels
        .create_panel(&admin, Some("Panel A"), &[m1.identity, m2.identity])
        .await
        .unwrap();

    let err = portal
        .panels
        .create_panel(&admin, Some("Panel B"), &[m1.identity])
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::MemberAlreadyAssigned));

    portal.panels.close_panel(&admin, &panel._id.unwrap()).await.unwrap();
    for member in [&m1, &m2] {
        let user = portal.store.find_user(&member.identity).await.unwrap().unwrap();
        assert!(!user.in_panel);
        assert!(user.panel.is_none());
    }

    portal
        .panels
        .create_panel(&admin, Some("Panel B"), &[m1.identity])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_panel_contracts_leave_pool() {
    let portal = Portal::new();
    let m1 = portal.user("Mem1", Role::Panel, None).await;
    let id = evaluated_contract(&portal, &[&m1]).await;

    let free = portal
        .store
        .query_contracts(&ContractQuery::open_accepted().in_panel(false))
        .await
        .unwrap();
    assert!(free.iter().all(|c| c._id != Some(id)));
}
