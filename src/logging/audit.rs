//! Audit logging of mutating operations
//!
//! One JSONL line per successful state change: who did what to which entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::{AuthContext, Role};

/// Mutating operations recorded in the audit log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Signup,
    RequestAdvisor,
    AcceptRequest,
    RejectRequest,
    CloseRequest,
    SubmitAdvisorForm,
    SetAdminMarks,
    SetAdvisorMarks,
    SetMidMarks,
    SetFinalMarks,
    CreatePanel,
    ClosePanel,
    AssignContracts,
    AssignTask,
    ToggleTaskSign,
    DeleteTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    /// Acting user id
    pub actor: Option<String>,
    pub role: Option<Role>,
    /// Id of the affected entity
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(operation: Operation) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            actor: None,
            role: None,
            target: None,
            detail: None,
        }
    }

    /// Record the caller as actor
    pub fn by(mut self, ctx: &AuthContext) -> Self {
        self.actor = Some(ctx.identity.to_hex());
        self.role = Some(ctx.role);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger writing events to an append-only JSONL file
///
/// Without a file the logger is a no-op.
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start appending to `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        *self.inner.lock().await = Some(BufWriter::new(file));

        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn log(&self, event: AuditEvent) {
        let line = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if let Some(writer) = inner.as_mut() {
            if let Err(e) = writeln!(writer, "{}", line) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    fn ctx() -> AuthContext {
        AuthContext {
            identity: ObjectId::new(),
            role: Role::Admin,
            name: "Admin".into(),
            email: "admin@uni.edu".into(),
            student_id: None,
            department: None,
        }
    }

    #[test]
    fn test_event_serialization() {
        let caller = ctx();
        let event = AuditEvent::new(Operation::SetAdminMarks)
            .by(&caller)
            .target("65f0c0ffee")
            .detail(serde_json::json!({ "marks": 7.0 }));

        let line = event.to_jsonl().unwrap();
        assert!(line.contains("set_admin_marks"));
        assert!(line.contains(&caller.identity.to_hex()));
        assert!(line.contains("\"ADMIN\""));
    }

    #[tokio::test]
    async fn test_writes_one_line_per_event() {
        let path = std::env::temp_dir().join(format!("audit-{}.jsonl", uuid::Uuid::new_v4()));
        let logger = AuditLogger::new();
        logger.init_file(path.clone()).await.unwrap();

        logger.log(AuditEvent::new(Operation::CreatePanel).by(&ctx())).await;
        logger.log(AuditEvent::new(Operation::ClosePanel).by(&ctx())).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("close_panel"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_noop_without_file() {
        AuditLogger::new()
            .log(AuditEvent::new(Operation::Signup))
            .await;
    }
}
