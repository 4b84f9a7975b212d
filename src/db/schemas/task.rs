//! Logform task schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for logform tasks
pub const TASK_COLLECTION: &str = "logforms";

/// Days between assignment and the default due date
pub const TASK_DUE_DAYS: i64 = 7;

/// One assignment line under a contract
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Owning contract
    pub contract: ObjectId,

    pub task_assigned: String,

    /// Due date
    pub date: DateTime,

    #[serde(default)]
    pub task_status: String,

    #[serde(default)]
    pub advisor_signed: bool,
}

impl TaskDoc {
    /// New unsigned task due a week from now
    pub fn new(contract: ObjectId, task_assigned: String) -> Self {
        let due = chrono::Utc::now() + chrono::Duration::days(TASK_DUE_DAYS);
        Self {
            _id: None,
            metadata: Metadata::new(),
            contract,
            task_assigned,
            date: DateTime::from_chrono(due),
            task_status: String::new(),
            advisor_signed: false,
        }
    }
}

impl IntoIndexes for TaskDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "contract": 1 },
            Some(
                IndexOptions::builder()
                    .name("contract_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for TaskDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let contract = ObjectId::new();
        let task = TaskDoc::new(contract, "Draft chapter 2".into());

        assert_eq!(task.contract, contract);
        assert_eq!(task.task_status, "");
        assert!(!task.advisor_signed);

        let delta = task.date.timestamp_millis() - DateTime::now().timestamp_millis();
        let week = TASK_DUE_DAYS * 24 * 60 * 60 * 1000;
        assert!(delta <= week && delta > week - 60_000);
    }
}
