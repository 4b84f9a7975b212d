//! User document schema
//!
//! One collection for all four roles. Students carry their university
//! registration `student_id`; staff carry a department and the panel mirror.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// Login identifier, unique
    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    pub role: Role,

    /// University registration ID (students only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,

    /// Department (staff only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// Mirror of open-panel membership, written only together with the panel
    #[serde(default)]
    pub in_panel: bool,

    #[serde(default)]
    pub panel: Option<ObjectId>,

    /// Bumped by every advisor accept so concurrent accepts for one advisor conflict
    #[serde(default)]
    pub accept_seq: i64,
}

impl UserDoc {
    /// Create a new user document
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name,
            email,
            password_hash,
            role,
            student_id: None,
            department: None,
            gender: None,
            in_panel: false,
            panel: None,
            accept_seq: 0,
        }
    }

    pub fn with_student_id(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_gender(mut self, gender: Option<String>) -> Self {
        self.gender = gender;
        self
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            // Sparse so staff without a registration ID do not collide
            (
                doc! { "student_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("student_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "role": 1, "in_panel": 1 },
                Some(
                    IndexOptions::builder()
                        .name("role_in_panel_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
