//! Panel document schema
//!
//! The panel's `members` and `contracts` sets are authoritative; the
//! `in_panel`/`panel` fields on users and contracts mirror them.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for panels
pub const PANEL_COLLECTION: &str = "panels";

/// Maximum number of members a panel may be created with
pub const MAX_PANEL_MEMBERS: usize = 7;

/// Panel document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PanelDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// Staff user ids
    #[serde(default)]
    pub members: Vec<ObjectId>,

    /// Contract ids under evaluation
    #[serde(default)]
    pub contracts: Vec<ObjectId>,

    #[serde(default)]
    pub is_closed: bool,
}

impl PanelDoc {
    pub fn new(name: String, members: Vec<ObjectId>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name,
            members,
            contracts: Vec::new(),
            is_closed: false,
        }
    }

    pub fn has_member(&self, user: &ObjectId) -> bool {
        self.members.contains(user)
    }

    pub fn has_contract(&self, contract: &ObjectId) -> bool {
        self.contracts.contains(contract)
    }
}

impl IntoIndexes for PanelDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "members": 1, "is_closed": 1 },
                Some(
                    IndexOptions::builder()
                        .name("members_open_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "contracts": 1, "is_closed": 1 },
                Some(
                    IndexOptions::builder()
                        .name("contracts_open_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PanelDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
