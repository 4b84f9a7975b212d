//! Contract document schema
//!
//! A contract is one student(-pair)/advisor supervision engagement. It owns the
//! project description, the advisor form, the four marks channels and the list
//! of logform task references.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::PortalError;

/// Collection name for contracts
pub const CONTRACT_COLLECTION: &str = "contracts";

/// Advisor response to a contract request
///
/// The three tokens are part of the public query interface and are matched
/// case-sensitively.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcceptanceStatus {
    #[default]
    NotResponded,
    Accepted,
    Rejected,
}

impl AcceptanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptanceStatus::NotResponded => "NOT_RESPONDED",
            AcceptanceStatus::Accepted => "ACCEPTED",
            AcceptanceStatus::Rejected => "REJECTED",
        }
    }

    /// A contract in this state still occupies its students
    pub fn is_engaging(&self) -> bool {
        matches!(
            self,
            AcceptanceStatus::NotResponded | AcceptanceStatus::Accepted
        )
    }
}

impl fmt::Display for AcceptanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcceptanceStatus {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_RESPONDED" => Ok(AcceptanceStatus::NotResponded),
            "ACCEPTED" => Ok(AcceptanceStatus::Accepted),
            "REJECTED" => Ok(AcceptanceStatus::Rejected),
            _ => Err(PortalError::Validation("Invalid request status!".into())),
        }
    }
}

/// Project under supervision
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One slot of the student pair
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StudentSlot {
    pub name: String,
    /// University registration ID
    #[serde(rename = "ID")]
    pub id: String,
}

/// Tools declared on the advisor form
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Tools {
    #[serde(default)]
    pub hardware: String,
    #[serde(default)]
    pub software: String,
}

/// Advisor form fields supplied by the student
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvisorFormDetails {
    pub designation: String,
    pub department: String,
    pub qualification: String,
    pub specialization: String,
    pub contact: String,
    pub email: String,
    pub semester: Option<i32>,
    pub year: Option<i32>,
    pub program: String,
    pub credit_hours: Option<i32>,
    pub compensation: Option<f64>,
    pub cost: Option<f64>,
    pub tools: Tools,
    pub reference_no: String,
}

/// Advisor form, written once per contract
///
/// Advisor name, project and the student pair are copied from the contract at
/// submission time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorForm {
    /// Presence of this id marks the form as submitted
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub advisor_name: String,
    pub project: Project,
    pub student_one: StudentSlot,
    pub student_two: StudentSlot,
    #[serde(flatten)]
    pub details: AdvisorFormDetails,
}

/// One evaluator's entry in a list channel
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EvaluatorMark {
    pub evaluator: ObjectId,
    pub marks: f64,
}

/// The four marks channels of a contract
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Marks {
    #[serde(default)]
    pub admin: Option<f64>,
    #[serde(default)]
    pub advisor: Option<f64>,
    #[serde(default)]
    pub mid: Vec<EvaluatorMark>,
    #[serde(default, rename = "final")]
    pub final_: Vec<EvaluatorMark>,
}

/// Marks channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarksChannel {
    Admin,
    Advisor,
    Mid,
    Final,
}

impl MarksChannel {
    pub const MIN_MARKS: f64 = 0.0;

    /// Inclusive upper bound for the channel
    pub fn max(self) -> f64 {
        match self {
            MarksChannel::Admin => 10.0,
            MarksChannel::Advisor => 30.0,
            MarksChannel::Mid => 20.0,
            MarksChannel::Final => 40.0,
        }
    }

    /// Document path of the channel inside a contract
    pub fn field_path(self) -> &'static str {
        match self {
            MarksChannel::Admin => "marks.admin",
            MarksChannel::Advisor => "marks.advisor",
            MarksChannel::Mid => "marks.mid",
            MarksChannel::Final => "marks.final",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MarksChannel::Admin => "admin",
            MarksChannel::Advisor => "advisor",
            MarksChannel::Mid => "mid",
            MarksChannel::Final => "final",
        }
    }

    /// Validate a submitted value against the channel range
    pub fn validate(self, value: f64) -> Result<f64, PortalError> {
        if value.is_finite() && (Self::MIN_MARKS..=self.max()).contains(&value) {
            Ok(value)
        } else {
            Err(PortalError::Validation(format!(
                "Invalid marks! {} marks must be between {} and {}",
                self.name(),
                Self::MIN_MARKS,
                self.max()
            )))
        }
    }
}

impl Marks {
    /// Entries of a list channel
    pub fn entries(&self, channel: MarksChannel) -> &[EvaluatorMark] {
        match channel {
            MarksChannel::Mid => &self.mid,
            MarksChannel::Final => &self.final_,
            MarksChannel::Admin | MarksChannel::Advisor => &[],
        }
    }

    /// The value a given evaluator holds in a list channel
    pub fn entry_for(&self, channel: MarksChannel, evaluator: &ObjectId) -> Option<f64> {
        self.entries(channel)
            .iter()
            .find(|entry| &entry.evaluator == evaluator)
            .map(|entry| entry.marks)
    }

    /// Overwrite one scalar channel, leaving the others untouched
    pub fn set_scalar(&mut self, channel: MarksChannel, value: f64) {
        match channel {
            MarksChannel::Admin => self.admin = Some(value),
            MarksChannel::Advisor => self.advisor = Some(value),
            MarksChannel::Mid | MarksChannel::Final => {}
        }
    }

    /// Replace the evaluator's entry in place, or append one
    pub fn upsert_entry(&mut self, channel: MarksChannel, evaluator: ObjectId, value: f64) {
        let list = match channel {
            MarksChannel::Mid => &mut self.mid,
            MarksChannel::Final => &mut self.final_,
            MarksChannel::Admin | MarksChannel::Advisor => return,
        };

        match list.iter_mut().find(|entry| entry.evaluator == evaluator) {
            Some(entry) => entry.marks = value,
            None => list.push(EvaluatorMark {
                evaluator,
                marks: value,
            }),
        }
    }
}

/// Contract document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContractDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Student who filed the request
    pub student: ObjectId,

    pub advisor: ObjectId,

    pub project: Project,

    pub student_one: StudentSlot,

    pub student_two: StudentSlot,

    #[serde(default)]
    pub acceptance: AcceptanceStatus,

    /// Terminal once true
    #[serde(default)]
    pub is_closed: bool,

    #[serde(default)]
    pub advisor_form: Option<AdvisorForm>,

    /// Mirror of panel assignment, written only together with the panel
    #[serde(default)]
    pub in_panel: bool,

    #[serde(default)]
    pub panel: Option<ObjectId>,

    #[serde(default)]
    pub marks: Marks,

    /// Logform task references, deduplicated
    #[serde(default)]
    pub logform_entries: Vec<ObjectId>,
}

impl ContractDoc {
    /// Create a fresh, unanswered request
    pub fn new(
        student: ObjectId,
        advisor: ObjectId,
        project: Project,
        student_one: StudentSlot,
        student_two: StudentSlot,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            student,
            advisor,
            project,
            student_one,
            student_two,
            acceptance: AcceptanceStatus::NotResponded,
            is_closed: false,
            advisor_form: None,
            in_panel: false,
            panel: None,
            marks: Marks::default(),
            logform_entries: Vec::new(),
        }
    }

    /// Open contracts block their students from filing another request
    pub fn is_open_engagement(&self) -> bool {
        !self.is_closed && self.acceptance.is_engaging()
    }

    /// Counts against the advisor's capacity
    pub fn is_open_accepted(&self) -> bool {
        !self.is_closed && self.acceptance == AcceptanceStatus::Accepted
    }

    /// Whether either slot holds the given registration ID
    pub fn names_student(&self, student_id: &str) -> bool {
        self.student_one.id == student_id || self.student_two.id == student_id
    }
}

impl IntoIndexes for ContractDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Capacity counts and advisor listings
            (
                doc! { "advisor": 1, "acceptance": 1, "is_closed": 1 },
                Some(
                    IndexOptions::builder()
                        .name("advisor_acceptance_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "student": 1, "acceptance": 1 },
                Some(
                    IndexOptions::builder()
                        .name("student_acceptance_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "student_one.ID": 1 },
                Some(
                    IndexOptions::builder()
                        .name("student_one_id_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "student_two.ID": 1 },
                Some(
                    IndexOptions::builder()
                        .name("student_two_id_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "logform_entries": 1 },
                Some(
                    IndexOptions::builder()
                        .name("logform_entries_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ContractDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tokens_are_exact() {
        assert_eq!(
            "NOT_RESPONDED".parse::<AcceptanceStatus>().unwrap(),
            AcceptanceStatus::NotResponded
        );
        assert_eq!(
            "ACCEPTED".parse::<AcceptanceStatus>().unwrap(),
            AcceptanceStatus::Accepted
        );
        assert_eq!(
            "REJECTED".parse::<AcceptanceStatus>().unwrap(),
            AcceptanceStatus::Rejected
        );
        assert!("accepted".parse::<AcceptanceStatus>().is_err());
        assert!("Accepted".parse::<AcceptanceStatus>().is_err());
        assert!("1".parse::<AcceptanceStatus>().is_err());
        assert!("".parse::<AcceptanceStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_to_token() {
        let json = serde_json::to_string(&AcceptanceStatus::NotResponded).unwrap();
        assert_eq!(json, "\"NOT_RESPONDED\"");
    }

    #[test]
    fn test_channel_ranges() {
        assert!(MarksChannel::Admin.validate(10.0).is_ok());
        assert!(MarksChannel::Admin.validate(12.0).is_err());
        assert!(MarksChannel::Advisor.validate(30.0).is_ok());
        assert!(MarksChannel::Advisor.validate(30.5).is_err());
        assert!(MarksChannel::Mid.validate(0.0).is_ok());
        assert!(MarksChannel::Mid.validate(-1.0).is_err());
        assert!(MarksChannel::Final.validate(40.0).is_ok());
        assert!(MarksChannel::Final.validate(f64::NAN).is_err());
    }

    #[test]
    fn test_upsert_entry_keeps_one_per_evaluator() {
        let m1 = ObjectId::new();
        let m2 = ObjectId::new();
        let mut marks = Marks::default();

        marks.upsert_entry(MarksChannel::Mid, m1, 15.0);
        marks.upsert_entry(MarksChannel::Mid, m2, 18.0);
        marks.upsert_entry(MarksChannel::Mid, m1, 17.0);

        assert_eq!(marks.mid.len(), 2);
        assert_eq!(marks.entry_for(MarksChannel::Mid, &m1), Some(17.0));
        assert_eq!(marks.entry_for(MarksChannel::Mid, &m2), Some(18.0));
        assert!(marks.final_.is_empty());
    }

    #[test]
    fn test_set_scalar_leaves_siblings() {
        let evaluator = ObjectId::new();
        let mut marks = Marks::default();
        marks.upsert_entry(MarksChannel::Final, evaluator, 33.0);
        marks.set_scalar(MarksChannel::Advisor, 25.0);
        marks.set_scalar(MarksChannel::Admin, 7.0);

        assert_eq!(marks.admin, Some(7.0));
        assert_eq!(marks.advisor, Some(25.0));
        assert_eq!(marks.entry_for(MarksChannel::Final, &evaluator), Some(33.0));
    }

    #[test]
    fn test_marks_bson_field_names() {
        let marks = Marks {
            admin: Some(5.0),
            ..Default::default()
        };
        let doc = bson::to_document(&marks).unwrap();
        assert!(doc.contains_key("final"));
        assert!(!doc.contains_key("final_"));
    }
}
