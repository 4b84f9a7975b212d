//! Response shapes
//!
//! Documents are projected into these before leaving the service layer. Ids
//! are rendered as hex strings and field names as camelCase.

use bson::oid::ObjectId;
use serde::Serialize;

use crate::auth::Role;
use crate::db::schemas::{
    AcceptanceStatus, AdvisorForm, AdvisorFormDetails, ContractDoc, EvaluatorMark, Marks,
    PanelDoc, Project, StudentSlot, TaskDoc, UserDoc,
};

fn hex(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

/// Populated user reference
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl UserSummary {
    /// Name and department, as shown for advisors
    pub fn staff(user: &UserDoc) -> Self {
        Self {
            id: hex(user._id),
            name: user.name.clone(),
            department: user.department.clone(),
            student_id: None,
            role: None,
        }
    }

    /// Staff with role, as shown for panel members
    pub fn member(user: &UserDoc) -> Self {
        Self {
            role: Some(user.role),
            ..Self::staff(user)
        }
    }

    /// Name and registration ID
    pub fn student(user: &UserDoc) -> Self {
        Self {
            id: hex(user._id),
            name: user.name.clone(),
            department: None,
            student_id: user.student_id.clone(),
            role: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluatorMarkView {
    pub evaluator: String,
    pub marks: f64,
}

impl From<&EvaluatorMark> for EvaluatorMarkView {
    fn from(entry: &EvaluatorMark) -> Self {
        Self {
            evaluator: entry.evaluator.to_hex(),
            marks: entry.marks,
        }
    }
}

/// Marks channels; `null` scalars are either unset or redacted
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarksView {
    pub admin: Option<f64>,
    pub advisor: Option<f64>,
    pub mid: Vec<EvaluatorMarkView>,
    #[serde(rename = "final")]
    pub final_: Vec<EvaluatorMarkView>,
}

impl From<&Marks> for MarksView {
    fn from(marks: &Marks) -> Self {
        Self {
            admin: marks.admin,
            advisor: marks.advisor,
            mid: marks.mid.iter().map(EvaluatorMarkView::from).collect(),
            final_: marks.final_.iter().map(EvaluatorMarkView::from).collect(),
        }
    }
}

/// The caller's own evaluator entries
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct OwnMarks {
    pub mid: Option<f64>,
    #[serde(rename = "final")]
    pub final_: Option<f64>,
}

/// Contract listing entry
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor: Option<UserSummary>,
    pub project: Project,
    pub student_one: StudentSlot,
    pub student_two: StudentSlot,
    pub acceptance: AcceptanceStatus,
    pub is_closed: bool,
    pub in_panel: bool,
    pub panel: Option<String>,
    /// Id of the submitted advisor form, if any
    pub advisor_form: Option<String>,
}

impl ContractSummary {
    pub fn new(
        contract: &ContractDoc,
        student: Option<UserSummary>,
        advisor: Option<UserSummary>,
    ) -> Self {
        Self {
            id: hex(contract._id),
            student,
            advisor,
            project: contract.project.clone(),
            student_one: contract.student_one.clone(),
            student_two: contract.student_two.clone(),
            acceptance: contract.acceptance,
            is_closed: contract.is_closed,
            in_panel: contract.in_panel,
            panel: contract.panel.map(|p| p.to_hex()),
            advisor_form: contract.advisor_form.as_ref().map(|f| f.id.to_hex()),
        }
    }
}

/// Single contract with its marks
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetail {
    #[serde(flatten)]
    pub summary: ContractSummary,
    pub marks: MarksView,
    pub logform_entries: Vec<String>,
}

/// Advisor form as shown to students and advisors
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorFormView {
    pub id: String,
    pub advisor_name: String,
    pub project: Project,
    pub student_one: StudentSlot,
    pub student_two: StudentSlot,
    #[serde(flatten)]
    pub details: AdvisorFormDetails,
}

impl From<&AdvisorForm> for AdvisorFormView {
    fn from(form: &AdvisorForm) -> Self {
        Self {
            id: form.id.to_hex(),
            advisor_name: form.advisor_name.clone(),
            project: form.project.clone(),
            student_one: form.student_one.clone(),
            student_two: form.student_two.clone(),
            details: form.details.clone(),
        }
    }
}

/// `GetAdvisorForm` payload; advisors also see their own scalar mark
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractFormView {
    pub id: String,
    pub advisor_form: Option<AdvisorFormView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_marks: Option<f64>,
}

/// Contract as seen through a panel
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanelContractView {
    pub id: String,
    pub project: Project,
    pub student_one: StudentSlot,
    pub student_two: StudentSlot,
    pub marks: MarksView,
    /// Caller's own mid/final entries (panel member views only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<OwnMarks>,
}

/// Panel with populated members and contracts
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PanelView {
    pub id: String,
    pub name: String,
    pub members: Vec<UserSummary>,
    pub contracts: Vec<PanelContractView>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContractBrief {
    pub id: String,
    pub project: Project,
}

/// Admin panel details
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanelDetailsView {
    pub id: String,
    pub name: String,
    pub is_closed: bool,
    pub members: Vec<UserSummary>,
    pub contracts: Vec<ContractBrief>,
}

/// Open panel listing entry, without members
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PanelSummary {
    pub id: String,
    pub name: String,
    pub contracts: Vec<String>,
}

impl From<&PanelDoc> for PanelSummary {
    fn from(panel: &PanelDoc) -> Self {
        Self {
            id: hex(panel._id),
            name: panel.name.clone(),
            contracts: panel.contracts.iter().map(|c| c.to_hex()).collect(),
        }
    }
}

/// Logform task
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
    pub contract: String,
    pub task_assigned: String,
    /// Due date, RFC 3339
    pub date: String,
    pub task_status: String,
    pub advisor_signed: bool,
}

impl From<&TaskDoc> for TaskView {
    fn from(task: &TaskDoc) -> Self {
        Self {
            id: hex(task._id),
            contract: task.contract.to_hex(),
            task_assigned: task.task_assigned.clone(),
            date: task.date.to_chrono().to_rfc3339(),
            task_status: task.task_status.clone(),
            advisor_signed: task.advisor_signed,
        }
    }
}

/// Caller profile
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "ID")]
    pub student_id: Option<String>,
    pub role: Role,
    pub department: Option<String>,
    pub gender: Option<String>,
}

impl From<&UserDoc> for ProfileView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: hex(user._id),
            name: user.name.clone(),
            email: user.email.clone(),
            student_id: user.student_id.clone(),
            role: user.role,
            department: user.department.clone(),
            gender: user.gender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_view_field_names() {
        let evaluator = ObjectId::new();
        let mut marks = Marks::default();
        marks.final_.push(EvaluatorMark {
            evaluator,
            marks: 30.0,
        });

        let json = serde_json::to_value(MarksView::from(&marks)).unwrap();
        assert_eq!(json["final"][0]["evaluator"], evaluator.to_hex());
        assert_eq!(json["final"][0]["marks"], 30.0);
        assert!(json["admin"].is_null());
    }

    #[test]
    fn test_student_summary_uses_id_key() {
        let user = UserDoc::new("Ayesha".into(), "a@uni.edu".into(), "h".into(), Role::Student)
            .with_student_id("FA20-BCS-001");
        let json = serde_json::to_value(UserSummary::student(&user)).unwrap();
        assert_eq!(json["ID"], "FA20-BCS-001");
        assert!(json.get("department").is_none());
    }
}
