//! Roles and role-scoped capabilities
//!
//! The four roles are mutually exclusive. Every authorization decision is an
//! exhaustive match over `Role`, never a comparison against raw codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::PortalError;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Advisor,
    Panel,
    Student,
}

/// Marks channels a role may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarksCapability {
    /// Admin scalar channel
    Admin,
    /// Advisor scalar channel on contracts the advisor owns
    Advisor,
    /// Mid/final evaluator channels on contracts of the caller's panel
    Evaluator,
}

impl Role {
    /// All roles, in source order
    pub const ALL: [Role; 4] = [Role::Admin, Role::Advisor, Role::Panel, Role::Student];

    /// Staff may be drafted into panels
    pub fn is_staff(self) -> bool {
        match self {
            Role::Advisor | Role::Panel => true,
            Role::Admin | Role::Student => false,
        }
    }

    /// Route prefix serving this role
    pub fn route_prefix(self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Advisor => "/advisor",
            Role::Panel => "/panel",
            Role::Student => "/student",
        }
    }

    /// Marks channels this role can write
    pub fn marks_capabilities(self) -> &'static [MarksCapability] {
        match self {
            Role::Admin => &[MarksCapability::Admin],
            Role::Advisor => &[MarksCapability::Advisor, MarksCapability::Evaluator],
            Role::Panel => &[MarksCapability::Evaluator],
            Role::Student => &[],
        }
    }

    pub fn can_write(self, capability: MarksCapability) -> bool {
        self.marks_capabilities().contains(&capability)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "ADMIN"),
            Role::Advisor => write!(f, "ADVISOR"),
            Role::Panel => write!(f, "PANEL"),
            Role::Student => write!(f, "STUDENT"),
        }
    }
}

impl FromStr for Role {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "ADVISOR" => Ok(Role::Advisor),
            "PANEL" => Ok(Role::Panel),
            "STUDENT" => Ok(Role::Student),
            other => Err(PortalError::Validation(format!("Unknown role: {other}"))),
        }
    }
}
