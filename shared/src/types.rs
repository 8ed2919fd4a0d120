use serde::{Deserialize, Serialize};
use std::fmt;

// ==================== Roles ====================

/// Staff role - the unit events are targeted at
///
/// Every active session runs under exactly one role. Events carry an
/// optional role set; absence means broadcast to every role in the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Waiter - table service
    Cameriere,
    /// Cashier - payments and tabs
    Cassa,
    /// Preparation station - kitchen / bar counter
    Prepara,
    /// Supervisor - sees everything
    Supervisore,
}

impl Role {
    /// All roles, in stable order
    pub const ALL: [Role; 4] = [
        Role::Cameriere,
        Role::Cassa,
        Role::Prepara,
        Role::Supervisore,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Cameriere => write!(f, "CAMERIERE"),
            Role::Cassa => write!(f, "CASSA"),
            Role::Prepara => write!(f, "PREPARA"),
            Role::Supervisore => write!(f, "SUPERVISORE"),
        }
    }
}

// ==================== Priority ====================

/// Delivery priority
///
/// `High` and `Urgent` bypass any client-side priority filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Whether this priority must never be filtered client-side
    pub fn bypasses_filters(&self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Urgent => write!(f, "URGENT"),
        }
    }
}

// ==================== User Reference ====================

/// Lightweight user reference returned by the session/user lookup layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub user_id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRef {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            display_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_priority_filter_bypass() {
        assert!(Priority::Urgent.bypasses_filters());
        assert!(Priority::High.bypasses_filters());
        assert!(!Priority::Normal.bypasses_filters());
        assert!(!Priority::Low.bypasses_filters());
    }

    #[test]
    fn test_role_serde_tags() {
        let json = serde_json::to_string(&Role::Cameriere).unwrap();
        assert_eq!(json, "\"CAMERIERE\"");
        let back: Role = serde_json::from_str("\"CASSA\"").unwrap();
        assert_eq!(back, Role::Cassa);
    }
}
