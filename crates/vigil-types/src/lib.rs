//! Shared types and constants for the Vigil platform.
//!
//! This crate provides the foundational enums used across all Vigil crates:
//! participant roles, report lifecycle statuses, report priorities, and
//! notification kinds. Each enum carries a stable string codec (`as_str` /
//! `FromStr`) used for database storage, plus serde derives for the wire.
//!
//! No crate in the workspace depends on anything *except* `vigil-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing an unknown enum label from storage.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} label: {value}")]
pub struct ParseLabelError {
    /// Which enum the label failed to parse into.
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Participant roles.
///
/// A user is either a citizen filing incident reports or a police officer
/// triaging them. Roles are assigned by the account service and never
/// mutated by this codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A citizen who submits reports and owns at most one chat.
    Citizen,
    /// A police officer who reviews reports and replies in chats.
    Officer,
}

impl Role {
    /// Returns the canonical string label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Officer => "officer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Self::Citizen),
            "officer" => Ok(Self::Officer),
            _ => Err(ParseLabelError::new("role", s)),
        }
    }
}

/// Report lifecycle statuses.
///
/// Statuses advance as an officer works a report. The labels below are the
/// wire and storage form; new statuses must never break notification
/// delivery (unknown strings fall back to a generic message downstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    /// Freshly filed, not yet looked at.
    Submitted,
    /// An officer has picked it up.
    #[serde(rename = "Under Review")]
    UnderReview,
    /// Work is underway.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Action was taken in response to the report.
    #[serde(rename = "Action Taken")]
    ActionTaken,
    /// The report is closed.
    Resolved,
}

impl ReportStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "Under Review",
            Self::InProgress => "In Progress",
            Self::ActionTaken => "Action Taken",
            Self::Resolved => "Resolved",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Submitted" => Ok(Self::Submitted),
            "Under Review" => Ok(Self::UnderReview),
            "In Progress" => Ok(Self::InProgress),
            "Action Taken" => Ok(Self::ActionTaken),
            "Resolved" => Ok(Self::Resolved),
            _ => Err(ParseLabelError::new("report status", s)),
        }
    }
}

/// Report priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Routine.
    Low,
    /// Default.
    Medium,
    /// Needs attention now.
    High,
}

impl Priority {
    /// Returns the canonical string label for this priority.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            _ => Err(ParseLabelError::new("priority", s)),
        }
    }
}

/// Kinds of notification a user can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A report was filed (sent to its owner as a receipt).
    NewReport,
    /// A report's status changed.
    StatusUpdate,
    /// Free-form informational notification (dev/test path).
    Info,
    /// A chat message arrived.
    NewMessage,
    /// A chat was opened.
    NewChat,
}

impl NotificationKind {
    /// Returns the canonical string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewReport => "new_report",
            Self::StatusUpdate => "status_update",
            Self::Info => "info",
            Self::NewMessage => "new_message",
            Self::NewChat => "new_chat",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_report" => Ok(Self::NewReport),
            "status_update" => Ok(Self::StatusUpdate),
            "info" => Ok(Self::Info),
            "new_message" => Ok(Self::NewMessage),
            "new_chat" => Ok(Self::NewChat),
            _ => Err(ParseLabelError::new("notification kind", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Citizen, Role::Officer] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn role_invalid() {
        assert!("policeman".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
        // Labels are case-sensitive
        assert!("Citizen".parse::<Role>().is_err());
    }

    #[test]
    fn role_serde_labels() {
        assert_eq!(serde_json::to_string(&Role::Officer).unwrap(), "\"officer\"");
        let parsed: Role = serde_json::from_str("\"citizen\"").unwrap();
        assert_eq!(parsed, Role::Citizen);
    }

    #[test]
    fn report_status_round_trip() {
        for status in [
            ReportStatus::Submitted,
            ReportStatus::UnderReview,
            ReportStatus::InProgress,
            ReportStatus::ActionTaken,
            ReportStatus::Resolved,
        ] {
            assert_eq!(status.as_str().parse::<ReportStatus>().unwrap(), status);
        }
    }

    #[test]
    fn report_status_serde_uses_spaced_labels() {
        assert_eq!(
            serde_json::to_string(&ReportStatus::UnderReview).unwrap(),
            "\"Under Review\""
        );
        let parsed: ReportStatus = serde_json::from_str("\"Action Taken\"").unwrap();
        assert_eq!(parsed, ReportStatus::ActionTaken);
    }

    #[test]
    fn priority_round_trip() {
        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(priority.as_str().parse::<Priority>().unwrap(), priority);
        }
    }

    #[test]
    fn notification_kind_round_trip() {
        for kind in [
            NotificationKind::NewReport,
            NotificationKind::StatusUpdate,
            NotificationKind::Info,
            NotificationKind::NewMessage,
            NotificationKind::NewChat,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn notification_kind_unknown_label() {
        let err = "broadcast".parse::<NotificationKind>().unwrap_err();
        assert_eq!(err.kind, "notification kind");
        assert_eq!(err.value, "broadcast");
    }
}
