use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Surgery Value Objects
// ============================================================================

/// Surgery lifecycle status.
///
/// `Scheduled → InProgress → Completed`, `Scheduled → Completed`,
/// `Scheduled → Cancelled`. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurgeryStatus {
    Scheduled,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

/// Transitions the engine can request on a surgery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurgeryAction {
    Start,
    Complete,
    Cancel,
}

impl SurgeryStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Scheduled" => Some(Self::Scheduled),
            "In Progress" => Some(Self::InProgress),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Status reached by applying `action`, or `None` if not allowed
    pub fn transition(self, action: SurgeryAction) -> Option<Self> {
        match (self, action) {
            (Self::Scheduled, SurgeryAction::Start) => Some(Self::InProgress),
            (Self::Scheduled | Self::InProgress, SurgeryAction::Complete) => Some(Self::Completed),
            (Self::Scheduled, SurgeryAction::Cancel) => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for SurgeryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SurgeryAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for SurgeryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
