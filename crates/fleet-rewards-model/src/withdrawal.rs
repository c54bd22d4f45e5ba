use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl WithdrawalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ValidationError(format!(
                "unknown withdrawal status: {other}"
            ))),
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    /// The full state machine:
    /// `pending -> processing | completed | rejected | cancelled`,
    /// `processing -> completed | rejected | cancelled`, terminal absorbs.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::Processing => next.is_terminal(),
            Self::Completed | Self::Rejected | Self::Cancelled => false,
        }
    }
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub user_id: String,
    pub status: WithdrawalStatus,
    pub user_notes: Option<String>,
    pub admin_notes: Option<String>,
    /// Present exactly when `status` is `rejected`.
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub processed_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use WithdrawalStatus::{Cancelled, Completed, Pending, Processing, Rejected};

    #[test]
    fn pending_reaches_every_other_state() {
        for next in [Processing, Completed, Rejected, Cancelled] {
            assert!(Pending.can_transition_to(next));
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn processing_only_reaches_terminal_states() {
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Rejected));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn terminal_states_absorb() {
        for from in [Completed, Rejected, Cancelled] {
            for next in [Pending, Processing, Completed, Rejected, Cancelled] {
                assert!(!from.can_transition_to(next), "{from} -> {next}");
            }
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [Pending, Processing, Completed, Rejected, Cancelled] {
            assert_eq!(WithdrawalStatus::parse(s.as_str()), Ok(s));
        }
        assert!(WithdrawalStatus::parse("approved").is_err());
    }
}
