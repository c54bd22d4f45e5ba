use crate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Zero-amount audit marker written when an invitation is issued.
    InviteSent,
    SignupReferralCredit,
    WithdrawalDebit,
}

impl EntryType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InviteSent => "invite_sent",
            Self::SignupReferralCredit => "signup_referral_credit",
            Self::WithdrawalDebit => "withdrawal_debit",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "invite_sent" => Ok(Self::InviteSent),
            "signup_referral_credit" => Ok(Self::SignupReferralCredit),
            "withdrawal_debit" => Ok(Self::WithdrawalDebit),
            other => Err(ValidationError(format!("unknown entry type: {other}"))),
        }
    }
}

impl Display for EntryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable, signed monetary record. Rows are never updated or deleted;
/// the account balance is exactly the sum of its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub amount_cents: i64,
    pub entry_type: EntryType,
    pub currency: String,
    pub related_user_id: Option<String>,
    pub referral_id: Option<i64>,
    /// Globally unique idempotency key; a duplicate insert is a no-op.
    pub edge_event_id: String,
    pub metadata: Value,
    pub created_at: i64,
}

/// Input to `apply_entry`; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub amount_cents: i64,
    pub entry_type: EntryType,
    pub currency: String,
    pub related_user_id: Option<String>,
    pub referral_id: Option<i64>,
    pub edge_event_id: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBalance {
    pub balance_cents: i64,
    pub currency: String,
}

impl RewardBalance {
    #[must_use]
    pub fn zero(currency: &str) -> Self {
        Self {
            balance_cents: 0,
            currency: currency.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_round_trips_through_strings() {
        for t in [
            EntryType::InviteSent,
            EntryType::SignupReferralCredit,
            EntryType::WithdrawalDebit,
        ] {
            assert_eq!(EntryType::parse(t.as_str()), Ok(t));
        }
        assert!(EntryType::parse("refund").is_err());
    }

    #[test]
    fn entry_type_serializes_as_snake_case() {
        let json = serde_json::to_string(&EntryType::SignupReferralCredit).unwrap();
        assert_eq!(json, "\"signup_referral_credit\"");
    }
}
