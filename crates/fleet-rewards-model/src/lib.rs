#![forbid(unsafe_code)]

//! Domain types for the referral reward ledger: referrals, ledger entries,
//! reward accounts, and withdrawal requests, plus the idempotency-key and
//! referral-code conventions every other crate builds on.

use std::fmt::{Display, Formatter};

mod ledger;
mod referral;
mod withdrawal;

pub use ledger::{EntryType, LedgerEntry, NewLedgerEntry, RewardBalance};
pub use referral::{
    generate_referral_code, is_valid_referral_code, share_link, Referral, ReferralStatus,
    CODE_ALPHABET, CODE_LEN,
};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Wall-clock epoch milliseconds. All persisted timestamps use this unit.
#[must_use]
pub fn unix_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Idempotency key for the signup credit of `invitee_user_id` via `referral_id`.
#[must_use]
pub fn signup_credit_event_id(invitee_user_id: &str, referral_id: i64) -> String {
    format!("signup:{invitee_user_id}:{referral_id}")
}

/// Idempotency key for the zero-amount audit entry written when a referral
/// is issued.
#[must_use]
pub fn invite_event_id(inviter_id: &str, referral_id: i64) -> String {
    format!("invite:{inviter_id}:{referral_id}")
}

/// Idempotency key for the debit written when a withdrawal completes.
#[must_use]
pub fn withdrawal_event_id(request_id: i64) -> String {
    format!("withdrawal:{request_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_embed_both_key_components() {
        assert_eq!(signup_credit_event_id("u-9", 41), "signup:u-9:41");
        assert_eq!(invite_event_id("u-1", 7), "invite:u-1:7");
        assert_eq!(withdrawal_event_id(12), "withdrawal:12");
    }

    #[test]
    fn unix_millis_is_monotonic_enough_for_ordering() {
        let a = unix_millis();
        let b = unix_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
