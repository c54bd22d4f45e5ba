use crate::ValidationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Code alphabet with visually ambiguous characters removed (`0/O`, `1/I/L`).
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

pub const CODE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
}

impl ReferralStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ValidationError(format!("unknown referral status: {other}"))),
        }
    }

    /// Accepted, expired and cancelled referrals never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Display for ReferralStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub id: i64,
    pub inviter_id: String,
    /// Stored lowercased; matching at signup is case-insensitive.
    pub invitee_email: Option<String>,
    /// Set exactly when `status` is `accepted`.
    pub invitee_user_id: Option<String>,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
}

/// Draws a fresh share code. Uniqueness is the registry's responsibility;
/// the generator only guarantees the alphabet and length.
#[must_use]
pub fn generate_referral_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[must_use]
pub fn is_valid_referral_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Public share URL: `{origin}/signup?ref={code}`. Codes are drawn from a
/// URL-safe alphabet, so no byte of the query value needs escaping.
#[must_use]
pub fn share_link(origin: &str, code: &str) -> String {
    format!("{}/signup?ref={code}", origin.trim_end_matches('/'))
}
