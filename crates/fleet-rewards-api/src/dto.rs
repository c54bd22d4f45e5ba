// SPDX-License-Identifier: Apache-2.0

use fleet_rewards_model::{
    share_link, LedgerEntry, Referral, ReferralStatus, RewardBalance, WithdrawalRequest,
    WithdrawalStatus,
};
use fleet_rewards_store::{CreditOutcome, WithdrawalWithAccount};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReferralBody {
    pub invitee_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCreatedResponse {
    pub referral_id: i64,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub share_link: String,
}

impl ReferralCreatedResponse {
    #[must_use]
    pub fn from_model(referral: &Referral, origin: &str) -> Self {
        Self {
            referral_id: referral.id,
            referral_code: referral.referral_code.clone(),
            status: referral.status,
            share_link: share_link(origin, &referral.referral_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralView {
    pub referral_id: i64,
    pub invitee_email: Option<String>,
    pub invitee_user_id: Option<String>,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub share_link: String,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
}

impl ReferralView {
    #[must_use]
    pub fn from_model(referral: &Referral, origin: &str) -> Self {
        Self {
            referral_id: referral.id,
            invitee_email: referral.invitee_email.clone(),
            invitee_user_id: referral.invitee_user_id.clone(),
            referral_code: referral.referral_code.clone(),
            status: referral.status,
            share_link: share_link(origin, &referral.referral_code),
            created_at: referral.created_at,
            accepted_at: referral.accepted_at,
        }
    }
}

/// Payload delivered (at least once) by the signup event source.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupEventBody {
    pub user_id: String,
    pub email: Option<String>,
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Credited,
    CreditedAlready,
    NoReferralFound,
    /// Invitee profile not materialized yet; the event source should
    /// redeliver later.
    Pending,
}

impl From<&CreditOutcome> for CreditStatus {
    fn from(outcome: &CreditOutcome) -> Self {
        match outcome {
            CreditOutcome::Credited { .. } => Self::Credited,
            CreditOutcome::AlreadyCredited => Self::CreditedAlready,
            CreditOutcome::NoReferral => Self::NoReferralFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupCreditResponse {
    pub status: CreditStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance_cents: i64,
    pub currency: String,
}

impl From<RewardBalance> for BalanceResponse {
    fn from(balance: RewardBalance) -> Self {
        Self {
            balance_cents: balance.balance_cents,
            currency: balance.currency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryView {
    pub entry_id: i64,
    pub amount_cents: i64,
    pub entry_type: fleet_rewards_model::EntryType,
    pub currency: String,
    pub related_user_id: Option<String>,
    pub referral_id: Option<i64>,
    pub edge_event_id: String,
    pub metadata: Value,
    pub created_at: i64,
}

impl From<LedgerEntry> for LedgerEntryView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            entry_id: entry.id,
            amount_cents: entry.amount_cents,
            entry_type: entry.entry_type,
            currency: entry.currency,
            related_user_id: entry.related_user_id,
            referral_id: entry.referral_id,
            edge_event_id: entry.edge_event_id,
            metadata: entry.metadata,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWithdrawalBody {
    pub user_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalCreatedResponse {
    pub withdrawal_id: i64,
    pub status: WithdrawalStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessWithdrawalBody {
    pub new_status: WithdrawalStatus,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessWithdrawalResponse {
    pub success: bool,
}

/// Admin listing row: request fields plus the owning account as one nested
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalAdminView {
    pub withdrawal_id: i64,
    pub user_id: String,
    pub status: WithdrawalStatus,
    pub user_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub processed_at: Option<i64>,
    pub account: BalanceResponse,
}

impl From<WithdrawalWithAccount> for WithdrawalAdminView {
    fn from(row: WithdrawalWithAccount) -> Self {
        let WithdrawalRequest {
            id,
            user_id,
            status,
            user_notes,
            admin_notes,
            rejection_reason,
            created_at,
            updated_at,
            processed_at,
        } = row.request;
        Self {
            withdrawal_id: id,
            user_id,
            status,
            user_notes,
            admin_notes,
            rejection_reason,
            created_at,
            updated_at,
            processed_at,
            account: row.account.into(),
        }
    }
}
