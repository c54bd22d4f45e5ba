use crate::ledger::apply_entry_tx;
use crate::registry::{accept_referral_tx, referral_from_row, REFERRAL_COLUMNS};
use crate::{ApplyOutcome, RewardStore, StoreError};
use fleet_rewards_model::{
    signup_credit_event_id, EntryType, LedgerEntry, NewLedgerEntry, Referral, ReferralStatus,
};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::json;
use tracing::info;

/// Outcome of one signup-event delivery. Only `Credited` changed the
/// balance; the others are successful no-ops so the event source can
/// redeliver freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited {
        inviter_id: String,
        entry: LedgerEntry,
    },
    AlreadyCredited,
    NoReferral,
}

impl RewardStore {
    /// Turns a signup event into at most one inviter credit, under
    /// at-least-once delivery. Resolution, the conditional
    /// pending→accepted transition, the ledger append and the balance
    /// update all happen in one transaction.
    ///
    /// The profile-exists precondition is the caller's: invoke this only
    /// once the invitee's profile is known to exist.
    pub fn grant_signup_credit(
        &mut self,
        invitee_user_id: &str,
        referral_code: Option<&str>,
        invitee_email: Option<&str>,
        amount_cents: i64,
        currency: &str,
    ) -> Result<CreditOutcome, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let referral = match find_candidate_tx(&tx, invitee_user_id, referral_code, invitee_email)?
        {
            Candidate::Pending(referral) => referral,
            Candidate::AlreadyAccepted => {
                tx.commit()?;
                return Ok(CreditOutcome::AlreadyCredited);
            }
            Candidate::None => {
                tx.commit()?;
                return Ok(CreditOutcome::NoReferral);
            }
        };

        // Only the delivery that wins the conditional update proceeds to
        // credit; all others stop here without error.
        if !accept_referral_tx(&tx, referral.id, invitee_user_id)? {
            tx.commit()?;
            return Ok(CreditOutcome::AlreadyCredited);
        }

        let outcome = apply_entry_tx(
            &tx,
            NewLedgerEntry {
                user_id: referral.inviter_id.clone(),
                amount_cents,
                entry_type: EntryType::SignupReferralCredit,
                currency: currency.to_string(),
                related_user_id: Some(invitee_user_id.to_string()),
                referral_id: Some(referral.id),
                edge_event_id: signup_credit_event_id(invitee_user_id, referral.id),
                metadata: json!({ "referral_code": referral.referral_code }),
            },
        )?;
        tx.commit()?;

        match outcome {
            ApplyOutcome::Applied(entry) => {
                info!(
                    inviter = %referral.inviter_id,
                    invitee = %invitee_user_id,
                    referral_id = referral.id,
                    amount_cents,
                    "signup referral credited"
                );
                Ok(CreditOutcome::Credited {
                    inviter_id: referral.inviter_id,
                    entry,
                })
            }
            ApplyOutcome::AlreadyApplied => Ok(CreditOutcome::AlreadyCredited),
        }
    }
}

enum Candidate {
    Pending(Referral),
    AlreadyAccepted,
    None,
}

/// Resolution order per the registry contract: exact code match first, then
/// most-recent pending referral for the e-mail. A referral already accepted
/// by this same invitee marks a redelivery, not a miss.
fn find_candidate_tx(
    tx: &Transaction<'_>,
    invitee_user_id: &str,
    referral_code: Option<&str>,
    invitee_email: Option<&str>,
) -> Result<Candidate, StoreError> {
    if let Some(code) = referral_code.map(str::trim).filter(|c| !c.is_empty()) {
        let by_code = tx
            .query_row(
                &format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE referral_code = ?1"),
                params![code],
                referral_from_row,
            )
            .optional()?;
        match by_code {
            Some(r) if r.status == ReferralStatus::Pending => return Ok(Candidate::Pending(r)),
            Some(r)
                if r.status == ReferralStatus::Accepted
                    && r.invitee_user_id.as_deref() == Some(invitee_user_id) =>
            {
                return Ok(Candidate::AlreadyAccepted);
            }
            _ => {}
        }
    }

    if let Some(email) = invitee_email.map(str::trim).filter(|e| !e.is_empty()) {
        let by_email = tx
            .query_row(
                &format!(
                    "SELECT {REFERRAL_COLUMNS} FROM referrals
                     WHERE invitee_email = ?1 AND status = 'pending'
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![email.to_lowercase()],
                referral_from_row,
            )
            .optional()?;
        if let Some(r) = by_email {
            return Ok(Candidate::Pending(r));
        }
    }

    // Redelivery after the referral was accepted: the pending lookups above
    // no longer match, but the acceptance record does.
    let accepted: Option<i64> = tx
        .query_row(
            "SELECT id FROM referrals WHERE invitee_user_id = ?1 AND status = 'accepted' LIMIT 1",
            params![invitee_user_id],
            |row| row.get(0),
        )
        .optional()?;
    if accepted.is_some() {
        return Ok(Candidate::AlreadyAccepted);
    }
    Ok(Candidate::None)
}
