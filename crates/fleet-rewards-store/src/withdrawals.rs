use crate::error::is_unique_violation;
use crate::ledger::{apply_entry_tx, conversion_err};
use crate::{RewardStore, StoreError};
use fleet_rewards_model::{
    unix_millis, withdrawal_event_id, EntryType, NewLedgerEntry, RewardBalance, WithdrawalRequest,
    WithdrawalStatus,
};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use serde_json::json;
use tracing::info;

/// Admin listing row: the request plus its owning account, normalized to a
/// single nested record at the data-access boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalWithAccount {
    pub request: WithdrawalRequest,
    pub account: RewardBalance,
}

/// `Updated` performed the transition; `AlreadyInState` is the idempotent
/// no-op for a duplicate admin click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Updated(WithdrawalRequest),
    AlreadyInState,
}

impl RewardStore {
    /// Creates a pending cash-out request. Does not touch the ledger; the
    /// debit happens only on admin-confirmed completion, so rejection and
    /// cancellation leave the balance untouched.
    pub fn create_withdrawal(
        &mut self,
        user_id: &str,
        user_notes: Option<&str>,
        minimum_cents: i64,
    ) -> Result<WithdrawalRequest, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let balance: i64 = tx
            .query_row(
                "SELECT balance_cents FROM reward_accounts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        if balance < minimum_cents {
            return Err(StoreError::PreconditionFailed(format!(
                "balance {balance} is below the withdrawal minimum {minimum_cents}"
            )));
        }

        let now = unix_millis();
        let inserted = tx.execute(
            "INSERT INTO withdrawal_requests (user_id, status, user_notes, created_at, updated_at)
             VALUES (?1, 'pending', ?2, ?3, ?3)",
            params![user_id, user_notes, now],
        );
        match inserted {
            Ok(_) => {}
            // Partial unique index over open requests: one outstanding
            // withdrawal per user.
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(
                    "a withdrawal request is already open for this user".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(WithdrawalRequest {
            id,
            user_id: user_id.to_string(),
            status: WithdrawalStatus::Pending,
            user_notes: user_notes.map(str::to_string),
            admin_notes: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        })
    }

    pub fn get_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = ?1"),
                params![id],
                withdrawal_from_row,
            )
            .optional()?)
    }

    pub fn list_withdrawals(&self) -> Result<Vec<WithdrawalWithAccount>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WITHDRAWAL_COLUMNS_W}, COALESCE(a.balance_cents, 0), COALESCE(a.currency, ?1)
             FROM withdrawal_requests w
             LEFT JOIN reward_accounts a ON a.user_id = w.user_id
             ORDER BY w.created_at DESC, w.id DESC"
        ))?;
        let rows = stmt.query_map(params![self.default_currency], |row| {
            Ok(WithdrawalWithAccount {
                request: withdrawal_from_row(row)?,
                account: RewardBalance {
                    balance_cents: row.get(9)?,
                    currency: row.get(10)?,
                },
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Drives the request state machine. Completion atomically marks the
    /// request and debits the account's full current balance, keyed by
    /// `withdrawal:{id}` so a duplicate click can never double-spend.
    pub fn process_withdrawal(
        &mut self,
        request_id: i64,
        new_status: WithdrawalStatus,
        rejection_reason: Option<&str>,
        admin_notes: Option<&str>,
    ) -> Result<ProcessOutcome, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = tx
            .query_row(
                &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = ?1"),
                params![request_id],
                withdrawal_from_row,
            )
            .optional()?
            .ok_or_else(|| {
                StoreError::NotFound(format!("withdrawal request {request_id} does not exist"))
            })?;

        // Idempotent from the admin UI: a duplicate click re-requesting the
        // current status is a successful no-op, even without a reason.
        if current.status == new_status {
            tx.commit()?;
            return Ok(ProcessOutcome::AlreadyInState);
        }
        if new_status == WithdrawalStatus::Rejected
            && rejection_reason.map(str::trim).filter(|r| !r.is_empty()).is_none()
        {
            return Err(StoreError::InvalidArgument(
                "rejecting a withdrawal requires a non-empty rejection_reason".to_string(),
            ));
        }
        if !current.status.can_transition_to(new_status) {
            return Err(StoreError::InvalidState(format!(
                "withdrawal request {request_id} is {}; cannot transition to {new_status}",
                current.status
            )));
        }

        let now = unix_millis();
        let mut processed_at = current.processed_at;
        if new_status == WithdrawalStatus::Completed {
            processed_at = Some(now);
            let balance: i64 = tx
                .query_row(
                    "SELECT balance_cents FROM reward_accounts WHERE user_id = ?1",
                    params![current.user_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            if balance > 0 {
                let currency: String = tx.query_row(
                    "SELECT currency FROM reward_accounts WHERE user_id = ?1",
                    params![current.user_id],
                    |row| row.get(0),
                )?;
                // Full-balance debit; AlreadyApplied means an earlier
                // completion attempt got there first.
                apply_entry_tx(
                    &tx,
                    NewLedgerEntry {
                        user_id: current.user_id.clone(),
                        amount_cents: -balance,
                        entry_type: EntryType::WithdrawalDebit,
                        currency,
                        related_user_id: None,
                        referral_id: None,
                        edge_event_id: withdrawal_event_id(request_id),
                        metadata: json!({ "withdrawal_request_id": request_id }),
                    },
                )?;
            }
        }

        let updated = tx.execute(
            "UPDATE withdrawal_requests
             SET status = ?1,
                 admin_notes = COALESCE(?2, admin_notes),
                 rejection_reason = ?3,
                 updated_at = ?4,
                 processed_at = ?5
             WHERE id = ?6 AND status = ?7",
            params![
                new_status.as_str(),
                admin_notes,
                if new_status == WithdrawalStatus::Rejected {
                    rejection_reason
                } else {
                    None
                },
                now,
                processed_at,
                request_id,
                current.status.as_str(),
            ],
        )?;
        if updated != 1 {
            return Err(StoreError::Conflict(format!(
                "withdrawal request {request_id} changed concurrently"
            )));
        }
        tx.commit()?;
        info!(
            request_id,
            from = %current.status,
            to = %new_status,
            "withdrawal request transitioned"
        );

        let refreshed = self.get_withdrawal(request_id)?.ok_or_else(|| {
            StoreError::Storage(format!("withdrawal request {request_id} vanished"))
        })?;
        Ok(ProcessOutcome::Updated(refreshed))
    }
}

const WITHDRAWAL_COLUMNS: &str = "id, user_id, status, user_notes, admin_notes, \
     rejection_reason, created_at, updated_at, processed_at";
const WITHDRAWAL_COLUMNS_W: &str = "w.id, w.user_id, w.status, w.user_notes, w.admin_notes, \
     w.rejection_reason, w.created_at, w.updated_at, w.processed_at";

fn withdrawal_from_row(row: &Row<'_>) -> rusqlite::Result<WithdrawalRequest> {
    let status_raw: String = row.get(2)?;
    Ok(WithdrawalRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: WithdrawalStatus::parse(&status_raw).map_err(|e| conversion_err(2, e))?,
        user_notes: row.get(3)?,
        admin_notes: row.get(4)?,
        rejection_reason: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        processed_at: row.get(8)?,
    })
}
