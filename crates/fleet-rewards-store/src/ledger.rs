use crate::error::is_unique_violation;
use crate::{RewardStore, StoreError};
use fleet_rewards_model::{unix_millis, LedgerEntry, NewLedgerEntry, RewardBalance};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::warn;

/// Result of `apply_entry`. A replayed `edge_event_id` is a success that
/// changed nothing, and callers must be able to tell the two apart without
/// parsing error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(LedgerEntry),
    AlreadyApplied,
}

/// One account whose materialized balance disagrees with its ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub user_id: String,
    pub stored_cents: i64,
    pub ledger_cents: i64,
}

impl RewardStore {
    /// Appends a ledger entry and adjusts the materialized balance in one
    /// transaction. The single choke point for balance mutation.
    pub fn apply_entry(&mut self, entry: NewLedgerEntry) -> Result<ApplyOutcome, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = apply_entry_tx(&tx, entry)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Zero balance in the default currency when no account row exists yet;
    /// accounts are created implicitly on first credit.
    pub fn balance(&self, user_id: &str) -> Result<RewardBalance, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT balance_cents, currency FROM reward_accounts WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(RewardBalance {
                        balance_cents: row.get(0)?,
                        currency: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_else(|| RewardBalance::zero(&self.default_currency)))
    }

    /// The user's ledger history, newest first.
    pub fn ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, amount_cents, entry_type, currency, related_user_id,
                    referral_id, edge_event_id, metadata, created_at
             FROM reward_ledger_entries
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Recomputes every balance from the ledger and reports accounts whose
    /// stored column diverges. Run at startup as the reconciliation backstop
    /// for the same-transaction balance update.
    pub fn verify_balances(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.user_id, a.balance_cents, COALESCE(SUM(l.amount_cents), 0)
             FROM reward_accounts a
             LEFT JOIN reward_ledger_entries l
               ON l.user_id = a.user_id AND l.currency = a.currency
             GROUP BY a.user_id
             HAVING a.balance_cents != COALESCE(SUM(l.amount_cents), 0)",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BalanceDrift {
                user_id: row.get(0)?,
                stored_cents: row.get(1)?,
                ledger_cents: row.get(2)?,
            })
        })?;
        let drift = rows.collect::<Result<Vec<_>, _>>()?;
        for d in &drift {
            warn!(
                user_id = %d.user_id,
                stored = d.stored_cents,
                ledger = d.ledger_cents,
                "reward balance diverged from ledger sum"
            );
        }
        Ok(drift)
    }
}

/// Ledger append inside an already-open transaction, shared by every
/// workflow that credits or debits.
pub(crate) fn apply_entry_tx(
    tx: &Transaction<'_>,
    entry: NewLedgerEntry,
) -> Result<ApplyOutcome, StoreError> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM reward_ledger_entries WHERE edge_event_id = ?1",
            params![entry.edge_event_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(ApplyOutcome::AlreadyApplied);
    }

    tx.execute(
        "INSERT OR IGNORE INTO reward_accounts (user_id, balance_cents, currency)
         VALUES (?1, 0, ?2)",
        params![entry.user_id, entry.currency],
    )?;
    let account_currency: String = tx.query_row(
        "SELECT currency FROM reward_accounts WHERE user_id = ?1",
        params![entry.user_id],
        |row| row.get(0),
    )?;
    if account_currency != entry.currency {
        return Err(StoreError::InvalidState(format!(
            "account currency is {account_currency}, entry is {}",
            entry.currency
        )));
    }

    if entry.amount_cents < 0 {
        // Checked inside the same transaction so a concurrent debit cannot
        // slip between the read and the write.
        let balance: i64 = tx.query_row(
            "SELECT balance_cents FROM reward_accounts WHERE user_id = ?1",
            params![entry.user_id],
            |row| row.get(0),
        )?;
        if balance + entry.amount_cents < 0 {
            return Err(StoreError::InvalidState(format!(
                "insufficient funds: balance {balance}, debit {}",
                -entry.amount_cents
            )));
        }
    }

    let created_at = unix_millis();
    let inserted = tx.execute(
        "INSERT INTO reward_ledger_entries
           (user_id, amount_cents, entry_type, currency, related_user_id,
            referral_id, edge_event_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.user_id,
            entry.amount_cents,
            entry.entry_type.as_str(),
            entry.currency,
            entry.related_user_id,
            entry.referral_id,
            entry.edge_event_id,
            entry.metadata.to_string(),
            created_at,
        ],
    );
    match inserted {
        Ok(_) => {}
        // Lost the race on the idempotency key: the event is already applied.
        Err(e) if is_unique_violation(&e) => return Ok(ApplyOutcome::AlreadyApplied),
        Err(e) => return Err(e.into()),
    }
    tx.execute(
        "UPDATE reward_accounts SET balance_cents = balance_cents + ?1 WHERE user_id = ?2",
        params![entry.amount_cents, entry.user_id],
    )?;

    Ok(ApplyOutcome::Applied(LedgerEntry {
        id: tx.last_insert_rowid(),
        user_id: entry.user_id,
        amount_cents: entry.amount_cents,
        entry_type: entry.entry_type,
        currency: entry.currency,
        related_user_id: entry.related_user_id,
        referral_id: entry.referral_id,
        edge_event_id: entry.edge_event_id,
        metadata: entry.metadata,
        created_at,
    }))
}

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let entry_type_raw: String = row.get(3)?;
    let metadata_raw: String = row.get(8)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount_cents: row.get(2)?,
        entry_type: fleet_rewards_model::EntryType::parse(&entry_type_raw)
            .map_err(|e| conversion_err(3, e))?,
        currency: row.get(4)?,
        related_user_id: row.get(5)?,
        referral_id: row.get(6)?,
        edge_event_id: row.get(7)?,
        metadata: serde_json::from_str(&metadata_raw).map_err(|e| conversion_err(8, e))?,
        created_at: row.get(9)?,
    })
}

pub(crate) fn conversion_err(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}
