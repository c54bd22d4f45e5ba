use crate::StoreError;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 1;

/// Creates the relational layout on first open; idempotent on later opens.
///
/// Invariants pushed into the schema itself: `edge_event_id` uniqueness (the
/// ledger's idempotency guarantee), non-negative balances, one open
/// withdrawal per user (partial unique index over pending/processing), and
/// `invitee_user_id` present exactly when a referral is accepted.
pub(crate) fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS referrals (
          id INTEGER PRIMARY KEY,
          inviter_id TEXT NOT NULL,
          invitee_email TEXT,
          invitee_user_id TEXT,
          referral_code TEXT NOT NULL UNIQUE,
          status TEXT NOT NULL DEFAULT 'pending',
          created_at INTEGER NOT NULL,
          accepted_at INTEGER,
          CHECK ((status = 'accepted') = (invitee_user_id IS NOT NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_referrals_inviter
          ON referrals(inviter_id, status);
        CREATE INDEX IF NOT EXISTS idx_referrals_email
          ON referrals(invitee_email, status, created_at);

        CREATE TABLE IF NOT EXISTS reward_accounts (
          user_id TEXT PRIMARY KEY,
          balance_cents INTEGER NOT NULL DEFAULT 0 CHECK (balance_cents >= 0),
          currency TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reward_ledger_entries (
          id INTEGER PRIMARY KEY,
          user_id TEXT NOT NULL,
          amount_cents INTEGER NOT NULL,
          entry_type TEXT NOT NULL,
          currency TEXT NOT NULL,
          related_user_id TEXT,
          referral_id INTEGER,
          edge_event_id TEXT NOT NULL,
          metadata TEXT NOT NULL DEFAULT '{}',
          created_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_edge_event
          ON reward_ledger_entries(edge_event_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_user
          ON reward_ledger_entries(user_id, created_at);

        CREATE TABLE IF NOT EXISTS withdrawal_requests (
          id INTEGER PRIMARY KEY,
          user_id TEXT NOT NULL,
          status TEXT NOT NULL DEFAULT 'pending',
          user_notes TEXT,
          admin_notes TEXT,
          rejection_reason TEXT,
          created_at INTEGER NOT NULL,
          updated_at INTEGER NOT NULL,
          processed_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_withdrawals_one_open
          ON withdrawal_requests(user_id)
          WHERE status IN ('pending', 'processing');
        CREATE INDEX IF NOT EXISTS idx_withdrawals_status
          ON withdrawal_requests(status, created_at);
        ",
    )?;

    let user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if user_version == 0 {
        conn.execute_batch(&format!("PRAGMA user_version={SCHEMA_VERSION};"))?;
    }
    Ok(())
}
