#![forbid(unsafe_code)]

//! Relational layer for the reward ledger. Every state-changing operation is
//! a single short SQLite transaction; the ledger is the only balance mutator
//! and `edge_event_id` uniqueness is the sole idempotency guarantee.

use rusqlite::Connection;
use std::path::Path;

mod crediting;
mod error;
mod ledger;
mod registry;
mod schema;
mod withdrawals;

pub use crediting::CreditOutcome;
pub use error::StoreError;
pub use ledger::{ApplyOutcome, BalanceDrift};
pub use registry::MAX_CODE_GEN_ATTEMPTS;
pub use withdrawals::{ProcessOutcome, WithdrawalWithAccount};

/// Handle to the reward database. Constructed once at process startup and
/// injected into whatever serves requests; there is no ambient global.
pub struct RewardStore {
    conn: Connection,
    default_currency: String,
}

impl RewardStore {
    pub fn open(path: impl AsRef<Path>, default_currency: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self {
            conn,
            default_currency: default_currency.to_string(),
        })
    }

    /// In-memory store for tests; same schema, same semantics.
    pub fn open_in_memory(default_currency: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn,
            default_currency: default_currency.to_string(),
        })
    }

    #[must_use]
    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Cheap connectivity probe for readiness checks.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod store_tests;
