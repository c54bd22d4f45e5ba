use crate::ledger::{apply_entry_tx, conversion_err};
use crate::{RewardStore, StoreError};
use fleet_rewards_model::{
    generate_referral_code, invite_event_id, unix_millis, EntryType, NewLedgerEntry, Referral,
    ReferralStatus,
};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::json;

/// Collision probability at this alphabet size is astronomically low; the
/// bound only keeps the regeneration loop finite.
pub const MAX_CODE_GEN_ATTEMPTS: u32 = 5;

impl RewardStore {
    /// Mints a pending referral with a fresh share code. Re-inviting the
    /// same e-mail while a pending referral exists returns that referral
    /// unchanged instead of creating a duplicate.
    ///
    /// The caller is responsible for having verified that `inviter_id`
    /// references an existing user.
    pub fn issue_referral(
        &mut self,
        inviter_id: &str,
        invitee_email: Option<&str>,
    ) -> Result<Referral, StoreError> {
        let email = invitee_email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase);
        let default_currency = self.default_currency.clone();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(email) = email.as_deref() {
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {REFERRAL_COLUMNS} FROM referrals
                         WHERE inviter_id = ?1 AND invitee_email = ?2 AND status = 'pending'
                         ORDER BY created_at DESC, id DESC LIMIT 1"
                    ),
                    params![inviter_id, email],
                    referral_from_row,
                )
                .optional()?;
            if let Some(referral) = existing {
                tx.commit()?;
                return Ok(referral);
            }
        }

        let created_at = unix_millis();
        let mut referral_id: Option<(i64, String)> = None;
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_CODE_GEN_ATTEMPTS {
            let code = generate_referral_code(&mut rng);
            let inserted = tx.execute(
                "INSERT INTO referrals (inviter_id, invitee_email, referral_code, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                params![inviter_id, email, code, created_at],
            );
            match inserted {
                Ok(_) => {
                    referral_id = Some((tx.last_insert_rowid(), code));
                    break;
                }
                Err(e) if crate::error::is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let Some((id, code)) = referral_id else {
            return Err(StoreError::ResourceExhausted(format!(
                "could not find a free referral code in {MAX_CODE_GEN_ATTEMPTS} attempts"
            )));
        };

        // Observational audit entry; zero amount, idempotent, never affects
        // the balance.
        apply_entry_tx(
            &tx,
            NewLedgerEntry {
                user_id: inviter_id.to_string(),
                amount_cents: 0,
                entry_type: EntryType::InviteSent,
                currency: default_currency,
                related_user_id: None,
                referral_id: Some(id),
                edge_event_id: invite_event_id(inviter_id, id),
                metadata: json!({ "invitee_email": email.as_deref() }),
            },
        )?;
        tx.commit()?;

        Ok(Referral {
            id,
            inviter_id: inviter_id.to_string(),
            invitee_email: email,
            invitee_user_id: None,
            referral_code: code,
            status: ReferralStatus::Pending,
            created_at,
            accepted_at: None,
        })
    }

    /// Resolution order: exact pending code match first, then the most
    /// recently created pending referral matching the e-mail. `None` is a
    /// normal outcome, not an error.
    pub fn resolve_referral(
        &self,
        code: Option<&str>,
        invitee_email: Option<&str>,
    ) -> Result<Option<Referral>, StoreError> {
        if let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) {
            let hit = self
                .conn
                .query_row(
                    &format!(
                        "SELECT {REFERRAL_COLUMNS} FROM referrals
                         WHERE referral_code = ?1 AND status = 'pending'"
                    ),
                    params![code],
                    referral_from_row,
                )
                .optional()?;
            if hit.is_some() {
                return Ok(hit);
            }
        }
        if let Some(email) = invitee_email.map(str::trim).filter(|e| !e.is_empty()) {
            return Ok(self
                .conn
                .query_row(
                    &format!(
                        "SELECT {REFERRAL_COLUMNS} FROM referrals
                         WHERE invitee_email = ?1 AND status = 'pending'
                         ORDER BY created_at DESC, id DESC LIMIT 1"
                    ),
                    params![email.to_lowercase()],
                    referral_from_row,
                )
                .optional()?);
        }
        Ok(None)
    }

    pub fn list_referrals(&self, inviter_id: &str) -> Result<Vec<Referral>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals
             WHERE inviter_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![inviter_id], referral_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_referral(&self, id: i64) -> Result<Option<Referral>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = ?1"),
                params![id],
                referral_from_row,
            )
            .optional()?)
    }
}

pub(crate) const REFERRAL_COLUMNS: &str = "id, inviter_id, invitee_email, invitee_user_id, \
     referral_code, status, created_at, accepted_at";

pub(crate) fn referral_from_row(row: &Row<'_>) -> rusqlite::Result<Referral> {
    let status_raw: String = row.get(5)?;
    Ok(Referral {
        id: row.get(0)?,
        inviter_id: row.get(1)?,
        invitee_email: row.get(2)?,
        invitee_user_id: row.get(3)?,
        referral_code: row.get(4)?,
        status: ReferralStatus::parse(&status_raw).map_err(|e| conversion_err(5, e))?,
        created_at: row.get(6)?,
        accepted_at: row.get(7)?,
    })
}

/// Conditional pending→accepted transition. Returns whether this call was
/// the one that performed it; racing redeliveries observe `false`.
pub(crate) fn accept_referral_tx(
    tx: &Transaction<'_>,
    referral_id: i64,
    invitee_user_id: &str,
) -> Result<bool, StoreError> {
    let updated = tx.execute(
        "UPDATE referrals
         SET status = 'accepted', invitee_user_id = ?1, accepted_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![invitee_user_id, unix_millis(), referral_id],
    )?;
    Ok(updated == 1)
}
