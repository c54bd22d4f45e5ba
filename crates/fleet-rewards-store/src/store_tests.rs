use crate::{ApplyOutcome, CreditOutcome, ProcessOutcome, RewardStore, StoreError};
use fleet_rewards_model::{EntryType, NewLedgerEntry, ReferralStatus, WithdrawalStatus};
use serde_json::json;

const CREDIT: i64 = 100;
const MINIMUM: i64 = 2000;

fn store() -> RewardStore {
    RewardStore::open_in_memory("usd").expect("in-memory store")
}

fn credit(store: &mut RewardStore, user: &str, cents: i64, key: &str) {
    let outcome = store
        .apply_entry(NewLedgerEntry {
            user_id: user.to_string(),
            amount_cents: cents,
            entry_type: EntryType::SignupReferralCredit,
            currency: "usd".to_string(),
            related_user_id: None,
            referral_id: None,
            edge_event_id: key.to_string(),
            metadata: json!({}),
        })
        .expect("credit");
    assert!(matches!(outcome, ApplyOutcome::Applied(_)));
}

#[test]
fn apply_entry_is_idempotent_on_edge_event_id() {
    let mut s = store();
    credit(&mut s, "u1", 500, "evt-1");
    let outcome = s
        .apply_entry(NewLedgerEntry {
            user_id: "u1".to_string(),
            amount_cents: 500,
            entry_type: EntryType::SignupReferralCredit,
            currency: "usd".to_string(),
            related_user_id: None,
            referral_id: None,
            edge_event_id: "evt-1".to_string(),
            metadata: json!({}),
        })
        .expect("replay");
    assert_eq!(outcome, ApplyOutcome::AlreadyApplied);
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 500);
    assert_eq!(s.ledger_entries("u1").expect("entries").len(), 1);
}

#[test]
fn balance_of_unknown_user_is_zero_in_default_currency() {
    let s = store();
    let b = s.balance("nobody").expect("balance");
    assert_eq!(b.balance_cents, 0);
    assert_eq!(b.currency, "usd");
}

#[test]
fn debit_below_zero_is_rejected_inside_the_transaction() {
    let mut s = store();
    credit(&mut s, "u1", 300, "evt-1");
    let err = s
        .apply_entry(NewLedgerEntry {
            user_id: "u1".to_string(),
            amount_cents: -400,
            entry_type: EntryType::WithdrawalDebit,
            currency: "usd".to_string(),
            related_user_id: None,
            referral_id: None,
            edge_event_id: "evt-2".to_string(),
            metadata: json!({}),
        })
        .expect_err("overdraw");
    assert!(matches!(err, StoreError::InvalidState(_)));
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 300);
}

#[test]
fn currency_mismatch_is_an_invalid_state() {
    let mut s = store();
    credit(&mut s, "u1", 100, "evt-1");
    let err = s
        .apply_entry(NewLedgerEntry {
            user_id: "u1".to_string(),
            amount_cents: 100,
            entry_type: EntryType::SignupReferralCredit,
            currency: "eur".to_string(),
            related_user_id: None,
            referral_id: None,
            edge_event_id: "evt-2".to_string(),
            metadata: json!({}),
        })
        .expect_err("currency mismatch");
    assert!(matches!(err, StoreError::InvalidState(_)));
}

#[test]
fn issue_referral_mints_a_pending_referral_with_audit_entry() {
    let mut s = store();
    let r = s
        .issue_referral("inviter", Some("Friend@Example.com"))
        .expect("issue");
    assert_eq!(r.status, ReferralStatus::Pending);
    assert_eq!(r.invitee_email.as_deref(), Some("friend@example.com"));
    assert_eq!(r.referral_code.len(), 8);

    // Audit entry exists, carries zero amount, and never moves the balance.
    let entries = s.ledger_entries("inviter").expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, EntryType::InviteSent);
    assert_eq!(entries[0].amount_cents, 0);
    assert_eq!(s.balance("inviter").expect("balance").balance_cents, 0);
}

#[test]
fn reinviting_the_same_email_returns_the_pending_referral_unchanged() {
    let mut s = store();
    let first = s
        .issue_referral("inviter", Some("friend@example.com"))
        .expect("first");
    let second = s
        .issue_referral("inviter", Some("FRIEND@example.com"))
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(s.list_referrals("inviter").expect("list").len(), 1);
}

#[test]
fn issued_codes_are_unique_across_many_referrals() {
    let mut s = store();
    let mut codes = std::collections::HashSet::new();
    for i in 0..50 {
        let r = s
            .issue_referral("inviter", Some(&format!("f{i}@example.com")))
            .expect("issue");
        assert!(codes.insert(r.referral_code), "duplicate code issued");
    }
}

#[test]
fn resolve_prefers_code_then_falls_back_to_email() {
    let mut s = store();
    let by_code = s
        .issue_referral("a", Some("x@example.com"))
        .expect("issue a");
    let by_email = s
        .issue_referral("b", Some("y@example.com"))
        .expect("issue b");

    let hit = s
        .resolve_referral(Some(&by_code.referral_code), Some("y@example.com"))
        .expect("resolve");
    assert_eq!(hit.as_ref().map(|r| r.id), Some(by_code.id));

    let hit = s
        .resolve_referral(Some("NOSUCHCD"), Some("Y@Example.COM"))
        .expect("resolve fallback");
    assert_eq!(hit.as_ref().map(|r| r.id), Some(by_email.id));

    let miss = s
        .resolve_referral(None, Some("stranger@example.com"))
        .expect("resolve miss");
    assert!(miss.is_none());
}

#[test]
fn signup_credit_happy_path_and_redelivery() {
    let mut s = store();
    let r = s
        .issue_referral("inviter-a", Some("new@example.com"))
        .expect("issue");
    assert_eq!(s.balance("inviter-a").expect("balance").balance_cents, 0);

    let outcome = s
        .grant_signup_credit("invitee-1", Some(&r.referral_code), None, CREDIT, "usd")
        .expect("credit");
    assert!(matches!(outcome, CreditOutcome::Credited { .. }));
    assert_eq!(s.balance("inviter-a").expect("balance").balance_cents, 100);

    // At-least-once delivery: every redelivery is a no-op.
    for _ in 0..5 {
        let outcome = s
            .grant_signup_credit("invitee-1", Some(&r.referral_code), None, CREDIT, "usd")
            .expect("redelivery");
        assert_eq!(outcome, CreditOutcome::AlreadyCredited);
    }
    assert_eq!(s.balance("inviter-a").expect("balance").balance_cents, 100);

    let accepted = s.get_referral(r.id).expect("get").expect("exists");
    assert_eq!(accepted.status, ReferralStatus::Accepted);
    assert_eq!(accepted.invitee_user_id.as_deref(), Some("invitee-1"));
    assert!(accepted.accepted_at.is_some());
}

#[test]
fn signup_credit_by_email_without_code() {
    let mut s = store();
    s.issue_referral("inviter", Some("kim@example.com"))
        .expect("issue");
    let outcome = s
        .grant_signup_credit("kim-id", None, Some("Kim@Example.com"), CREDIT, "usd")
        .expect("credit");
    assert!(matches!(outcome, CreditOutcome::Credited { .. }));
    assert_eq!(s.balance("inviter").expect("balance").balance_cents, 100);
}

#[test]
fn signup_without_any_referral_is_a_normal_no_referral_outcome() {
    let mut s = store();
    let outcome = s
        .grant_signup_credit("lone-signup", None, Some("lone@example.com"), CREDIT, "usd")
        .expect("credit");
    assert_eq!(outcome, CreditOutcome::NoReferral);
}

#[test]
fn an_accepted_referral_cannot_credit_a_second_invitee() {
    let mut s = store();
    let r = s.issue_referral("inviter", None).expect("issue");
    let first = s
        .grant_signup_credit("invitee-1", Some(&r.referral_code), None, CREDIT, "usd")
        .expect("first");
    assert!(matches!(first, CreditOutcome::Credited { .. }));

    let second = s
        .grant_signup_credit("invitee-2", Some(&r.referral_code), None, CREDIT, "usd")
        .expect("second");
    assert_eq!(second, CreditOutcome::NoReferral);
    assert_eq!(s.balance("inviter").expect("balance").balance_cents, 100);
}

#[test]
fn withdrawal_below_minimum_fails_and_leaves_balance_untouched() {
    let mut s = store();
    credit(&mut s, "u1", 1500, "evt-1");
    let err = s
        .create_withdrawal("u1", None, MINIMUM)
        .expect_err("below minimum");
    assert!(matches!(err, StoreError::PreconditionFailed(_)));
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 1500);

    // A further credit lifts the balance to the threshold; now it works.
    credit(&mut s, "u1", 500, "evt-2");
    let req = s.create_withdrawal("u1", None, MINIMUM).expect("create");
    assert_eq!(req.status, WithdrawalStatus::Pending);
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 2000);
}

#[test]
fn only_one_open_withdrawal_per_user() {
    let mut s = store();
    credit(&mut s, "u1", 5000, "evt-1");
    let req = s.create_withdrawal("u1", None, MINIMUM).expect("first");
    let err = s
        .create_withdrawal("u1", None, MINIMUM)
        .expect_err("second while pending");
    assert!(matches!(err, StoreError::Conflict(_)));

    // Still blocked while the admin is working on it.
    s.process_withdrawal(req.id, WithdrawalStatus::Processing, None, None)
        .expect("start work");
    let err = s
        .create_withdrawal("u1", None, MINIMUM)
        .expect_err("second while processing");
    assert!(matches!(err, StoreError::Conflict(_)));

    // A terminal request frees the slot.
    s.process_withdrawal(req.id, WithdrawalStatus::Cancelled, None, None)
        .expect("cancel");
    s.create_withdrawal("u1", None, MINIMUM).expect("reopen");
}

#[test]
fn completing_a_withdrawal_debits_the_full_balance_exactly_once() {
    let mut s = store();
    credit(&mut s, "u1", 2500, "evt-1");
    let req = s.create_withdrawal("u1", Some("payout please"), MINIMUM).expect("create");

    let outcome = s
        .process_withdrawal(req.id, WithdrawalStatus::Completed, None, Some("wired"))
        .expect("complete");
    let ProcessOutcome::Updated(updated) = outcome else {
        panic!("expected a transition");
    };
    assert_eq!(updated.status, WithdrawalStatus::Completed);
    assert!(updated.processed_at.is_some());
    assert_eq!(updated.admin_notes.as_deref(), Some("wired"));
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 0);

    // Duplicate admin click: no second debit, reported as a no-op success.
    let outcome = s
        .process_withdrawal(req.id, WithdrawalStatus::Completed, None, None)
        .expect("duplicate complete");
    assert_eq!(outcome, ProcessOutcome::AlreadyInState);
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 0);
    let debits = s
        .ledger_entries("u1")
        .expect("entries")
        .into_iter()
        .filter(|e| e.entry_type == EntryType::WithdrawalDebit)
        .count();
    assert_eq!(debits, 1);
}

#[test]
fn rejecting_requires_a_reason_and_leaves_the_balance_unchanged() {
    let mut s = store();
    credit(&mut s, "u1", 3000, "evt-1");
    let req = s.create_withdrawal("u1", None, MINIMUM).expect("create");

    let err = s
        .process_withdrawal(req.id, WithdrawalStatus::Rejected, None, None)
        .expect_err("no reason");
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    let err = s
        .process_withdrawal(req.id, WithdrawalStatus::Rejected, Some("  "), None)
        .expect_err("blank reason");
    assert!(matches!(err, StoreError::InvalidArgument(_)));

    let outcome = s
        .process_withdrawal(
            req.id,
            WithdrawalStatus::Rejected,
            Some("fraud suspected"),
            None,
        )
        .expect("reject");
    let ProcessOutcome::Updated(updated) = outcome else {
        panic!("expected a transition");
    };
    assert_eq!(updated.status, WithdrawalStatus::Rejected);
    assert_eq!(updated.rejection_reason.as_deref(), Some("fraud suspected"));
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 3000);
}

#[test]
fn terminal_withdrawals_absorb_all_other_transitions() {
    let mut s = store();
    credit(&mut s, "u1", 2000, "evt-1");
    let req = s.create_withdrawal("u1", None, MINIMUM).expect("create");
    s.process_withdrawal(req.id, WithdrawalStatus::Completed, None, None)
        .expect("complete");

    for next in [
        WithdrawalStatus::Pending,
        WithdrawalStatus::Processing,
        WithdrawalStatus::Rejected,
        WithdrawalStatus::Cancelled,
    ] {
        let reason = (next == WithdrawalStatus::Rejected).then_some("late reject");
        let err = s
            .process_withdrawal(req.id, next, reason, None)
            .expect_err("terminal must absorb");
        assert!(matches!(err, StoreError::InvalidState(_)), "{next}");
    }
}

#[test]
fn processing_an_unknown_request_is_not_found() {
    let mut s = store();
    let err = s
        .process_withdrawal(999, WithdrawalStatus::Completed, None, None)
        .expect_err("missing request");
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn admin_listing_joins_the_owning_account_as_one_nested_record() {
    let mut s = store();
    credit(&mut s, "u1", 2500, "evt-1");
    s.create_withdrawal("u1", None, MINIMUM).expect("create");

    let rows = s.list_withdrawals().expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].request.user_id, "u1");
    assert_eq!(rows[0].account.balance_cents, 2500);
    assert_eq!(rows[0].account.currency, "usd");
}

#[test]
fn full_referral_to_withdrawal_walkthrough_stays_reconciled() {
    let mut s = store();
    let r = s
        .issue_referral("owner-a", Some("driver@example.com"))
        .expect("issue");

    // Signup with the shared code, then a redelivery.
    s.grant_signup_credit("driver-1", Some(&r.referral_code), None, CREDIT, "usd")
        .expect("credit");
    s.grant_signup_credit("driver-1", Some(&r.referral_code), None, CREDIT, "usd")
        .expect("redelivery");
    assert_eq!(s.balance("owner-a").expect("balance").balance_cents, 100);

    // Build the balance up to the threshold and cash out.
    for i in 0..19 {
        let r = s
            .issue_referral("owner-a", Some(&format!("d{i}@example.com")))
            .expect("issue more");
        s.grant_signup_credit(
            &format!("driver-x{i}"),
            Some(&r.referral_code),
            None,
            CREDIT,
            "usd",
        )
        .expect("credit more");
    }
    assert_eq!(s.balance("owner-a").expect("balance").balance_cents, 2000);

    let req = s.create_withdrawal("owner-a", None, MINIMUM).expect("create");
    s.process_withdrawal(req.id, WithdrawalStatus::Processing, None, None)
        .expect("start");
    s.process_withdrawal(req.id, WithdrawalStatus::Completed, None, None)
        .expect("finish");
    assert_eq!(s.balance("owner-a").expect("balance").balance_cents, 0);

    // Materialized balances always equal the ledger sums.
    assert!(s.verify_balances().expect("verify").is_empty());
}

#[test]
fn store_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rewards.sqlite");
    {
        let mut s = RewardStore::open(&path, "usd").expect("open");
        credit(&mut s, "u1", 2500, "evt-1");
    }
    let s = RewardStore::open(&path, "usd").expect("reopen");
    assert_eq!(s.balance("u1").expect("balance").balance_cents, 2500);
    assert!(s.verify_balances().expect("verify").is_empty());
}
