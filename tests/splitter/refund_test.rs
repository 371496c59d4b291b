// Refund withdrawal tests

use crate::{Fixture, SENDER_FUNDS};
use splitter::custody::{Custody, TransferError};
use splitter::splitter::SplitterError;

#[test]
fn test_withdraw_pays_exact_credit() {
    let mut f = Fixture::new();
    f.splitter.deposit(&f.sender, 10).unwrap();

    let paid = f.splitter.withdraw_refund(&f.sender).unwrap();

    assert_eq!(paid, 1);
    assert_eq!(f.splitter.pending_refund(&f.sender), 0);
    // sender is out exactly the nine that was split
    assert_eq!(f.balance_of(&f.sender), SENDER_FUNDS - 9);
    assert_eq!(f.splitter.balance(), 0);
    assert_eq!(f.splitter.custody().balance(), 0);
}

#[test]
fn test_withdraw_twice_fails_second_time() {
    let mut f = Fixture::new();
    f.splitter.deposit(&f.sender, 11).unwrap();
    f.splitter.withdraw_refund(&f.sender).unwrap();
    let balance_after_first = f.balance_of(&f.sender);
    let state_after_first = f.splitter.state().clone();

    let second = f.splitter.withdraw_refund(&f.sender);

    assert_eq!(second, Err(SplitterError::NoRefundAvailable));
    assert_eq!(f.balance_of(&f.sender), balance_after_first);
    assert_eq!(f.splitter.state(), &state_after_first);
}

#[test]
fn test_withdraw_without_credit_fails() {
    let mut f = Fixture::new();

    assert_eq!(
        f.splitter.withdraw_refund(&f.sender),
        Err(SplitterError::NoRefundAvailable)
    );
}

#[test]
fn test_withdraw_only_touches_own_credit() {
    let mut f = Fixture::new();
    let other = f.funded_account(10);
    f.splitter.deposit(&f.sender, 2).unwrap();
    f.splitter.deposit(&other, 4).unwrap();

    f.splitter.withdraw_refund(&other).unwrap();

    assert_eq!(f.splitter.pending_refund(&other), 0);
    assert_eq!(f.splitter.pending_refund(&f.sender), 2);
    assert_eq!(f.splitter.balance(), 2);
}

#[test]
fn test_rejected_refund_restores_credit() {
    let mut f = Fixture::new();
    f.splitter.deposit(&f.sender, 5).unwrap();
    let sender = f.sender;
    f.splitter.custody_mut().set_rejecting(&sender, true);

    let result = f.splitter.withdraw_refund(&f.sender);

    assert_eq!(
        result,
        Err(SplitterError::Transfer(TransferError::Rejected { to: f.sender }))
    );
    assert_eq!(f.splitter.pending_refund(&f.sender), 2);
    assert_eq!(f.splitter.balance(), 2);
    assert_eq!(f.splitter.outstanding_refunds(), 2);

    // once the sender accepts value again the credit is still claimable
    f.splitter.custody_mut().set_rejecting(&sender, false);
    assert_eq!(f.splitter.withdraw_refund(&f.sender).unwrap(), 2);
}

#[test]
fn test_refund_after_emergency_drain_fails_and_keeps_credit() {
    let mut f = Fixture::new();
    f.splitter.deposit(&f.sender, 4).unwrap();
    let owner = f.owner;
    f.splitter.emergency_withdraw(&owner, &owner).unwrap();

    let result = f.splitter.withdraw_refund(&f.sender);

    assert!(matches!(
        result,
        Err(SplitterError::Transfer(TransferError::InsufficientFunds { .. }))
    ));
    assert_eq!(f.splitter.pending_refund(&f.sender), 1);
}
