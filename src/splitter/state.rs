// Ledger State - everything the splitter knows, and nothing it does

use crate::custody::{Amount, TransferError};
use crate::identity::Address;
use crate::splitter::split::{SplitPlan, RECIPIENT_COUNT};
use crate::splitter::SplitterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from decoding or auditing a ledger state
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

/// The splitter's state. Only `Splitter` mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Administrator, fixed at deployment
    owner: Address,
    /// Payout slots, non-zero and distinct
    recipients: [Address; RECIPIENT_COUNT],
    /// Value in custody as far as the ledger has accounted for it
    held_balance: Amount,
    /// Withdrawable remainders per sender; zero entries are removed
    pending_refunds: BTreeMap<Address, Amount>,
    /// Sum of `pending_refunds`
    outstanding_refunds: Amount,
    total_received: Amount,
    total_split: Amount,
    /// Every refund credit ever created, withdrawn or not
    total_refunds_credited: Amount,
}

impl LedgerState {
    /// Create the state for a fresh deployment
    pub fn new(owner: Address, recipients: [Address; RECIPIENT_COUNT]) -> Result<Self, SplitterError> {
        if owner.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        validate_recipients(&recipients)?;

        Ok(Self {
            owner,
            recipients,
            held_balance: 0,
            pending_refunds: BTreeMap::new(),
            outstanding_refunds: 0,
            total_received: 0,
            total_split: 0,
            total_refunds_credited: 0,
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn recipients(&self) -> &[Address; RECIPIENT_COUNT] {
        &self.recipients
    }

    pub fn held_balance(&self) -> Amount {
        self.held_balance
    }

    /// Pending refund credit for `who` (zero when absent)
    pub fn pending_refund(&self, who: &Address) -> Amount {
        self.pending_refunds.get(who).copied().unwrap_or(0)
    }

    /// All non-zero refund credits, ordered by address
    pub fn pending_refunds(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.pending_refunds.iter()
    }

    pub fn outstanding_refunds(&self) -> Amount {
        self.outstanding_refunds
    }

    /// Held value not already owed back as refunds
    pub fn available_to_split(&self) -> Amount {
        self.held_balance.saturating_sub(self.outstanding_refunds)
    }

    pub fn total_received(&self) -> Amount {
        self.total_received
    }

    pub fn total_split(&self) -> Amount {
        self.total_split
    }

    pub fn total_refunds_credited(&self) -> Amount {
        self.total_refunds_credited
    }

    pub fn is_owner(&self, who: &Address) -> bool {
        self.owner == *who
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Value entered custody through the deposit path
    pub(crate) fn record_inflow(&mut self, amount: Amount) -> Result<(), SplitterError> {
        self.held_balance = self
            .held_balance
            .checked_add(amount)
            .ok_or(SplitterError::Overflow)?;
        Ok(())
    }

    /// Account for a split of held value: totals move, the remainder becomes
    /// `sender`'s refund credit and the distributed part leaves the pool.
    pub(crate) fn record_split(&mut self, sender: &Address, plan: &SplitPlan) -> Result<(), SplitterError> {
        self.total_received = self
            .total_received
            .checked_add(plan.amount())
            .ok_or(SplitterError::Overflow)?;
        self.total_split = self
            .total_split
            .checked_add(plan.distributed())
            .ok_or(SplitterError::Overflow)?;
        self.credit_refund(sender, plan.remainder())?;
        self.held_balance = self
            .held_balance
            .checked_sub(plan.distributed())
            .ok_or(TransferError::InsufficientFunds {
                available: self.held_balance,
                required: plan.distributed(),
            })?;
        Ok(())
    }

    fn credit_refund(&mut self, who: &Address, amount: Amount) -> Result<(), SplitterError> {
        if amount == 0 {
            return Ok(());
        }
        let credit = self
            .pending_refund(who)
            .checked_add(amount)
            .ok_or(SplitterError::Overflow)?;
        self.outstanding_refunds = self
            .outstanding_refunds
            .checked_add(amount)
            .ok_or(SplitterError::Overflow)?;
        self.total_refunds_credited = self
            .total_refunds_credited
            .checked_add(amount)
            .ok_or(SplitterError::Overflow)?;
        self.pending_refunds.insert(*who, credit);
        Ok(())
    }

    /// Zero `who`'s credit and take it out of the pool. Returns the amount
    /// now owed to `who` by the caller of this method.
    pub(crate) fn take_refund(&mut self, who: &Address) -> Result<Amount, SplitterError> {
        let credit = self.pending_refund(who);
        if credit == 0 {
            return Err(SplitterError::NoRefundAvailable);
        }
        let held = self
            .held_balance
            .checked_sub(credit)
            .ok_or(TransferError::InsufficientFunds {
                available: self.held_balance,
                required: credit,
            })?;

        self.pending_refunds.remove(who);
        self.outstanding_refunds -= credit;
        self.held_balance = held;
        Ok(credit)
    }

    /// Replace one slot, returning the previous occupant
    pub(crate) fn set_recipient(&mut self, slot: usize, recipient: Address) -> Result<Address, SplitterError> {
        if slot >= RECIPIENT_COUNT {
            return Err(SplitterError::InvalidSlot(slot));
        }
        if recipient.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        let duplicate = self
            .recipients
            .iter()
            .enumerate()
            .any(|(i, r)| i != slot && *r == recipient);
        if duplicate {
            return Err(SplitterError::DuplicateRecipient(recipient));
        }

        Ok(std::mem::replace(&mut self.recipients[slot], recipient))
    }

    /// Empty the pool, returning what it held
    pub(crate) fn drain(&mut self) -> Amount {
        std::mem::take(&mut self.held_balance)
    }

    /// Align the held counter with what custody reports. Returns the value
    /// that arrived outside the deposit path.
    pub(crate) fn reconcile(&mut self, custody_balance: Amount) -> Amount {
        let unaccounted = custody_balance.saturating_sub(self.held_balance);
        self.held_balance = custody_balance;
        unaccounted
    }

    // ========================================================================
    // AUDIT & SERIALIZATION
    // ========================================================================

    /// Verify the accounting identities that every committed operation keeps
    pub fn check_invariants(&self) -> Result<(), StateError> {
        if self.owner.is_zero() {
            return Err(StateError::InvariantViolated("owner is the zero address".into()));
        }
        validate_recipients(&self.recipients)
            .map_err(|e| StateError::InvariantViolated(e.to_string()))?;

        let expected = self.total_split.checked_add(self.total_refunds_credited);
        if expected != Some(self.total_received) {
            return Err(StateError::InvariantViolated(format!(
                "total_received {} != total_split {} + refunds credited {}",
                self.total_received, self.total_split, self.total_refunds_credited
            )));
        }

        let mut sum: Amount = 0;
        for (who, credit) in &self.pending_refunds {
            if *credit == 0 {
                return Err(StateError::InvariantViolated(format!("zero refund entry for {}", who)));
            }
            sum = sum.checked_add(*credit).ok_or_else(|| {
                StateError::InvariantViolated("pending refunds overflow".into())
            })?;
        }
        if sum != self.outstanding_refunds {
            return Err(StateError::InvariantViolated(format!(
                "outstanding_refunds {} != sum of pending refunds {}",
                self.outstanding_refunds, sum
            )));
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Decode a state and audit it before handing it out
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        let state: LedgerState = postcard::from_bytes(bytes)
            .map_err(|e| StateError::DeserializationFailed(e.to_string()))?;
        state.check_invariants()?;
        Ok(state)
    }
}

/// Non-zero and pairwise distinct
pub(crate) fn validate_recipients(recipients: &[Address; RECIPIENT_COUNT]) -> Result<(), SplitterError> {
    if recipients.iter().any(|r| r.is_zero()) {
        return Err(SplitterError::ZeroAddress);
    }
    for (i, a) in recipients.iter().enumerate() {
        if recipients[i + 1..].contains(a) {
            return Err(SplitterError::DuplicateRecipient(*a));
        }
    }
    Ok(())
}
