// Splitter - the ledger state machine
//
// Every public operation is all-or-nothing. State is snapshotted and the
// custody journal opened before anything changes; on failure both are
// restored and no event is published. Within an operation the ledger state
// reaches its final value before any payout is attempted.

use crate::custody::{Amount, Custody, TransferError};
use crate::identity::Address;
use crate::splitter::events::{EventLog, EventRecord, SplitterEvent};
use crate::splitter::split::{SplitPlan, RECIPIENT_COUNT};
use crate::splitter::state::LedgerState;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Errors that can occur during splitter operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitterError {
    #[error("Zero address supplied where a real identity is required")]
    ZeroAddress,

    #[error("Unauthorized: caller is not the owner")]
    Unauthorized,

    #[error("Deposit amount must be greater than zero")]
    EmptyDeposit,

    #[error("No funds to split")]
    NoFundsToSplit,

    #[error("No refund available")]
    NoRefundAvailable,

    #[error("Invalid recipient slot {0}: expected 0, 1 or 2")]
    InvalidSlot(usize),

    #[error("Recipient {0} already occupies another slot")]
    DuplicateRecipient(Address),

    #[error("Amount would overflow")]
    Overflow,

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

/// Result of a committed deposit or manual split
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Who the received value is attributed to (and who holds the remainder)
    pub sender: Address,
    pub recipients: [Address; RECIPIENT_COUNT],
    pub plan: SplitPlan,
}

impl SplitOutcome {
    pub fn share(&self) -> Amount {
        self.plan.share()
    }

    pub fn remainder(&self) -> Amount {
        self.plan.remainder()
    }
}

pub struct Splitter<C: Custody> {
    state: LedgerState,
    custody: C,
    events: EventLog,
}

impl<C: Custody> Splitter<C> {
    /// Deploy a new ledger. `owner` becomes the administrator.
    ///
    /// Fails with `ZeroAddress` if the owner or any recipient is the zero
    /// address and with `DuplicateRecipient` if two slots name the same
    /// identity. No ledger exists after a failed deployment.
    pub fn deploy(
        owner: Address,
        recipients: [Address; RECIPIENT_COUNT],
        custody: C,
    ) -> Result<Self, SplitterError> {
        let mut state = LedgerState::new(owner, recipients)?;
        // custody may already hold value; it is splittable, not owed
        state.reconcile(custody.balance());

        info!(
            owner = %owner,
            recipient1 = %recipients[0],
            recipient2 = %recipients[1],
            recipient3 = %recipients[2],
            "splitter deployed"
        );

        Ok(Self {
            state,
            custody,
            events: EventLog::new(),
        })
    }

    /// Reassemble a ledger from persisted parts
    pub fn from_parts(state: LedgerState, custody: C, events: EventLog) -> Self {
        Self {
            state,
            custody,
            events,
        }
    }

    pub fn into_parts(self) -> (LedgerState, C, EventLog) {
        (self.state, self.custody, self.events)
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Default inbound path: `sender` transfers `amount` in, which is split
    /// three ways on the spot. The remainder becomes `sender`'s refund credit.
    pub fn deposit(&mut self, sender: &Address, amount: Amount) -> Result<SplitOutcome, SplitterError> {
        if amount == 0 {
            return Err(SplitterError::EmptyDeposit);
        }
        if sender.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        let sender = *sender;

        let outcome = self.atomically("deposit", |state, custody, events| {
            custody.accept(&sender, amount)?;
            state.record_inflow(amount)?;
            distribute(state, custody, events, &sender, SplitPlan::new(amount))
        })?;

        info!(
            sender = %sender,
            amount,
            share = outcome.share(),
            remainder = outcome.remainder(),
            "deposit split"
        );
        Ok(outcome)
    }

    /// Split whatever the pool holds beyond outstanding refunds. Anyone may
    /// call this; the caller is recorded as the sender and keeps the remainder.
    pub fn manual_split(&mut self, caller: &Address) -> Result<SplitOutcome, SplitterError> {
        if caller.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        let caller = *caller;

        let outcome = self.atomically("manual_split", |state, custody, events| {
            fold_unaccounted(state, custody);
            let available = state.available_to_split();
            if available == 0 {
                return Err(SplitterError::NoFundsToSplit);
            }
            distribute(state, custody, events, &caller, SplitPlan::new(available))
        })?;

        info!(
            caller = %caller,
            amount = outcome.plan.amount(),
            share = outcome.share(),
            remainder = outcome.remainder(),
            "manual split"
        );
        Ok(outcome)
    }

    /// Pay `caller` their accumulated remainder credit
    pub fn withdraw_refund(&mut self, caller: &Address) -> Result<Amount, SplitterError> {
        let caller = *caller;

        let amount = self.atomically("withdraw_refund", |state, custody, events| {
            // credit is gone before the payout leaves
            let amount = state.take_refund(&caller)?;
            custody.pay(&caller, amount)?;
            events.push(SplitterEvent::RefundWithdrawn {
                claimant: caller,
                amount,
            });
            Ok(amount)
        })?;

        info!(claimant = %caller, amount, "refund withdrawn");
        Ok(amount)
    }

    /// Owner-only: put `new_recipient` in `slot`. Returns the replaced address.
    pub fn update_recipient(
        &mut self,
        caller: &Address,
        slot: usize,
        new_recipient: &Address,
    ) -> Result<Address, SplitterError> {
        self.ensure_owner(caller)?;
        let new_recipient = *new_recipient;

        let previous = self.atomically("update_recipient", |state, _custody, events| {
            let previous = state.set_recipient(slot, new_recipient)?;
            events.push(SplitterEvent::RecipientUpdated {
                slot,
                previous,
                current: new_recipient,
            });
            Ok(previous)
        })?;

        info!(slot, previous = %previous, current = %new_recipient, "recipient updated");
        Ok(previous)
    }

    /// Owner-only: send the whole held balance to `destination`, bypassing
    /// split and refund accounting. Pending credits stay on the books.
    pub fn emergency_withdraw(&mut self, caller: &Address, destination: &Address) -> Result<Amount, SplitterError> {
        self.ensure_owner(caller)?;
        if destination.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        let destination = *destination;

        let amount = self.atomically("emergency_withdraw", |state, custody, events| {
            fold_unaccounted(state, custody);
            if state.held_balance() == 0 {
                return Err(SplitterError::NoFundsToSplit);
            }
            let amount = state.drain();
            custody.pay(&destination, amount)?;
            events.push(SplitterEvent::EmergencyWithdrawal {
                destination,
                amount,
            });
            Ok(amount)
        })?;

        warn!(
            destination = %destination,
            amount,
            stranded_refunds = self.state.outstanding_refunds(),
            "emergency withdrawal"
        );
        Ok(amount)
    }

    /// Recognise value that reached custody outside the deposit path.
    /// Returns the newly recognised amount.
    pub fn reconcile(&mut self) -> Result<Amount, SplitterError> {
        self.atomically("reconcile", |state, custody, _events| {
            Ok(fold_unaccounted(state, custody))
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Held balance as currently accounted
    pub fn balance(&self) -> Amount {
        self.state.held_balance()
    }

    pub fn recipients(&self) -> [Address; RECIPIENT_COUNT] {
        *self.state.recipients()
    }

    pub fn pending_refund(&self, who: &Address) -> Amount {
        self.state.pending_refund(who)
    }

    pub fn total_received(&self) -> Amount {
        self.state.total_received()
    }

    pub fn total_split(&self) -> Amount {
        self.state.total_split()
    }

    pub fn owner(&self) -> &Address {
        self.state.owner()
    }

    pub fn outstanding_refunds(&self) -> Amount {
        self.state.outstanding_refunds()
    }

    pub fn available_to_split(&self) -> Amount {
        self.state.available_to_split()
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// Host-side access to the custody (funding accounts, forced transfers).
    /// The ledger notices forced value on its next reconcile.
    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn ensure_owner(&self, caller: &Address) -> Result<(), SplitterError> {
        if !self.state.is_owner(caller) {
            return Err(SplitterError::Unauthorized);
        }
        Ok(())
    }

    fn atomically<T, F>(&mut self, operation: &'static str, f: F) -> Result<T, SplitterError>
    where
        F: FnOnce(&mut LedgerState, &mut C, &mut Vec<SplitterEvent>) -> Result<T, SplitterError>,
    {
        let snapshot = self.state.clone();
        let mut pending = Vec::new();

        self.custody.begin();
        match f(&mut self.state, &mut self.custody, &mut pending) {
            Ok(value) => {
                self.custody.commit();
                debug_assert!(self.state.check_invariants().is_ok());
                self.events.publish_all(pending);
                Ok(value)
            }
            Err(err) => {
                self.custody.rollback();
                self.state = snapshot;
                warn!(operation, error = %err, "operation reverted");
                Err(err)
            }
        }
    }
}

/// Apply `plan` to the pool on behalf of `sender` and pay the shares.
fn distribute<C: Custody>(
    state: &mut LedgerState,
    custody: &mut C,
    events: &mut Vec<SplitterEvent>,
    sender: &Address,
    plan: SplitPlan,
) -> Result<SplitOutcome, SplitterError> {
    state.record_split(sender, &plan)?;
    let recipients = *state.recipients();

    if plan.share() > 0 {
        for recipient in &recipients {
            custody.pay(recipient, plan.share())?;
        }
    } else {
        debug!(amount = plan.amount(), "share rounds to zero, nothing paid out");
    }

    events.push(SplitterEvent::EtherReceived {
        sender: *sender,
        amount: plan.amount(),
    });
    events.push(SplitterEvent::EtherSplit {
        recipients,
        shares: plan.shares(),
    });

    Ok(SplitOutcome {
        sender: *sender,
        recipients,
        plan,
    })
}

fn fold_unaccounted<C: Custody>(state: &mut LedgerState, custody: &C) -> Amount {
    let unaccounted = state.reconcile(custody.balance());
    if unaccounted > 0 {
        info!(unaccounted, "recognised value received outside the deposit path");
    }
    unaccounted
}
