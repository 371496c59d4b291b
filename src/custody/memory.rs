// MemoryCustody - journaled in-memory host
//
// Keeps the ledger's held value plus the balances of every outside account,
// so that payouts are observable. Accounts can be flagged as rejecting, which
// makes any payment to them fail the way a refusing contract would.

use crate::custody::traits::{Amount, Custody, TransferError};
use crate::identity::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MemoryCustodyError {
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

/// Undo record: the value a slot had before it was first touched
#[derive(Clone, Debug)]
enum JournalEntry {
    Held(Amount),
    Account(Address, Option<Amount>),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryCustody {
    /// Value held on behalf of the ledger
    held: Amount,
    /// Outside account balances
    accounts: HashMap<Address, Amount>,
    /// Accounts that refuse incoming value
    rejecting: HashSet<Address>,
    #[serde(skip)]
    journal: Option<Vec<JournalEntry>>,
}

impl MemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an outside account (zero when unknown)
    pub fn balance_of(&self, who: &Address) -> Amount {
        self.accounts.get(who).copied().unwrap_or(0)
    }

    /// Mint value into an outside account
    pub fn fund(&mut self, who: &Address, amount: Amount) -> Result<(), TransferError> {
        let current = self.balance_of(who);
        let updated = current.checked_add(amount).ok_or(TransferError::Overflow)?;
        self.set_account(*who, updated);
        Ok(())
    }

    /// Push value straight into custody without going through the ledger's
    /// deposit path (a forced transfer). The ledger only learns about it when
    /// it reconciles.
    pub fn force_send(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        self.debit(from, amount)?;
        let held = self.held.checked_add(amount).ok_or(TransferError::Overflow)?;
        self.set_held(held);
        Ok(())
    }

    /// Make `who` refuse (or accept again) every incoming payment
    pub fn set_rejecting(&mut self, who: &Address, rejecting: bool) {
        if rejecting {
            self.rejecting.insert(*who);
        } else {
            self.rejecting.remove(who);
        }
    }

    pub fn is_rejecting(&self, who: &Address) -> bool {
        self.rejecting.contains(who)
    }

    /// True while an operation is open
    pub fn in_operation(&self) -> bool {
        self.journal.is_some()
    }

    /// Sum of all value: held plus every outside account
    pub fn total_supply(&self) -> Amount {
        self.accounts
            .values()
            .fold(self.held, |acc, v| acc.saturating_add(*v))
    }

    fn debit(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                available,
                required: amount,
            });
        }
        self.set_account(*from, available - amount);
        Ok(())
    }

    fn set_held(&mut self, value: Amount) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Held(self.held));
        }
        self.held = value;
    }

    fn set_account(&mut self, who: Address, value: Amount) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Account(who, self.accounts.get(&who).copied()));
        }
        self.accounts.insert(who, value);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MemoryCustodyError> {
        postcard::from_bytes(bytes)
            .map_err(|e| MemoryCustodyError::DeserializationFailed(e.to_string()))
    }
}

impl Custody for MemoryCustody {
    fn balance(&self) -> Amount {
        self.held
    }

    fn accept(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let held = self.held.checked_add(amount).ok_or(TransferError::Overflow)?;
        self.debit(from, amount)?;
        self.set_held(held);
        debug!(from = %from, amount, "custody accepted value");
        Ok(())
    }

    fn pay(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        if self.rejecting.contains(to) {
            return Err(TransferError::Rejected { to: *to });
        }
        if self.held < amount {
            return Err(TransferError::InsufficientFunds {
                available: self.held,
                required: amount,
            });
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.set_held(self.held - amount);
        self.set_account(*to, credited);
        debug!(to = %to, amount, "custody paid value");
        Ok(())
    }

    fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    fn commit(&mut self) {
        self.journal = None;
    }

    fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for entry in journal.into_iter().rev() {
            match entry {
                JournalEntry::Held(previous) => self.held = previous,
                JournalEntry::Account(who, Some(previous)) => {
                    self.accounts.insert(who, previous);
                }
                JournalEntry::Account(who, None) => {
                    self.accounts.remove(&who);
                }
            }
        }
    }
}
