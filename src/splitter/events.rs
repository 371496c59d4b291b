// Notifications emitted by committed operations

use crate::custody::Amount;
use crate::identity::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Capacity of the live subscription channel. Slow subscribers lag; the
/// history is always complete.
const SUBSCRIPTION_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitterEvent {
    /// Value came in (deposit) or was picked up from the pool (manual split)
    EtherReceived { sender: Address, amount: Amount },
    /// Shares paid to the three recipients, in slot order
    EtherSplit {
        recipients: [Address; 3],
        shares: [Amount; 3],
    },
    RefundWithdrawn { claimant: Address, amount: Amount },
    RecipientUpdated {
        slot: usize,
        previous: Address,
        current: Address,
    },
    EmergencyWithdrawal { destination: Address, amount: Amount },
}

impl SplitterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EtherReceived { .. } => "EtherReceived",
            Self::EtherSplit { .. } => "EtherSplit",
            Self::RefundWithdrawn { .. } => "RefundWithdrawn",
            Self::RecipientUpdated { .. } => "RecipientUpdated",
            Self::EmergencyWithdrawal { .. } => "EmergencyWithdrawal",
        }
    }
}

impl fmt::Display for SplitterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EtherReceived { sender, amount } => {
                write!(f, "EtherReceived({}, {})", sender, amount)
            }
            Self::EtherSplit { recipients, shares } => write!(
                f,
                "EtherSplit({}, {}, {}, {}, {}, {})",
                recipients[0], recipients[1], recipients[2], shares[0], shares[1], shares[2]
            ),
            Self::RefundWithdrawn { claimant, amount } => {
                write!(f, "RefundWithdrawn({}, {})", claimant, amount)
            }
            Self::RecipientUpdated {
                slot,
                previous,
                current,
            } => write!(f, "RecipientUpdated({}, {}, {})", slot, previous, current),
            Self::EmergencyWithdrawal {
                destination,
                amount,
            } => write!(f, "EmergencyWithdrawal({}, {})", destination, amount),
        }
    }
}

/// An event with its position in the ledger's history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub event: SplitterEvent,
}

/// Append-only history plus a live fan-out for observers
#[derive(Debug)]
pub struct EventLog {
    history: Vec<EventRecord>,
    next_sequence: u64,
    sender: broadcast::Sender<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Continue numbering after `next_sequence - 1`, e.g. when reopening a
    /// persisted deployment. The in-memory history starts empty.
    pub fn starting_at(next_sequence: u64) -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIPTION_CAPACITY);
        Self {
            history: Vec::new(),
            next_sequence,
            sender,
        }
    }

    /// Record a committed operation's events, in order
    pub(crate) fn publish_all(&mut self, events: Vec<SplitterEvent>) {
        for event in events {
            let record = EventRecord {
                sequence: self.next_sequence,
                event,
            };
            self.next_sequence += 1;
            // no live subscribers is fine
            let _ = self.sender.send(record.clone());
            self.history.push(record);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn history(&self) -> &[EventRecord] {
        &self.history
    }

    /// Records with `sequence >= from`
    pub fn since(&self, from: u64) -> Vec<&EventRecord> {
        self.history.iter().filter(|r| r.sequence >= from).collect()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
