// Split arithmetic

use crate::custody::Amount;
use serde::{Deserialize, Serialize};

pub const RECIPIENT_COUNT: usize = 3;

/// How one amount divides across the three recipients
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    amount: Amount,
    share: Amount,
    remainder: Amount,
}

impl SplitPlan {
    pub fn new(amount: Amount) -> Self {
        let count = RECIPIENT_COUNT as Amount;
        Self {
            amount,
            share: amount / count,
            remainder: amount % count,
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Equal per-recipient share (truncating)
    pub fn share(&self) -> Amount {
        self.share
    }

    /// Indivisible leftover, 0..=2
    pub fn remainder(&self) -> Amount {
        self.remainder
    }

    /// What actually leaves for the recipients
    pub fn distributed(&self) -> Amount {
        self.amount - self.remainder
    }

    pub fn shares(&self) -> [Amount; RECIPIENT_COUNT] {
        [self.share; RECIPIENT_COUNT]
    }
}
