// Custody Traits and Core Types
// The ledger never moves value itself; it asks a Custody to do it

use crate::identity::Address;
use thiserror::Error;

/// Value in the smallest indivisible unit of the underlying system
pub type Amount = u128;

/// Why an inbound or outbound transfer could not be delivered
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer rejected: {to} cannot accept value")]
    Rejected { to: Address },

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("Balance would overflow")]
    Overflow,
}

/// The value-custody mechanism behind a ledger.
///
/// Every ledger operation is bracketed by `begin` and exactly one of
/// `commit`/`rollback`. After `rollback` the custody must be in the state it
/// had at `begin`, including any transfers already executed.
pub trait Custody {
    /// Value currently held on behalf of the ledger
    fn balance(&self) -> Amount;

    /// Move `amount` from `from` into custody
    fn accept(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Pay `amount` out of custody to `to`
    fn pay(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError>;

    fn begin(&mut self);

    fn commit(&mut self);

    fn rollback(&mut self);
}
