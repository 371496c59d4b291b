// Custody module - where the ledger's value actually sits

mod memory;
mod traits;

pub use memory::{MemoryCustody, MemoryCustodyError};
pub use traits::{Amount, Custody, TransferError};
