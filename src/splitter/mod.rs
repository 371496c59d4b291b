// Splitter module - THE LEDGER
// Deposits split three ways, remainders owed back, owner administration

mod events;
mod ledger;
mod split;
mod state;

pub use events::{EventLog, EventRecord, SplitterEvent};
pub use ledger::{SplitOutcome, Splitter, SplitterError};
pub use split::{SplitPlan, RECIPIENT_COUNT};
pub use state::{LedgerState, StateError};
