// Splitter - three-way fund distribution ledger
//
// identity: keypairs and addresses
// custody:  where the value actually sits (and how it moves)
// splitter: the ledger state machine
// storage:  sled persistence
// config:   node and deployment configuration

pub mod config;
pub mod custody;
pub mod identity;
pub mod splitter;
pub mod storage;
