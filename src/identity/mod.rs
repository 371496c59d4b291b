// Identity module - account keypairs and ledger addresses

mod address;
mod keypair;

pub use address::{Address, AddressError, ADDRESS_LEN};
pub use keypair::{Keypair, KeypairError, PublicKey};
