// Thin re-export module: the UTXO set and ledger live in `state`, blocks and
// the pending pool in `chain`.

pub mod chain;
pub mod state;

pub use chain::*;
pub use state::*;
