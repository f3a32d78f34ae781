// rcoin: a didactic UTXO cryptocurrency engine.
//
// Proof-of-work chain with cumulative-difficulty tie-breaking, an in-memory
// UTXO set, P-256 wallets, and an event-driven node that reconciles gossip
// over channels.

pub mod constants;
pub mod consensus;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use crate::core::{
    Block, BlockHeader, BlockTransactions, Chain, CoinbaseTransaction, ContentHash, Hash,
    LedgerBlock, LedgerChain, RegularTransaction, Transaction, TxData, TxId, TxIn, TxOut, Witness,
};
pub use error::{UtxoError, ValidationError, WalletError};
pub use network::Node;
pub use storage::{Tally, UtxoDb};
pub use wallet::Wallet;
