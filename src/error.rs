//! Error types for chain, UTXO and wallet validation

use crate::core::{Address, Hash, TxIn};
use thiserror::Error;

/// Failures of block, header, chain and transaction validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("hash mismatch: computed {computed} != stored {stored}")]
    HashMismatch { computed: Hash, stored: Hash },

    #[error("index mismatch: expected {expected}, got {got}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("previous-hash mismatch at index {index}")]
    PrevHashMismatch { index: u64 },

    #[error("cumulative difficulty mismatch at index {index}")]
    DiffMismatch { index: u64 },

    #[error("timestamp violates the clock-skew rule")]
    ClockSkew,

    #[error("block hash has {got} leading zero bits, target requires {required}")]
    TargetNotMet { required: u8, got: u32 },

    #[error("genesis header violates the genesis shape")]
    GenesisShape,

    #[error("witness does not verify the transaction id")]
    SignatureInvalid,

    #[error("coinbase must have no inputs and exactly one output")]
    CoinbaseShape,

    #[error("coinbase amount does not equal base reward plus collected fees")]
    RewardMismatch,

    #[error("already seen")]
    Duplicate,

    #[error("no predecessor in pool for {0}")]
    NoPredecessor(Hash),
}

/// Failures of spend validation against the UTXO set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("input {0} does not reference an unspent output")]
    UnknownInput(TxIn),

    #[error("input {0} spent more than once")]
    DoubleSpend(TxIn),

    #[error("input {0} is not owned by the witness address")]
    AddressMismatch(TxIn),

    #[error("inputs carry {have}, outputs need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("computed fee {computed} does not match declared fee {declared}")]
    FeeMismatch { computed: u64, declared: u64 },
}

/// Failures surfaced to a wallet caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("nothing to send")]
    AmountZero,

    #[error("insufficient funds for {address}")]
    InsufficientFunds { address: Address },
}
