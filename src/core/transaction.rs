// Transaction types: outputs, inputs, witnesses, coinbase and regular
// transactions, and the per-block payload committing to all of them

use crate::constants::BASE_REWARD;
use crate::core::{content_hash, now_ms, sha256, Address, CanonicalEncode, Hash, TxId};
use crate::core::{Block, Chain, ContentHash};
use crate::error::ValidationError;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use std::fmt;

/// A spendable amount locked to an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOut {
    pub address: Address,
    pub amount: u64,
}

impl CanonicalEncode for TxOut {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.address.encode_into(buf);
        self.amount.encode_into(buf);
    }
}

impl fmt::Display for TxOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "${}->{}", self.amount, self.address)
    }
}

/// Reference to a prior transaction's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxIn {
    pub tx_id: TxId,
    pub out_idx: u64,
}

impl CanonicalEncode for TxIn {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.tx_id.encode_into(buf);
        self.out_idx.encode_into(buf);
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}]", self.tx_id, self.out_idx)
    }
}

/// ECDSA authorization: ASN.1 signature over the tx id plus the compressed
/// SEC1 public key that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub sig: Vec<u8>,
    pub pub_key: Vec<u8>,
}

impl Witness {
    pub fn address(&self) -> Address {
        sha256(&self.pub_key)
    }
}

/// The signed content of a transaction. Hashing it yields the tx id; the
/// witness is excluded so the id can be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
    pub timestamp: i64,
}

impl CanonicalEncode for TxData {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.tx_ins.encode_into(buf);
        self.tx_outs.encode_into(buf);
        self.timestamp.encode_into(buf);
    }
}

impl TxData {
    pub fn tx_id(&self) -> TxId {
        content_hash(self)
    }
}

/// Subsidy transaction. No inputs, a single output, no witness: it is only
/// creatable by the block producer and checked by the block reward rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseTransaction {
    pub tx_id: TxId,
    pub tx_data: TxData,
}

impl CoinbaseTransaction {
    pub fn new(address: Address, amount: u64) -> Self {
        let tx_data = TxData {
            tx_ins: Vec::new(),
            tx_outs: vec![TxOut { address, amount }],
            timestamp: now_ms(),
        };
        Self { tx_id: tx_data.tx_id(), tx_data }
    }

    pub fn amount(&self) -> u64 {
        self.tx_data.tx_outs[0].amount
    }

    pub fn address(&self) -> Address {
        self.tx_data.tx_outs[0].address
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.tx_data.tx_ins.is_empty() || self.tx_data.tx_outs.len() != 1 {
            return Err(ValidationError::CoinbaseShape);
        }
        let computed = self.tx_data.tx_id();
        if computed != self.tx_id {
            return Err(ValidationError::HashMismatch {
                computed,
                stored: self.tx_id,
            });
        }
        Ok(())
    }
}

/// A spend: inputs it consumes, outputs it creates, the declared fee and the
/// witness authorizing it all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularTransaction {
    pub tx_id: TxId,
    pub tx_data: TxData,
    pub witness: Witness,
    pub transaction_fee: u64,
}

impl RegularTransaction {
    /// Id and signature checks. UTXO-level validity (ownership, balance,
    /// fee) is the ledger's business, see `UtxoDb::validate_regular`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let computed = self.tx_data.tx_id();
        if computed != self.tx_id {
            return Err(ValidationError::HashMismatch {
                computed,
                stored: self.tx_id,
            });
        }
        let key = VerifyingKey::from_sec1_bytes(&self.witness.pub_key)
            .map_err(|_| ValidationError::SignatureInvalid)?;
        let sig = Signature::from_der(&self.witness.sig)
            .map_err(|_| ValidationError::SignatureInvalid)?;
        key.verify(self.tx_id.as_bytes(), &sig)
            .map_err(|_| ValidationError::SignatureInvalid)?;
        Ok(())
    }
}

/// Either kind of transaction, borrowed from its block payload. Dispatch is
/// by match so coinbase-specific rules stay explicit.
#[derive(Debug, Clone, Copy)]
pub enum Transaction<'a> {
    Coinbase(&'a CoinbaseTransaction),
    Regular(&'a RegularTransaction),
}

impl<'a> Transaction<'a> {
    pub fn tx_id(&self) -> TxId {
        match self {
            Transaction::Coinbase(tx) => tx.tx_id,
            Transaction::Regular(tx) => tx.tx_id,
        }
    }

    pub fn tx_data(&self) -> &'a TxData {
        match self {
            Transaction::Coinbase(tx) => &tx.tx_data,
            Transaction::Regular(tx) => &tx.tx_data,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Transaction::Coinbase(tx) => tx.validate(),
            Transaction::Regular(tx) => tx.validate(),
        }
    }
}

/// Block payload: one coinbase followed by the ordered regular transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransactions {
    pub coinbase: CoinbaseTransaction,
    pub regulars: Vec<RegularTransaction>,
}

fn total_fees(txns: &[RegularTransaction]) -> u64 {
    txns.iter().map(|tx| tx.transaction_fee).sum()
}

impl BlockTransactions {
    /// Payload rewarding `miner` the base subsidy plus the fees collected
    /// from `regulars`.
    pub fn new(regulars: Vec<RegularTransaction>, miner: Address) -> Self {
        let reward = BASE_REWARD + total_fees(&regulars);
        Self {
            coinbase: CoinbaseTransaction::new(miner, reward),
            regulars,
        }
    }

    /// All transactions in apply order, coinbase first.
    pub fn transactions(&self) -> impl Iterator<Item = Transaction<'_>> {
        std::iter::once(Transaction::Coinbase(&self.coinbase))
            .chain(self.regulars.iter().map(Transaction::Regular))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for tx in self.transactions() {
            tx.validate()?;
        }
        if self.coinbase.amount() != BASE_REWARD + total_fees(&self.regulars) {
            return Err(ValidationError::RewardMismatch);
        }
        Ok(())
    }
}

impl ContentHash for BlockTransactions {
    /// SHA-256 over the concatenated tx ids, coinbase first.
    fn content_hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(32 * (1 + self.regulars.len()));
        buf.extend_from_slice(self.coinbase.tx_id.as_bytes());
        for tx in &self.regulars {
            buf.extend_from_slice(tx.tx_id.as_bytes());
        }
        sha256(&buf)
    }
}

/// The concrete block and chain carried by the currency layer.
pub type LedgerBlock = Block<BlockTransactions>;
pub type LedgerChain = Chain<BlockTransactions>;
