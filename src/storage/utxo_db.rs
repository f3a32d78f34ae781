// In-memory UTXO set with per-address and per-input indices

use crate::core::{Address, BlockTransactions, LedgerChain, RegularTransaction, TxData, TxIn, TxOut};
use crate::error::UtxoError;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Outputs spent by an applied transaction; feeding them back to `undo`
/// restores the set, since spent outputs are not reconstructible from the
/// post-state alone.
pub type SpentOutputs = Vec<(TxIn, TxOut)>;

/// One address's balance in a summary report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub address: Address,
    pub amount: u64,
}

/// The unspent-output set. `by_txin` maps every live output reference to its
/// output; `by_address` groups the same references by owning address. The
/// two indices always agree, and no address maps to an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoDb {
    by_address: HashMap<Address, BTreeSet<TxIn>>,
    by_txin: HashMap<TxIn, TxOut>,
}

impl UtxoDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay a whole chain from genesis. The canonical way to restore the
    /// set after a reorg.
    pub fn from_chain(chain: &LedgerChain) -> Self {
        let mut db = Self::new();
        for block in chain.blocks() {
            db.apply_block(&block.data);
        }
        db
    }

    /// Consume the inputs and create the outputs of an already-validated
    /// transaction. Returns the spent outputs for `undo`.
    ///
    /// Panics if an input does not reference a live output; callers must
    /// have validated the transaction against this exact state.
    pub fn apply(&mut self, td: &TxData) -> SpentOutputs {
        let mut spent = Vec::with_capacity(td.tx_ins.len());
        for tx_in in &td.tx_ins {
            let tx_out = match self.by_txin.remove(tx_in) {
                Some(out) => out,
                None => panic!("utxo index corrupt: applied input {tx_in} is unknown"),
            };
            self.forget_input(tx_out.address, tx_in);
            spent.push((*tx_in, tx_out));
        }

        let tx_id = td.tx_id();
        for (k, tx_out) in td.tx_outs.iter().enumerate() {
            let tx_in = TxIn { tx_id, out_idx: k as u64 };
            self.by_address.entry(tx_out.address).or_default().insert(tx_in);
            self.by_txin.insert(tx_in, *tx_out);
        }
        spent
    }

    /// Exact inverse of `apply`: drop the outputs the transaction created
    /// and restore the outputs it spent. `apply` followed by `undo` with no
    /// intervening mutation is an identity.
    pub fn undo(&mut self, td: &TxData, spent: SpentOutputs) {
        let tx_id = td.tx_id();
        for k in 0..td.tx_outs.len() {
            let tx_in = TxIn { tx_id, out_idx: k as u64 };
            let tx_out = match self.by_txin.remove(&tx_in) {
                Some(out) => out,
                None => panic!("utxo index corrupt: undone output {tx_in} is unknown"),
            };
            self.forget_input(tx_out.address, &tx_in);
        }
        for (tx_in, tx_out) in spent {
            self.by_address.entry(tx_out.address).or_default().insert(tx_in);
            self.by_txin.insert(tx_in, tx_out);
        }
    }

    fn forget_input(&mut self, address: Address, tx_in: &TxIn) {
        if let Some(set) = self.by_address.get_mut(&address) {
            set.remove(tx_in);
            if set.is_empty() {
                self.by_address.remove(&address);
            }
        }
    }

    /// Apply a block payload: the coinbase, then every regular transaction
    /// in order.
    pub fn apply_block(&mut self, bt: &BlockTransactions) {
        for tx in bt.transactions() {
            self.apply(tx.tx_data());
        }
    }

    /// Check a spend against the current set. Assumes `tx.validate()` has
    /// already passed (id and signature). Check order is fixed: duplicate
    /// input, unknown input, foreign input, then the amount accounting.
    pub fn validate_regular(&self, tx: &RegularTransaction) -> Result<(), UtxoError> {
        let address = tx.witness.address();
        let mut claimed = HashSet::new();
        let mut in_sum = 0u64;
        for tx_in in &tx.tx_data.tx_ins {
            if !claimed.insert(*tx_in) {
                return Err(UtxoError::DoubleSpend(*tx_in));
            }
            let tx_out = self
                .by_txin
                .get(tx_in)
                .ok_or(UtxoError::UnknownInput(*tx_in))?;
            if tx_out.address != address {
                return Err(UtxoError::AddressMismatch(*tx_in));
            }
            in_sum += tx_out.amount;
        }

        let out_sum: u64 = tx.tx_data.tx_outs.iter().map(|out| out.amount).sum();
        if in_sum < out_sum {
            return Err(UtxoError::InsufficientFunds { have: in_sum, need: out_sum });
        }
        let fee = in_sum - out_sum;
        if fee != tx.transaction_fee {
            return Err(UtxoError::FeeMismatch {
                computed: fee,
                declared: tx.transaction_fee,
            });
        }
        Ok(())
    }

    /// Select the mempool transactions that are valid in sequence against a
    /// tentative copy of the current state. Earlier selections can fund
    /// later ones; conflicting spends are skipped. The set is left exactly
    /// as it was found.
    pub fn filter_mempool(&mut self, mempool: &[RegularTransaction]) -> Vec<RegularTransaction> {
        let mut selected = Vec::new();
        let mut undo_stack = Vec::new();
        for tx in mempool {
            if let Err(err) = self.validate_regular(tx) {
                log::debug!("mempool tx {} skipped: {err}", tx.tx_id);
                continue;
            }
            let spent = self.apply(&tx.tx_data);
            undo_stack.push((tx.tx_data.clone(), spent));
            selected.push(tx.clone());
        }
        while let Some((td, spent)) = undo_stack.pop() {
            self.undo(&td, spent);
        }
        selected
    }

    /// Unspent references owned by `address`, in set order, with their
    /// outputs.
    pub fn unspent_inputs(&self, address: Address) -> impl Iterator<Item = (TxIn, &TxOut)> {
        self.by_address
            .get(&address)
            .into_iter()
            .flat_map(|set| set.iter())
            .map(move |tx_in| {
                let tx_out = self
                    .by_txin
                    .get(tx_in)
                    .unwrap_or_else(|| panic!("utxo index corrupt: {tx_in} has no output"));
                (*tx_in, tx_out)
            })
    }

    pub fn available_funds(&self, address: Address) -> u64 {
        self.unspent_inputs(address).map(|(_, out)| out.amount).sum()
    }

    /// Balance of every funded address, ascending by amount; ties break on
    /// address bytes so the order is reproducible.
    pub fn summary(&self) -> Vec<Tally> {
        let mut tallies: Vec<Tally> = self
            .by_address
            .keys()
            .map(|&address| Tally { address, amount: self.available_funds(address) })
            .collect();
        tallies.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| a.address.cmp(&b.address)));
        tallies
    }
}
