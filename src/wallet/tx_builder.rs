// Spend construction: input sourcing, change and fee

use crate::core::{now_ms, Address, RegularTransaction, TxData, TxIn, TxOut};
use crate::error::WalletError;
use crate::storage::UtxoDb;
use crate::wallet::Wallet;

impl Wallet {
    /// Build and sign a transfer of `amount` to `recv`, paying `fee` on top.
    /// Inputs are drawn from this wallet's unspent outputs in set order until
    /// they cover `amount + fee`; any over-pay comes back as a change output.
    pub fn make_regular(
        &self,
        utxo: &UtxoDb,
        recv: Address,
        amount: u64,
        fee: u64,
    ) -> Result<RegularTransaction, WalletError> {
        if amount == 0 {
            return Err(WalletError::AmountZero);
        }

        let mut tx_data = TxData {
            tx_ins: Vec::new(),
            tx_outs: vec![TxOut { address: recv, amount }],
            timestamp: now_ms(),
        };
        let change = self.source_inputs(utxo, &mut tx_data.tx_ins, amount + fee)?;
        if change > 0 {
            tx_data.tx_outs.push(TxOut { address: self.address(), amount: change });
        }

        let tx_id = tx_data.tx_id();
        Ok(RegularTransaction {
            tx_id,
            witness: self.witness(tx_id),
            tx_data,
            transaction_fee: fee,
        })
    }

    /// Accumulate own inputs into `tx_ins` until they cover `needed`;
    /// returns the over-pay.
    fn source_inputs(
        &self,
        utxo: &UtxoDb,
        tx_ins: &mut Vec<TxIn>,
        mut needed: u64,
    ) -> Result<u64, WalletError> {
        let address = self.address();
        for (tx_in, tx_out) in utxo.unspent_inputs(address) {
            tx_ins.push(tx_in);
            if needed > tx_out.amount {
                needed -= tx_out.amount;
            } else {
                return Ok(tx_out.amount - needed);
            }
        }
        Err(WalletError::InsufficientFunds { address })
    }
}
