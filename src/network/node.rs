// Event-driven node: relays blocks and transactions, mines, reorgs

use crate::constants::{BROADCAST_TIMEOUT, MINE_DISPATCH_DELAY, RELAY_WAKEUP};
use crate::core::{
    BlockTransactions, Chain, Hash, LedgerBlock, LedgerChain, RegularTransaction, TxId,
};
use crate::error::{ValidationError, WalletError};
use crate::storage::{Tally, UtxoDb};
use crate::wallet::Wallet;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::sleep;

/// The state every worker must see consistently: the canonical chain, the
/// UTXO set derived from it, and the admitted-but-unmined transactions.
#[derive(Default)]
struct ChainState {
    chain: LedgerChain,
    utxo: UtxoDb,
    mempool: Vec<RegularTransaction>,
}

/// One peer in the gossip network. The relay and miner workers share the
/// node through an `Arc`; all chain/UTXO/mempool access goes through the one
/// lock, and mining runs with the lock released.
pub struct Node {
    state: Mutex<ChainState>,
    wallet: Wallet,
    stop: AtomicBool,
    out_blocks: Vec<mpsc::Sender<LedgerBlock>>,
    out_txns: Vec<mpsc::Sender<RegularTransaction>>,
}

/// Fan a value out to every subscriber concurrently. A send that cannot
/// complete within the timeout is dropped, never retried.
pub async fn broadcast<T: Clone + Send + 'static>(outs: &[mpsc::Sender<T>], value: T) {
    let mut sends = JoinSet::new();
    for out in outs {
        let out = out.clone();
        let value = value.clone();
        sends.spawn(async move {
            if out.send_timeout(value, BROADCAST_TIMEOUT).await.is_err() {
                debug!("broadcast dropped: subscriber slow or gone");
            }
        });
    }
    while sends.join_next().await.is_some() {}
}

impl Node {
    pub fn new(
        wallet: Wallet,
        out_blocks: Vec<mpsc::Sender<LedgerBlock>>,
        out_txns: Vec<mpsc::Sender<RegularTransaction>>,
    ) -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            wallet,
            stop: AtomicBool::new(false),
            out_blocks,
            out_txns,
        }
    }

    pub fn address(&self) -> Hash {
        self.wallet.address()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Consume the three inbound channels until the stop flag is set.
    /// Valid, novel items are relayed to the outbound subscribers; invalid
    /// external items are dropped without relay.
    ///
    /// The seen-block map and seen-tx-id set live here: each is touched by
    /// exactly one handler, so neither needs the lock.
    pub async fn relay_loop(
        self: Arc<Self>,
        mut r_block: mpsc::Receiver<LedgerBlock>,
        mut r_txn: mpsc::Receiver<RegularTransaction>,
        mut r_mined: mpsc::Receiver<LedgerBlock>,
    ) {
        let mut seen_blocks: HashMap<Hash, LedgerBlock> = HashMap::new();
        let mut seen_tx_ids: HashSet<TxId> = HashSet::new();

        while !self.is_stopped() {
            tokio::select! {
                Some(block) = r_block.recv() => {
                    match self.handle_block(&mut seen_blocks, block.clone()).await {
                        Ok(()) => broadcast(&self.out_blocks, block).await,
                        Err(ValidationError::Duplicate) => {}
                        Err(err) => warn!("received block rejected: {err}"),
                    }
                }
                Some(tx) = r_txn.recv() => {
                    match self.handle_transaction(&mut seen_tx_ids, tx.clone()).await {
                        Ok(()) => broadcast(&self.out_txns, tx).await,
                        Err(ValidationError::Duplicate) => {}
                        Err(err) => warn!("received transaction rejected: {err}"),
                    }
                }
                Some(block) = r_mined.recv() => {
                    match self.handle_mined(block.clone()).await {
                        Ok(()) => broadcast(&self.out_blocks, block).await,
                        Err(err) => debug!("mined candidate lost the race: {err}"),
                    }
                }
                _ = sleep(RELAY_WAKEUP) => {}
            }
        }
    }

    /// Mine candidate blocks until stopped. The candidate is assembled under
    /// the lock; the nonce scan itself runs on a blocking thread with the
    /// lock released. The short dispatch delay keeps consecutive coinbases
    /// out of the same millisecond.
    pub async fn mine_loop(self: Arc<Self>, mined: mpsc::Sender<LedgerBlock>) {
        while !self.is_stopped() {
            let unmined = self.prepare_candidate().await;
            let block = match tokio::task::spawn_blocking(move || {
                let mut block = unmined;
                block.mine();
                block
            })
            .await
            {
                Ok(block) => block,
                Err(err) => {
                    warn!("mining task failed: {err}");
                    continue;
                }
            };

            sleep(MINE_DISPATCH_DELAY).await;
            if mined.send_timeout(block, BROADCAST_TIMEOUT).await.is_err() {
                debug!("mined candidate dropped: relay backlogged");
            }
        }
    }

    /// Validate a received block, remember it, and reorg onto it when it
    /// tops the current cumulative difficulty. Every remembered block is a
    /// potential ancestor for a later rebuild.
    async fn handle_block(
        &self,
        seen: &mut HashMap<Hash, LedgerBlock>,
        block: LedgerBlock,
    ) -> Result<(), ValidationError> {
        block.validate()?;
        block.data.validate()?;

        if seen.contains_key(&block.block_hash) {
            return Err(ValidationError::Duplicate);
        }
        seen.insert(block.block_hash, block.clone());

        let mut state = self.state.lock().await;
        if block.header.diff <= state.chain.cumulative_difficulty() {
            return Ok(());
        }

        let chain = match Chain::rebuild(seen, block) {
            Ok(chain) => chain,
            // the tip itself validated, so a gap here means the pool lost an
            // ancestor: unrecoverable in this simulation
            Err(err) => panic!("rebuild failed after accepting a valid block: {err}"),
        };
        info!(
            "reorg: len {} cd {}",
            chain.len(),
            chain.cumulative_difficulty()
        );
        state.utxo = UtxoDb::from_chain(&chain);
        state.chain = chain;
        Ok(())
    }

    /// Admit a received transaction to the mempool. Admission only checks id
    /// and signature; UTXO validity is re-checked when a block is built,
    /// since a reorg can flip it either way in the meantime.
    async fn handle_transaction(
        &self,
        seen: &mut HashSet<TxId>,
        tx: RegularTransaction,
    ) -> Result<(), ValidationError> {
        tx.validate()?;
        if !seen.insert(tx.tx_id) {
            return Err(ValidationError::Duplicate);
        }
        self.state.lock().await.mempool.push(tx);
        Ok(())
    }

    /// Attach a locally mined block. Unlike a received block this strictly
    /// extends the current chain, so the UTXO set updates incrementally
    /// instead of being rebuilt. A candidate mined against a chain that has
    /// since moved on fails the append and is discarded.
    async fn handle_mined(&self, block: LedgerBlock) -> Result<(), ValidationError> {
        let payload = block.data.clone();
        let mut state = self.state.lock().await;
        state.chain.append(block)?;
        state.utxo.apply_block(&payload);
        Ok(())
    }

    /// Snapshot the ledger and build the next candidate: filter the mempool
    /// against a copy of the UTXO set, collect the fees into a coinbase, and
    /// stack the payload on the current tip.
    async fn prepare_candidate(&self) -> LedgerBlock {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let mut tentative = state.utxo.clone();
        let selected = tentative.filter_mempool(&state.mempool);
        let bt = BlockTransactions::new(selected, self.wallet.address());
        state.chain.next_unmined(bt)
    }

    /// Build a signed transfer from this node's wallet against its current
    /// UTXO set.
    pub async fn create_transfer(
        &self,
        recv: Hash,
        amount: u64,
        fee: u64,
    ) -> Result<RegularTransaction, WalletError> {
        let state = self.state.lock().await;
        self.wallet.make_regular(&state.utxo, recv, amount, fee)
    }

    pub async fn available_funds(&self) -> u64 {
        let state = self.state.lock().await;
        state.utxo.available_funds(self.wallet.address())
    }

    pub async fn chain_snapshot(&self) -> LedgerChain {
        self.state.lock().await.chain.clone()
    }

    /// Balance report over the first `tally_len` blocks, recomputed from
    /// scratch so reports from different nodes are comparable even while
    /// their tips still differ.
    pub async fn summary(&self, tally_len: usize) -> Vec<Tally> {
        let state = self.state.lock().await;
        UtxoDb::from_chain(&state.chain.prefix(tally_len)).summary()
    }
}
