// Network simulation driver: 2*N nodes in a bipartite mesh, each issuing
// random transfers while mining, reporting UTXO tallies at the end

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rcoin::constants::BROADCAST_TIMEOUT;
use rcoin::core::{Address, LedgerBlock, RegularTransaction};
use rcoin::network::Node;
use rcoin::wallet::Wallet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;

/// Buffered capacity of the inbound block and transaction channels. Large
/// enough that gossip bursts do not hit the send timeout.
const CHANNEL_CAPACITY: usize = 4096;

#[derive(Parser, Debug)]
#[command(name = "rcoin", about = "UTXO blockchain network simulation")]
struct Args {
    /// Nodes on each side of the bipartite mesh (2*N total)
    #[arg(long, default_value_t = 4)]
    nodes: usize,

    /// Transfers each node attempts before the network winds down
    #[arg(long, default_value_t = 40)]
    sim_len: usize,

    /// Largest amount moved per transfer
    #[arg(long, default_value_t = 5)]
    max_amount: u64,

    /// Flat fee paid per transfer
    #[arg(long, default_value_t = 1)]
    fee: u64,

    /// Number of leading blocks tallied in the final report
    #[arg(long, default_value_t = 24)]
    tally_len: usize,

    /// Base seed for the per-node simulation RNGs
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Issue random transfers to random peers until `sim_len` rounds are done,
/// then flag the node to stop. Rounds are paced 100-350 ms apart; a node
/// whose spendable balance is at or below `max_amount` sits the round out.
async fn sim_loop(
    node: Arc<Node>,
    addresses: Vec<Address>,
    r_txn: mpsc::Sender<RegularTransaction>,
    args: Arc<Args>,
    mut rng: StdRng,
) {
    for _ in 0..args.sim_len {
        let pause = 100 + rng.gen_range(0..250);
        sleep(Duration::from_millis(pause)).await;

        if node.available_funds().await <= args.max_amount {
            continue;
        }
        let recv = addresses[rng.gen_range(0..addresses.len())];
        let amount = 1 + rng.gen_range(0..args.max_amount);

        match node.create_transfer(recv, amount, args.fee).await {
            Ok(tx) => {
                if r_txn.send_timeout(tx, BROADCAST_TIMEOUT).await.is_err() {
                    log::debug!("simulated transfer dropped: relay backlogged");
                }
            }
            Err(err) => log::debug!("simulated transfer skipped: {err}"),
        }
    }
    node.stop();
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Arc::new(Args::parse());
    let total = 2 * args.nodes;

    let mut block_channels = Vec::with_capacity(total);
    let mut txn_channels = Vec::with_capacity(total);
    for _ in 0..total {
        block_channels.push(mpsc::channel::<LedgerBlock>(CHANNEL_CAPACITY));
        txn_channels.push(mpsc::channel::<RegularTransaction>(CHANNEL_CAPACITY));
    }
    let block_senders: Vec<_> = block_channels.iter().map(|(tx, _)| tx.clone()).collect();
    let txn_senders: Vec<_> = txn_channels.iter().map(|(tx, _)| tx.clone()).collect();

    // Bipartite mesh: each node subscribes every node on the opposite side.
    let opposite = |i: usize| -> Vec<usize> {
        if i < args.nodes {
            (args.nodes..total).collect()
        } else {
            (0..args.nodes).collect()
        }
    };

    let nodes: Vec<Arc<Node>> = (0..total)
        .map(|i| {
            let out_blocks = opposite(i).iter().map(|&j| block_senders[j].clone()).collect();
            let out_txns = opposite(i).iter().map(|&j| txn_senders[j].clone()).collect();
            Arc::new(Node::new(Wallet::new(), out_blocks, out_txns))
        })
        .collect();
    let addresses: Vec<Address> = nodes.iter().map(|n| n.address()).collect();

    let mut workers = JoinSet::new();
    for (i, node) in nodes.iter().enumerate() {
        let (_, r_block) = block_channels.remove(0);
        let (r_txn_sender, r_txn) = txn_channels.remove(0);
        let (r_mined_sender, r_mined) = mpsc::channel::<LedgerBlock>(1);

        workers.spawn(node.clone().relay_loop(r_block, r_txn, r_mined));
        workers.spawn(node.clone().mine_loop(r_mined_sender));
        workers.spawn(sim_loop(
            node.clone(),
            addresses.clone(),
            r_txn_sender,
            args.clone(),
            StdRng::seed_from_u64(args.seed.wrapping_add(i as u64)),
        ));
    }
    while workers.join_next().await.is_some() {}

    for (i, node) in nodes.iter().enumerate() {
        let chain = node.chain_snapshot().await;
        println!(
            "node {i}: len={} cd={}",
            chain.len(),
            chain.cumulative_difficulty()
        );
        let tallies = node.summary(args.tally_len).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&tallies).expect("tally serialization")
        );
    }
}
