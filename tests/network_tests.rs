// Multi-node behavior: a bipartite mesh of mining nodes converges on a
// common chain prefix, and transfers propagate and settle across it

use rcoin::constants::{BASE_REWARD, BROADCAST_TIMEOUT};
use rcoin::core::{Address, LedgerBlock, RegularTransaction};
use rcoin::{Node, UtxoDb, Wallet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;

const CHANNEL_CAPACITY: usize = 4096;

/// Blocks near the tip that may still differ between honest nodes right
/// after the network quiesces.
const SAFETY_LAG: usize = 12;

struct Mesh {
    nodes: Vec<Arc<Node>>,
    /// Inbound transaction senders, one per node, for injecting transfers.
    txn_senders: Vec<mpsc::Sender<RegularTransaction>>,
    workers: JoinSet<()>,
}

/// Wire `2 * side` nodes so each subscribes every node on the opposite side,
/// then start relay and miner workers for all of them.
fn spawn_mesh(side: usize) -> Mesh {
    let total = 2 * side;
    let mut block_channels = Vec::with_capacity(total);
    let mut txn_channels = Vec::with_capacity(total);
    for _ in 0..total {
        block_channels.push(mpsc::channel::<LedgerBlock>(CHANNEL_CAPACITY));
        txn_channels.push(mpsc::channel::<RegularTransaction>(CHANNEL_CAPACITY));
    }
    let block_senders: Vec<_> = block_channels.iter().map(|(tx, _)| tx.clone()).collect();
    let txn_senders: Vec<_> = txn_channels.iter().map(|(tx, _)| tx.clone()).collect();

    let opposite = |i: usize| -> Vec<usize> {
        if i < side {
            (side..total).collect()
        } else {
            (0..side).collect()
        }
    };

    let nodes: Vec<Arc<Node>> = (0..total)
        .map(|i| {
            let out_blocks = opposite(i).iter().map(|&j| block_senders[j].clone()).collect();
            let out_txns = opposite(i).iter().map(|&j| txn_senders[j].clone()).collect();
            Arc::new(Node::new(Wallet::new(), out_blocks, out_txns))
        })
        .collect();

    let mut workers = JoinSet::new();
    for node in &nodes {
        let (_, r_block) = block_channels.remove(0);
        let (_, r_txn) = txn_channels.remove(0);
        let (r_mined_sender, r_mined) = mpsc::channel::<LedgerBlock>(1);
        workers.spawn(node.clone().relay_loop(r_block, r_txn, r_mined));
        workers.spawn(node.clone().mine_loop(r_mined_sender));
    }

    Mesh { nodes, txn_senders, workers }
}

async fn stop_and_join(mesh: &mut Mesh) {
    for node in &mesh.nodes {
        node.stop();
    }
    while mesh.workers.join_next().await.is_some() {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mesh_converges_on_common_prefix() {
    let mut mesh = spawn_mesh(2);
    let addresses: Vec<Address> = mesh.nodes.iter().map(|n| n.address()).collect();
    let total = addresses.len();

    // mine for a while with transfers sprinkled in
    for round in 0..8usize {
        sleep(Duration::from_millis(250)).await;
        for (i, node) in mesh.nodes.iter().enumerate() {
            if node.available_funds().await <= 5 {
                continue;
            }
            let recv = addresses[(i + round + 1) % total];
            let amount = 1 + (round as u64 % 5);
            if let Ok(tx) = node.create_transfer(recv, amount, 1).await {
                let _ = mesh.txn_senders[i].send_timeout(tx, BROADCAST_TIMEOUT).await;
            }
        }
    }

    // quiescence: no further sends, gossip keeps aligning the tips
    sleep(Duration::from_millis(1000)).await;
    stop_and_join(&mut mesh).await;

    let mut chains = Vec::new();
    for node in &mesh.nodes {
        chains.push(node.chain_snapshot().await);
    }
    let min_len = chains.iter().map(|c| c.len()).min().unwrap();
    assert!(min_len > SAFETY_LAG, "mesh mined too few blocks: {min_len}");
    let common = min_len - SAFETY_LAG;

    // every pair of nodes agrees below the safety lag
    let reference = chains[0].prefix(common);
    for chain in &chains {
        assert!(chain.validate().is_ok());
        assert_eq!(chain.prefix(common), reference);
    }

    // conservation: the common prefix mints exactly the subsidy per block
    let utxo = UtxoDb::from_chain(&reference);
    let total_supply: u64 = utxo.summary().iter().map(|t| t.amount).sum();
    assert_eq!(total_supply, common as u64 * BASE_REWARD);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transfer_settles_across_mesh() {
    let mut mesh = spawn_mesh(1);
    let node_a = mesh.nodes[0].clone();
    let node_b = mesh.nodes[1].clone();

    // wait until node A has something to spend
    let mut funded = false;
    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        if node_a.available_funds().await > 6 {
            funded = true;
            break;
        }
    }
    assert!(funded, "node A never mined a spendable reward");

    let tx = node_a
        .create_transfer(node_b.address(), 5, 1)
        .await
        .expect("node A has funds");
    let transfer_id = tx.tx_id;
    mesh.txn_senders[0]
        .send_timeout(tx, BROADCAST_TIMEOUT)
        .await
        .expect("inject transfer");

    // the transfer must eventually be mined into node B's canonical chain
    let mut settled = false;
    for _ in 0..80 {
        sleep(Duration::from_millis(100)).await;
        let chain = node_b.chain_snapshot().await;
        let mined = chain
            .blocks()
            .iter()
            .flat_map(|b| b.data.regulars.iter())
            .any(|r| r.tx_id == transfer_id);
        if mined {
            settled = true;
            break;
        }
    }
    stop_and_join(&mut mesh).await;

    assert!(settled, "transfer never settled on node B");
}
