// Gossip networking: per-node relay, mining and broadcast

mod node;

pub use node::{broadcast, Node};
