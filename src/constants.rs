//! Protocol constants shared by every peer

use std::time::Duration;

/// Number of blocks between difficulty retargets
pub const ADJUST_INTERVAL: u64 = 4;

/// Expected milliseconds per mined block
pub const MS_PER_BLOCK_EXPECTED: i64 = 200;

/// Expected milliseconds to produce `ADJUST_INTERVAL` blocks
pub const TIME_EXPECTED: i64 = MS_PER_BLOCK_EXPECTED * ADJUST_INTERVAL as i64;

/// Allowed clock skew between peers, in milliseconds
pub const TIME_TOLERANCE_MS: i64 = 60;

/// Coinbase subsidy before collected fees
pub const BASE_REWARD: u64 = 50;

/// How long a channel send may block before the message is dropped
pub const BROADCAST_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay wake-up period when no message arrives
pub const RELAY_WAKEUP: Duration = Duration::from_secs(2);

/// Delay before a mined candidate is dispatched; keeps coinbase ids of
/// back-to-back blocks out of the same millisecond
pub const MINE_DISPATCH_DELAY: Duration = Duration::from_millis(50);
