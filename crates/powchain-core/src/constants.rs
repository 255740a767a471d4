pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Lowest number of leading zero hex characters a mined block must carry.
pub const MIN_DIFFICULTY: u32 = 3;

/// Sequential mining polls its cancel token once per this many attempts.
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;

pub const GENESIS_FROM: &str = "Genesis";
pub const GENESIS_TO: &str = "Nobody";
