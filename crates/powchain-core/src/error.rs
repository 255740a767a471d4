use crate::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("mining cancelled before a satisfying nonce was found")]
    Cancelled,

    #[error("nonce space exhausted without reaching {0} leading zero hex digits")]
    NonceSpaceExhausted(u32),

    #[error("failed to start mining workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// First defect found by [`crate::Chain::validate`], scanning from block 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block {index}: stored hash {stored} does not match contents ({computed})")]
    HashMismatch {
        index: u64,
        stored: Hash,
        computed: Hash,
    },

    #[error("block {index}: previous hash {found} does not match predecessor hash {expected}")]
    BrokenLink {
        index: u64,
        expected: Hash,
        found: Hash,
    },
}

impl ValidationError {
    pub fn index(&self) -> u64 {
        match self {
            Self::HashMismatch { index, .. } | Self::BrokenLink { index, .. } => *index,
        }
    }
}
