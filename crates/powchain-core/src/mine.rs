use crate::{
    constants::CANCEL_CHECK_INTERVAL, error::MiningError, hash_with_nonce, pow, Block, Hash,
};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Shared flag that asks an in-flight mining search to give up.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MiningStrategy {
    /// Single-threaded nonce search on the calling thread.
    #[default]
    Sequential,
    /// Nonce search split across a rayon pool. `workers == 0` lets rayon pick
    /// one thread per core.
    Parallel { workers: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiningReport {
    pub nonce: u64,
    pub hash: Hash,
    pub attempts: u64,
}

/// Search for a nonce that gives `block` a hash with at least
/// `max(difficulty, MIN_DIFFICULTY)` leading zero hex digits.
///
/// The block is only written to once a satisfying nonce has been found; on
/// error it is left exactly as it was passed in.
pub fn mine_block(
    block: &mut Block,
    difficulty: u32,
    strategy: MiningStrategy,
    cancel: &CancelToken,
) -> Result<MiningReport, MiningError> {
    let target = pow::effective_difficulty(difficulty);
    debug!(index = block.index, target, ?strategy, "mining block");

    let outcome = match strategy {
        MiningStrategy::Sequential => search_sequential(block, target, cancel),
        MiningStrategy::Parallel { workers } => search_parallel(block, target, workers, cancel),
    };
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            warn!(index = block.index, %err, "candidate block discarded");
            return Err(err);
        }
    };

    block.nonce = report.nonce;
    block.hash = report.hash;
    info!(
        index = block.index,
        nonce = report.nonce,
        attempts = report.attempts,
        hash = %report.hash,
        "block mined"
    );
    Ok(report)
}

fn search_sequential(
    block: &Block,
    target: u32,
    cancel: &CancelToken,
) -> Result<MiningReport, MiningError> {
    if cancel.is_cancelled() {
        return Err(MiningError::Cancelled);
    }

    let prefix = block.hash_prefix();
    let mut nonce = block.nonce;
    let mut hash = hash_with_nonce(&prefix, nonce);
    let mut attempts = 0u64;
    while !pow::meets_difficulty(&hash, target) {
        nonce = nonce.wrapping_add(1);
        if nonce == block.nonce {
            return Err(MiningError::NonceSpaceExhausted(target));
        }
        attempts += 1;
        if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(MiningError::Cancelled);
        }
        hash = hash_with_nonce(&prefix, nonce);
    }
    Ok(MiningReport {
        nonce,
        hash,
        attempts,
    })
}

/// First-success-wins search over `block.nonce..u64::MAX`. The winning nonce
/// is whichever a worker hits first, not necessarily the smallest one.
fn search_parallel(
    block: &Block,
    target: u32,
    workers: usize,
    cancel: &CancelToken,
) -> Result<MiningReport, MiningError> {
    if cancel.is_cancelled() {
        return Err(MiningError::Cancelled);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("powchain-miner-{i}"))
        .build()?;

    let prefix = block.hash_prefix();
    let attempts = AtomicU64::new(0);
    // A cancelled worker reports its nonce as "found" to stop the others;
    // the winner is re-checked below.
    let found = pool.install(|| {
        (block.nonce..u64::MAX).into_par_iter().find_any(|nonce| {
            if cancel.is_cancelled() {
                return true;
            }
            attempts.fetch_add(1, Ordering::Relaxed);
            pow::meets_difficulty(&hash_with_nonce(&prefix, *nonce), target)
        })
    });

    let Some(nonce) = found else {
        return Err(MiningError::NonceSpaceExhausted(target));
    };
    let hash = hash_with_nonce(&prefix, nonce);
    if !pow::meets_difficulty(&hash, target) {
        return Err(MiningError::Cancelled);
    }
    Ok(MiningReport {
        nonce,
        hash,
        attempts: attempts.into_inner(),
    })
}
