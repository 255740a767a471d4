use crate::{
    constants::MIN_DIFFICULTY,
    error::{MiningError, ValidationError},
    mine::{self, CancelToken, MiningStrategy},
    pow, Block, Hash, Transaction,
};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    /// Leading zero hex digits required of every mined block. Values below
    /// [`MIN_DIFFICULTY`] are raised to it when the chain is built.
    pub difficulty: u32,
    pub strategy: MiningStrategy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: MIN_DIFFICULTY,
            strategy: MiningStrategy::Sequential,
        }
    }
}

impl ChainConfig {
    pub fn new(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: MiningStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// In-memory, append-only block sequence plus the queue of transactions
/// waiting for the next block.
///
/// `blocks` is never empty: index 0 always holds the genesis block.
#[derive(Clone, Debug)]
pub struct Chain {
    config: ChainConfig,
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::with_config(ChainConfig::default())
    }
}

impl Chain {
    /// New chain mining sequentially at `difficulty`, floored to [`MIN_DIFFICULTY`].
    pub fn new(difficulty: u32) -> Self {
        Self::with_config(ChainConfig::new(difficulty))
    }

    pub fn with_config(config: ChainConfig) -> Self {
        let config = ChainConfig {
            difficulty: pow::effective_difficulty(config.difficulty),
            ..config
        };
        let genesis = Block::genesis();
        debug!(hash = %genesis.hash, difficulty = config.difficulty, "chain created");
        Self {
            config,
            blocks: vec![genesis],
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain starts with its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn latest_block(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Direct mutable access to an appended block. Nothing is re-hashed, so
    /// any change shows up as a failure in [`Chain::validate`].
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn submit(&mut self, tx: Transaction) {
        debug!(from = tx.from(), to = tx.to(), amount = tx.amount(), "transaction queued");
        self.pending.push(tx);
    }

    /// Mine the pending transactions into a new block, append it and empty
    /// the queue.
    pub fn create_and_mine_next_block(&mut self) -> Result<&Block, MiningError> {
        self.create_and_mine_next_block_with(&CancelToken::new())
    }

    /// Like [`Chain::create_and_mine_next_block`], but gives up when `cancel`
    /// fires. A cancelled candidate is dropped: the chain and the pending
    /// queue are left as they were.
    pub fn create_and_mine_next_block_with(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<&Block, MiningError> {
        let candidate = self.candidate_block();
        self.append(candidate, cancel)?;
        self.pending.clear();
        Ok(self.latest_block())
    }

    /// Unlinked, unmined block over a snapshot of the pending queue.
    fn candidate_block(&self) -> Block {
        let block = Block::new(self.blocks.len() as u64, self.pending.clone(), Hash::ZERO);
        debug!(
            index = block.index,
            txs = block.transactions.len(),
            "candidate block created"
        );
        block
    }

    fn append(&mut self, mut block: Block, cancel: &CancelToken) -> Result<(), MiningError> {
        block.previous_hash = self.latest_block().hash;
        mine::mine_block(&mut block, self.config.difficulty, self.config.strategy, cancel)?;
        self.blocks.push(block);
        Ok(())
    }

    /// Walk blocks 1.. and stop at the first one whose stored hash no longer
    /// matches its contents or whose previous hash does not match its
    /// predecessor. The genesis block only serves as the anchor for block 1.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for pair in self.blocks.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            let computed = current.calculate_hash();
            if current.hash != computed {
                return Err(ValidationError::HashMismatch {
                    index: current.index,
                    stored: current.hash,
                    computed,
                });
            }

            if current.previous_hash != previous.hash {
                return Err(ValidationError::BrokenLink {
                    index: current.index,
                    expected: previous.hash,
                    found: current.previous_hash,
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "chain validation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_bob_chain() -> Chain {
        let mut chain = Chain::new(3);
        chain.submit(Transaction::new("Alice", "Bob", 50));
        chain.submit(Transaction::new("Bob", "Charlie", 30));
        chain.create_and_mine_next_block().unwrap();
        chain
    }

    #[test]
    fn new_chain_holds_only_genesis() {
        let chain = Chain::new(5);
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.difficulty(), 5);
        assert!(chain.latest_block().is_genesis());
        assert!(chain.pending_transactions().is_empty());
        assert!(chain.is_valid());
    }

    #[test]
    fn difficulty_is_floored() {
        for d in 0..MIN_DIFFICULTY {
            assert_eq!(Chain::new(d).difficulty(), MIN_DIFFICULTY);
        }
        assert_eq!(Chain::default().difficulty(), MIN_DIFFICULTY);
        assert_eq!(Chain::new(4).difficulty(), 4);
    }

    #[test]
    fn genesis_is_not_mined() {
        let chain = Chain::new(3);
        let genesis = &chain.blocks()[0];
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.previous_hash, Hash::ZERO);
        assert!(genesis.has_valid_hash());
    }

    #[test]
    fn alice_bob_scenario() {
        let mut chain = alice_bob_chain();

        let block = &chain.blocks()[1];
        assert_eq!(block.index, 1);
        assert!(block.hash.to_hex().starts_with("000"));
        assert_eq!(block.previous_hash, chain.blocks()[0].hash);
        assert_eq!(block.transactions.len(), 2);
        assert!(chain.pending_transactions().is_empty());
        assert!(chain.is_valid());

        chain.block_mut(1).unwrap().transactions[0] = Transaction::new("Alice", "Bob", 9999);
        assert!(!chain.is_valid());

        chain.block_mut(1).unwrap().transactions[0] = Transaction::new("Alice", "Bob", 50);
        assert!(chain.is_valid());
    }

    #[test]
    fn tampered_amount_reports_hash_mismatch() {
        let mut chain = alice_bob_chain();
        chain.submit(Transaction::new("Charlie", "Dana", 75));
        chain.create_and_mine_next_block().unwrap();

        chain.block_mut(2).unwrap().transactions[0] = Transaction::new("Charlie", "Dana", 9999);
        let err = chain.validate().unwrap_err();
        assert!(matches!(err, ValidationError::HashMismatch { index: 2, .. }));
        assert_eq!(err.index(), 2);
    }

    #[test]
    fn corrupted_link_reports_broken_link() {
        let mut chain = alice_bob_chain();
        let block = chain.block_mut(1).unwrap();
        block.previous_hash = Hash([0xee; 32]);
        // keep the block self-consistent so only the link is wrong
        block.hash = block.calculate_hash();

        assert_eq!(
            chain.validate(),
            Err(ValidationError::BrokenLink {
                index: 1,
                expected: chain.blocks()[0].hash,
                found: Hash([0xee; 32]),
            })
        );
        assert!(!chain.is_valid());
    }

    #[test]
    fn corrupted_previous_hash_alone_is_detected() {
        let mut chain = alice_bob_chain();
        chain.block_mut(1).unwrap().previous_hash = Hash([0xee; 32]);
        assert!(!chain.is_valid());
    }

    #[test]
    fn first_failure_wins() {
        let mut chain = alice_bob_chain();
        chain.create_and_mine_next_block().unwrap();
        chain.create_and_mine_next_block().unwrap();

        chain.block_mut(3).unwrap().nonce += 1;
        chain.block_mut(2).unwrap().timestamp += 1;
        assert_eq!(chain.validate().unwrap_err().index(), 2);
    }

    #[test]
    fn tampered_genesis_breaks_link_of_block_one() {
        let mut chain = alice_bob_chain();
        let genesis = chain.block_mut(0).unwrap();
        genesis.transactions[0] = Transaction::new("Genesis", "Mallory", 1);
        genesis.hash = genesis.calculate_hash();
        assert!(matches!(
            chain.validate(),
            Err(ValidationError::BrokenLink { index: 1, .. })
        ));
    }

    #[test]
    fn candidate_snapshots_pending_queue() {
        let mut chain = Chain::new(3);
        chain.submit(Transaction::new("Alice", "Bob", 1));
        let candidate = chain.candidate_block();
        chain.submit(Transaction::new("Eve", "Mallory", 2));

        assert_eq!(candidate.index, 1);
        assert_eq!(candidate.previous_hash, Hash::ZERO);
        assert_eq!(candidate.transactions, vec![Transaction::new("Alice", "Bob", 1)]);
        assert_eq!(chain.pending_transactions().len(), 2);
    }

    #[test]
    fn empty_queue_still_mines_a_block() {
        let mut chain = Chain::new(3);
        let block = chain.create_and_mine_next_block().unwrap();
        assert!(block.transactions.is_empty());
        assert_eq!(chain.len(), 2);
        assert!(chain.is_valid());
    }

    #[test]
    fn cancelled_mining_keeps_chain_and_queue() {
        let mut chain = Chain::new(3);
        chain.submit(Transaction::new("Alice", "Bob", 50));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = chain.create_and_mine_next_block_with(&cancel).unwrap_err();
        assert!(matches!(err, MiningError::Cancelled));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.pending_transactions().len(), 1);

        chain.create_and_mine_next_block().unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain.pending_transactions().is_empty());
    }

    #[test]
    fn parallel_chain_is_valid() {
        let config = ChainConfig::new(3).with_strategy(MiningStrategy::Parallel { workers: 2 });
        let mut chain = Chain::with_config(config);
        for i in 0..3 {
            chain.submit(Transaction::new("Alice", "Bob", i));
            chain.create_and_mine_next_block().unwrap();
        }
        assert_eq!(chain.len(), 4);
        assert!(chain.blocks()[1..].iter().all(|b| b.meets_difficulty(3)));
        assert!(chain.is_valid());
    }
}
