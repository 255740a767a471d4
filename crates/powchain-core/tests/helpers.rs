use powchain_core::{Chain, ChainConfig, MiningStrategy, Transaction};
use rand::{rngs::StdRng, Rng, SeedableRng};

const NAMES: [&str; 8] = [
    "Alice", "Bob", "Charlie", "Dana", "Eve", "Frank", "Gina", "Hank",
];

pub fn random_transactions(rng: &mut StdRng, count: usize) -> Vec<Transaction> {
    (0..count)
        .map(|_| {
            let from = NAMES[rng.gen_range(0..NAMES.len())];
            let to = NAMES[rng.gen_range(0..NAMES.len())];
            Transaction::new(from, to, rng.gen_range(-100..1_000))
        })
        .collect()
}

/// Chain of `blocks` mined blocks (plus genesis), each holding 0..4 random transactions.
pub fn build_chain(seed: u64, blocks: usize, strategy: MiningStrategy) -> Chain {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chain = Chain::with_config(ChainConfig::new(3).with_strategy(strategy));
    for _ in 0..blocks {
        let count = rng.gen_range(0..4);
        for tx in random_transactions(&mut rng, count) {
            chain.submit(tx);
        }
        chain
            .create_and_mine_next_block()
            .expect("mining should not fail");
    }
    chain
}
