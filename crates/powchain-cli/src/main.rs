use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use powchain_core::{CancelToken, Chain, ChainConfig, MiningStrategy, Transaction};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain")]
#[command(about = "Build, tamper with and validate a proof-of-work hash chain")]
struct Cli {
    /// Leading zero hex digits each mined block needs (values below 3 count as 3)
    #[arg(
        long,
        global = true,
        env = "POWCHAIN_DIFFICULTY",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(0..=16)
    )]
    difficulty: u32,

    /// Mining threads; 0 searches nonces on a single thread
    #[arg(long, global = true, env = "POWCHAIN_WORKERS", default_value_t = 0)]
    workers: usize,

    /// Print blocks as single-line JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a few blocks, tamper with one, revert it and re-validate
    Demo,
    /// Mine the given transactions into new blocks and print the chain
    Mine {
        /// Transaction as FROM:TO:AMOUNT, repeatable
        #[arg(long = "tx", value_parser = parse_tx)]
        txs: Vec<Transaction>,
        /// Number of blocks to mine; the transactions go into the first one
        #[arg(long, default_value_t = 1)]
        blocks: usize,
    },
}

fn parse_tx(s: &str) -> Result<Transaction, String> {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(from), Some(to), Some(amount)) => {
            let amount = amount
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid amount {amount:?}: {e}"))?;
            Ok(Transaction::new(from, to, amount))
        }
        _ => Err(format!("expected FROM:TO:AMOUNT, got {s:?}")),
    }
}

#[derive(Clone, Copy)]
struct Printer {
    compact: bool,
}

impl Printer {
    fn print_chain(&self, chain: &Chain) -> Result<()> {
        for block in chain.blocks() {
            let json = if self.compact {
                serde_json::to_string(block)?
            } else {
                serde_json::to_string_pretty(block)?
            };
            println!("Block #{}:", block.index);
            println!("{json}");
        }
        Ok(())
    }
}

const DEMO_ROUNDS: [[(&str, &str, i64); 2]; 4] = [
    [("Alice", "Bob", 50), ("Bob", "Charlie", 30)],
    [("Charlie", "Dana", 75), ("Dana", "Eve", 10)],
    [("Eve", "Frank", 20), ("Gina", "Hank", 10)],
    [("Alice", "Charlie", 25), ("Bob", "David", 5)],
];

const TAMPERED_BLOCK: usize = 2;

fn mine_next(chain: &mut Chain, cancel: &CancelToken) -> Result<()> {
    let index = chain.len();
    println!("Mining block #{index}...");
    let block = chain
        .create_and_mine_next_block_with(cancel)
        .with_context(|| format!("block #{index} was not mined"))?;
    println!("Block mined (idx={}): {}", block.index, block.hash);
    Ok(())
}

/// Overwrite the amount of the first transaction in block `index` without
/// re-hashing, returning the amount it replaced.
fn set_first_amount(chain: &mut Chain, index: usize, amount: i64) -> Result<i64> {
    let block = chain
        .block_mut(index)
        .with_context(|| format!("no block #{index}"))?;
    let tx = block
        .transactions
        .first()
        .cloned()
        .with_context(|| format!("block #{index} has no transactions"))?;
    block.transactions[0] = Transaction::new(tx.from(), tx.to(), amount);
    Ok(tx.amount())
}

fn report_validity(chain: &Chain, label: &str) {
    match chain.validate() {
        Ok(()) => println!("{label} Yes"),
        Err(err) => println!("{label} No ({err})"),
    }
}

fn run_demo(config: ChainConfig, cancel: &CancelToken, out: Printer) -> Result<()> {
    let mut chain = Chain::with_config(config);

    for round in DEMO_ROUNDS {
        for (from, to, amount) in round {
            chain.submit(Transaction::new(from, to, amount));
        }
        mine_next(&mut chain, cancel)?;
    }

    println!("\nFull chain:");
    out.print_chain(&chain)?;
    report_validity(&chain, "\nIs the chain valid?");

    println!("\nTampering with block #{TAMPERED_BLOCK} data...");
    let original = set_first_amount(&mut chain, TAMPERED_BLOCK, 9999)?;
    report_validity(&chain, "Is the chain valid after tampering?");

    println!("\nReverting the tampered block...");
    set_first_amount(&mut chain, TAMPERED_BLOCK, original)?;
    report_validity(&chain, "Is the chain valid after the revert?");

    chain.submit(Transaction::new("Charlie", "Alice", 100));
    mine_next(&mut chain, cancel)?;

    println!("\nUpdated chain:");
    out.print_chain(&chain)?;
    report_validity(&chain, "\nFinal chain validation:");
    Ok(())
}

fn run_mine(
    config: ChainConfig,
    cancel: &CancelToken,
    out: Printer,
    txs: Vec<Transaction>,
    blocks: usize,
) -> Result<()> {
    let mut chain = Chain::with_config(config);
    for tx in txs {
        chain.submit(tx);
    }
    for _ in 0..blocks {
        mine_next(&mut chain, cancel)?;
    }
    out.print_chain(&chain)?;
    report_validity(&chain, "Is the chain valid?");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let strategy = match cli.workers {
        0 => MiningStrategy::Sequential,
        workers => MiningStrategy::Parallel { workers },
    };
    let config = ChainConfig::new(cli.difficulty).with_strategy(strategy);
    info!(difficulty = cli.difficulty, ?strategy, "starting");

    let cancel = CancelToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, abandoning the block being mined");
                cancel.cancel();
            }
        }
    });

    let out = Printer {
        compact: cli.compact,
    };
    tokio::task::spawn_blocking(move || match cli.cmd {
        Command::Demo => run_demo(config, &cancel, out),
        Command::Mine { txs, blocks } => run_mine(config, &cancel, out, txs, blocks),
    })
    .await
    .context("mining task panicked")?
}
