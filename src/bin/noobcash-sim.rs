#![forbid(unsafe_code)]
//! Local simulation: a bootstrap node funds participants, random transfers
//! fill the pending pool, and the background miner seals full blocks.

use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use noobcash::blockchain::{Block, Blockchain};
use noobcash::config::load_config;
use noobcash::crypto::KeyPair;
use noobcash::miner::{Miner, MinerMessage};
use noobcash::transaction::Transaction;
use rand::Rng;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const COINS_PER_PARTICIPANT: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "noobcash-sim", about = "Run transfers and mining against an in-memory ledger")]
struct Args {
    /// Path to a TOML config file; defaults are used when it does not exist
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of participants, including the bootstrap node
    #[arg(short, long, default_value_t = 3)]
    participants: usize,

    /// Number of random transfers to submit
    #[arg(short, long, default_value_t = 20)]
    transactions: usize,

    /// Override miner.difficulty
    #[arg(long)]
    difficulty: Option<u32>,

    /// Override chain.capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Seconds to wait for outstanding mining before giving up
    #[arg(long, default_value_t = 60)]
    mining_timeout: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(difficulty) = args.difficulty {
        config.miner.difficulty = difficulty;
    }
    if let Some(capacity) = args.capacity {
        config.chain.capacity = capacity;
    }
    config.validate()?;

    let participants: Vec<KeyPair> = (0..args.participants.max(2))
        .map(|_| KeyPair::generate())
        .collect();
    let bootstrap = &participants[0];
    let supply = COINS_PER_PARTICIPANT * participants.len() as u64;

    let mut chain = Blockchain::new(
        Transaction::genesis(bootstrap.public_key, supply),
        config.miner.difficulty,
        config.chain.capacity,
    )?;
    info!(supply, participants = participants.len(), "genesis created");

    let (outbound_tx, outbound_rx) = unbounded();
    let mut miner = if config.miner.enabled {
        Some(Miner::spawn(&config.miner, outbound_tx)?)
    } else {
        None
    };

    // Bootstrap funds everyone first, then random peer-to-peer transfers.
    let mut transfers: Vec<(usize, usize, u64)> = (1..participants.len())
        .map(|i| (0, i, COINS_PER_PARTICIPANT))
        .collect();
    let mut rng = rand::thread_rng();
    for _ in 0..args.transactions {
        let from = rng.gen_range(0..participants.len());
        let to = (from + rng.gen_range(1..participants.len())) % participants.len();
        transfers.push((from, to, rng.gen_range(1..=COINS_PER_PARTICIPANT / 2)));
    }

    for (from, to, amount) in transfers {
        let sender = &participants[from];
        let receiver = participants[to].public_key;
        let tx = match chain
            .ledger
            .with_utxos(|utxos| Transaction::transfer(sender, receiver, amount, utxos))
        {
            Ok(tx) => tx,
            Err(e) => {
                warn!(from, to, amount, "skipping transfer: {}", e);
                continue;
            }
        };
        if let Err(e) = chain.submit_transaction(tx) {
            warn!(from, to, amount, "transaction rejected: {}", e);
            continue;
        }

        if let Some(miner) = miner.as_mut() {
            drain_mined(miner, &mut chain, &outbound_rx, Duration::ZERO);
            miner.maybe_mine(&mut chain)?;
        }
    }

    if let Some(mut miner) = miner {
        let deadline = Instant::now() + Duration::from_secs(args.mining_timeout);
        while miner.is_mining() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    attempt = miner.current_attempt(),
                    "mining timed out, cancelling outstanding attempt"
                );
                miner.stop_mining();
                break;
            }
            drain_mined(&mut miner, &mut chain, &outbound_rx, remaining.min(Duration::from_secs(1)));
            miner.maybe_mine(&mut chain)?;
        }
        miner.shutdown()?;
    }

    println!("Chain height: {}", chain.height());
    println!("Pending transactions: {}", chain.pending_len());
    for (i, participant) in participants.iter().enumerate() {
        println!(
            "  participant {} ({}...): {}",
            i,
            &participant.public_key_hex()[..16],
            format_amount(chain.ledger.balance_of(&participant.public_key))
        );
    }
    println!(
        "Total supply: {}",
        format_amount(chain.ledger.with_utxos(|utxos| utxos.total_value()))
    );
    Ok(())
}

fn format_amount(amount: Option<u64>) -> String {
    amount.map_or_else(|| "overflow".to_string(), |v| v.to_string())
}

/// Applies mined blocks waiting on `outbound`, blocking up to `timeout` for
/// the first one.
fn drain_mined(
    miner: &mut Miner<Block>,
    chain: &mut Blockchain,
    outbound: &Receiver<MinerMessage<Block>>,
    timeout: Duration,
) {
    let mut next = match outbound.recv_timeout(timeout) {
        Ok(msg) => Some(msg),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            error!("miner outbound channel disconnected");
            miner.stop_mining();
            None
        }
    };

    while let Some(msg) = next {
        match msg {
            MinerMessage::BlockMined { attempt, block } => {
                if !miner.block_mined_ack(attempt) {
                    warn!(attempt, "discarding block from a cancelled attempt");
                } else if let Err(e) = chain.add_mined_block(block) {
                    error!("mined block rejected: {}", e);
                }
            }
            other => error!(kind = other.kind(), "unexpected message from miner"),
        }
        next = outbound.try_recv().ok();
    }
}
