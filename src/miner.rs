//! Proof-of-work mining coordinator.
//!
//! A single background worker receives blocks over an inbound channel, tries
//! random nonces until one satisfies the block's proof-of-work predicate, and
//! reports the solved block over an outbound channel. The owner keeps the
//! "mining in progress" flag to itself in [`Miner`]; the worker only sees
//! messages and the cancellation watermark, which it checks once per trial.

use crate::config::MinerConfig;
use crate::error::ChainError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Span};

/// A block that supports proof-of-work trials.
pub trait Minable: Send + 'static {
    /// Tests `nonce` at `difficulty`; on success the nonce is recorded on the block.
    fn try_mine(&mut self, nonce: u64, difficulty: u32) -> bool;

    /// Height of the block in its chain.
    fn index(&self) -> u64;
}

/// The chain/pool side the coordinator pulls blocks from.
pub trait BlockSource {
    type Block: Minable;

    /// Whether enough transactions are pending to justify mining now.
    fn is_full(&self) -> bool;

    /// Snapshots pending transactions into a new unmined block.
    fn create_block(&mut self) -> Self::Block;
}

#[derive(Debug, Clone)]
pub enum MinerMessage<B> {
    BlockToMine { attempt: u64, block: B },
    BlockMined { attempt: u64, block: B },
}

impl<B> MinerMessage<B> {
    pub fn kind(&self) -> &'static str {
        match self {
            MinerMessage::BlockToMine { .. } => "BlockToMine",
            MinerMessage::BlockMined { .. } => "BlockMined",
        }
    }
}

/// Highest attempt id the owner has cancelled. Attempt ids start at 1, so a
/// cancel issued before any attempt (or after the last one finished) never
/// aborts a later attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled_through: Arc<AtomicU64>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_through(&self, attempt: u64) {
        self.cancelled_through.fetch_max(attempt, Ordering::AcqRel);
    }

    pub fn is_cancelled(&self, attempt: u64) -> bool {
        self.cancelled_through.load(Ordering::Acquire) >= attempt
    }
}

/// The background half: blocks on the inbound channel, searches, reports.
pub struct MinerWorker<B> {
    inbound: Receiver<MinerMessage<B>>,
    outbound: Sender<MinerMessage<B>>,
    cancel: CancelSignal,
    difficulty: u32,
    span: Span,
}

impl<B: Minable> MinerWorker<B> {
    pub fn new(
        inbound: Receiver<MinerMessage<B>>,
        outbound: Sender<MinerMessage<B>>,
        cancel: CancelSignal,
        difficulty: u32,
        span: Span,
    ) -> Self {
        MinerWorker {
            inbound,
            outbound,
            cancel,
            difficulty,
            span,
        }
    }

    /// Serves mining requests until the inbound channel is closed.
    pub fn run(self) {
        let _entered = self.span.enter();
        let mut rng = rand::thread_rng();

        loop {
            debug!("waiting for block to mine");
            let (attempt, block) = match self.inbound.recv() {
                Ok(MinerMessage::BlockToMine { attempt, block }) => (attempt, block),
                Ok(other) => {
                    error!(kind = other.kind(), "expected BlockToMine, skipping message");
                    continue;
                }
                Err(_) => {
                    info!("inbound channel closed, miner stopping");
                    return;
                }
            };

            let Some(block) = self.search(attempt, block, &mut rng) else {
                continue;
            };

            if self
                .outbound
                .send(MinerMessage::BlockMined { attempt, block })
                .is_err()
            {
                warn!(attempt, "outbound channel closed, mined block dropped");
            }
        }
    }

    /// Tries random nonces until one succeeds or `attempt` is cancelled.
    pub fn search<R: Rng>(&self, attempt: u64, mut block: B, rng: &mut R) -> Option<B> {
        let index = block.index();
        debug!(attempt, index, "mining block");

        let mut trials: u64 = 0;
        loop {
            if self.cancel.is_cancelled(attempt) {
                info!(attempt, index, trials, "mining attempt cancelled");
                return None;
            }
            trials += 1;
            if block.try_mine(rng.gen(), self.difficulty) {
                info!(attempt, index, trials, "block mined");
                return Some(block);
            }
        }
    }
}

/// Owner-side handle to the mining worker.
pub struct Miner<B: Minable> {
    inbound: Option<Sender<MinerMessage<B>>>,
    cancel: CancelSignal,
    attempt: u64,
    mining: bool,
    handle: Option<JoinHandle<()>>,
}

impl<B: Minable> Miner<B> {
    /// Starts the worker. Solved blocks arrive on `outbound` as
    /// [`MinerMessage::BlockMined`]; it should be unbounded so the worker
    /// never stalls on delivery.
    pub fn spawn(config: &MinerConfig, outbound: Sender<MinerMessage<B>>) -> Result<Self, ChainError> {
        let span = info_span!("miner", difficulty = config.difficulty);
        Self::spawn_with_span(config.difficulty, outbound, span)
    }

    pub fn spawn_with_span(
        difficulty: u32,
        outbound: Sender<MinerMessage<B>>,
        span: Span,
    ) -> Result<Self, ChainError> {
        let (inbound_tx, inbound_rx) = unbounded();
        let cancel = CancelSignal::new();
        let worker = MinerWorker::new(inbound_rx, outbound, cancel.clone(), difficulty, span);

        let handle = thread::Builder::new()
            .name("noobcash-miner".to_string())
            .spawn(move || worker.run())
            .map_err(|e| ChainError::MinerError(format!("Failed to spawn miner thread: {}", e)))?;

        Ok(Miner {
            inbound: Some(inbound_tx),
            cancel,
            attempt: 0,
            mining: false,
            handle: Some(handle),
        })
    }

    pub fn is_mining(&self) -> bool {
        self.mining
    }

    /// Id of the most recently dispatched attempt, 0 if none yet.
    pub fn current_attempt(&self) -> u64 {
        self.attempt
    }

    /// Sends a fresh block to the worker unless an attempt is already in
    /// progress or `source` is not ready. Returns whether a block was sent.
    pub fn maybe_mine<S>(&mut self, source: &mut S) -> Result<bool, ChainError>
    where
        S: BlockSource<Block = B>,
    {
        if self.mining || !source.is_full() {
            return Ok(false);
        }
        let inbound = self
            .inbound
            .as_ref()
            .ok_or_else(|| ChainError::MinerError("Miner has been shut down".to_string()))?;

        let block = source.create_block();
        self.attempt += 1;
        self.mining = true;
        info!(attempt = self.attempt, index = block.index(), "sending block to miner");

        if inbound
            .send(MinerMessage::BlockToMine {
                attempt: self.attempt,
                block,
            })
            .is_err()
        {
            self.mining = false;
            return Err(ChainError::MinerError(
                "Miner worker is no longer running".to_string(),
            ));
        }
        Ok(true)
    }

    /// Abandons the current attempt, if any. Safe to call at any time.
    pub fn stop_mining(&mut self) {
        if self.mining {
            info!(attempt = self.attempt, "stopping mining attempt");
        }
        self.mining = false;
        self.cancel.cancel_through(self.attempt);
    }

    /// Clears the in-progress flag when `attempt` is the outstanding one.
    /// Returns `false` for results of cancelled or superseded attempts.
    pub fn block_mined_ack(&mut self, attempt: u64) -> bool {
        if self.mining && attempt == self.attempt {
            self.mining = false;
            true
        } else {
            debug!(attempt, current = self.attempt, "ignoring stale mined block");
            false
        }
    }

    /// Cancels any attempt, closes the inbound channel and waits for the worker.
    pub fn shutdown(mut self) -> Result<(), ChainError> {
        self.close();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ChainError::MinerError("Miner thread panicked".to_string())),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        self.stop_mining();
        self.inbound = None;
    }
}

impl<B: Minable> Drop for Miner<B> {
    fn drop(&mut self) {
        self.close();
    }
}
