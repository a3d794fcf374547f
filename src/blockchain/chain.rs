use crate::blockchain::state::{Ledger, UtxoSet};
use crate::crypto::{self, Sha256Hash};
use crate::error::ChainError;
use crate::miner::{BlockSource, Minable};
use crate::transaction::Transaction;
use std::collections::VecDeque;
use tracing::{debug, info};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: Sha256Hash,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    /// Hash recorded by the last successful `try_mine`; zero while unmined.
    pub hash: Sha256Hash,
}

impl Block {
    pub fn new(index: u64, previous_hash: Sha256Hash, transactions: Vec<Transaction>) -> Self {
        Block {
            index,
            timestamp: chrono::Utc::now().timestamp_millis(),
            previous_hash,
            transactions,
            nonce: 0,
            hash: [0u8; 32],
        }
    }

    pub fn genesis(genesis_tx: Transaction) -> Self {
        let mut block = Block::new(0, [0u8; 32], vec![genesis_tx]);
        block.timestamp = 0;
        block.hash = block.hash_with_nonce(0);
        block
    }

    pub fn transactions_root(&self) -> Sha256Hash {
        let mut bytes = Vec::with_capacity(self.transactions.len() * 32);
        for tx in &self.transactions {
            bytes.extend_from_slice(&tx.txid);
        }
        crypto::hash(&bytes)
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Sha256Hash {
        let mut bytes = Vec::with_capacity(8 + 8 + 32 + 32 + 8);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.previous_hash);
        bytes.extend_from_slice(&self.transactions_root());
        bytes.extend_from_slice(&nonce.to_le_bytes());
        crypto::hash(&bytes)
    }

    pub fn calculate_hash(&self) -> Sha256Hash {
        self.hash_with_nonce(self.nonce)
    }

    /// Target with `difficulty` leading zero bits; a hash meets it when it
    /// compares less than or equal as a big-endian integer.
    pub fn hash_to_target(difficulty: u32) -> [u8; 32] {
        let mut target = [0xFF; 32];
        let leading_zeros = (difficulty / 8).min(32);
        let partial_bits = difficulty % 8;

        for item in target.iter_mut().take(leading_zeros as usize) {
            *item = 0;
        }

        if leading_zeros < 32 && partial_bits > 0 {
            target[leading_zeros as usize] = 0xFF >> partial_bits;
        }
        target
    }

    pub fn hash_meets(hash: &Sha256Hash, difficulty: u32) -> bool {
        *hash <= Self::hash_to_target(difficulty)
    }

    /// Whether the recorded nonce actually solves this block.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        let hash = self.calculate_hash();
        hash == self.hash && Self::hash_meets(&hash, difficulty)
    }
}

impl Minable for Block {
    fn try_mine(&mut self, nonce: u64, difficulty: u32) -> bool {
        let hash = self.hash_with_nonce(nonce);
        if Self::hash_meets(&hash, difficulty) {
            self.nonce = nonce;
            self.hash = hash;
            true
        } else {
            false
        }
    }

    fn index(&self) -> u64 {
        self.index
    }
}

/// Minimal chain and pending pool: accepts verified transactions, reports
/// readiness to mine and snapshots pending transactions into blocks.
#[derive(Debug)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub ledger: Ledger,
    pub difficulty: u32,
    capacity: usize,
    pending: VecDeque<Transaction>,
}

impl Blockchain {
    pub fn new(genesis_tx: Transaction, difficulty: u32, capacity: usize) -> Result<Self, ChainError> {
        if capacity == 0 {
            return Err(ChainError::ConfigError(
                "Block capacity must be at least one transaction".to_string(),
            ));
        }
        let utxos = UtxoSet::from_genesis(&genesis_tx);
        Ok(Blockchain {
            blocks: vec![Block::genesis(genesis_tx)],
            ledger: Ledger::new(utxos),
            difficulty,
            capacity,
            pending: VecDeque::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn height(&self) -> u64 {
        self.blocks.last().map_or(0, |b| b.index)
    }

    /// Verifies and applies `tx`, then queues it for the next block.
    /// Returns `false` if a transaction with the same id is already queued.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<bool, ChainError> {
        if self.pending.contains(&tx) {
            debug!(txid = %tx.txid_hex(), "duplicate transaction ignored");
            return Ok(false);
        }
        self.ledger.verify_and_apply(&tx)?;
        self.pending.push_back(tx);
        Ok(true)
    }

    /// Appends a solved block that extends the current tip and drops its
    /// transactions from the pending pool.
    pub fn add_mined_block(&mut self, block: Block) -> Result<(), ChainError> {
        let last = self
            .blocks
            .last()
            .ok_or_else(|| ChainError::InvalidBlock("Chain has no genesis block".to_string()))?;

        if block.index != last.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block index. Expected {}, but got {}.",
                last.index + 1,
                block.index
            )));
        }
        if block.previous_hash != last.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid previous block hash. Expected {}, but got {}.",
                hex::encode(last.hash),
                hex::encode(block.previous_hash)
            )));
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(ChainError::InvalidBlock(
                "Block hash does not meet difficulty target".to_string(),
            ));
        }

        self.pending.retain(|tx| !block.transactions.contains(tx));
        info!(
            index = block.index,
            hash = %hex::encode(block.hash),
            transactions = block.transactions.len(),
            "block added to chain"
        );
        self.blocks.push(block);
        Ok(())
    }
}

impl BlockSource for Blockchain {
    type Block = Block;

    fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    fn create_block(&mut self) -> Block {
        let (index, previous_hash) = self
            .blocks
            .last()
            .map_or((0, [0u8; 32]), |b| (b.index + 1, b.hash));
        let transactions = self.pending.iter().take(self.capacity).cloned().collect();
        Block::new(index, previous_hash, transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_hash_to_target() {
        assert_eq!(Block::hash_to_target(0), [0xFF; 32]);
        let target = Block::hash_to_target(12);
        assert_eq!(target[0], 0);
        assert_eq!(target[1], 0x0F);
        assert_eq!(target[2], 0xFF);
        assert_eq!(Block::hash_to_target(256), [0u8; 32]);
    }

    #[test]
    fn test_try_mine_records_winning_nonce() {
        let mut block = Block::new(1, [1u8; 32], vec![]);
        assert!(block.try_mine(42, 0));
        assert_eq!(block.nonce, 42);
        assert!(block.meets_difficulty(0));
    }

    #[test]
    fn test_try_mine_failure_leaves_block_untouched() {
        let mut block = Block::new(1, [1u8; 32], vec![]);
        assert!(!block.try_mine(42, 256));
        assert_eq!(block.nonce, 0);
        assert_eq!(block.hash, [0u8; 32]);
    }

    #[test]
    fn test_pool_readiness_and_block_creation() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut chain = Blockchain::new(Transaction::genesis(alice.public_key, 100), 4, 2).unwrap();
        assert!(!chain.is_full());

        for amount in [10, 20] {
            let tx = chain
                .ledger
                .with_utxos(|u| Transaction::transfer(&alice, bob.public_key, amount, u))
                .unwrap();
            assert!(chain.submit_transaction(tx).unwrap());
        }
        assert!(chain.is_full());

        let block = chain.create_block();
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, chain.blocks[0].hash);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(chain.ledger.balance_of(&bob.public_key), Some(30));
    }

    #[test]
    fn test_duplicate_submission_ignored() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut chain = Blockchain::new(Transaction::genesis(alice.public_key, 100), 4, 5).unwrap();
        let tx = chain
            .ledger
            .with_utxos(|u| Transaction::transfer(&alice, bob.public_key, 10, u))
            .unwrap();

        assert!(chain.submit_transaction(tx.clone()).unwrap());
        assert!(!chain.submit_transaction(tx).unwrap());
        assert_eq!(chain.pending_len(), 1);
    }

    #[test]
    fn test_add_mined_block_rejects_unsolved() {
        let alice = KeyPair::generate();
        let mut chain = Blockchain::new(Transaction::genesis(alice.public_key, 100), 255, 1).unwrap();
        let block = chain.create_block();
        assert!(matches!(
            chain.add_mined_block(block),
            Err(ChainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_add_mined_block_clears_pool() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut chain = Blockchain::new(Transaction::genesis(alice.public_key, 100), 0, 1).unwrap();
        let tx = chain
            .ledger
            .with_utxos(|u| Transaction::transfer(&alice, bob.public_key, 10, u))
            .unwrap();
        chain.submit_transaction(tx).unwrap();

        let mut block = chain.create_block();
        assert!(block.try_mine(7, 0));
        chain.add_mined_block(block).unwrap();

        assert_eq!(chain.height(), 1);
        assert_eq!(chain.pending_len(), 0);
        assert!(!chain.is_full());
    }
}
