use crate::error::ChainError;
use crate::transaction::{OutputId, Transaction, TransactionOutput};
use parking_lot::Mutex;
use secp256k1::PublicKey;
use std::collections::HashMap;
use tracing::debug;

/// All currently spendable outputs, keyed by output id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    utxo_set: HashMap<OutputId, TransactionOutput>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an empty set with the outputs of the genesis transaction.
    pub fn from_genesis(genesis: &Transaction) -> Self {
        let mut set = Self::new();
        genesis.apply(&mut set);
        set
    }

    pub fn get(&self, id: &OutputId) -> Option<&TransactionOutput> {
        self.utxo_set.get(id)
    }

    pub fn contains(&self, id: &OutputId) -> bool {
        self.utxo_set.contains_key(id)
    }

    pub fn insert(&mut self, output: TransactionOutput) -> Option<TransactionOutput> {
        self.utxo_set.insert(output.id, output)
    }

    pub fn remove(&mut self, id: &OutputId) -> Option<TransactionOutput> {
        self.utxo_set.remove(id)
    }

    pub fn len(&self) -> usize {
        self.utxo_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxo_set.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionOutput> {
        self.utxo_set.values()
    }

    /// Sum of every unspent amount, `None` on overflow.
    pub fn total_value(&self) -> Option<u64> {
        self.utxo_set
            .values()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    pub fn balance_of(&self, owner: &PublicKey) -> Option<u64> {
        self.utxo_set
            .values()
            .filter(|output| output.belongs_to(owner))
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    /// Outputs owned by `owner`, ordered by id so selection is reproducible.
    pub fn spendable_by(&self, owner: &PublicKey) -> Vec<&TransactionOutput> {
        let mut outputs: Vec<_> = self
            .utxo_set
            .values()
            .filter(|output| output.belongs_to(owner))
            .collect();
        outputs.sort_by(|a, b| a.id.cmp(&b.id));
        outputs
    }
}

/// A UTXO set behind a lock, so verify-then-apply runs as one exclusive step.
#[derive(Debug, Default)]
pub struct Ledger {
    utxos: Mutex<UtxoSet>,
}

impl Ledger {
    pub fn new(utxos: UtxoSet) -> Self {
        Ledger {
            utxos: Mutex::new(utxos),
        }
    }

    /// Validates `tx` and, only if valid, applies it, without releasing the
    /// lock in between.
    pub fn verify_and_apply(&self, tx: &Transaction) -> Result<(), ChainError> {
        let mut utxos = self.utxos.lock();
        tx.validate(&utxos)?;
        tx.apply(&mut utxos);
        debug!(txid = %tx.txid_hex(), utxos = utxos.len(), "applied transaction");
        Ok(())
    }

    pub fn verify(&self, tx: &Transaction) -> bool {
        tx.verify(&self.utxos.lock())
    }

    pub fn with_utxos<R>(&self, f: impl FnOnce(&UtxoSet) -> R) -> R {
        f(&self.utxos.lock())
    }

    pub fn snapshot(&self) -> UtxoSet {
        self.utxos.lock().clone()
    }

    pub fn balance_of(&self, owner: &PublicKey) -> Option<u64> {
        self.utxos.lock().balance_of(owner)
    }
}
