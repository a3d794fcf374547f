/// Transaction types for noobcash
use crate::blockchain::UtxoSet;
use crate::crypto::{self, KeyPair, Sha256Hash};
use crate::error::ChainError;
use secp256k1::{PublicKey, SecretKey};
use std::hash::{Hash, Hasher};

/// Identifier of a transaction: hash of its signable content.
pub type TxId = Sha256Hash;

/// Identifier of a transaction output: hash of parent id and position.
pub type OutputId = Sha256Hash;

const TX_DOMAIN: &[u8] = b"NOOBCASH:TX:";
const OUTPUT_DOMAIN: &[u8] = b"NOOBCASH:OUT:";

/// An indivisible spendable amount created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionOutput {
    pub id: OutputId,
    pub owner: PublicKey,
    pub amount: u64,
    pub parent_txid: TxId,
}

impl TransactionOutput {
    pub fn new(parent_txid: TxId, position: u32, owner: PublicKey, amount: u64) -> Self {
        TransactionOutput {
            id: Self::derive_id(&parent_txid, position),
            owner,
            amount,
            parent_txid,
        }
    }

    pub fn derive_id(parent_txid: &TxId, position: u32) -> OutputId {
        let mut bytes = Vec::with_capacity(OUTPUT_DOMAIN.len() + 32 + 4);
        bytes.extend_from_slice(OUTPUT_DOMAIN);
        bytes.extend_from_slice(parent_txid);
        bytes.extend_from_slice(&position.to_le_bytes());
        crypto::hash(&bytes)
    }

    pub fn belongs_to(&self, key: &PublicKey) -> bool {
        &self.owner == key
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

/// Reference to a still-unspent output. Its value is looked up at validation time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionInput {
    pub previous_output_id: OutputId,
}

impl TransactionInput {
    pub fn new(previous_output_id: OutputId) -> Self {
        TransactionInput { previous_output_id }
    }
}

impl From<&TransactionOutput> for TransactionInput {
    fn from(output: &TransactionOutput) -> Self {
        TransactionInput::new(output.id)
    }
}

/// A signed transfer of `amount` from `sender` to `receiver`.
///
/// Two transactions are equal iff their ids are equal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub sender: PublicKey,
    pub receiver: PublicKey,
    pub amount: u64,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub inputs: Vec<TransactionInput>,
    pub txid: TxId,
    pub outputs: Vec<TransactionOutput>,
    pub signature: Option<Vec<u8>>,
}

impl Transaction {
    /// Builds an unsigned transaction stamped with the current time.
    ///
    /// No UTXO lookup happens here; a `change` inconsistent with the spent
    /// outputs is caught by [`Transaction::validate`].
    pub fn new(
        sender: PublicKey,
        receiver: PublicKey,
        inputs: Vec<TransactionInput>,
        amount: u64,
        change: u64,
    ) -> Result<Self, ChainError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self::new_at(sender, receiver, inputs, amount, change, timestamp)
    }

    pub fn new_at(
        sender: PublicKey,
        receiver: PublicKey,
        inputs: Vec<TransactionInput>,
        amount: u64,
        change: u64,
        timestamp: i64,
    ) -> Result<Self, ChainError> {
        if inputs.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Transaction must reference at least one input".to_string(),
            ));
        }
        Ok(Self::build(sender, receiver, inputs, amount, change, timestamp))
    }

    /// The bootstrap transaction minting the initial supply to `receiver`.
    /// It spends nothing and carries no signature; it is only ever applied to
    /// an empty set, never verified.
    pub fn genesis(receiver: PublicKey, amount: u64) -> Self {
        Self::build(receiver, receiver, Vec::new(), amount, 0, 0)
    }

    fn build(
        sender: PublicKey,
        receiver: PublicKey,
        inputs: Vec<TransactionInput>,
        amount: u64,
        change: u64,
        timestamp: i64,
    ) -> Self {
        let mut tx = Transaction {
            sender,
            receiver,
            amount,
            timestamp,
            inputs,
            txid: [0u8; 32],
            outputs: Vec::new(),
            signature: None,
        };
        tx.txid = tx.calculate_hash();

        tx.outputs
            .push(TransactionOutput::new(tx.txid, 0, receiver, amount));
        if change > 0 {
            tx.outputs
                .push(TransactionOutput::new(tx.txid, 1, sender, change));
        }
        tx
    }

    /// Selects the sender's unspent outputs until `amount` is covered, then
    /// builds and signs the transfer with the leftover as change.
    pub fn transfer(
        keypair: &KeyPair,
        receiver: PublicKey,
        amount: u64,
        utxos: &UtxoSet,
    ) -> Result<Self, ChainError> {
        let mut inputs = Vec::new();
        let mut gathered: u64 = 0;

        for output in utxos.spendable_by(&keypair.public_key) {
            if gathered >= amount && !inputs.is_empty() {
                break;
            }
            gathered = gathered
                .checked_add(output.amount)
                .ok_or(ChainError::ValueOverflow)?;
            inputs.push(TransactionInput::from(output));
        }

        if gathered < amount || inputs.is_empty() {
            return Err(ChainError::InsufficientFunds {
                have: gathered,
                need: amount,
            });
        }

        let mut tx = Transaction::new(
            keypair.public_key,
            receiver,
            inputs,
            amount,
            gathered - amount,
        )?;
        tx.sign(&keypair.secret_key);
        Ok(tx)
    }

    /// Canonical byte encoding shared by id hashing, signing and verification.
    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(TX_DOMAIN.len() + 90 + self.inputs.len() * 32);
        message.extend_from_slice(TX_DOMAIN);
        message.extend_from_slice(&crypto::public_key_bytes(&self.sender));
        message.extend_from_slice(&crypto::public_key_bytes(&self.receiver));
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.timestamp.to_le_bytes());
        message.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            message.extend_from_slice(&input.previous_output_id);
        }
        message
    }

    pub fn calculate_hash(&self) -> TxId {
        crypto::hash(&self.signable_message())
    }

    /// Signs the canonical content with the sender's secret key.
    pub fn sign(&mut self, secret_key: &SecretKey) {
        let signature = crypto::sign(&self.signable_message(), secret_key);
        self.signature = Some(signature.to_vec());
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid)
    }

    pub fn output_total(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.txid == other.txid
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.txid.hash(state);
    }
}
