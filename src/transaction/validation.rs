/// Validation and application of transactions against a UTXO set
use crate::blockchain::UtxoSet;
use crate::crypto;
use crate::error::ChainError;
use crate::transaction::types::{OutputId, Transaction};
use std::collections::HashSet;
use tracing::warn;

impl Transaction {
    /// Checks this transaction against `utxos` without modifying it.
    ///
    /// Checks run in a fixed order and the first violation is returned:
    /// signature, id, input resolution and ownership, output parent ids,
    /// value conservation. An output listed twice among the inputs counts as
    /// already spent.
    pub fn validate(&self, utxos: &UtxoSet) -> Result<(), ChainError> {
        self.validate_signature()?;
        self.validate_txid()?;

        let mut input_total: u64 = 0;
        let mut seen: HashSet<OutputId> = HashSet::with_capacity(self.inputs.len());
        for input in &self.inputs {
            if !seen.insert(input.previous_output_id) {
                return Err(ChainError::DuplicateInput(hex::encode(input.previous_output_id)));
            }
            let output = utxos
                .get(&input.previous_output_id)
                .ok_or_else(|| ChainError::UnknownInput(hex::encode(input.previous_output_id)))?;
            if !output.belongs_to(&self.sender) {
                return Err(ChainError::ForeignInput {
                    output: output.id_hex(),
                    owner: crypto::public_key_to_hex(&output.owner),
                });
            }
            input_total = input_total
                .checked_add(output.amount)
                .ok_or(ChainError::ValueOverflow)?;
        }

        let mut output_total: u64 = 0;
        for output in &self.outputs {
            if output.parent_txid != self.txid {
                return Err(ChainError::OutputParentMismatch {
                    output: output.id_hex(),
                    parent: hex::encode(output.parent_txid),
                    txid: self.txid_hex(),
                });
            }
            output_total = output_total
                .checked_add(output.amount)
                .ok_or(ChainError::ValueOverflow)?;
        }

        if input_total != output_total {
            return Err(ChainError::ValueMismatch {
                inputs: input_total,
                outputs: output_total,
            });
        }

        Ok(())
    }

    /// Stateless check of the stored signature against the sender's key.
    pub fn validate_signature(&self) -> Result<(), ChainError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| ChainError::InvalidSignature(format!("{} is not signed", self.txid_hex())))?;

        crypto::verify_signature(&self.sender, &self.signable_message(), signature)
            .map_err(|e| ChainError::InvalidSignature(format!("{}: {}", self.txid_hex(), e)))
    }

    /// Detects fields changed after the id was computed.
    pub fn validate_txid(&self) -> Result<(), ChainError> {
        let computed = self.calculate_hash();
        if computed != self.txid {
            return Err(ChainError::TxidMismatch {
                stored: self.txid_hex(),
                computed: hex::encode(computed),
            });
        }
        Ok(())
    }

    /// Boolean form of [`Transaction::validate`]; the rejection reason is logged.
    pub fn verify(&self, utxos: &UtxoSet) -> bool {
        match self.validate(utxos) {
            Ok(()) => true,
            Err(e) => {
                warn!(txid = %self.txid_hex(), "rejected transaction: {}", e);
                false
            }
        }
    }

    /// Consumes the referenced outputs and inserts this transaction's outputs.
    ///
    /// Performs no validation; callers verify first while holding exclusive
    /// access to `utxos`.
    pub fn apply(&self, utxos: &mut UtxoSet) {
        for input in &self.inputs {
            utxos.remove(&input.previous_output_id);
        }
        for output in &self.outputs {
            utxos.insert(output.clone());
        }
    }
}
