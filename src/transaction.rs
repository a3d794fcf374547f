//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::UtxoSet;
    use crate::crypto::KeyPair;
    use crate::error::ChainError;

    struct Fixture {
        sender: KeyPair,
        receiver: KeyPair,
        utxos: UtxoSet,
        funding: TransactionOutput,
    }

    fn fixture(funds: u64) -> Fixture {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        let genesis = Transaction::genesis(sender.public_key, funds);
        let funding = genesis.outputs[0].clone();
        Fixture {
            sender,
            receiver,
            utxos: UtxoSet::from_genesis(&genesis),
            funding,
        }
    }

    fn signed(f: &Fixture, amount: u64, change: u64) -> Transaction {
        let mut tx = Transaction::new(
            f.sender.public_key,
            f.receiver.public_key,
            vec![TransactionInput::from(&f.funding)],
            amount,
            change,
        )
        .unwrap();
        tx.sign(&f.sender.secret_key);
        tx
    }

    #[test]
    fn test_construction_derives_outputs() {
        let f = fixture(100);
        let tx = signed(&f, 60, 40);

        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].owner, f.receiver.public_key);
        assert_eq!(tx.outputs[0].amount, 60);
        assert_eq!(tx.outputs[1].owner, f.sender.public_key);
        assert_eq!(tx.outputs[1].amount, 40);
        for (position, output) in tx.outputs.iter().enumerate() {
            assert_eq!(output.parent_txid, tx.txid);
            assert_eq!(output.id, TransactionOutput::derive_id(&tx.txid, position as u32));
        }
    }

    #[test]
    fn test_zero_change_yields_single_output() {
        let f = fixture(100);
        let tx = signed(&f, 100, 0);
        assert_eq!(tx.outputs.len(), 1);
        assert!(tx.verify(&f.utxos));
    }

    #[test]
    fn test_empty_inputs_rejected_at_construction() {
        let f = fixture(100);
        let result = Transaction::new(f.sender.public_key, f.receiver.public_key, vec![], 10, 0);
        assert!(matches!(result, Err(ChainError::InvalidTransaction(_))));
    }

    #[test]
    fn test_valid_transaction_verifies_twice_without_mutation() {
        let f = fixture(100);
        let tx = signed(&f, 60, 40);
        let before = f.utxos.clone();

        assert!(tx.verify(&f.utxos));
        assert!(tx.verify(&f.utxos));
        assert_eq!(f.utxos, before);
    }

    #[test]
    fn test_unsigned_transaction_fails() {
        let f = fixture(100);
        let tx = Transaction::new(
            f.sender.public_key,
            f.receiver.public_key,
            vec![TransactionInput::from(&f.funding)],
            60,
            40,
        )
        .unwrap();
        assert!(matches!(
            tx.validate(&f.utxos),
            Err(ChainError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_signature_by_wrong_key_fails() {
        let f = fixture(100);
        let mut tx = signed(&f, 60, 40);
        tx.sign(&f.receiver.secret_key);
        assert!(matches!(
            tx.validate(&f.utxos),
            Err(ChainError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_tampered_signed_fields_fail_signature_check() {
        let f = fixture(100);
        let original = signed(&f, 60, 40);

        let mut tx = original.clone();
        tx.amount = 70;
        assert!(matches!(tx.validate(&f.utxos), Err(ChainError::InvalidSignature(_))));

        let mut tx = original.clone();
        tx.receiver = KeyPair::generate().public_key;
        assert!(matches!(tx.validate(&f.utxos), Err(ChainError::InvalidSignature(_))));

        let mut tx = original;
        tx.inputs.push(TransactionInput::new([9u8; 32]));
        assert!(matches!(tx.validate(&f.utxos), Err(ChainError::InvalidSignature(_))));
    }

    #[test]
    fn test_tampered_txid_fails_identity_check() {
        let f = fixture(100);
        let mut tx = signed(&f, 60, 40);
        tx.txid[0] ^= 0xFF;
        assert!(matches!(
            tx.validate(&f.utxos),
            Err(ChainError::TxidMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_input_fails() {
        let f = fixture(100);
        let tx = signed(&f, 60, 40);
        assert!(matches!(
            tx.validate(&UtxoSet::new()),
            Err(ChainError::UnknownInput(_))
        ));
    }

    #[test]
    fn test_spending_foreign_output_fails() {
        let f = fixture(100);
        let thief = KeyPair::generate();
        let mut tx = Transaction::new(
            thief.public_key,
            thief.public_key,
            vec![TransactionInput::from(&f.funding)],
            100,
            0,
        )
        .unwrap();
        tx.sign(&thief.secret_key);
        assert!(matches!(
            tx.validate(&f.utxos),
            Err(ChainError::ForeignInput { .. })
        ));
    }

    #[test]
    fn test_output_parent_mismatch_fails() {
        let f = fixture(100);
        let mut tx = signed(&f, 60, 40);
        tx.outputs[1].parent_txid = [3u8; 32];
        assert!(matches!(
            tx.validate(&f.utxos),
            Err(ChainError::OutputParentMismatch { .. })
        ));
    }

    #[test]
    fn test_inconsistent_change_fails_conservation() {
        let f = fixture(100);
        let tx = signed(&f, 60, 50);
        assert_eq!(
            tx.validate(&f.utxos),
            Err(ChainError::ValueMismatch {
                inputs: 100,
                outputs: 110
            })
        );

        let tx = signed(&f, 60, 0);
        assert!(!tx.verify(&f.utxos));
    }

    #[test]
    fn test_repeated_input_rejected() {
        let f = fixture(100);
        let coin = TransactionInput::from(&f.funding);
        let mut tx = Transaction::new(
            f.sender.public_key,
            f.receiver.public_key,
            vec![coin.clone(), coin],
            200,
            0,
        )
        .unwrap();
        tx.sign(&f.sender.secret_key);

        assert_eq!(
            tx.validate(&f.utxos),
            Err(ChainError::DuplicateInput(f.funding.id_hex()))
        );
        assert!(!tx.verify(&f.utxos));
        assert_eq!(f.utxos.total_value(), Some(100));
    }

    #[test]
    fn test_apply_conserves_value() {
        let f = fixture(100);
        let tx = signed(&f, 60, 40);
        let mut utxos = f.utxos.clone();

        assert!(tx.verify(&utxos));
        tx.apply(&mut utxos);

        assert!(!utxos.contains(&f.funding.id));
        assert_eq!(utxos.total_value(), Some(100));
        assert_eq!(utxos.balance_of(&f.receiver.public_key), Some(60));
        assert_eq!(utxos.balance_of(&f.sender.public_key), Some(40));
        assert!(!tx.verify(&utxos));
    }

    #[test]
    fn test_transfer_selects_inputs_and_change() {
        let f = fixture(100);
        let tx = Transaction::transfer(&f.sender, f.receiver.public_key, 25, &f.utxos).unwrap();
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs[1].amount, 75);
        assert!(tx.verify(&f.utxos));
    }

    #[test]
    fn test_transfer_insufficient_funds() {
        let f = fixture(100);
        let result = Transaction::transfer(&f.sender, f.receiver.public_key, 101, &f.utxos);
        assert_eq!(
            result.unwrap_err(),
            ChainError::InsufficientFunds { have: 100, need: 101 }
        );
    }

    #[test]
    fn test_equality_is_by_txid() {
        let f = fixture(100);
        let tx = signed(&f, 60, 40);
        let mut other = tx.clone();
        other.signature = None;
        other.amount = 1;
        assert_eq!(tx, other);
    }
}
