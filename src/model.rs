//! Domain model split into block types, transaction types and validation

pub mod block;
pub mod transaction;
pub mod validation;

pub use block::*;
pub use transaction::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use serde_json::{json, Value};

    const BLOCK_JSON: &str = include_str!("../tests/fixtures/block.json");
    const TX_JSON: &str = include_str!("../tests/fixtures/transaction.json");
    const COINBASE_JSON: &str = include_str!("../tests/fixtures/coinbase_transaction.json");

    fn block_value() -> Value {
        serde_json::from_str(BLOCK_JSON).unwrap()
    }

    fn tx_value() -> Value {
        serde_json::from_str(TX_JSON).unwrap()
    }

    #[test]
    fn test_block_parses_nested_extras_and_pool() {
        let block = Block::from_json(BLOCK_JSON).unwrap();

        assert_eq!(block.height, 900_000);
        assert_eq!(block.tx_count, 3);
        assert_eq!(block.median_time, 1_748_255_131);
        assert_eq!(
            block.previous_block_hash.as_deref(),
            Some("00000000000000000001a4c8f0b3c64e1e0a8dba9ba1b65e1e8a8a6a23fe41b4")
        );
        assert_eq!(block.extras.fee_range.len(), 7);
        assert_eq!(block.extras.utxo_set_change, -1451);
        assert_eq!(block.extras.coinbase_addresses.len(), 2);
        assert_eq!(block.extras.pool.slug, "marapool");
        assert_eq!(
            block.extras.pool.miner_names,
            Some(vec!["MARA Pool".to_string(), "Marathon".to_string()])
        );
        assert_eq!(block.extras.similarity, Some(0.9874));
    }

    #[test]
    fn test_absent_similarity_is_not_zero() {
        let mut value = block_value();
        value["extras"].as_object_mut().unwrap().remove("similarity");
        let absent = Block::from_value(value).unwrap();
        assert_eq!(absent.extras.similarity, None);

        let mut value = block_value();
        value["extras"]["similarity"] = json!(0.0);
        let zero = Block::from_value(value).unwrap();
        assert_eq!(zero.extras.similarity, Some(0.0));
    }

    #[test]
    fn test_unidentified_pool_has_no_miner_names() {
        let mut value = block_value();
        value["extras"]["pool"] = json!({ "id": 137, "name": "Unknown", "slug": "unknown", "minerNames": null });
        let block = Block::from_value(value).unwrap();
        assert_eq!(block.extras.pool.miner_names, None);
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let mut value = block_value();
        value["extras"].as_object_mut().unwrap().remove("totalFees");
        let err = Block::from_value(value).unwrap_err();
        assert!(matches!(err, EtlError::Validation(ref msg) if msg.contains("totalFees")));
    }

    #[test]
    fn test_wrong_type_is_validation_error() {
        let mut value = block_value();
        value["height"] = json!("nine hundred thousand");
        assert!(matches!(Block::from_value(value), Err(EtlError::Validation(_))));
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        let mut value = block_value();
        value["id"] = json!("not-a-hash");
        assert!(matches!(Block::from_value(value), Err(EtlError::Validation(_))));
    }

    #[test]
    fn test_non_genesis_block_requires_previous_hash() {
        let mut value = block_value();
        value.as_object_mut().unwrap().remove("previousblockhash");
        assert!(Block::from_value(value.clone()).is_err());

        value["height"] = json!(0);
        let genesis = Block::from_value(value).unwrap();
        assert_eq!(genesis.previous_block_hash, None);
    }

    #[test]
    fn test_tx_page_offsets() {
        let mut block = Block::from_json(BLOCK_JSON).unwrap();

        block.tx_count = 23;
        assert_eq!(block.tx_pages(), 3);
        assert_eq!(block.tx_page_offsets().collect::<Vec<_>>(), vec![0, 10, 20]);

        block.tx_count = 20;
        assert_eq!(block.tx_page_offsets().collect::<Vec<_>>(), vec![0, 10]);

        block.tx_count = 0;
        assert_eq!(block.tx_pages(), 0);
        assert_eq!(block.tx_page_offsets().count(), 0);
    }

    #[test]
    fn test_transaction_parses_inputs_outputs_and_witnesses() {
        let tx = Transaction::from_json(TX_JSON).unwrap();

        assert_eq!(tx.block_height(), 900_000);
        assert_eq!(tx.v_in.len(), 2);
        assert_eq!(tx.v_out.len(), 2);
        assert_eq!(tx.v_in[0].witness.len(), 2);
        assert_eq!(tx.v_in[0].inner_redeem_script_asm, None);
        assert!(tx.v_in[1].inner_redeem_script_asm.is_some());
        assert_eq!(tx.v_out[1].script_pubkey_type, "op_return");
        assert_eq!(tx.v_out[1].script_pubkey_address, None);
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_coinbase_input_has_no_prevout() {
        let tx = Transaction::from_json(COINBASE_JSON).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.v_in[0].prev_out, None);
        assert_eq!(tx.v_in[0].v_out, u32::MAX);
    }

    #[test]
    fn test_legacy_input_without_witness_defaults_to_empty() {
        let mut value = tx_value();
        value["vin"][0].as_object_mut().unwrap().remove("witness");
        let tx = Transaction::from_value(value).unwrap();
        assert!(tx.v_in[0].witness.is_empty());
    }

    #[test]
    fn test_spending_input_without_prevout_is_rejected() {
        let mut value = tx_value();
        value["vin"][0]["prevout"] = Value::Null;
        let err = Transaction::from_value(value).unwrap_err();
        assert!(matches!(err, EtlError::Validation(ref msg) if msg.contains("prevout")));
    }

    #[test]
    fn test_missing_status_is_rejected() {
        let mut value = tx_value();
        value.as_object_mut().unwrap().remove("status");
        assert!(matches!(Transaction::from_value(value), Err(EtlError::Validation(_))));
    }
}
