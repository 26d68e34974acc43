use crate::error::{EtlError, Result};
use crate::model::{Block, Transaction};

const HASH_HEX_LEN: usize = 64;

/// A block or transaction hash: 32 bytes, hex encoded.
pub fn is_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && hex::decode(s).is_ok()
}

pub fn validate_hash(field: &str, value: &str) -> Result<()> {
    if is_hash(value) {
        Ok(())
    } else {
        Err(EtlError::Validation(format!(
            "{} is not a 64-character hex hash: {:?}",
            field, value
        )))
    }
}

pub fn validate_block(block: &Block) -> Result<()> {
    validate_hash("block id", &block.id)?;
    validate_hash("merkle_root", &block.merkle_root)?;
    if let Some(previous) = &block.previous_block_hash {
        validate_hash("previousblockhash", previous)?;
    } else if block.height != 0 {
        return Err(EtlError::Validation(format!(
            "Block at height {} has no previousblockhash",
            block.height
        )));
    }
    Ok(())
}

pub fn validate_transaction(tx: &Transaction) -> Result<()> {
    validate_hash("txid", &tx.tx_id)?;
    validate_hash("status.block_hash", &tx.status.block_hash)?;

    for (index, input) in tx.v_in.iter().enumerate() {
        validate_hash("vin.txid", &input.prev_tx_id)?;
        if input.is_coinbase == input.prev_out.is_some() {
            return Err(EtlError::Validation(format!(
                "Input {} of {}: is_coinbase = {} but prevout is {}",
                index,
                tx.tx_id,
                input.is_coinbase,
                if input.prev_out.is_some() { "present" } else { "absent" }
            )));
        }
    }
    Ok(())
}
