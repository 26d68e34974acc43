//! Transaction types as returned by the explorer's `block/{hash}/txs/{offset}` endpoint

use crate::error::{EtlError, Result};
use crate::model::validation::validate_transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "txid")]
    pub tx_id: String,
    #[serde(rename = "vsize")]
    pub v_size: f64,
    #[serde(rename = "feePerVsize")]
    pub fee_per_vsize: f64,
    /// Fee rate after accounting for ancestor/descendant packages
    #[serde(rename = "effectiveFeePerVsize")]
    pub effective_fee_per_vsize: f64,
    pub version: i32,
    #[serde(rename = "locktime")]
    pub lock_time: u32,
    #[serde(rename = "vin")]
    pub v_in: Vec<TxInput>,
    #[serde(rename = "vout")]
    pub v_out: Vec<TxOutput>,
    pub size: u64,
    pub weight: u64,
    /// Inputs minus outputs, in satoshis
    pub fee: u64,
    pub status: Status,
}

impl Transaction {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let tx: Transaction = serde_json::from_value(value)
            .map_err(|e| EtlError::Validation(format!("Malformed transaction: {}", e)))?;
        validate_transaction(&tx)?;
        Ok(tx)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn block_height(&self) -> u64 {
        self.status.block_height
    }

    pub fn is_coinbase(&self) -> bool {
        self.v_in.iter().any(|input| input.is_coinbase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub confirmed: bool,
    pub block_height: u64,
    pub block_hash: String,
    pub block_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Transaction holding the spent output; all zeroes for coinbase inputs
    #[serde(rename = "txid")]
    pub prev_tx_id: String,
    #[serde(rename = "vout")]
    pub v_out: u32,
    /// The spent output; `None` exactly when `is_coinbase` is set
    #[serde(rename = "prevout")]
    pub prev_out: Option<TxOutput>,
    #[serde(rename = "scriptsig")]
    pub script_sig: String,
    #[serde(rename = "scriptsig_asm")]
    pub script_sig_asm: String,
    /// Hex-encoded witness stack items, in stack order. Empty for legacy inputs.
    #[serde(default)]
    pub witness: Vec<String>,
    pub is_coinbase: bool,
    pub sequence: u32,
    #[serde(rename = "inner_redeemscript_asm")]
    pub inner_redeem_script_asm: Option<String>,
    #[serde(rename = "inner_witnessscript_asm")]
    pub inner_witness_script_asm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(rename = "scriptpubkey")]
    pub script_pubkey: String,
    #[serde(rename = "scriptpubkey_asm")]
    pub script_pubkey_asm: String,
    #[serde(rename = "scriptpubkey_type")]
    pub script_pubkey_type: String,
    /// Absent for scripts without an address form (e.g. OP_RETURN)
    #[serde(rename = "scriptpubkey_address")]
    pub script_pubkey_address: Option<String>,
    pub value: u64,
}
