//! Block types as returned by the explorer's `block/{hash}` and `blocks/` endpoints

use crate::error::{EtlError, Result};
use crate::model::validation::validate_block;
use serde::{Deserialize, Serialize};

/// Maximum number of transactions the explorer returns per `txs` page
pub const TX_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash
    pub id: String,
    pub height: u64,
    pub version: u32,
    pub timestamp: u64,
    pub bits: u32,
    pub nonce: u32,
    pub difficulty: f64,
    pub merkle_root: String,
    pub tx_count: u64,
    pub size: u64,
    pub weight: u64,
    /// Absent only for the genesis block
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: Option<String>,
    #[serde(rename = "mediantime")]
    pub median_time: u64,
    pub extras: Extras,
}

impl Block {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let block: Block = serde_json::from_value(value)
            .map_err(|e| EtlError::Validation(format!("Malformed block: {}", e)))?;
        validate_block(&block)?;
        Ok(block)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Number of `txs` pages needed to cover every transaction of this block.
    pub fn tx_pages(&self) -> u64 {
        self.tx_count.div_ceil(TX_PAGE_SIZE)
    }

    /// Offsets of every `txs` page, in request order.
    pub fn tx_page_offsets(&self) -> impl Iterator<Item = u64> {
        (0..self.tx_count).step_by(TX_PAGE_SIZE as usize)
    }
}

/// Derived and aggregate statistics the explorer attaches to a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extras {
    /// Raw 80-byte header, hex encoded
    pub header: String,
    /// Subsidy plus fees, in satoshis
    pub reward: u64,
    pub median_fee: f64,
    pub fee_range: Vec<f64>,
    pub total_fees: u64,
    pub avg_fee: u64,
    pub avg_fee_rate: u64,
    pub coinbase_raw: String,
    pub coinbase_address: String,
    pub coinbase_addresses: Vec<String>,
    pub coinbase_signature: String,
    /// New outputs minus spent inputs; negative when the block shrinks the set
    pub utxo_set_change: i64,
    pub avg_tx_size: f64,
    pub total_inputs: u64,
    pub total_outputs: u64,
    pub total_output_amt: u64,
    pub segwit_total_txs: u64,
    pub segwit_total_size: u64,
    pub segwit_total_weight: u64,
    pub virtual_size: f64,
    pub pool: Pool,
    /// Similarity to the predicted template; absent until one was computed
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: u64,
    pub name: String,
    pub slug: String,
    /// `None` for unidentified pools
    #[serde(rename = "minerNames")]
    pub miner_names: Option<Vec<String>>,
}

/// Height/hash pair returned by the timestamp lookup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockStamp {
    pub height: u64,
    pub hash: String,
}
