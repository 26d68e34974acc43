//! Extraction client for a mempool/Esplora-compatible explorer API
//!
//! Every request goes through the client's [`RetryPolicy`]. Bodies are
//! validated into domain types only after the retry loop, so a response that
//! arrived but doesn't parse is reported immediately and never re-requested.

use crate::config::Config;
use crate::endpoint::{ApiBase, BlockHash, Endpoint, ResponseFormat};
use crate::error::{EtlError, Result};
use crate::model::validation::validate_hash;
use crate::model::{Block, BlockStamp, Transaction, TX_PAGE_SIZE};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, ReqwestTransport};
use serde_json::Value;
use tracing::debug;

pub struct ExplorerClient<T> {
    transport: T,
    base: ApiBase,
    retry: RetryPolicy,
}

impl ExplorerClient<ReqwestTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let base = ApiBase::parse(&config.api.base_url)?;
        let transport = ReqwestTransport::new(config.api.timeout())?;
        Ok(Self::new(transport, base, config.retry.policy()))
    }
}

impl<T: HttpTransport> ExplorerClient<T> {
    pub fn new(transport: T, base: ApiBase, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base,
            retry,
        }
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    fn fetch_text(&self, endpoint: &Endpoint) -> Result<String> {
        let url = self.base.url_for(endpoint)?;
        self.retry
            .run(endpoint.name(), |_attempt| self.transport.get(&url))
    }

    fn fetch_json(&self, endpoint: &Endpoint) -> Result<Value> {
        debug_assert_eq!(endpoint.format(), ResponseFormat::Json);
        let body = self.fetch_text(endpoint)?;
        serde_json::from_str(&body).map_err(|e| {
            EtlError::Validation(format!("{} returned invalid JSON: {}", endpoint, e))
        })
    }

    fn fetch_array(&self, endpoint: &Endpoint) -> Result<Vec<Value>> {
        match self.fetch_json(endpoint)? {
            Value::Array(items) => Ok(items),
            other => Err(EtlError::Validation(format!(
                "{} returned {} instead of an array",
                endpoint,
                json_kind(&other)
            ))),
        }
    }

    /// Resolves a height to the canonical block hash.
    pub fn block_hash_by_height(&self, height: u64) -> Result<String> {
        debug!(target: "chainetl::client", height, "getting block hash");
        let body = self.fetch_text(&Endpoint::BlockHashByHeight { height })?;
        Ok(BlockHash::parse(&body)?.to_string())
    }

    pub fn block_by_hash(&self, hash: &str) -> Result<Block> {
        let hash = BlockHash::parse(hash)?;
        debug!(target: "chainetl::client", %hash, "getting block");
        Block::from_value(self.fetch_json(&Endpoint::BlockByHash { hash })?)
    }

    pub fn block_by_height(&self, height: u64) -> Result<Block> {
        let hash = self.block_hash_by_height(height)?;
        self.block_by_hash(&hash)
    }

    /// The block whose mining time is closest to `timestamp` (UNIX seconds).
    pub fn block_by_timestamp(&self, timestamp: i64) -> Result<Block> {
        debug!(
            target: "chainetl::client",
            timestamp,
            at = %format_timestamp(timestamp),
            "getting block closest to timestamp"
        );
        let value = self.fetch_json(&Endpoint::BlockByTimestamp { timestamp })?;
        let stamp: BlockStamp = serde_json::from_value(value)
            .map_err(|e| EtlError::Validation(format!("Malformed timestamp lookup: {}", e)))?;
        validate_hash("hash", &stamp.hash)?;
        debug!(target: "chainetl::client", height = stamp.height, "resolved timestamp");
        self.block_by_hash(&stamp.hash)
    }

    /// Most recent page of blocks, or the page ending at `start_height`
    /// (inclusive), highest first.
    pub fn block_batch(&self, start_height: Option<u64>) -> Result<Vec<Block>> {
        match start_height {
            Some(height) => debug!(target: "chainetl::client", height, "getting blocks ending at height"),
            None => debug!(target: "chainetl::client", "getting latest blocks"),
        }
        self.fetch_array(&Endpoint::Blocks { start_height })?
            .into_iter()
            .map(Block::from_value)
            .collect()
    }

    pub fn transaction_ids(&self, block_hash: &str) -> Result<Vec<String>> {
        let hash = BlockHash::parse(block_hash)?;
        debug!(target: "chainetl::client", %hash, "getting transaction ids");
        let ids: Vec<String> = serde_json::from_value(Value::Array(
            self.fetch_array(&Endpoint::TxIds { hash })?,
        ))
        .map_err(|e| EtlError::Validation(format!("Malformed txid list: {}", e)))?;
        for id in &ids {
            validate_hash("txid", id)?;
        }
        Ok(ids)
    }

    /// One page of up to ten transactions starting at `offset`.
    pub fn transactions_batch(&self, block_hash: &str, offset: u64) -> Result<Vec<Transaction>> {
        let hash = BlockHash::parse(block_hash)?;
        debug!(
            target: "chainetl::client",
            %hash,
            from = offset,
            to = offset.saturating_add(TX_PAGE_SIZE - 1),
            "getting transactions"
        );
        self.fetch_array(&Endpoint::TxsPage { hash, offset })?
            .into_iter()
            .map(Transaction::from_value)
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
