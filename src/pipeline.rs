//! One fetch-and-load pass: resolve a block, store it, then store its transactions

use crate::client::ExplorerClient;
use crate::error::{EtlError, Result};
use crate::model::Block;
use crate::pagination::{TransactionPager, TxCountCheck};
use crate::persistence::Database;
use crate::transport::HttpTransport;
use std::fmt;
use tracing::info;

/// Which block a pass loads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSelector {
    Height(u64),
    Hash(String),
    /// Block mined closest to a UNIX timestamp
    Timestamp(i64),
    /// Tip of the chain as reported by the blocks listing
    Latest,
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockSelector::Height(height) => write!(f, "height {}", height),
            BlockSelector::Hash(hash) => write!(f, "hash {}", hash),
            BlockSelector::Timestamp(ts) => write!(f, "timestamp {}", ts),
            BlockSelector::Latest => write!(f, "latest block"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub height: u64,
    pub hash: String,
    pub transactions: usize,
}

pub struct Pipeline<'a, T> {
    client: &'a ExplorerClient<T>,
    db: &'a Database,
    check: TxCountCheck,
}

impl<'a, T: HttpTransport> Pipeline<'a, T> {
    pub fn new(client: &'a ExplorerClient<T>, db: &'a Database, check: TxCountCheck) -> Self {
        Self { client, db, check }
    }

    fn resolve(&self, selector: &BlockSelector) -> Result<Block> {
        match selector {
            BlockSelector::Height(height) => self.client.block_by_height(*height),
            BlockSelector::Hash(hash) => self.client.block_by_hash(hash),
            BlockSelector::Timestamp(ts) => self.client.block_by_timestamp(*ts),
            BlockSelector::Latest => self
                .client
                .block_batch(None)?
                .into_iter()
                .next()
                .ok_or_else(|| EtlError::validation("Blocks listing returned no blocks")),
        }
    }

    /// Stops at the first error. Rows already committed by earlier steps stay.
    pub fn run(&self, selector: &BlockSelector) -> Result<LoadSummary> {
        info!(target: "chainetl::pipeline", "Loading {}.", selector);

        let block = self.resolve(selector)?;
        self.db.save_block(&block)?;

        let transactions = TransactionPager::new(self.client, self.check).transactions_of(&block)?;
        for transaction in &transactions {
            self.db.save_transaction(transaction)?;
        }

        info!(
            target: "chainetl::pipeline",
            "Block at height {} loaded with {} transactions.",
            block.height,
            transactions.len()
        );
        Ok(LoadSummary {
            height: block.height,
            hash: block.id,
            transactions: transactions.len(),
        })
    }
}
