//! Reassembles a block's full transaction list from ten-transaction pages

use crate::client::ExplorerClient;
use crate::error::{EtlError, Result};
use crate::model::{Block, Transaction};
use crate::transport::HttpTransport;
use tracing::{debug, info, warn};

/// What to do when the pages of a block don't add up to its `tx_count`.
///
/// Pages are never re-requested, padded or truncated either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxCountCheck {
    /// Log the mismatch and return the transactions as received
    #[default]
    Warn,
    /// Fail the block with a validation error
    Strict,
}

pub struct TransactionPager<'a, T> {
    client: &'a ExplorerClient<T>,
    check: TxCountCheck,
}

impl<'a, T: HttpTransport> TransactionPager<'a, T> {
    pub fn new(client: &'a ExplorerClient<T>, check: TxCountCheck) -> Self {
        Self { client, check }
    }

    /// Fetches the block for its `tx_count`, then every page of its transactions.
    pub fn all_transactions(&self, block_hash: &str) -> Result<Vec<Transaction>> {
        let block = self.client.block_by_hash(block_hash)?;
        self.transactions_of(&block)
    }

    /// Pages through the transactions of an already fetched block, in block order.
    pub fn transactions_of(&self, block: &Block) -> Result<Vec<Transaction>> {
        info!(
            target: "chainetl::pagination",
            "Fetching {} transactions from block at height {} in {} pages.",
            block.tx_count,
            block.height,
            block.tx_pages()
        );

        let mut transactions = Vec::new();
        for offset in block.tx_page_offsets() {
            let page = self.client.transactions_batch(&block.id, offset)?;
            debug!(
                target: "chainetl::pagination",
                height = block.height,
                offset,
                received = page.len(),
                "page fetched"
            );
            transactions.extend(page);
        }

        self.reconcile(block, transactions.len() as u64)?;
        Ok(transactions)
    }

    fn reconcile(&self, block: &Block, received: u64) -> Result<()> {
        if received == block.tx_count {
            return Ok(());
        }
        match self.check {
            TxCountCheck::Warn => {
                warn!(
                    target: "chainetl::pagination",
                    height = block.height,
                    expected = block.tx_count,
                    received,
                    "transaction count mismatch; keeping the pages as received"
                );
                Ok(())
            }
            TxCountCheck::Strict => Err(EtlError::Validation(format!(
                "Block at height {} advertises {} transactions but its pages held {}",
                block.height, block.tx_count, received
            ))),
        }
    }
}
