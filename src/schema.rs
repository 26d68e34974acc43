//! Relational schema for extracted blocks and transactions
//!
//! Every child table cascades from its parent, so foreign-key enforcement
//! must be on for the connection (see [`crate::persistence::Database::open`]).

use crate::error::{EtlError, Result};
use rusqlite::Connection;
use tracing::info;

pub const TABLE_BLOCKS: &str = "blocks";
pub const TABLE_EXTRAS: &str = "extras";
pub const TABLE_FEE_RANGE: &str = "fee_range";
pub const TABLE_COINBASE_ADDRESSES: &str = "coinbase_addresses";
pub const TABLE_POOLS: &str = "pools";
pub const TABLE_MINERS: &str = "miners";
pub const TABLE_TRANSACTIONS: &str = "transactions";
pub const TABLE_TX_INPUTS: &str = "tx_inputs";
pub const TABLE_TX_OUTPUTS: &str = "tx_outputs";
pub const TABLE_WITNESSES: &str = "witnesses";

/// Tables holding one block's rows, parent first
pub const BLOCK_TABLES: [&str; 6] = [
    TABLE_BLOCKS,
    TABLE_EXTRAS,
    TABLE_FEE_RANGE,
    TABLE_COINBASE_ADDRESSES,
    TABLE_POOLS,
    TABLE_MINERS,
];

/// Tables holding one transaction's rows, parent first
pub const TRANSACTION_TABLES: [&str; 4] = [
    TABLE_TRANSACTIONS,
    TABLE_TX_INPUTS,
    TABLE_TX_OUTPUTS,
    TABLE_WITNESSES,
];

pub fn is_known_table(name: &str) -> bool {
    BLOCK_TABLES.contains(&name) || TRANSACTION_TABLES.contains(&name)
}

const BLOCK_DDL: &str = "
CREATE TABLE IF NOT EXISTS blocks (
    height INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    version INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    bits INTEGER NOT NULL,
    nonce INTEGER NOT NULL,
    difficulty REAL NOT NULL,
    merkle_root TEXT NOT NULL,
    tx_count INTEGER NOT NULL,
    size INTEGER NOT NULL,
    weight INTEGER NOT NULL,
    previous_block_hash TEXT,
    median_time INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS extras (
    height INTEGER PRIMARY KEY,
    header TEXT NOT NULL,
    reward INTEGER NOT NULL,
    median_fee REAL NOT NULL,
    total_fees INTEGER NOT NULL,
    avg_fee INTEGER NOT NULL,
    avg_fee_rate INTEGER NOT NULL,
    coinbase_raw TEXT NOT NULL,
    coinbase_address TEXT NOT NULL,
    coinbase_signature TEXT NOT NULL,
    utxo_set_change INTEGER NOT NULL,
    avg_tx_size REAL NOT NULL,
    total_inputs INTEGER NOT NULL,
    total_outputs INTEGER NOT NULL,
    total_output_amt INTEGER NOT NULL,
    segwit_total_txs INTEGER NOT NULL,
    segwit_total_size INTEGER NOT NULL,
    segwit_total_weight INTEGER NOT NULL,
    virtual_size REAL NOT NULL,
    similarity REAL,
    FOREIGN KEY (height) REFERENCES blocks(height) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS fee_range (
    height INTEGER NOT NULL,
    position INTEGER NOT NULL,
    fee REAL NOT NULL,
    PRIMARY KEY (height, position),
    FOREIGN KEY (height) REFERENCES blocks(height) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS coinbase_addresses (
    height INTEGER NOT NULL,
    position INTEGER NOT NULL,
    address TEXT NOT NULL,
    PRIMARY KEY (height, position),
    FOREIGN KEY (height) REFERENCES blocks(height) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS pools (
    height INTEGER PRIMARY KEY,
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    miner_names_known INTEGER NOT NULL,
    FOREIGN KEY (height) REFERENCES blocks(height) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS miners (
    height INTEGER NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (height, position),
    FOREIGN KEY (height) REFERENCES blocks(height) ON DELETE CASCADE
);
";

const TRANSACTION_DDL: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    tx_id TEXT PRIMARY KEY,
    block_height INTEGER NOT NULL,
    block_hash TEXT NOT NULL,
    block_time INTEGER NOT NULL,
    confirmed INTEGER NOT NULL,
    v_size REAL NOT NULL,
    fee_per_vsize REAL NOT NULL,
    effective_fee_per_vsize REAL NOT NULL,
    version INTEGER NOT NULL,
    lock_time INTEGER NOT NULL,
    size INTEGER NOT NULL,
    weight INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    FOREIGN KEY (block_height) REFERENCES blocks(height) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_transactions_block_height ON transactions(block_height);

CREATE TABLE IF NOT EXISTS tx_outputs (
    tx_id TEXT NOT NULL,
    v_out_index INTEGER NOT NULL,
    script_pubkey TEXT NOT NULL,
    script_pubkey_asm TEXT NOT NULL,
    script_pubkey_type TEXT NOT NULL,
    script_pubkey_address TEXT,
    value INTEGER NOT NULL,
    PRIMARY KEY (tx_id, v_out_index),
    FOREIGN KEY (tx_id) REFERENCES transactions(tx_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tx_inputs (
    tx_id TEXT NOT NULL,
    v_in_index INTEGER NOT NULL,
    prev_tx_id TEXT NOT NULL,
    v_out_index INTEGER NOT NULL,
    script_sig TEXT NOT NULL,
    script_sig_asm TEXT NOT NULL,
    is_coinbase INTEGER NOT NULL,
    sequence INTEGER NOT NULL,
    inner_redeem_script_asm TEXT,
    inner_witness_script_asm TEXT,
    prevout_script_pubkey TEXT,
    prevout_script_pubkey_asm TEXT,
    prevout_script_pubkey_type TEXT,
    prevout_script_pubkey_address TEXT,
    prevout_value INTEGER,
    PRIMARY KEY (tx_id, v_in_index),
    FOREIGN KEY (tx_id) REFERENCES transactions(tx_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS witnesses (
    tx_id TEXT NOT NULL,
    v_in_index INTEGER NOT NULL,
    witness_index INTEGER NOT NULL,
    witness TEXT NOT NULL,
    PRIMARY KEY (tx_id, v_in_index, witness_index),
    FOREIGN KEY (tx_id) REFERENCES transactions(tx_id) ON DELETE CASCADE
);
";

/// Creates every table and index that doesn't exist yet, in one transaction.
pub fn create_tables(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(|e| {
        EtlError::Persistence(format!("Failed to start schema transaction: {}", e))
    })?;

    tx.execute_batch(BLOCK_DDL)
        .map_err(|e| EtlError::Persistence(format!("Failed to create block tables: {}", e)))?;
    info!(target: "chainetl::schema", "Block related tables created.");

    tx.execute_batch(TRANSACTION_DDL).map_err(|e| {
        EtlError::Persistence(format!("Failed to create transaction tables: {}", e))
    })?;
    info!(target: "chainetl::schema", "Transaction related tables created.");

    tx.commit()
        .map_err(|e| EtlError::Persistence(format!("Failed to commit schema: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn test_creates_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let names = table_names(&conn);
        for table in BLOCK_TABLES.iter().chain(TRANSACTION_TABLES.iter()) {
            assert!(names.iter().any(|n| n == table), "missing table {}", table);
        }
    }

    #[test]
    fn test_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(table_names(&conn).len(), BLOCK_TABLES.len() + TRANSACTION_TABLES.len());
    }

    #[test]
    fn test_known_tables() {
        assert!(is_known_table("witnesses"));
        assert!(!is_known_table("sqlite_master"));
        assert!(!is_known_table("blocks; DROP TABLE blocks"));
    }
}
