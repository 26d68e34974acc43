//! SQLite persistence for extracted blocks and transactions
//!
//! Every write runs inside one `rusqlite::Transaction`. Parents are upserted by
//! primary key so their children survive, then each child collection is
//! replaced as a set. If anything fails the transaction is dropped uncommitted
//! and SQLite rolls it back.

use crate::error::{EtlError, Result};
use crate::model::{Block, Extras, Pool, Status, Transaction, TxInput, TxOutput};
use crate::schema;
use rusqlite::types::FromSql;
use rusqlite::{params, Connection, Params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database file with foreign-key enforcement on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            EtlError::Persistence(format!("Failed to open database {}: {}", path.display(), e))
        })?;
        debug!(target: "chainetl::db", path = %path.display(), "database opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EtlError::Persistence(format!("Failed to open database: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(|e| {
            EtlError::Persistence(format!("Failed to enable foreign keys: {}", e))
        })?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EtlError::Persistence("Mutex poisoned".to_string()))
    }

    /// Creates all tables that don't exist yet.
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::create_tables(&conn)
    }

    /// Writes a block with its extras, fee range, coinbase addresses, pool and
    /// miners as one unit.
    pub fn save_block(&self, block: &Block) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| {
            EtlError::Persistence(format!("Failed to start transaction: {}", e))
        })?;

        if let Err(err) = write_block(&tx, block) {
            error!(
                target: "chainetl::db",
                height = block.height,
                error = %err,
                "block write failed, rolling back"
            );
            return Err(err);
        }

        tx.commit()
            .map_err(|e| EtlError::Persistence(format!("Failed to commit block: {}", e)))?;
        info!(target: "chainetl::db", "Block at height {} inserted.", block.height);
        Ok(())
    }

    /// Writes a transaction with its inputs, outputs and witnesses as one unit.
    /// The block at `status.block_height` must already be stored.
    pub fn save_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| {
            EtlError::Persistence(format!("Failed to start transaction: {}", e))
        })?;

        if let Err(err) = write_transaction(&tx, transaction) {
            error!(
                target: "chainetl::db",
                tx_id = %transaction.tx_id,
                error = %err,
                "transaction write failed, rolling back"
            );
            return Err(err);
        }

        tx.commit().map_err(|e| {
            EtlError::Persistence(format!("Failed to commit transaction: {}", e))
        })?;
        debug!(target: "chainetl::db", tx_id = %transaction.tx_id, "transaction inserted");
        Ok(())
    }

    pub fn load_block(&self, height: u64) -> Result<Option<Block>> {
        let conn = self.lock()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocks WHERE height = ?1)",
            params![height],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }

        read_block(&conn, height).map(Some).map_err(|e| {
            EtlError::Persistence(format!("Failed to load block at height {}: {}", height, e))
        })
    }

    pub fn load_transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        let conn = self.lock()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE tx_id = ?1)",
            params![tx_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }

        read_transaction(&conn, tx_id).map(Some).map_err(|e| {
            EtlError::Persistence(format!("Failed to load transaction {}: {}", tx_id, e))
        })
    }

    /// Stored transaction ids of a block, in the order they were first written.
    pub fn transaction_ids_at(&self, height: u64) -> Result<Vec<String>> {
        let conn = self.lock()?;
        Ok(query_column(
            &conn,
            "SELECT tx_id FROM transactions WHERE block_height = ?1 ORDER BY rowid",
            params![height],
        )?)
    }

    /// Deletes a block; its child rows and transactions go with it.
    /// Returns whether a block was stored at that height.
    pub fn delete_block(&self, height: u64) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM blocks WHERE height = ?1", params![height])
            .map_err(|e| EtlError::Persistence(format!("Failed to delete block: {}", e)))?;
        if deleted > 0 {
            info!(target: "chainetl::db", "Block at height {} deleted.", height);
        }
        Ok(deleted > 0)
    }

    pub fn count_rows(&self, table: &str) -> Result<u64> {
        if !schema::is_known_table(table) {
            return Err(EtlError::Persistence(format!("Unknown table: {}", table)));
        }
        let conn = self.lock()?;
        let count: u64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

fn write_block(tx: &rusqlite::Transaction<'_>, block: &Block) -> Result<()> {
    let height = block.height;

    tx.execute(
        "INSERT INTO blocks (height, id, version, timestamp, bits, nonce, difficulty,
                             merkle_root, tx_count, size, weight, previous_block_hash, median_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(height) DO UPDATE SET
            id = excluded.id,
            version = excluded.version,
            timestamp = excluded.timestamp,
            bits = excluded.bits,
            nonce = excluded.nonce,
            difficulty = excluded.difficulty,
            merkle_root = excluded.merkle_root,
            tx_count = excluded.tx_count,
            size = excluded.size,
            weight = excluded.weight,
            previous_block_hash = excluded.previous_block_hash,
            median_time = excluded.median_time",
        params![
            height,
            block.id,
            block.version,
            block.timestamp,
            block.bits,
            block.nonce,
            block.difficulty,
            block.merkle_root,
            block.tx_count,
            block.size,
            block.weight,
            block.previous_block_hash,
            block.median_time,
        ],
    )
    .map_err(|e| EtlError::Persistence(format!("Failed to save block: {}", e)))?;

    write_extras(tx, height, &block.extras)?;

    tx.execute("DELETE FROM fee_range WHERE height = ?1", params![height])?;
    for (position, fee) in block.extras.fee_range.iter().enumerate() {
        tx.execute(
            "INSERT INTO fee_range (height, position, fee) VALUES (?1, ?2, ?3)",
            params![height, position, fee],
        )
        .map_err(|e| EtlError::Persistence(format!("Failed to save fee range: {}", e)))?;
    }

    tx.execute("DELETE FROM coinbase_addresses WHERE height = ?1", params![height])?;
    for (position, address) in block.extras.coinbase_addresses.iter().enumerate() {
        tx.execute(
            "INSERT INTO coinbase_addresses (height, position, address) VALUES (?1, ?2, ?3)",
            params![height, position, address],
        )
        .map_err(|e| {
            EtlError::Persistence(format!("Failed to save coinbase address: {}", e))
        })?;
    }

    write_pool(tx, height, &block.extras.pool)
}

fn write_extras(tx: &rusqlite::Transaction<'_>, height: u64, extras: &Extras) -> Result<()> {
    tx.execute(
        "INSERT INTO extras (height, header, reward, median_fee, total_fees, avg_fee, avg_fee_rate,
                             coinbase_raw, coinbase_address, coinbase_signature, utxo_set_change,
                             avg_tx_size, total_inputs, total_outputs, total_output_amt,
                             segwit_total_txs, segwit_total_size, segwit_total_weight,
                             virtual_size, similarity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
         ON CONFLICT(height) DO UPDATE SET
            header = excluded.header,
            reward = excluded.reward,
            median_fee = excluded.median_fee,
            total_fees = excluded.total_fees,
            avg_fee = excluded.avg_fee,
            avg_fee_rate = excluded.avg_fee_rate,
            coinbase_raw = excluded.coinbase_raw,
            coinbase_address = excluded.coinbase_address,
            coinbase_signature = excluded.coinbase_signature,
            utxo_set_change = excluded.utxo_set_change,
            avg_tx_size = excluded.avg_tx_size,
            total_inputs = excluded.total_inputs,
            total_outputs = excluded.total_outputs,
            total_output_amt = excluded.total_output_amt,
            segwit_total_txs = excluded.segwit_total_txs,
            segwit_total_size = excluded.segwit_total_size,
            segwit_total_weight = excluded.segwit_total_weight,
            virtual_size = excluded.virtual_size,
            similarity = excluded.similarity",
        params![
            height,
            extras.header,
            extras.reward,
            extras.median_fee,
            extras.total_fees,
            extras.avg_fee,
            extras.avg_fee_rate,
            extras.coinbase_raw,
            extras.coinbase_address,
            extras.coinbase_signature,
            extras.utxo_set_change,
            extras.avg_tx_size,
            extras.total_inputs,
            extras.total_outputs,
            extras.total_output_amt,
            extras.segwit_total_txs,
            extras.segwit_total_size,
            extras.segwit_total_weight,
            extras.virtual_size,
            extras.similarity,
        ],
    )
    .map_err(|e| EtlError::Persistence(format!("Failed to save extras: {}", e)))?;
    Ok(())
}

fn write_pool(tx: &rusqlite::Transaction<'_>, height: u64, pool: &Pool) -> Result<()> {
    tx.execute(
        "INSERT INTO pools (height, id, name, slug, miner_names_known)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(height) DO UPDATE SET
            id = excluded.id,
            name = excluded.name,
            slug = excluded.slug,
            miner_names_known = excluded.miner_names_known",
        params![
            height,
            pool.id,
            pool.name,
            pool.slug,
            pool.miner_names.is_some()
        ],
    )
    .map_err(|e| EtlError::Persistence(format!("Failed to save pool: {}", e)))?;

    tx.execute("DELETE FROM miners WHERE height = ?1", params![height])?;
    for (position, name) in pool.miner_names.iter().flatten().enumerate() {
        tx.execute(
            "INSERT INTO miners (height, position, name) VALUES (?1, ?2, ?3)",
            params![height, position, name],
        )
        .map_err(|e| EtlError::Persistence(format!("Failed to save miner: {}", e)))?;
    }
    Ok(())
}

fn write_transaction(tx: &rusqlite::Transaction<'_>, transaction: &Transaction) -> Result<()> {
    let tx_id = &transaction.tx_id;
    let status = &transaction.status;

    tx.execute(
        "INSERT INTO transactions (tx_id, block_height, block_hash, block_time, confirmed,
                                   v_size, fee_per_vsize, effective_fee_per_vsize, version,
                                   lock_time, size, weight, fee)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(tx_id) DO UPDATE SET
            block_height = excluded.block_height,
            block_hash = excluded.block_hash,
            block_time = excluded.block_time,
            confirmed = excluded.confirmed,
            v_size = excluded.v_size,
            fee_per_vsize = excluded.fee_per_vsize,
            effective_fee_per_vsize = excluded.effective_fee_per_vsize,
            version = excluded.version,
            lock_time = excluded.lock_time,
            size = excluded.size,
            weight = excluded.weight,
            fee = excluded.fee",
        params![
            tx_id,
            status.block_height,
            status.block_hash,
            status.block_time,
            status.confirmed,
            transaction.v_size,
            transaction.fee_per_vsize,
            transaction.effective_fee_per_vsize,
            transaction.version,
            transaction.lock_time,
            transaction.size,
            transaction.weight,
            transaction.fee,
        ],
    )
    .map_err(|e| EtlError::Persistence(format!("Failed to save transaction {}: {}", tx_id, e)))?;

    tx.execute("DELETE FROM tx_outputs WHERE tx_id = ?1", params![tx_id])?;
    for (index, output) in transaction.v_out.iter().enumerate() {
        tx.execute(
            "INSERT INTO tx_outputs (tx_id, v_out_index, script_pubkey, script_pubkey_asm,
                                     script_pubkey_type, script_pubkey_address, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tx_id,
                index,
                output.script_pubkey,
                output.script_pubkey_asm,
                output.script_pubkey_type,
                output.script_pubkey_address,
                output.value,
            ],
        )
        .map_err(|e| EtlError::Persistence(format!("Failed to save output: {}", e)))?;
    }

    tx.execute("DELETE FROM tx_inputs WHERE tx_id = ?1", params![tx_id])?;
    tx.execute("DELETE FROM witnesses WHERE tx_id = ?1", params![tx_id])?;
    for (index, input) in transaction.v_in.iter().enumerate() {
        let prev_out = input.prev_out.as_ref();
        tx.execute(
            "INSERT INTO tx_inputs (tx_id, v_in_index, prev_tx_id, v_out_index, script_sig,
                                    script_sig_asm, is_coinbase, sequence,
                                    inner_redeem_script_asm, inner_witness_script_asm,
                                    prevout_script_pubkey, prevout_script_pubkey_asm,
                                    prevout_script_pubkey_type, prevout_script_pubkey_address,
                                    prevout_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                tx_id,
                index,
                input.prev_tx_id,
                input.v_out,
                input.script_sig,
                input.script_sig_asm,
                input.is_coinbase,
                input.sequence,
                input.inner_redeem_script_asm,
                input.inner_witness_script_asm,
                prev_out.map(|o| o.script_pubkey.as_str()),
                prev_out.map(|o| o.script_pubkey_asm.as_str()),
                prev_out.map(|o| o.script_pubkey_type.as_str()),
                prev_out.and_then(|o| o.script_pubkey_address.as_deref()),
                prev_out.map(|o| o.value),
            ],
        )
        .map_err(|e| EtlError::Persistence(format!("Failed to save input: {}", e)))?;

        for (witness_index, witness) in input.witness.iter().enumerate() {
            tx.execute(
                "INSERT INTO witnesses (tx_id, v_in_index, witness_index, witness)
                 VALUES (?1, ?2, ?3, ?4)",
                params![tx_id, index, witness_index, witness],
            )
            .map_err(|e| EtlError::Persistence(format!("Failed to save witness: {}", e)))?;
        }
    }
    Ok(())
}

/// Collects the first column of every row.
fn query_column<T: FromSql, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get(0))?;
    let mut values = Vec::new();
    for value in rows {
        values.push(value?);
    }
    Ok(values)
}

fn read_block(conn: &Connection, height: u64) -> rusqlite::Result<Block> {
    let fee_range: Vec<f64> = query_column(
        conn,
        "SELECT fee FROM fee_range WHERE height = ?1 ORDER BY position",
        params![height],
    )?;
    let coinbase_addresses: Vec<String> = query_column(
        conn,
        "SELECT address FROM coinbase_addresses WHERE height = ?1 ORDER BY position",
        params![height],
    )?;
    let miners: Vec<String> = query_column(
        conn,
        "SELECT name FROM miners WHERE height = ?1 ORDER BY position",
        params![height],
    )?;

    let pool = conn.query_row(
        "SELECT id, name, slug, miner_names_known FROM pools WHERE height = ?1",
        params![height],
        move |row| {
            let known: bool = row.get(3)?;
            Ok(Pool {
                id: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
                miner_names: if known { Some(miners) } else { None },
            })
        },
    )?;

    let extras = conn.query_row(
        "SELECT header, reward, median_fee, total_fees, avg_fee, avg_fee_rate, coinbase_raw,
                coinbase_address, coinbase_signature, utxo_set_change, avg_tx_size,
                total_inputs, total_outputs, total_output_amt, segwit_total_txs,
                segwit_total_size, segwit_total_weight, virtual_size, similarity
         FROM extras WHERE height = ?1",
        params![height],
        move |row| {
            Ok(Extras {
                header: row.get(0)?,
                reward: row.get(1)?,
                median_fee: row.get(2)?,
                fee_range,
                total_fees: row.get(3)?,
                avg_fee: row.get(4)?,
                avg_fee_rate: row.get(5)?,
                coinbase_raw: row.get(6)?,
                coinbase_address: row.get(7)?,
                coinbase_addresses,
                coinbase_signature: row.get(8)?,
                utxo_set_change: row.get(9)?,
                avg_tx_size: row.get(10)?,
                total_inputs: row.get(11)?,
                total_outputs: row.get(12)?,
                total_output_amt: row.get(13)?,
                segwit_total_txs: row.get(14)?,
                segwit_total_size: row.get(15)?,
                segwit_total_weight: row.get(16)?,
                virtual_size: row.get(17)?,
                pool,
                similarity: row.get(18)?,
            })
        },
    )?;

    conn.query_row(
        "SELECT id, height, version, timestamp, bits, nonce, difficulty, merkle_root, tx_count,
                size, weight, previous_block_hash, median_time
         FROM blocks WHERE height = ?1",
        params![height],
        move |row| {
            Ok(Block {
                id: row.get(0)?,
                height: row.get(1)?,
                version: row.get(2)?,
                timestamp: row.get(3)?,
                bits: row.get(4)?,
                nonce: row.get(5)?,
                difficulty: row.get(6)?,
                merkle_root: row.get(7)?,
                tx_count: row.get(8)?,
                size: row.get(9)?,
                weight: row.get(10)?,
                previous_block_hash: row.get(11)?,
                median_time: row.get(12)?,
                extras,
            })
        },
    )
}

fn read_transaction(conn: &Connection, tx_id: &str) -> rusqlite::Result<Transaction> {
    let v_out = read_outputs(conn, tx_id)?;
    let mut v_in = read_inputs(conn, tx_id)?;

    let mut stmt = conn.prepare(
        "SELECT v_in_index, witness FROM witnesses WHERE tx_id = ?1
         ORDER BY v_in_index, witness_index",
    )?;
    let rows = stmt.query_map(params![tx_id], |row| {
        Ok((row.get::<_, usize>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (index, witness) = row?;
        match v_in.get_mut(index) {
            Some(input) => input.witness.push(witness),
            None => return Err(rusqlite::Error::IntegralValueOutOfRange(0, index as i64)),
        }
    }

    conn.query_row(
        "SELECT tx_id, block_height, block_hash, block_time, confirmed, v_size, fee_per_vsize,
                effective_fee_per_vsize, version, lock_time, size, weight, fee
         FROM transactions WHERE tx_id = ?1",
        params![tx_id],
        move |row| {
            Ok(Transaction {
                tx_id: row.get(0)?,
                v_size: row.get(5)?,
                fee_per_vsize: row.get(6)?,
                effective_fee_per_vsize: row.get(7)?,
                version: row.get(8)?,
                lock_time: row.get(9)?,
                v_in,
                v_out,
                size: row.get(10)?,
                weight: row.get(11)?,
                fee: row.get(12)?,
                status: Status {
                    confirmed: row.get(4)?,
                    block_height: row.get(1)?,
                    block_hash: row.get(2)?,
                    block_time: row.get(3)?,
                },
            })
        },
    )
}

fn read_outputs(conn: &Connection, tx_id: &str) -> rusqlite::Result<Vec<TxOutput>> {
    let mut stmt = conn.prepare(
        "SELECT script_pubkey, script_pubkey_asm, script_pubkey_type, script_pubkey_address, value
         FROM tx_outputs WHERE tx_id = ?1 ORDER BY v_out_index",
    )?;
    let rows = stmt.query_map(params![tx_id], |row| {
        Ok(TxOutput {
            script_pubkey: row.get(0)?,
            script_pubkey_asm: row.get(1)?,
            script_pubkey_type: row.get(2)?,
            script_pubkey_address: row.get(3)?,
            value: row.get(4)?,
        })
    })?;
    let mut outputs = Vec::new();
    for output in rows {
        outputs.push(output?);
    }
    Ok(outputs)
}

fn read_inputs(conn: &Connection, tx_id: &str) -> rusqlite::Result<Vec<TxInput>> {
    let mut stmt = conn.prepare(
        "SELECT prev_tx_id, v_out_index, script_sig, script_sig_asm, is_coinbase, sequence,
                inner_redeem_script_asm, inner_witness_script_asm,
                prevout_script_pubkey, prevout_script_pubkey_asm, prevout_script_pubkey_type,
                prevout_script_pubkey_address, prevout_value
         FROM tx_inputs WHERE tx_id = ?1 ORDER BY v_in_index",
    )?;
    let rows = stmt.query_map(params![tx_id], |row| {
        let prev_out = match row.get::<_, Option<String>>(8)? {
            Some(script_pubkey) => Some(TxOutput {
                script_pubkey,
                script_pubkey_asm: row.get(9)?,
                script_pubkey_type: row.get(10)?,
                script_pubkey_address: row.get(11)?,
                value: row.get(12)?,
            }),
            None => None,
        };
        Ok(TxInput {
            prev_tx_id: row.get(0)?,
            v_out: row.get(1)?,
            prev_out,
            script_sig: row.get(2)?,
            script_sig_asm: row.get(3)?,
            witness: Vec::new(),
            is_coinbase: row.get(4)?,
            sequence: row.get(5)?,
            inner_redeem_script_asm: row.get(6)?,
            inner_witness_script_asm: row.get(7)?,
        })
    })?;
    let mut inputs = Vec::new();
    for input in rows {
        inputs.push(input?);
    }
    Ok(inputs)
}
