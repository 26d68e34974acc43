use chainetl::client::ExplorerClient;
use chainetl::endpoint::{ApiBase, BlockHash, Endpoint};
use chainetl::error::EtlError;
use chainetl::model::{Block, Transaction};
use chainetl::pagination::TxCountCheck;
use chainetl::persistence::Database;
use chainetl::pipeline::{BlockSelector, Pipeline};
use chainetl::retry::{Backoff, RetryPolicy, Sleeper};
use chainetl::transport::{Reply, ScriptedTransport};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const BLOCK_JSON: &str = include_str!("fixtures/block.json");
const TX_JSON: &str = include_str!("fixtures/transaction.json");
const COINBASE_JSON: &str = include_str!("fixtures/coinbase_transaction.json");
const HASH: &str = "000000000000000000010538edbfd2d5b809a33dd83f284aeea41c6d0d96968a";

#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

fn hash() -> BlockHash {
    BlockHash::parse(HASH).unwrap()
}

/// A block of 23 transactions: the coinbase followed by 22 spends.
fn chain_transactions() -> Vec<Value> {
    let coinbase: Value = serde_json::from_str(COINBASE_JSON).unwrap();
    let template: Value = serde_json::from_str(TX_JSON).unwrap();
    let mut txs = vec![coinbase];
    for n in 1..23 {
        let mut tx = template.clone();
        tx["txid"] = json!(format!("{:064x}", n));
        txs.push(tx);
    }
    txs
}

fn scripted_explorer() -> ScriptedTransport {
    let transport = ScriptedTransport::new(ApiBase::parse("http://explorer.test/api").unwrap());
    let mut block: Value = serde_json::from_str(BLOCK_JSON).unwrap();
    block["tx_count"] = json!(23);

    transport
        .on_text(&Endpoint::BlockHashByHeight { height: 900_000 }, &format!("{}\n", HASH))
        .unwrap();
    transport
        .on_json(&Endpoint::BlockByHash { hash: hash() }, &block)
        .unwrap();

    let txs = chain_transactions();
    for (page, chunk) in txs.chunks(10).enumerate() {
        transport
            .on_json(
                &Endpoint::TxsPage {
                    hash: hash(),
                    offset: page as u64 * 10,
                },
                &Value::Array(chunk.to_vec()),
            )
            .unwrap();
    }
    transport
}

fn client(
    transport: &ScriptedTransport,
    sleeper: Arc<RecordingSleeper>,
) -> ExplorerClient<&ScriptedTransport> {
    let policy = RetryPolicy::new(3, Backoff::default()).with_sleeper(sleeper);
    ExplorerClient::new(transport, transport.base().clone(), policy)
}

fn temp_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("bitcoin_etl.db")).unwrap();
    db.init_schema().unwrap();
    (dir, db)
}

#[test]
fn test_loads_block_with_all_pages() {
    let transport = scripted_explorer();
    let client = client(&transport, Arc::default());
    let (_dir, db) = temp_db();

    let summary = Pipeline::new(&client, &db, TxCountCheck::Strict)
        .run(&BlockSelector::Height(900_000))
        .unwrap();

    assert_eq!(summary.height, 900_000);
    assert_eq!(summary.hash, HASH);
    assert_eq!(summary.transactions, 23);

    let page_requests: Vec<String> = transport
        .requests()
        .into_iter()
        .filter(|url| url.contains("/txs/"))
        .collect();
    assert_eq!(page_requests.len(), 3);

    let expected_ids: Vec<String> = chain_transactions()
        .iter()
        .map(|tx| tx["txid"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(db.transaction_ids_at(900_000).unwrap(), expected_ids);
    assert_eq!(db.count_rows("transactions").unwrap(), 23);
    // the coinbase has one input, every spend has two
    assert_eq!(db.count_rows("tx_inputs").unwrap(), 1 + 22 * 2);
}

#[test]
fn test_round_trip_through_file_database() {
    let transport = scripted_explorer();
    let client = client(&transport, Arc::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bitcoin_etl.db");

    {
        let db = Database::open(&path).unwrap();
        db.init_schema().unwrap();
        Pipeline::new(&client, &db, TxCountCheck::Warn)
            .run(&BlockSelector::Hash(HASH.to_string()))
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let mut expected_block = Block::from_json(BLOCK_JSON).unwrap();
    expected_block.tx_count = 23;
    assert_eq!(db.load_block(900_000).unwrap().unwrap(), expected_block);

    for value in chain_transactions() {
        let expected = Transaction::from_value(value).unwrap();
        let stored = db.load_transaction(&expected.tx_id).unwrap().unwrap();
        assert_eq!(stored, expected);
    }
}

#[test]
fn test_reloading_is_idempotent() {
    let transport = scripted_explorer();
    let client = client(&transport, Arc::default());
    let (_dir, db) = temp_db();
    let pipeline = Pipeline::new(&client, &db, TxCountCheck::Strict);

    pipeline.run(&BlockSelector::Height(900_000)).unwrap();
    let tables = ["blocks", "extras", "fee_range", "pools", "transactions", "tx_inputs", "witnesses"];
    let before: Vec<u64> = tables.iter().map(|t| db.count_rows(t).unwrap()).collect();

    pipeline.run(&BlockSelector::Height(900_000)).unwrap();
    let after: Vec<u64> = tables.iter().map(|t| db.count_rows(t).unwrap()).collect();

    assert_eq!(before, after);
}

#[test]
fn test_transient_failures_are_retried_with_backoff() {
    // two failures queued ahead of the real block body
    let flaky = ScriptedTransport::new(ApiBase::parse("http://explorer.test/api/").unwrap());
    let block: Value = serde_json::from_str(BLOCK_JSON).unwrap();
    flaky.on(&Endpoint::BlockByHash { hash: hash() }, Reply::Status(503)).unwrap();
    flaky.on(&Endpoint::BlockByHash { hash: hash() }, Reply::Timeout).unwrap();
    flaky.on_json(&Endpoint::BlockByHash { hash: hash() }, &block).unwrap();
    flaky
        .on_json(
            &Endpoint::TxsPage { hash: hash(), offset: 0 },
            &Value::Array(chain_transactions()[..3].to_vec()),
        )
        .unwrap();

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&flaky, sleeper.clone());
    let (_dir, db) = temp_db();

    let summary = Pipeline::new(&client, &db, TxCountCheck::Strict)
        .run(&BlockSelector::Hash(HASH.to_string()))
        .unwrap();

    assert_eq!(summary.transactions, 3);
    assert_eq!(flaky.request_count(&Endpoint::BlockByHash { hash: hash() }), 3);
    assert_eq!(
        *sleeper.slept.lock().unwrap(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn test_persistent_outage_stores_nothing() {
    let outage = ScriptedTransport::new(ApiBase::parse("http://explorer.test/api/").unwrap());
    outage.on(&Endpoint::BlockByHash { hash: hash() }, Reply::Status(502)).unwrap();

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&outage, sleeper.clone());
    let (_dir, db) = temp_db();

    let err = Pipeline::new(&client, &db, TxCountCheck::Warn)
        .run(&BlockSelector::Hash(HASH.to_string()))
        .unwrap_err();

    assert!(matches!(err, EtlError::TransientNetwork { .. }));
    assert_eq!(outage.request_count(&Endpoint::BlockByHash { hash: hash() }), 3);
    assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    assert_eq!(db.count_rows("blocks").unwrap(), 0);
}

#[test]
fn test_strict_count_check_rejects_short_block() {
    let transport = ScriptedTransport::new(ApiBase::parse("http://explorer.test/api/").unwrap());
    let mut block: Value = serde_json::from_str(BLOCK_JSON).unwrap();
    block["tx_count"] = json!(5);
    transport.on_json(&Endpoint::BlockByHash { hash: hash() }, &block).unwrap();
    transport
        .on_json(
            &Endpoint::TxsPage { hash: hash(), offset: 0 },
            &Value::Array(chain_transactions()[..4].to_vec()),
        )
        .unwrap();
    let client = client(&transport, Arc::default());
    let (_dir, db) = temp_db();

    let err = Pipeline::new(&client, &db, TxCountCheck::Strict)
        .run(&BlockSelector::Hash(HASH.to_string()))
        .unwrap_err();

    assert!(matches!(err, EtlError::Validation(_)));
    // the block itself committed before paging started
    assert_eq!(db.count_rows("blocks").unwrap(), 1);
    assert_eq!(db.count_rows("transactions").unwrap(), 0);
}
