#![forbid(unsafe_code)]
//! Command line entry point: bootstrap the schema, load blocks, show stored blocks

use chainetl::client::ExplorerClient;
use chainetl::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use chainetl::error::Result;
use chainetl::model::Block;
use chainetl::persistence::Database;
use chainetl::pipeline::{BlockSelector, Pipeline};
use clap::{ArgGroup, Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Database file, overriding `database.path`
    #[arg(long, global = true)]
    db: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates the database tables
    Init,
    /// Fetches one block with all its transactions and stores them
    #[command(group(ArgGroup::new("selector").args(["height", "hash", "timestamp", "latest"])))]
    Load {
        #[arg(long)]
        height: Option<u64>,
        #[arg(long)]
        hash: Option<String>,
        /// UNIX timestamp; loads the block mined closest to it
        #[arg(long, allow_negative_numbers = true)]
        timestamp: Option<i64>,
        /// Loads the chain tip (the default)
        #[arg(long)]
        latest: bool,
    },
    /// Prints a stored block
    Show {
        #[arg(long)]
        height: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "❌ Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli.config)?;
    if let Some(db) = cli.db {
        config.database.path = db;
        config.validate()?;
    }

    match cli.command {
        Commands::Init => init(&config),
        Commands::Load {
            height,
            hash,
            timestamp,
            latest: _,
        } => {
            let selector = match (height, hash, timestamp) {
                (Some(height), _, _) => BlockSelector::Height(height),
                (_, Some(hash), _) => BlockSelector::Hash(hash),
                (_, _, Some(ts)) => BlockSelector::Timestamp(ts),
                _ => BlockSelector::Latest,
            };
            load(&config, &selector)
        }
        Commands::Show { height } => show(&config, height),
    }
}

fn init(config: &Config) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    db.init_schema()?;
    println!(
        "{} {}",
        "✅ Schema ready in".bright_green(),
        config.database.path.bright_white()
    );
    Ok(())
}

fn load(config: &Config, selector: &BlockSelector) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    db.init_schema()?;
    let client = ExplorerClient::from_config(config)?;

    println!("{} {}", "⛓️  Loading".bright_cyan(), selector.to_string().bright_white());
    let summary = Pipeline::new(&client, &db, config.pagination.tx_count_check()).run(selector)?;

    println!(
        "{} block {} ({}) with {} transactions",
        "✅ Stored".bright_green().bold(),
        summary.height.to_string().bright_yellow(),
        summary.hash.dimmed(),
        summary.transactions.to_string().bright_yellow()
    );
    Ok(())
}

fn show(config: &Config, height: u64) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    let Some(block) = db.load_block(height)? else {
        println!(
            "{}",
            format!("📭 No block stored at height {}", height).yellow()
        );
        return Ok(());
    };
    let stored_txs = db.transaction_ids_at(height)?.len();

    println!("{}", block_table(&block, stored_txs));
    Ok(())
}

fn block_table(block: &Block, stored_txs: usize) -> Table {
    let extras = &block.extras;
    let mined_at = chrono::DateTime::<chrono::Utc>::from_timestamp(block.timestamp as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| block.timestamp.to_string());
    let similarity = extras
        .similarity
        .map(|s| format!("{:.4}", s))
        .unwrap_or_else(|| "-".to_string());

    let rows = vec![
        ("Hash", block.id.clone()),
        ("Previous", block.previous_block_hash.clone().unwrap_or_else(|| "-".to_string())),
        ("Mined", mined_at),
        ("Transactions", format!("{} ({} stored)", block.tx_count, stored_txs)),
        ("Size / Weight", format!("{} / {}", block.size, block.weight)),
        ("Difficulty", format!("{:.2}", block.difficulty)),
        ("Pool", format!("{} ({})", extras.pool.name, extras.pool.slug)),
        ("Reward", format!("{} sat", extras.reward)),
        ("Total fees", format!("{} sat", extras.total_fees)),
        ("Median fee", format!("{:.2} sat/vB", extras.median_fee)),
        ("Coinbase address", extras.coinbase_address.clone()),
        ("UTXO set change", extras.utxo_set_change.to_string()),
        ("Similarity", similarity),
    ];

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new(format!("Block {}", block.height))
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new(""),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label).fg(TableColor::Yellow), Cell::new(value)]);
    }
    table
}
