use std::sync::Arc;

use anyhow::{Context, Result};
use bdk_wallet::bitcoin::address::NetworkUnchecked;
use bdk_wallet::bitcoin::{Address, Amount, Network};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use wallet_account_core::chain::api::NetworkSync;
use wallet_account_core::sync::{AccountSyncState, Mode, Scope, SyncIntervals, SystemClock};
use wallet_account_core::tx::{Receiver, SelectionOrder, UnspentOutput};
use wallet_account_core::{
    open_wallet, AccountSyncCoordinator, ElectrumBackend, SpendRequest, SyncMode, SyncReport,
    UnsignedTransaction, UnsignedTransactionBuilder, WalletConfig,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Overrides BITCOIN_NETWORK.
    #[arg(long, global = true)]
    network: Option<Network>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an unsigned transaction from a JSON description and print it.
    Plan {
        #[arg(long)]
        input: String,
    },
    /// Run one throttled sync of a descriptor wallet against Electrum.
    Sync {
        #[arg(long)]
        descriptor: String,

        #[arg(long)]
        change_descriptor: Option<String>,

        #[arg(long, value_enum, default_value_t = CliMode::Normal)]
        mode: CliMode,

        /// Ignore the sync interval.
        #[arg(long)]
        force: bool,

        /// Overrides ELECTRUM_URL.
        #[arg(long)]
        electrum_url: Option<String>,

        /// Overrides WALLET_DB_PATH.
        #[arg(long)]
        db_path: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliMode {
    OneAddress,
    Fast,
    Normal,
    Full,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::OneAddress => Mode::OneAddress,
            CliMode::Fast => Mode::FastSync,
            CliMode::Normal => Mode::NormalSync,
            CliMode::Full => Mode::FullSync,
        }
    }
}

#[derive(Deserialize)]
struct PlanInput {
    fee_per_kb: u64,
    outputs: Vec<UnspentOutput>,
    receivers: Vec<ReceiverInput>,
    change_address: String,
    #[serde(default)]
    largest_first: bool,
    min_confirmations: Option<u32>,
}

#[derive(Deserialize)]
struct ReceiverInput {
    address: String,
    amount: u64,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    txid: String,
    transaction: &'a UnsignedTransaction,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = WalletConfig::from_env();
    if let Some(network) = args.network {
        config.network = network;
    }
    SyncIntervals::install(config.sync_intervals);

    match args.command {
        Command::Plan { input } => run_plan(&config, &input),
        Command::Sync {
            descriptor,
            change_descriptor,
            mode,
            force,
            electrum_url,
            db_path,
        } => {
            if let Some(url) = electrum_url {
                config.electrum_url = url;
            }
            if let Some(path) = db_path {
                config.db_path = path;
            }
            let mode = SyncMode::new(mode.into(), Scope::CurrentAccount, force);
            run_sync(&config, descriptor, change_descriptor, mode)
        }
    }
}

fn parse_address(raw: &str, network: Network) -> Result<Address> {
    raw.parse::<Address<NetworkUnchecked>>()
        .with_context(|| format!("invalid address {}", raw))?
        .require_network(network)
        .with_context(|| format!("address {} is not for {}", raw, network))
}

fn run_plan(config: &WalletConfig, path: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let input: PlanInput = serde_json::from_str(&raw).context("parsing plan input")?;

    let receivers = input
        .receivers
        .iter()
        .map(|r| {
            parse_address(&r.address, config.network)
                .map(|address| Receiver::to_address(&address, Amount::from_sat(r.amount)))
        })
        .collect::<Result<Vec<_>>>()?;
    let change = parse_address(&input.change_address, config.network)?.script_pubkey();

    let order = if input.largest_first {
        SelectionOrder::LargestFirst
    } else {
        SelectionOrder::AsGiven
    };
    let builder = UnsignedTransactionBuilder::new(config.params())
        .with_order(order)
        .with_min_confirmations(input.min_confirmations.unwrap_or(config.min_confirmations));

    let request = SpendRequest::new(receivers, Amount::from_sat(input.fee_per_kb));
    let tx = builder.build(&input.outputs, &request, &change)?;

    let output = PlanOutput {
        txid: tx.to_transaction().compute_txid().to_string(),
        transaction: &tx,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_sync(
    config: &WalletConfig,
    descriptor: String,
    change_descriptor: Option<String>,
    mode: SyncMode,
) -> Result<()> {
    println!("[SYNC] Opening wallet at {}", config.db_path);
    let (wallet, db) =
        open_wallet(descriptor, change_descriptor, config.network, &config.db_path)?;
    let backend = Arc::new(ElectrumBackend::connect(wallet, db, &config.electrum_url)?);

    let state_path = format!("{}.sync.json", config.db_path);
    let coordinator = AccountSyncCoordinator::new("default", Arc::new(SystemClock))
        .restore(load_state(&state_path));
    let report = coordinator.synchronize(&mode, |m| backend.sync_account("default", m))?;
    std::fs::write(&state_path, serde_json::to_vec(&coordinator.state())?)
        .with_context(|| format!("writing {}", state_path))?;

    let builder = UnsignedTransactionBuilder::new(config.params())
        .with_min_confirmations(config.min_confirmations);
    let outputs = backend.local_outputs();
    let fee = config.params().default_fee_per_kb;

    println!("-----------------------------------");
    match report {
        SyncReport::Skipped => println!("Sync:             skipped (throttled)"),
        SyncReport::Synchronized(outcome) => {
            println!("Tip height:       {:?}", outcome.tip_height);
            println!("New txs:          {}", outcome.new_transactions);
        }
    }
    println!("Total Balance:    {} sats", backend.balance().total().to_sat());
    println!("Unspent outputs:  {}", outputs.len());
    println!(
        "Max spendable:    {} sats (at {} sat/kB)",
        builder.max_spendable(&outputs, fee, |_| true).to_sat(),
        fee.to_sat()
    );
    println!("-----------------------------------");
    Ok(())
}

/// Last-sync table from a previous run; a missing or unreadable file means
/// never synced.
fn load_state(path: &str) -> AccountSyncState {
    std::fs::read(path)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .unwrap_or_default()
}
