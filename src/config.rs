//! Wallet configuration.
//!
//! Network parameters (dust threshold, transaction size model) come from
//! here and are handed to the transaction builder; nothing in the selection
//! code hard-codes them.

use std::env;

use bitcoin::{Amount, Network};

use crate::sync::SyncIntervals;

pub const DEFAULT_ELECTRUM_URL: &str = "ssl://electrum.blockstream.info:60002";
pub const DEFAULT_DB_PATH: &str = "wallet_db.dat";

/// Byte-size model used for fee estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeModel {
    /// Version, input/output counts and lock time.
    pub overhead: u64,
    pub per_input: u64,
    pub per_output: u64,
}

impl SizeModel {
    /// Legacy P2PKH estimate with compressed keys.
    pub const P2PKH: SizeModel = SizeModel {
        overhead: 10,
        per_input: 148,
        per_output: 34,
    };

    pub fn estimate(&self, inputs: usize, outputs: usize) -> u64 {
        self.overhead + inputs as u64 * self.per_input + outputs as u64 * self.per_output
    }
}

/// Per-network constants the transaction builder depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,
    /// Outputs below this value are uneconomical and never created.
    pub dust_threshold: Amount,
    pub size_model: SizeModel,
    pub default_fee_per_kb: Amount,
}

impl NetworkParams {
    pub fn for_network(network: Network) -> Self {
        let default_fee_per_kb = match network {
            Network::Bitcoin => Amount::from_sat(20_000),
            _ => Amount::from_sat(1_000),
        };

        Self {
            network,
            dust_threshold: Amount::from_sat(546),
            size_model: SizeModel::P2PKH,
            default_fee_per_kb,
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::for_network(Network::Testnet)
    }
}

/// Runtime configuration, read from the environment and overridable by CLI flags.
#[derive(Clone, Debug)]
pub struct WalletConfig {
    pub network: Network,
    pub electrum_url: String,
    pub db_path: String,
    /// Outputs with fewer confirmations are not selected for spending.
    pub min_confirmations: u32,
    /// Installed as the process-wide throttle table at startup.
    pub sync_intervals: SyncIntervals,
}

impl WalletConfig {
    /// Environment variables:
    /// - `BITCOIN_NETWORK`: "testnet" (default), "signet", "regtest" or "bitcoin"
    /// - `ELECTRUM_URL`
    /// - `WALLET_DB_PATH`
    /// - `MIN_CONFIRMATIONS` (default 1)
    /// - `SYNC_INTERVALS_MS`: four comma-separated intervals for one-address,
    ///   fast, normal and full sync
    pub fn from_env() -> Self {
        let network_str = env::var("BITCOIN_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .to_lowercase();

        let network = match network_str.as_str() {
            "bitcoin" | "mainnet" => Network::Bitcoin,
            "signet" => Network::Signet,
            "regtest" => Network::Regtest,
            "testnet" | "" => Network::Testnet,
            other => {
                log::warn!("[CONFIG] Unknown network '{}', defaulting to testnet", other);
                Network::Testnet
            }
        };

        let electrum_url =
            env::var("ELECTRUM_URL").unwrap_or_else(|_| DEFAULT_ELECTRUM_URL.to_string());
        let db_path = env::var("WALLET_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        let min_confirmations = match env::var("MIN_CONFIRMATIONS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("[CONFIG] Ignoring invalid MIN_CONFIRMATIONS '{}'", raw);
                1
            }),
            Err(_) => 1,
        };

        let sync_intervals = match env::var("SYNC_INTERVALS_MS") {
            Ok(raw) => parse_intervals(&raw).unwrap_or_else(|| {
                log::warn!("[CONFIG] Ignoring invalid SYNC_INTERVALS_MS '{}'", raw);
                SyncIntervals::DEFAULT
            }),
            Err(_) => SyncIntervals::DEFAULT,
        };

        log::debug!(
            "[CONFIG] network={} electrum={} db={} min_conf={} intervals={:?}",
            network,
            electrum_url,
            db_path,
            min_confirmations,
            sync_intervals
        );

        Self {
            network,
            electrum_url,
            db_path,
            min_confirmations,
            sync_intervals,
        }
    }

    pub fn params(&self) -> NetworkParams {
        NetworkParams::for_network(self.network)
    }
}

/// Parses "one_address,fast,normal,full" in milliseconds.
pub fn parse_intervals(raw: &str) -> Option<SyncIntervals> {
    let millis = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match millis[..] {
        [one_address, fast, normal, full] => {
            Some(SyncIntervals::new(one_address, fast, normal, full))
        }
        _ => None,
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            electrum_url: DEFAULT_ELECTRUM_URL.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            min_confirmations: 1,
            sync_intervals: SyncIntervals::DEFAULT,
        }
    }
}
