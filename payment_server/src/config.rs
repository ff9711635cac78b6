//! Server configuration.
//!
//! Everything is read from `OPG_`-prefixed environment variables with logged fallbacks.
//! A malformed value never aborts startup; the default is used and the problem is logged.
use std::{env, time::Duration};

use log::*;
use opg_common::{parse_boolean_flag, Secret};
use payment_engine::{db_types::WalletAddress, exchange::TokenRegistry, RetryPolicy};

const DEFAULT_OPG_HOST: &str = "127.0.0.1";
const DEFAULT_OPG_PORT: u16 = 8360;
const DEFAULT_NODE_URL: &str = "http://127.0.0.1:18142";
const DEFAULT_MIN_CONFIRMATIONS: u64 = 3;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// JSON-RPC endpoint of the blockchain node.
    pub node_url: String,
    /// Address of the payment contract whose events settle orders.
    pub payment_contract: WalletAddress,
    /// Address of the receipt contract that mints proof-of-purchase tokens.
    pub receipt_contract: WalletAddress,
    pub min_confirmations: u64,
    /// How often the payment event subscription polls the node.
    pub poll_interval: Duration,
    pub retry_policy: RetryPolicy,
    /// HTTP content store for receipt metadata. `None` selects the process-local store.
    pub storage_url: Option<String>,
    /// Bearer token for the content store's pinning API.
    pub storage_api_key: Option<Secret<String>>,
    /// When true, orders settle but no receipt tokens are minted.
    pub disable_receipts: bool,
    pub tokens: TokenRegistry,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OPG_HOST.to_string(),
            port: DEFAULT_OPG_PORT,
            database_url: String::default(),
            node_url: DEFAULT_NODE_URL.to_string(),
            payment_contract: WalletAddress::from(""),
            receipt_contract: WalletAddress::from(""),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_policy: RetryPolicy::default(),
            storage_url: None,
            storage_api_key: None,
            disable_receipts: false,
            tokens: TokenRegistry::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("OPG_HOST").ok().unwrap_or_else(|| DEFAULT_OPG_HOST.into());
        let port = env::var("OPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for OPG_PORT. {e} Using the default, {DEFAULT_OPG_PORT}, instead."
                    );
                    DEFAULT_OPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_OPG_PORT);
        let database_url = env::var("OPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ OPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let node_url = env::var("OPG_NODE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ OPG_NODE_URL is not set. Using the default, {DEFAULT_NODE_URL}.");
            DEFAULT_NODE_URL.to_string()
        });
        let payment_contract = required_address("OPG_PAYMENT_CONTRACT");
        let receipt_contract = required_address("OPG_RECEIPT_CONTRACT");
        let min_confirmations = parse_var("OPG_MIN_CONFIRMATIONS", DEFAULT_MIN_CONFIRMATIONS);
        let poll_interval =
            Duration::from_secs(parse_var("OPG_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL.as_secs()));
        let retry_policy = retry_policy_from_env();
        let storage_url = env::var("OPG_STORAGE_URL").ok().filter(|s| !s.is_empty());
        if storage_url.is_none() {
            info!("🪛️ OPG_STORAGE_URL is not set. Receipt metadata will be kept in the process-local store.");
        }
        let storage_api_key = env::var("OPG_STORAGE_API_KEY").ok().filter(|s| !s.is_empty()).map(Secret::new);
        if storage_api_key.is_some() && storage_url.is_none() {
            warn!("🪛️ OPG_STORAGE_API_KEY is set, but OPG_STORAGE_URL is not. The key will not be used.");
        }
        let disable_receipts = parse_boolean_flag(env::var("OPG_DISABLE_RECEIPTS").ok(), false);
        if disable_receipts {
            warn!("🪛️ Receipt issuance is disabled. Orders will settle, but no receipt tokens will be minted.");
        }
        let tokens = token_registry_from_env();
        Self {
            host,
            port,
            database_url,
            node_url,
            payment_contract,
            receipt_contract,
            min_confirmations,
            poll_interval,
            retry_policy,
            storage_url,
            storage_api_key,
            disable_receipts,
            tokens,
        }
    }
}

fn required_address(var: &str) -> WalletAddress {
    let value = env::var(var).ok().unwrap_or_else(|| {
        error!("🪛️ {var} is not set. Please set it to the relevant contract address.");
        String::default()
    });
    WalletAddress::from(value)
}

fn parse_var<T: std::str::FromStr + std::fmt::Display>(var: &str, default: T) -> T
where T::Err: std::fmt::Display {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid value for {var} ({s}): {e}. Using the default, {default}.");
            default
        }),
        Err(_) => {
            info!("🪛️ {var} is not set. Using the default, {default}.");
            default
        },
    }
}

fn retry_policy_from_env() -> RetryPolicy {
    let defaults = RetryPolicy::default();
    let max_attempts = parse_var("OPG_RETRY_MAX_ATTEMPTS", defaults.max_attempts);
    let initial_delay =
        Duration::from_millis(parse_var("OPG_RETRY_INITIAL_DELAY_MS", defaults.initial_delay.as_millis() as u64));
    RetryPolicy { max_attempts, initial_delay, ..defaults }
}

/// `OPG_TOKEN_DECIMALS` holds comma-separated `address:decimals` pairs, e.g.
/// `native:18,0xa1b2:6`. Unknown tokens fall back to the registry default.
fn token_registry_from_env() -> TokenRegistry {
    let mut registry = TokenRegistry::default();
    let Ok(entries) = env::var("OPG_TOKEN_DECIMALS") else {
        return registry;
    };
    for pair in entries.split(',').filter(|p| !p.trim().is_empty()) {
        match pair.split_once(':').map(|(addr, dec)| (addr.trim(), dec.trim().parse::<u8>())) {
            Some((addr, Ok(decimals))) => {
                registry = registry.with_token(addr.into(), decimals);
            },
            _ => warn!("🪛️ Ignoring malformed entry ({pair}) in OPG_TOKEN_DECIMALS."),
        }
    }
    registry
}
