use std::{path::PathBuf, time::Duration};

use alloy::primitives::{utils::parse_ether, Address, U256};
use clap::Parser;
use eyre::{eyre, WrapErr};
use reqwest::Url;
use serde::Deserialize;

use crate::{
    endpoint::Endpoint,
    pipeline::Route,
    submitter::{normalize_address, Confirmation, RetryPolicy, SubmitterConfig},
};

#[derive(Parser, Debug)]
#[command(version, about = "Generate accounts and route funds through them")]
pub struct Args {
    /// TOML run configuration
    #[arg(short, long, default_value = "fanout.toml")]
    pub config: PathBuf,

    /// Number of accounts to generate
    #[arg(short = 'n', long)]
    pub accounts: Option<String>,

    /// Pipelines allowed in flight at once
    #[arg(short, long)]
    pub workers: Option<String>,

    /// Operator private key; prompted for when absent
    #[arg(long, env = "FANOUT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcSection {
    pub probe_timeout_secs: u64,
    pub probe_attempts: u32,
    pub call_timeout_secs: u64,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            probe_attempts: 3,
            call_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    pub gas_limit: u64,
    pub min_gas_price_wei: u128,
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            gas_limit: 21_000,
            min_gas_price_wei: 10_000_000,
            attempts: 3,
            retry_delay_ms: 2_000,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySection {
    /// Operator-owned endpoint receiving completed accounts; notification is off
    /// when unset.
    pub webhook_url: Option<String>,
    pub batch_size: usize,
    pub send_key_file: bool,
    pub timeout_secs: u64,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            batch_size: 20,
            send_key_file: true,
            timeout_secs: 10,
        }
    }
}

impl NotifySection {
    fn validate(&self) -> eyre::Result<Option<NotifyConfig>> {
        let Some(raw) = self.webhook_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw.trim()).map_err(|err| eyre!("notify.webhook_url: {err}"))?;
        let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
        // batches carry private keys
        eyre::ensure!(
            url.scheme() == "https" || (url.scheme() == "http" && loopback),
            "notify.webhook_url must use https unless it points at this host"
        );
        eyre::ensure!(self.batch_size > 0, "notify.batch_size must be positive");
        Ok(Some(NotifyConfig {
            url,
            batch_size: self.batch_size,
            send_key_file: self.send_key_file,
            timeout: Duration::from_secs(self.timeout_secs),
        }))
    }
}

/// Raw file contents. Call [`FileConfig::validate`] before use.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub forward_address: Option<String>,
    pub sweep_address: Option<String>,
    /// Ether amount sent to each new account.
    pub funding_amount: String,
    pub key_file: PathBuf,
    pub rpc: RpcSection,
    pub transfer: TransferSection,
    pub notify: NotifySection,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            chain_id: 130,
            rpc_urls: vec![
                "https://unichain.api.onfinality.io/public".to_string(),
                "https://unichain-rpc.publicnode.com".to_string(),
            ],
            forward_address: None,
            sweep_address: None,
            funding_amount: "0.00001".to_string(),
            key_file: PathBuf::from("generated_keys.txt"),
            rpc: RpcSection::default(),
            transfer: TransferSection::default(),
            notify: NotifySection::default(),
        }
    }
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: u64,
    pub endpoints: Vec<Endpoint>,
    pub call_timeout: Duration,
    pub forward_to: Address,
    pub sweep_to: Address,
    pub funding: U256,
    pub key_file: PathBuf,
    pub gas_limit: u64,
    pub submitter: SubmitterConfig,
    pub notify: Option<NotifyConfig>,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub url: Url,
    pub batch_size: usize,
    pub send_key_file: bool,
    pub timeout: Duration,
}

impl FileConfig {
    pub fn from_toml(raw: &str) -> eyre::Result<Self> {
        toml::from_str(raw).wrap_err("parsing configuration")
    }

    pub fn validate(self) -> eyre::Result<Config> {
        eyre::ensure!(!self.rpc_urls.is_empty(), "rpc_urls must list at least one endpoint");
        let probe_timeout = Duration::from_secs(self.rpc.probe_timeout_secs);
        let endpoints = self
            .rpc_urls
            .iter()
            .map(|url| Endpoint::parse(url, probe_timeout, self.rpc.probe_attempts))
            .collect::<Result<Vec<_>, _>>()?;

        let forward_to = required_address("forward_address", self.forward_address.as_deref())?;
        let sweep_to = required_address("sweep_address", self.sweep_address.as_deref())?;
        let funding = parse_ether(&self.funding_amount)
            .map_err(|err| eyre!("funding_amount `{}`: {err}", self.funding_amount))?;
        eyre::ensure!(!funding.is_zero(), "funding_amount must be positive");
        eyre::ensure!(self.transfer.gas_limit > 0, "transfer.gas_limit must be positive");
        let notify = self.notify.validate()?;

        let transfer = &self.transfer;
        Ok(Config {
            chain_id: self.chain_id,
            endpoints,
            call_timeout: Duration::from_secs(self.rpc.call_timeout_secs),
            forward_to,
            sweep_to,
            funding,
            key_file: self.key_file,
            gas_limit: transfer.gas_limit,
            submitter: SubmitterConfig {
                chain_id: self.chain_id,
                min_gas_price: transfer.min_gas_price_wei,
                retry: RetryPolicy {
                    attempts: transfer.attempts.max(1),
                    delay: Duration::from_millis(transfer.retry_delay_ms),
                },
                confirmation: Confirmation {
                    timeout: Duration::from_secs(transfer.confirmation_timeout_secs),
                    poll_interval: Duration::from_millis(transfer.poll_interval_ms),
                },
            },
            notify,
        })
    }
}

fn required_address(field: &str, raw: Option<&str>) -> eyre::Result<Address> {
    let raw = raw.ok_or_else(|| eyre!("{field} is required"))?;
    normalize_address(raw).map_err(|err| eyre!("{field}: {err}"))
}

impl Config {
    pub async fn load(path: &std::path::Path) -> eyre::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        FileConfig::from_toml(&raw)?.validate()
    }

    pub fn route(&self) -> Route {
        Route {
            forward_to: self.forward_to,
            sweep_to: self.sweep_to,
            funding: self.funding,
            forward_value: U256::ZERO,
            gas_limit: self.gas_limit,
        }
    }
}
