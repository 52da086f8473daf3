//! Configuration types for the swap service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use swap_faucet::LimitSettings;
use swap_types::TokenRegistry;

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
	pub service: ServiceSettings,
	/// Bank signer table, handed to the account factory.
	pub account: toml::Value,
	pub faucet: FaucetConfig,
	/// Holding-ledger client table.
	pub holding_ledger: toml::Value,
	/// Execution-ledger client table.
	pub execution_ledger: toml::Value,
	#[serde(default)]
	pub swap: SwapSettings,
	/// Token registries by deployment environment name.
	#[serde(default)]
	pub environments: HashMap<String, TokenRegistry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default)]
	pub log_format: LogFormat,
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_host() -> String {
	"0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
	8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
	#[serde(default = "default_cooldown_secs")]
	pub cooldown_secs: u64,
	pub bank_wallet: String,
	pub fee_collector: String,
	/// Native base units charged to the recipient per grant.
	#[serde(default)]
	pub service_fee: u64,
	/// Environment whose registry decides eligibility and token categories.
	pub environment: String,
	#[serde(default)]
	pub limits: LimitSettings,
}

fn default_cooldown_secs() -> u64 {
	60
}

impl FaucetConfig {
	pub fn cooldown(&self) -> Duration {
		Duration::from_secs(self.cooldown_secs)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettings {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_max_poll_duration_secs")]
	pub max_poll_duration_secs: u64,
	#[serde(default)]
	pub strict_order: bool,
	/// Upper bound for a single ledger call.
	#[serde(default = "default_call_timeout_ms")]
	pub call_timeout_ms: u64,
	/// Upper bound for the anchor transaction to confirm.
	#[serde(default = "default_confirmation_timeout_secs")]
	pub confirmation_timeout_secs: u64,
	/// Idle sessions are forgotten after this long.
	#[serde(default = "default_session_ttl_secs")]
	pub session_ttl_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
	1_000
}

fn default_max_poll_duration_secs() -> u64 {
	300
}

fn default_call_timeout_ms() -> u64 {
	10_000
}

fn default_confirmation_timeout_secs() -> u64 {
	60
}

fn default_session_ttl_secs() -> u64 {
	600
}

impl Default for SwapSettings {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			max_poll_duration_secs: default_max_poll_duration_secs(),
			strict_order: false,
			call_timeout_ms: default_call_timeout_ms(),
			confirmation_timeout_secs: default_confirmation_timeout_secs(),
			session_ttl_secs: default_session_ttl_secs(),
		}
	}
}

impl SwapSettings {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn max_poll_duration(&self) -> Duration {
		Duration::from_secs(self.max_poll_duration_secs)
	}

	pub fn call_timeout(&self) -> Duration {
		Duration::from_millis(self.call_timeout_ms)
	}

	pub fn confirmation_timeout(&self) -> Duration {
		Duration::from_secs(self.confirmation_timeout_secs)
	}

	pub fn session_ttl(&self) -> Duration {
		Duration::from_secs(self.session_ttl_secs)
	}
}
