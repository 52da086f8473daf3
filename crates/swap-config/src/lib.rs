//! Configuration loading for the swap service.
//!
//! Files are TOML, or YAML when the extension says so. `${VAR}` references
//! are replaced from the environment before parsing, and a handful of
//! prefixed environment variables override the parsed values.

use regex::Regex;
use rust_decimal::Decimal;
use std::env;
use std::path::Path;
use swap_account::implementations::local::LocalWalletSchema;
use swap_delivery::implementations::execution::RpcExecutionLedgerSchema;
use swap_delivery::implementations::holding::RpcHoldingLedgerSchema;
use swap_types::ConfigSchema;
use thiserror::Error;
use tracing::debug;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Self {
		match path.extension().and_then(|s| s.to_str()) {
			Some("yaml") | Some("yml") => ConfigFormat::Yaml,
			_ => ConfigFormat::Toml,
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SWAP_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<SwapConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		let content = tokio::fs::read_to_string(path).await?;
		self.load_str(&content, ConfigFormat::from_path(path))
	}

	/// Parses, overrides and validates configuration text.
	pub fn load_str(&self, content: &str, format: ConfigFormat) -> Result<SwapConfig, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;

		let mut config: SwapConfig = match format {
			ConfigFormat::Toml => {
				toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?
			}
			ConfigFormat::Yaml => serde_yaml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string()))?,
		};

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut SwapConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Ok(key) = env::var(format!("{}PRIVATE_KEY", self.env_prefix)) {
			debug!("Overriding account private key from environment");
			let table = config.account.as_table_mut().ok_or_else(|| {
				ConfigError::ValidationError("[account] must be a table".to_string())
			})?;
			table.insert("private_key".to_string(), toml::Value::String(key));
		}

		Ok(())
	}
}

fn validate_config(config: &SwapConfig) -> Result<(), ConfigError> {
	let invalid = |message: String| Err(ConfigError::ValidationError(message));

	if config.service.name.trim().is_empty() {
		return invalid("service.name must not be empty".to_string());
	}
	if config.service.http_port == 0 {
		return invalid("service.http_port must not be 0".to_string());
	}

	LocalWalletSchema
		.validate(&config.account)
		.map_err(|e| ConfigError::ValidationError(format!("[account] {}", e)))?;
	RpcHoldingLedgerSchema
		.validate(&config.holding_ledger)
		.map_err(|e| ConfigError::ValidationError(format!("[holding_ledger] {}", e)))?;
	RpcExecutionLedgerSchema
		.validate(&config.execution_ledger)
		.map_err(|e| ConfigError::ValidationError(format!("[execution_ledger] {}", e)))?;

	let faucet = &config.faucet;
	if faucet.cooldown_secs == 0 {
		return invalid("faucet.cooldown_secs must be positive".to_string());
	}
	if faucet.bank_wallet.is_empty() || faucet.fee_collector.is_empty() {
		return invalid("faucet.bank_wallet and faucet.fee_collector are required".to_string());
	}
	if !config.environments.contains_key(&faucet.environment) {
		return invalid(format!(
			"faucet.environment '{}' is not a configured environment",
			faucet.environment
		));
	}

	let limits = &faucet.limits;
	let caps = [
		("standard_cap", limits.standard_cap),
		("native_wrapped_cap", limits.native_wrapped_cap),
		("requested_amount_cap", limits.requested_amount_cap),
	];
	for (name, cap) in caps
		.into_iter()
		.chain(limits.overrides.values().map(|cap| ("overrides", *cap)))
	{
		if cap <= Decimal::ZERO {
			return invalid(format!("faucet.limits.{} must be positive", name));
		}
	}

	let swap = &config.swap;
	if swap.poll_interval_ms == 0 || swap.call_timeout_ms == 0 {
		return invalid("swap intervals must be positive".to_string());
	}
	if swap.confirmation_timeout_secs == 0 {
		return invalid("swap.confirmation_timeout_secs must be positive".to_string());
	}
	if swap.max_poll_duration() <= swap.poll_interval() {
		return invalid("swap.max_poll_duration_secs must exceed the poll interval".to_string());
	}
	if swap.session_ttl_secs == 0 {
		return invalid("swap.session_ttl_secs must be positive".to_string());
	}

	Ok(())
}
