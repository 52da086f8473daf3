//! Service wiring: turns a loaded configuration into the faucet builder and
//! the swap orchestrator shared by the HTTP handlers.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use swap_account::{implementations::local::create_account, AccountService};
use swap_config::types::SwapConfig;
use swap_core::{OrchestratorSettings, SwapOrchestrator};
use swap_delivery::implementations::{
	execution::create_execution_ledger, holding::create_holding_ledger,
};
use swap_delivery::DeliveryService;
use swap_faucet::{FaucetSettings, FaucetTransactionBuilder, LimitPolicy, RateLimiter};
use swap_types::TokenRegistry;
use tracing::{info, instrument};

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct SwapService {
	faucet: Arc<FaucetTransactionBuilder>,
	orchestrator: SwapOrchestrator,
	environments: Arc<HashMap<String, TokenRegistry>>,
}

impl SwapService {
	pub fn new(
		faucet: Arc<FaucetTransactionBuilder>,
		orchestrator: SwapOrchestrator,
		environments: HashMap<String, TokenRegistry>,
	) -> Self {
		Self {
			faucet,
			orchestrator,
			environments: Arc::new(environments),
		}
	}

	#[instrument(skip(config), fields(name = %config.service.name))]
	pub fn from_config(config: &SwapConfig) -> Result<Self> {
		let bank = Arc::new(AccountService::new(
			create_account(&config.account).context("Failed to create bank account")?,
		));

		let holding = create_holding_ledger(&config.holding_ledger, bank.clone())
			.context("Failed to create holding ledger client")?;
		let execution = create_execution_ledger(&config.execution_ledger)
			.context("Failed to create execution ledger client")?;
		let delivery = Arc::new(DeliveryService::new(
			holding,
			execution,
			config.swap.call_timeout(),
			config.swap.confirmation_timeout(),
		));

		let tokens = config
			.environments
			.get(&config.faucet.environment)
			.cloned()
			.with_context(|| {
				format!(
					"Faucet environment '{}' is not configured",
					config.faucet.environment
				)
			})?;

		let faucet = FaucetTransactionBuilder::new(
			delivery.clone(),
			bank,
			Arc::new(RateLimiter::with_system_clock()),
			LimitPolicy::new(config.faucet.limits.clone()),
			tokens,
			FaucetSettings {
				cooldown: config.faucet.cooldown(),
				bank_wallet: config.faucet.bank_wallet.clone(),
				fee_collector: config.faucet.fee_collector.clone(),
				service_fee: config.faucet.service_fee,
			},
		);

		let orchestrator = SwapOrchestrator::new(
			delivery.clone(),
			OrchestratorSettings {
				poll_interval: config.swap.poll_interval(),
				max_poll_duration: config.swap.max_poll_duration(),
				strict_order: config.swap.strict_order,
				session_ttl: config.swap.session_ttl(),
			},
		);

		info!(
			chain_id = delivery.chain_id(),
			environments = config.environments.len(),
			"Swap service initialized"
		);

		Ok(Self::new(
			Arc::new(faucet),
			orchestrator,
			config.environments.clone(),
		))
	}

	pub fn faucet(&self) -> &FaucetTransactionBuilder {
		&self.faucet
	}

	pub fn orchestrator(&self) -> &SwapOrchestrator {
		&self.orchestrator
	}

	pub fn registry(&self, environment: &str) -> Option<&TokenRegistry> {
		self.environments.get(environment)
	}

	/// Stops every polling loop. Submitted steps are left to the ledger.
	pub async fn shutdown(&self) {
		self.orchestrator.cancel_all().await;
		info!("All polling loops stopped");
	}
}
