//! HTTP API: faucet grants, token registries and swap sessions.

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::str::FromStr;
use swap_core::OrchestratorError;
use swap_faucet::FaucetError;
use swap_types::{
	Address, FaucetGrantRequest, SessionKey, SessionSnapshot, SwapRequest, TokenRegistry,
};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{field, info, instrument, warn, Span};

use crate::service::SwapService;

#[derive(Debug, Error)]
pub enum ApiError {
	#[error(transparent)]
	Faucet(#[from] FaucetError),
	#[error("{error}")]
	Swap {
		error: OrchestratorError,
		/// Session state at the time of failure, when one was created.
		session: Option<SessionSnapshot>,
	},
	#[error("Unknown environment: {0}")]
	UnknownEnvironment(String),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
}

impl From<OrchestratorError> for ApiError {
	fn from(error: OrchestratorError) -> Self {
		ApiError::Swap {
			error,
			session: None,
		}
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		ApiError::InvalidRequest(rejection.body_text())
	}
}

impl ApiError {
	fn status(&self) -> StatusCode {
		match self {
			ApiError::Faucet(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
			ApiError::Faucet(_) => StatusCode::INTERNAL_SERVER_ERROR,
			ApiError::Swap { error, .. } => match error {
				OrchestratorError::InvalidPlan(_) | OrchestratorError::StepOutOfRange { .. } => {
					StatusCode::BAD_REQUEST
				}
				OrchestratorError::SessionNotFound(_) => StatusCode::NOT_FOUND,
				OrchestratorError::SessionBusy(_) | OrchestratorError::InvalidTransition(_) => {
					StatusCode::CONFLICT
				}
				OrchestratorError::NonceUnavailable { .. }
				| OrchestratorError::EstimationFailure(_)
				| OrchestratorError::SubmissionFailure { .. } => StatusCode::BAD_GATEWAY,
			},
			ApiError::UnknownEnvironment(_) => StatusCode::NOT_FOUND,
			ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
		}
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	retry_after_seconds: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	session: Option<SessionSnapshot>,
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		let message = self.to_string();
		if status.is_server_error() {
			warn!(%status, %message, "Request failed");
		} else {
			info!(%status, %message, "Request rejected");
		}

		let (retry_after_seconds, session) = match self {
			ApiError::Faucet(e) => (e.retry_after_seconds(), None),
			ApiError::Swap { session, .. } => (None, session),
			_ => (None, None),
		};
		let body = ErrorBody {
			message,
			retry_after_seconds,
			session,
		};
		(status, Json(body)).into_response()
	}
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AirdropResponse {
	/// Base64 of the partially signed envelope.
	transaction_envelope: String,
}

pub fn router(service: SwapService) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/airdrop", post(request_airdrop))
		.route("/tokens/{environment}", get(get_tokens))
		.route("/swaps", post(start_swap))
		.route("/swaps/{payer}/{nonce}", get(get_swap).delete(cancel_swap))
		.route(
			"/swaps/{payer}/{nonce}/steps/{index}/restart",
			post(restart_step),
		)
		.route("/swaps/{payer}/{nonce}/poll", post(resume_polling))
		.with_state(service)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

pub async fn start_http_server(service: SwapService, host: String, port: u16) -> anyhow::Result<()> {
	let app = router(service);
	let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

	info!("HTTP server listening on {}:{}", host, port);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

#[instrument(skip_all, fields(wallet = field::Empty, token = field::Empty))]
async fn request_airdrop(
	State(service): State<SwapService>,
	payload: Result<Json<FaucetGrantRequest>, JsonRejection>,
) -> ApiResult<Json<AirdropResponse>> {
	let Json(request) = payload?;
	Span::current()
		.record("wallet", field::display(&request.wallet))
		.record("token", field::display(&request.token_address));

	let envelope = service.faucet().build(&request).await?;
	Ok(Json(AirdropResponse {
		transaction_envelope: STANDARD.encode(envelope.as_bytes()),
	}))
}

async fn get_tokens(
	State(service): State<SwapService>,
	Path(environment): Path<String>,
) -> ApiResult<Json<TokenRegistry>> {
	service
		.registry(&environment)
		.cloned()
		.map(Json)
		.ok_or(ApiError::UnknownEnvironment(environment))
}

fn session_key(payer: &str, nonce: u64) -> ApiResult<SessionKey> {
	let payer = Address::from_str(payer)
		.map_err(|e| ApiError::InvalidRequest(format!("payer: {}", e)))?;
	Ok(SessionKey::new(payer, nonce))
}

/// Attaches the session snapshot to ledger-side failures so the caller can
/// see which steps made it and restart the rest.
async fn swap_failure(
	service: &SwapService,
	key: Option<SessionKey>,
	error: OrchestratorError,
) -> ApiError {
	let lookup = match (&error, key) {
		(OrchestratorError::SubmissionFailure { key, .. }, _) => Some(key.clone()),
		(OrchestratorError::EstimationFailure(_), key) => key,
		_ => None,
	};
	let session = match lookup {
		Some(key) => service.orchestrator().session(&key).await,
		None => None,
	};
	ApiError::Swap { error, session }
}

#[instrument(skip_all, fields(payer = field::Empty, plan = field::Empty))]
async fn start_swap(
	State(service): State<SwapService>,
	payload: Result<Json<SwapRequest>, JsonRejection>,
) -> ApiResult<Json<SessionSnapshot>> {
	let Json(request) = payload?;
	Span::current()
		.record("payer", field::display(&request.payer))
		.record("plan", request.plan.name());

	let key = request
		.nonce
		.map(|nonce| SessionKey::new(request.payer.clone(), nonce));
	match service.orchestrator().start(request).await {
		Ok(snapshot) => Ok(Json(snapshot)),
		Err(error) => Err(swap_failure(&service, key, error).await),
	}
}

async fn get_swap(
	State(service): State<SwapService>,
	Path((payer, nonce)): Path<(String, u64)>,
) -> ApiResult<Json<SessionSnapshot>> {
	let key = session_key(&payer, nonce)?;
	service
		.orchestrator()
		.session(&key)
		.await
		.map(Json)
		.ok_or_else(|| OrchestratorError::SessionNotFound(key).into())
}

async fn cancel_swap(
	State(service): State<SwapService>,
	Path((payer, nonce)): Path<(String, u64)>,
) -> ApiResult<StatusCode> {
	let key = session_key(&payer, nonce)?;
	service.orchestrator().cancel(&key).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(service))]
async fn restart_step(
	State(service): State<SwapService>,
	Path((payer, nonce, index)): Path<(String, u64, usize)>,
) -> ApiResult<Json<SessionSnapshot>> {
	let key = session_key(&payer, nonce)?;
	match service.orchestrator().restart_step(&key, index).await {
		Ok(snapshot) => Ok(Json(snapshot)),
		Err(error) => Err(swap_failure(&service, Some(key), error).await),
	}
}

async fn resume_polling(
	State(service): State<SwapService>,
	Path((payer, nonce)): Path<(String, u64)>,
) -> ApiResult<Json<SessionSnapshot>> {
	let key = session_key(&payer, nonce)?;
	Ok(Json(service.orchestrator().resume_polling(&key).await?))
}
