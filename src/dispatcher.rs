use std::io::IsTerminal;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ResolvedConfig;
use crate::error::TridentError;
use crate::pap::PapLevel;
use crate::service::{Service, ServiceError, ServiceOutput};
use crate::worker::WorkerPool;

#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("{service}: requires pap >= {required}, configured limit is {limit}")]
	PapBlocked { service: &'static str, required: PapLevel, limit: PapLevel },
	#[error("{service}: {source}")]
	Backend {
		service: &'static str,
		#[source]
		source: ServiceError,
	},
	#[error("{0}")]
	ConfigError(String),
	#[error("cancelled")]
	Cancelled,
}

#[derive(Debug)]
pub enum DispatchOutcome {
	Output(ServiceOutput),
	NoData,
}

/// Orchestration entry point: PAP gate, input resolution, single vs bulk
/// execution, then a handoff to rendering — see [`crate::render`].
pub async fn dispatch(
	cfg: &ResolvedConfig,
	svc: &dyn Service,
	positional_inputs: Vec<String>,
	cancel: &CancellationToken,
) -> Result<DispatchOutcome, DispatchError> {
	if !cfg.pap_limit.allows(svc.gate_pap()) {
		return Err(DispatchError::PapBlocked { service: svc.name(), required: svc.gate_pap(), limit: cfg.pap_limit });
	}

	let inputs = resolve_inputs(positional_inputs)?;

	if inputs.len() == 1 {
		let output = match svc.run(&inputs[0], cancel).await {
			Ok(output) => output,
			Err(ServiceError::Upstream { source: TridentError::Cancelled, .. }) => return Err(DispatchError::Cancelled),
			Err(source) => return Err(DispatchError::Backend { service: svc.name(), source }),
		};
		if output.is_empty() {
			info!(service = svc.name(), input = inputs[0].as_str(), "no data");
			return Ok(DispatchOutcome::NoData);
		}
		return Ok(DispatchOutcome::Output(output));
	}

	let results = WorkerPool::run(svc, &inputs, cfg.concurrency, cancel).await;
	let mut valid = Vec::with_capacity(results.len());
	for result in results {
		if let Some(err) = result.error {
			error!(service = svc.name(), input = result.input.as_str(), error = %err, "backend error");
			continue;
		}
		match result.output {
			Some(output) if !output.is_empty() => valid.push(output),
			Some(_) => info!(service = svc.name(), input = result.input.as_str(), "no data"),
			None => {},
		}
	}

	match valid.len() {
		0 => Ok(DispatchOutcome::NoData),
		1 => Ok(DispatchOutcome::Output(valid.into_iter().next().expect("len == 1"))),
		_ => Ok(DispatchOutcome::Output(svc.aggregate(valid))),
	}
}

fn resolve_inputs(positional: Vec<String>) -> Result<Vec<String>, DispatchError> {
	if !positional.is_empty() {
		return Ok(positional);
	}

	if std::io::stdin().is_terminal() {
		return Err(DispatchError::ConfigError("pass an argument or pipe stdin".to_string()));
	}

	let mut inputs = Vec::new();
	for line in std::io::stdin().lines() {
		let line = line.map_err(|e| DispatchError::ConfigError(format!("failed to read stdin: {e}")))?;
		let trimmed = line.trim();
		if !trimmed.is_empty() {
			inputs.push(trimmed.to_string());
		}
	}
	Ok(inputs)
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;

	use crate::backends::identify::IdentifyOutput;

	/// A service that requires `Green` to run in full but, like
	/// `ApexService`, claims a lower `gate_pap` it can still run at.
	struct PartialAggregate {
		fails_with_cancelled: bool,
	}

	#[async_trait]
	impl Service for PartialAggregate {
		fn name(&self) -> &'static str {
			"partial-aggregate"
		}
		fn pap(&self) -> PapLevel {
			PapLevel::Green
		}
		fn gate_pap(&self) -> PapLevel {
			PapLevel::Amber
		}
		async fn run(&self, input: &str, _cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
			if self.fails_with_cancelled {
				return Err(ServiceError::Upstream { service: self.name(), source: TridentError::Cancelled });
			}
			if input == "bad" {
				return Err(ServiceError::InvalidInput { service: self.name(), input: input.to_string() });
			}
			Ok(ServiceOutput::Identify(IdentifyOutput::default()))
		}
		fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
			results.into_iter().next().unwrap_or(ServiceOutput::Identify(IdentifyOutput::default()))
		}
	}

	fn cfg_with_limit(pap_limit: PapLevel) -> ResolvedConfig {
		ResolvedConfig { pap_limit, ..ResolvedConfig::default() }
	}

	#[tokio::test]
	async fn aggregate_service_is_gated_on_min_pap_not_pap() {
		let svc = PartialAggregate { fails_with_cancelled: false };
		let cfg = cfg_with_limit(PapLevel::Amber);
		let cancel = CancellationToken::new();

		// `pap()` is Green, which an Amber limit would normally block; but
		// `gate_pap()` reports Amber, so dispatch must let it through.
		let result = dispatch(&cfg, &svc, vec!["example.com".to_string()], &cancel).await;
		assert!(matches!(result, Ok(DispatchOutcome::NoData)));
	}

	#[tokio::test]
	async fn aggregate_service_still_blocked_below_its_min_pap() {
		let svc = PartialAggregate { fails_with_cancelled: false };
		let cfg = cfg_with_limit(PapLevel::Red);
		let cancel = CancellationToken::new();

		let result = dispatch(&cfg, &svc, vec!["example.com".to_string()], &cancel).await;
		assert!(matches!(result, Err(DispatchError::PapBlocked { required: PapLevel::Amber, limit: PapLevel::Red, .. })));
	}

	#[tokio::test]
	async fn single_input_cancellation_surfaces_as_cancelled_not_config_error() {
		let svc = PartialAggregate { fails_with_cancelled: true };
		let cfg = cfg_with_limit(PapLevel::White);
		let cancel = CancellationToken::new();

		let result = dispatch(&cfg, &svc, vec!["example.com".to_string()], &cancel).await;
		assert!(matches!(result, Err(DispatchError::Cancelled)));
	}

	#[tokio::test]
	async fn single_input_backend_error_preserves_typed_cause() {
		let svc = PartialAggregate { fails_with_cancelled: false };
		let cfg = cfg_with_limit(PapLevel::White);
		let cancel = CancellationToken::new();

		let result = dispatch(&cfg, &svc, vec!["bad".to_string()], &cancel).await;
		match result {
			Err(DispatchError::Backend { service, source: ServiceError::InvalidInput { .. } }) => {
				assert_eq!(service, "partial-aggregate");
			},
			other => panic!("expected DispatchError::Backend, got {other:?}"),
		}
	}
}
