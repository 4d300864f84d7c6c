use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::service::{Service, ServiceError, ServiceOutput};

pub struct WorkerResult {
	pub input: String,
	pub output: Option<ServiceOutput>,
	pub error: Option<ServiceError>,
}

/// Order-preserving bounded fan-out: `results[i].input == inputs[i]` for
/// every `i`, independent of completion order. Each worker writes only to
/// its own job's slot, so a `Vec<Mutex<..>>` needs no cross-task
/// coordination beyond the channel handing out distinct indices.
pub struct WorkerPool;

impl WorkerPool {
	pub async fn run(svc: &dyn Service, inputs: &[String], concurrency: usize, cancel: &CancellationToken) -> Vec<WorkerResult> {
		debug_assert!(concurrency >= 1, "concurrency must be >= 1 (validated by the dispatcher)");

		if inputs.is_empty() {
			return Vec::new();
		}

		let slots: Vec<Mutex<Option<WorkerResult>>> = (0..inputs.len()).map(|_| Mutex::new(None)).collect();
		let slots = std::sync::Arc::new(slots);

		let (tx, rx) = mpsc::channel::<(usize, String)>(inputs.len().min(concurrency.max(1)));
		let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));

		let mut tasks = JoinSet::new();
		for _ in 0..concurrency.max(1).min(inputs.len()) {
			let rx = rx.clone();
			let slots = slots.clone();
			let cancel = cancel.clone();
			tasks.spawn(async move {
				loop {
					let job = {
						let mut rx = rx.lock().await;
						rx.recv().await
					};
					let Some((index, input)) = job else {
						break;
					};

					let result = if cancel.is_cancelled() {
						WorkerResult {
							input: input.clone(),
							output: None,
							error: Some(ServiceError::Upstream { service: "worker", source: crate::error::TridentError::Cancelled }),
						}
					} else {
						match svc.run(&input, &cancel).await {
							Ok(output) => WorkerResult { input: input.clone(), output: Some(output), error: None },
							Err(error) => WorkerResult { input: input.clone(), output: None, error: Some(error) },
						}
					};

					*slots[index].lock().expect("slot mutex poisoned") = Some(result);
				}
			});
		}

		for (index, input) in inputs.iter().cloned().enumerate() {
			if tx.send((index, input)).await.is_err() {
				break;
			}
		}
		drop(tx);

		while tasks.join_next().await.is_some() {}

		let slots = std::sync::Arc::try_unwrap(slots).unwrap_or_else(|_| unreachable!("all worker tasks have joined, no other Arc clone can remain"));
		slots
			.into_iter()
			.map(|slot| slot.into_inner().expect("slot mutex poisoned").expect("every slot is filled before join_next returns"))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pap::PapLevel;
	use async_trait::async_trait;

	struct EchoOrFail;

	#[async_trait]
	impl Service for EchoOrFail {
		fn name(&self) -> &'static str {
			"echo"
		}
		fn pap(&self) -> PapLevel {
			PapLevel::White
		}
		async fn run(&self, input: &str, _cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
			if input == "bad" {
				return Err(ServiceError::InvalidInput { service: "echo", input: input.to_string() });
			}
			Ok(ServiceOutput::Identify(crate::backends::identify::IdentifyOutput::default()))
		}
		fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
			results.into_iter().next().unwrap_or(ServiceOutput::Identify(crate::backends::identify::IdentifyOutput::default()))
		}
	}

	#[tokio::test]
	async fn empty_inputs_yield_empty_results() {
		let svc = EchoOrFail;
		let cancel = CancellationToken::new();
		let results = WorkerPool::run(&svc, &[], 4, &cancel).await;
		assert!(results.is_empty());
	}

	#[tokio::test]
	async fn preserves_input_order_and_isolates_failures() {
		let svc = EchoOrFail;
		let cancel = CancellationToken::new();
		let inputs = vec!["good".to_string(), "bad".to_string()];
		let results = WorkerPool::run(&svc, &inputs, 2, &cancel).await;

		assert_eq!(results.len(), 2);
		assert_eq!(results[0].input, "good");
		assert!(results[0].error.is_none());
		assert_eq!(results[1].input, "bad");
		assert!(results[1].error.is_some());
	}

	#[tokio::test]
	async fn concurrency_one_matches_concurrency_n_in_output() {
		let svc = EchoOrFail;
		let cancel = CancellationToken::new();
		let inputs: Vec<String> = (0..5).map(|i| format!("input-{i}")).collect();

		let serial = WorkerPool::run(&svc, &inputs, 1, &cancel).await;
		let parallel = WorkerPool::run(&svc, &inputs, 5, &cancel).await;

		let serial_inputs: Vec<_> = serial.iter().map(|r| r.input.clone()).collect();
		let parallel_inputs: Vec<_> = parallel.iter().map(|r| r.input.clone()).collect();
		assert_eq!(serial_inputs, parallel_inputs);
	}
}
