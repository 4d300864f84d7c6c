use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backends::is_domain;
use crate::doh::DohClient;
use crate::http_client::HttpClient;
use crate::pap::PapLevel;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Serialize)]
pub struct Quad9Output {
	pub blocked: bool,
	pub status: String,
}

impl Quad9Output {
	/// Quad9 always returns a verdict, never "no data" — see §4.11's
	/// "Empty signal: —".
	pub fn is_empty(&self) -> bool {
		false
	}
}

pub struct Quad9Service {
	pub http: HttpClient,
}

const NAME: &str = "quad9";

#[async_trait]
impl Service for Quad9Service {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Amber
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		if !is_domain(input) {
			return Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() });
		}

		let client = DohClient::new(&self.http);
		let response = client
			.query(input, RecordType::A, cancel)
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: e })?;

		let blocked = response.status == ResponseCode::NXDomain && !response.has_authority;
		Ok(ServiceOutput::Quad9(Quad9Output { blocked, status: format!("{:?}", response.status) }))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		// Each input gets its own independent verdict; bulk output is
		// rendered per-entry, so "aggregate" is just "report the last one
		// evaluated" since the dispatcher only calls this with >= 2 inputs
		// sharing no natural merge.
		results
			.into_iter()
			.last()
			.unwrap_or(ServiceOutput::Quad9(Quad9Output { blocked: false, status: "NOERROR".to_string() }))
	}
}
