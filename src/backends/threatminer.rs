use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backends::{is_domain, is_hash, is_ip};
use crate::http_client::HttpClient;
use crate::pap::PapLevel;
use crate::retry::RetryPolicy;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreatMinerOutput {
	pub subdomains: Vec<String>,
	pub passive_dns: Vec<String>,
}

impl ThreatMinerOutput {
	pub fn is_empty(&self) -> bool {
		self.subdomains.is_empty() && self.passive_dns.is_empty()
	}

	fn merge(mut self, other: ThreatMinerOutput) -> ThreatMinerOutput {
		self.subdomains.extend(other.subdomains);
		self.passive_dns.extend(other.passive_dns);
		self
	}
}

#[derive(Debug, Deserialize)]
struct ThreatMinerResponse {
	#[serde(default)]
	results: Vec<serde_json::Value>,
}

pub struct ThreatMinerService {
	pub http: HttpClient,
}

const NAME: &str = "threatminer";
const BASE_URL: &str = "https://api.threatminer.org/v2";

#[async_trait]
impl Service for ThreatMinerService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Amber
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		let endpoint = if is_domain(input) {
			"domain.php"
		} else if is_ip(input) {
			"host.php"
		} else if is_hash(input) {
			"sample.php"
		} else {
			return Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() });
		};

		let mut out = ThreatMinerOutput::default();

		if endpoint == "domain.php" {
			if let Some(values) = self.fetch(endpoint, input, 5, cancel).await? {
				out.subdomains = values.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
			}
		}
		if let Some(values) = self.fetch(endpoint, input, 2, cancel).await? {
			out.passive_dns = values
				.into_iter()
				.filter_map(|v| {
					v.get("ip")
						.or_else(|| v.get("domain"))
						.and_then(|s| s.as_str())
						.map(str::to_string)
				})
				.collect();
		}

		Ok(ServiceOutput::ThreatMiner(out))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut merged = ThreatMinerOutput::default();
		for result in results {
			if let ServiceOutput::ThreatMiner(o) = result {
				merged = merged.merge(o);
			}
		}
		ServiceOutput::ThreatMiner(merged)
	}
}

impl ThreatMinerService {
	async fn fetch(
		&self,
		endpoint: &str,
		query: &str,
		rt: u32,
		cancel: &CancellationToken,
	) -> Result<Option<Vec<serde_json::Value>>, ServiceError> {
		let url = format!("{BASE_URL}/{endpoint}?q={}&rt={rt}", url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>());
		let policy = RetryPolicy::new(&self.http);
		let response = policy
			.execute(NAME, Method::GET, &url, |b| b, cancel)
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: e })?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !response.status().is_success() {
			return Err(ServiceError::Upstream {
				service: NAME,
				source: crate::error::TridentError::RequestFailed {
					service: NAME,
					source: anyhow::anyhow!("threatminer returned status {}", response.status()),
				},
			});
		}

		let body = response
			.text()
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: crate::error::TridentError::RequestFailed { service: NAME, source: e.into() } })?;
		let parsed: ThreatMinerResponse = serde_json::from_str(&body).unwrap_or(ThreatMinerResponse { results: Vec::new() });
		Ok(Some(parsed.results))
	}
}
