use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backends::is_domain;
use crate::http_client::HttpClient;
use crate::pap::PapLevel;
use crate::retry::RetryPolicy;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrtShOutput {
	pub subdomains: Vec<String>,
}

impl CrtShOutput {
	pub fn is_empty(&self) -> bool {
		self.subdomains.is_empty()
	}
}

#[derive(Debug, Deserialize)]
struct CrtShEntry {
	name_value: String,
}

pub struct CrtShService {
	pub http: HttpClient,
}

const NAME: &str = "crtsh";

#[async_trait]
impl Service for CrtShService {
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

		let url = format!("https://crt.sh/?q={}&output=json", urlencoding_escape(input));
		let policy = RetryPolicy::new(&self.http);
		let response = policy
			.execute(NAME, Method::GET, &url, |b| b, cancel)
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: e })?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Ok(ServiceOutput::CrtSh(CrtShOutput::default()));
		}
		if !response.status().is_success() {
			return Err(ServiceError::Upstream {
				service: NAME,
				source: crate::error::TridentError::RequestFailed {
					service: NAME,
					source: anyhow::anyhow!("crt.sh returned status {}", response.status()),
				},
			});
		}

		let body = response
			.text()
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: crate::error::TridentError::RequestFailed { service: NAME, source: e.into() } })?;

		let entries: Vec<CrtShEntry> = serde_json::from_str(&body).unwrap_or_default();
		let apex = input.trim_end_matches('.').to_ascii_lowercase();
		let mut subdomains: BTreeSet<String> = BTreeSet::new();
		for entry in entries {
			for line in entry.name_value.lines() {
				let name = line.trim().trim_end_matches('.').to_ascii_lowercase();
				if name.is_empty() || name.starts_with("*.") || name == apex {
					continue;
				}
				subdomains.insert(name);
			}
		}

		Ok(ServiceOutput::CrtSh(CrtShOutput { subdomains: subdomains.into_iter().collect() }))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut merged: BTreeSet<String> = BTreeSet::new();
		for result in results {
			if let ServiceOutput::CrtSh(o) = result {
				merged.extend(o.subdomains);
			}
		}
		ServiceOutput::CrtSh(CrtShOutput { subdomains: merged.into_iter().collect() })
	}
}

fn urlencoding_escape(input: &str) -> String {
	url::form_urlencoded::byte_serialize(input.as_bytes()).collect()
}
