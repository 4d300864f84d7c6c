use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backends::is_asn_token;
use crate::pap::PapLevel;
use crate::resolver::Resolver;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CymruOutput {
	pub asn: String,
	pub prefix: String,
	pub country: String,
	pub registry: String,
	pub allocated: String,
	pub description: String,
}

impl CymruOutput {
	pub fn is_empty(&self) -> bool {
		self.asn.is_empty()
	}
}

pub struct CymruService {
	pub resolver: Resolver,
}

const NAME: &str = "cymru";

#[async_trait]
impl Service for CymruService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Amber
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		if cancel.is_cancelled() {
			return Err(ServiceError::Upstream { service: NAME, source: crate::error::TridentError::Cancelled });
		}

		if is_asn_token(input) {
			return self.run_description(input).await;
		}
		if let Ok(ip) = input.parse::<std::net::IpAddr>() {
			return self.run_origin(ip).await;
		}
		Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() })
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		// Cymru has no meaningful merge across multiple ASN/IP lookups:
		// take the first non-empty result (dispatcher only calls this
		// when >= 2 valid outputs exist).
		results
			.into_iter()
			.find(|r| !r.is_empty())
			.unwrap_or_else(|| ServiceOutput::Cymru(CymruOutput::default()))
	}
}

impl CymruService {
	async fn run_origin(&self, ip: std::net::IpAddr) -> Result<ServiceOutput, ServiceError> {
		let query = match ip {
			std::net::IpAddr::V4(v4) => {
				let octets = v4.octets();
				format!("{}.{}.{}.{}.origin.asn.cymru.com", octets[3], octets[2], octets[1], octets[0])
			},
			std::net::IpAddr::V6(v6) => {
				let nibbles: String = v6
					.octets()
					.iter()
					.rev()
					.flat_map(|b| [b & 0x0f, b >> 4])
					.map(|nibble| format!("{nibble:x}."))
					.collect();
				format!("{nibbles}origin6.asn.cymru.com")
			},
		};

		let Some(record) = self.lookup_txt(&query).await else {
			return Ok(ServiceOutput::Cymru(CymruOutput::default()));
		};

		let fields: Vec<&str> = record.split('|').map(str::trim).collect();
		let mut out = CymruOutput::default();
		if let Some(asn) = fields.first() {
			out.asn = format!("AS{asn}");
		}
		if let Some(prefix) = fields.get(1) {
			out.prefix = prefix.to_string();
		}
		if let Some(country) = fields.get(2) {
			out.country = country.to_string();
		}
		if let Some(registry) = fields.get(3) {
			out.registry = registry.to_string();
		}
		if let Some(allocated) = fields.get(4) {
			out.allocated = allocated.to_string();
		}

		if !out.asn.is_empty() {
			if let Some(desc) = self.lookup_description(&out.asn).await {
				out.description = desc;
			}
		}

		Ok(ServiceOutput::Cymru(out))
	}

	async fn run_description(&self, asn_token: &str) -> Result<ServiceOutput, ServiceError> {
		let mut out = CymruOutput { asn: asn_token.to_string(), ..Default::default() };
		if let Some(desc) = self.lookup_description(asn_token).await {
			out.description = desc;
		}
		Ok(ServiceOutput::Cymru(out))
	}

	async fn lookup_description(&self, asn_token: &str) -> Option<String> {
		let query = format!("{asn_token}.asn.cymru.com");
		let record = self.lookup_txt(&query).await?;
		// `"15169 | US | arin | 2000-03-30 | GOOGLE, US"` — description is
		// everything after the 4th pipe.
		record.splitn(5, '|').nth(4).map(|s| s.trim().to_string())
	}

	async fn lookup_txt(&self, query: &str) -> Option<String> {
		let lookup = self.resolver.inner().txt_lookup(query).await.ok()?;
		lookup.iter().next().map(|r| r.to_string())
	}
}
