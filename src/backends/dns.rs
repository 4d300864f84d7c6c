use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backends::{is_domain, is_ip};
use crate::pap::PapLevel;
use crate::resolver::Resolver;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DnsOutput {
	pub a: Vec<String>,
	pub aaaa: Vec<String>,
	pub mx: Vec<String>,
	pub ns: Vec<String>,
	pub txt: Vec<String>,
	pub ptr: Vec<String>,
}

impl DnsOutput {
	pub fn is_empty(&self) -> bool {
		self.a.is_empty()
			&& self.aaaa.is_empty()
			&& self.mx.is_empty()
			&& self.ns.is_empty()
			&& self.txt.is_empty()
			&& self.ptr.is_empty()
	}

	fn merge(mut self, other: DnsOutput) -> DnsOutput {
		self.a.extend(other.a);
		self.aaaa.extend(other.aaaa);
		self.mx.extend(other.mx);
		self.ns.extend(other.ns);
		self.txt.extend(other.txt);
		self.ptr.extend(other.ptr);
		self
	}
}

pub struct DnsService {
	pub resolver: Resolver,
}

const NAME: &str = "dns";

#[async_trait]
impl Service for DnsService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Green
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		if cancel.is_cancelled() {
			return Err(ServiceError::Upstream { service: NAME, source: crate::error::TridentError::Cancelled });
		}

		if is_ip(input) {
			return self.run_ptr(input).await;
		}
		if is_domain(input) {
			return self.run_forward(input).await;
		}
		Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() })
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut merged = DnsOutput::default();
		for result in results {
			if let ServiceOutput::Dns(o) = result {
				merged = merged.merge(o);
			}
		}
		ServiceOutput::Dns(merged)
	}
}

impl DnsService {
	async fn run_forward(&self, domain: &str) -> Result<ServiceOutput, ServiceError> {
		let resolver = self.resolver.inner();
		let mut out = DnsOutput::default();

		if let Ok(lookup) = resolver.ipv4_lookup(domain).await {
			out.a.extend(lookup.iter().map(|r| r.0.to_string()));
		}
		if let Ok(lookup) = resolver.ipv6_lookup(domain).await {
			out.aaaa.extend(lookup.iter().map(|r| r.0.to_string()));
		}
		if let Ok(lookup) = resolver.mx_lookup(domain).await {
			out.mx.extend(lookup.iter().map(|r| format!("{} {}", r.preference(), r.exchange())));
		}
		if let Ok(lookup) = resolver.ns_lookup(domain).await {
			out.ns.extend(lookup.iter().map(|r| r.0.to_string()));
		}
		if let Ok(lookup) = resolver.txt_lookup(domain).await {
			out.txt.extend(lookup.iter().map(|r| r.to_string()));
		}

		Ok(ServiceOutput::Dns(out))
	}

	async fn run_ptr(&self, ip: &str) -> Result<ServiceOutput, ServiceError> {
		let resolver = self.resolver.inner();
		let addr: std::net::IpAddr = ip.parse().map_err(|_| ServiceError::InvalidInput { service: NAME, input: ip.to_string() })?;

		let mut out = DnsOutput::default();
		if let Ok(lookup) = resolver.reverse_lookup(addr).await {
			out.ptr.extend(lookup.iter().map(|r| r.0.to_string()));
		}
		Ok(ServiceOutput::Dns(out))
	}
}
