use std::collections::HashSet;

use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backends::is_domain;
use crate::detect::{Detection, DetectionEngine, RecordSet};
use crate::doh::DohClient;
use crate::http_client::HttpClient;
use crate::pap::PapLevel;
use crate::service::{AggregateService, Service, ServiceError, ServiceOutput};

const NAME: &str = "apex";
const MAX_CNAME_DEPTH: usize = 5;

/// Hostnames derived from the apex and queried in addition to it.
const DERIVED_HOSTNAMES: &[&str] = &[
	"www",
	"mail",
	"autodiscover",
	"_dmarc",
	"_domainkey",
	"_mta-sts",
	"_smtp._tls",
	"default._bimi",
	"selector1._domainkey",
	"selector2._domainkey",
	"google._domainkey",
	"k1._domainkey",
];

const SRV_SERVICES: &[&str] = &["_sip._tls", "_sipfederationtls._tcp", "_xmpp-client._tcp", "_xmpp-server._tcp"];

/// Record types swept for the apex and every derived hostname. `NS`/`SOA`
/// disclose the target's own authoritative infrastructure rather than a
/// third party's view of it, so they are gated at `Green` even though the
/// transport (DoH to Quad9) is the same `Amber` third party for every
/// other type in this set.
const RECORD_TYPES: &[RecordType] = &[
	RecordType::A,
	RecordType::AAAA,
	RecordType::CAA,
	RecordType::DNSKEY,
	RecordType::HTTPS,
	RecordType::MX,
	RecordType::NS,
	RecordType::SOA,
	RecordType::SRV,
	RecordType::SSHFP,
	RecordType::TXT,
	RecordType::CNAME,
];

fn record_type_min_pap(rt: RecordType) -> PapLevel {
	match rt {
		RecordType::NS | RecordType::SOA => PapLevel::Green,
		_ => PapLevel::Amber,
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ApexRecord {
	pub hostname: String,
	pub record_type: String,
	pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApexOutput {
	pub records: Vec<ApexRecord>,
	pub detections: Vec<Detection>,
}

impl ApexOutput {
	pub fn is_empty(&self) -> bool {
		self.records.is_empty() && self.detections.is_empty()
	}

	fn merge(mut self, other: ApexOutput) -> ApexOutput {
		self.records.extend(other.records);
		self.detections.extend(other.detections);
		self
	}
}

pub struct ApexService {
	pub http: HttpClient,
	pub engine: DetectionEngine,
	pub pap_limit: PapLevel,
}

#[async_trait]
impl Service for ApexService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Green
	}

	/// Apex is gated at its `min_pap` (the lowest ceiling that still
	/// yields useful output), not at `pap`: between the two it runs and
	/// silently skips the sub-queries (NS/SOA) that exceed the configured
	/// limit — see `record_type_min_pap` below.
	fn gate_pap(&self) -> PapLevel {
		self.min_pap()
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		if !is_domain(input) {
			return Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() });
		}

		let client = DohClient::new(&self.http);
		let mut hostnames: Vec<String> = vec![input.to_string()];
		hostnames.extend(DERIVED_HOSTNAMES.iter().map(|h| format!("{h}.{input}")));
		hostnames.extend(SRV_SERVICES.iter().map(|s| format!("{s}.{input}")));

		let mut records = Vec::new();
		let mut detect_input = RecordSet::default();
		let mut visited = HashSet::new();
		let semaphore = Semaphore::new(8);

		for hostname in &hostnames {
			if cancel.is_cancelled() {
				return Err(ServiceError::Upstream { service: NAME, source: crate::error::TridentError::Cancelled });
			}

			for &rtype in RECORD_TYPES {
				if record_type_min_pap(rtype) > self.pap_limit {
					debug!(hostname, ?rtype, "apex: skipping sub-query above configured pap limit");
					continue;
				}
				let _permit = semaphore.acquire().await.expect("semaphore not closed");

				let Ok(response) = client.query(hostname, rtype, cancel).await else {
					continue;
				};
				for answer in &response.answers {
					records.push(ApexRecord {
						hostname: hostname.clone(),
						record_type: format!("{:?}", answer.record_type),
						data: answer.data.clone(),
					});
					match answer.record_type {
						RecordType::CNAME => detect_input.cnames.push(answer.data.clone()),
						RecordType::MX => detect_input.mx.push(answer.data.clone()),
						RecordType::NS => detect_input.ns.push(answer.data.clone()),
						RecordType::TXT => detect_input.txt.push(answer.data.clone()),
						_ => {},
					}
				}
			}

			self.follow_cname_chain(&client, hostname, 0, &mut visited, &mut records, &mut detect_input, cancel).await;
		}

		let detections = self.engine.classify(&detect_input);
		Ok(ServiceOutput::Apex(ApexOutput { records, detections }))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut merged = ApexOutput::default();
		for result in results {
			if let ServiceOutput::Apex(o) = result {
				merged = merged.merge(o);
			}
		}
		ServiceOutput::Apex(merged)
	}
}

impl ApexService {
	async fn follow_cname_chain(
		&self,
		client: &DohClient<'_>,
		hostname: &str,
		depth: usize,
		visited: &mut HashSet<String>,
		records: &mut Vec<ApexRecord>,
		detect_input: &mut RecordSet,
		cancel: &CancellationToken,
	) {
		if depth >= MAX_CNAME_DEPTH || !visited.insert(hostname.to_string()) {
			return;
		}
		let Ok(response) = client.query(hostname, RecordType::CNAME, cancel).await else {
			return;
		};
		for answer in response.answers.iter().filter(|a| a.record_type == RecordType::CNAME) {
			let target = answer.data.clone();
			records.push(ApexRecord { hostname: hostname.to_string(), record_type: "CNAME".to_string(), data: target.clone() });
			detect_input.cnames.push(target.clone());
			Box::pin(self.follow_cname_chain(client, &target, depth + 1, visited, records, detect_input, cancel)).await;
		}
	}
}

impl AggregateService for ApexService {
	fn min_pap(&self) -> PapLevel {
		PapLevel::Amber
	}
}
