use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backends::apex::ApexOutput;
use crate::backends::crtsh::CrtShOutput;
use crate::backends::cymru::CymruOutput;
use crate::backends::detect_backend::DetectOutput;
use crate::backends::dns::DnsOutput;
use crate::backends::identify::IdentifyOutput;
use crate::backends::pgp::PgpOutput;
use crate::backends::quad9::Quad9Output;
use crate::backends::threatminer::ThreatMinerOutput;
use crate::pap::PapLevel;

#[derive(Debug, Error)]
pub enum ServiceError {
	#[error("{service}: invalid input {input:?}")]
	InvalidInput { service: &'static str, input: String },
	#[error("{service}: {source}")]
	Upstream {
		service: &'static str,
		#[source]
		source: crate::error::TridentError,
	},
}

/// Tagged payload every backend's [`Service::run`]/[`Service::aggregate`]
/// produces. The dispatcher never inspects a variant beyond `is_empty`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServiceOutput {
	Dns(DnsOutput),
	Cymru(CymruOutput),
	CrtSh(CrtShOutput),
	ThreatMiner(ThreatMinerOutput),
	Pgp(PgpOutput),
	Quad9(Quad9Output),
	Detect(DetectOutput),
	Identify(IdentifyOutput),
	Apex(ApexOutput),
}

impl ServiceOutput {
	pub fn is_empty(&self) -> bool {
		match self {
			ServiceOutput::Dns(o) => o.is_empty(),
			ServiceOutput::Cymru(o) => o.is_empty(),
			ServiceOutput::CrtSh(o) => o.is_empty(),
			ServiceOutput::ThreatMiner(o) => o.is_empty(),
			ServiceOutput::Pgp(o) => o.is_empty(),
			ServiceOutput::Quad9(o) => o.is_empty(),
			ServiceOutput::Detect(o) => o.is_empty(),
			ServiceOutput::Identify(o) => o.is_empty(),
			ServiceOutput::Apex(o) => o.is_empty(),
		}
	}
}

/// The capability every backend implements. A `Service` never mutates
/// its input string; an output with `is_empty() == true` is not an error.
#[async_trait]
pub trait Service: Send + Sync {
	fn name(&self) -> &'static str;
	fn pap(&self) -> PapLevel;
	/// The ceiling the dispatcher's PAP gate actually checks. Defaults to
	/// `pap()`; an [`AggregateService`] overrides this to its `min_pap()`
	/// so dispatch lets it through down to the lowest level that still
	/// produces useful output, instead of the single ceiling its busiest
	/// sub-query requires.
	fn gate_pap(&self) -> PapLevel {
		self.pap()
	}
	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError>;
	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput;
}

/// Implemented by aggregate (apex-style) services in addition to
/// [`Service`]. `min_pap` is the lowest ceiling that still produces some
/// useful output; between `min_pap` and `pap` the service runs but skips
/// sub-queries whose own requirement exceeds the configured limit.
pub trait AggregateService: Service {
	fn min_pap(&self) -> PapLevel;
}
