use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backends::is_domain;
use hickory_proto::rr::RecordType;

use crate::detect::{Detection, DetectionEngine, RecordSet};
use crate::pap::PapLevel;
use crate::resolver::Resolver;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectOutput {
	pub detections: Vec<Detection>,
}

impl DetectOutput {
	pub fn is_empty(&self) -> bool {
		self.detections.is_empty()
	}
}

pub struct DetectService {
	pub resolver: Resolver,
	pub engine: DetectionEngine,
}

const NAME: &str = "detect";

#[async_trait]
impl Service for DetectService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Green
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		if !is_domain(input) {
			return Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() });
		}
		if cancel.is_cancelled() {
			return Err(ServiceError::Upstream { service: NAME, source: crate::error::TridentError::Cancelled });
		}

		let resolver = self.resolver.inner();
		let mut records = RecordSet::default();

		for name in [input.to_string(), format!("www.{input}")] {
			if let Ok(lookup) = resolver.lookup(name.as_str(), RecordType::CNAME).await {
				records.cnames.extend(lookup.iter().map(|r| r.to_string()));
			}
		}
		if let Ok(lookup) = resolver.mx_lookup(input).await {
			records.mx.extend(lookup.iter().map(|r| r.exchange().to_string()));
		}
		if let Ok(lookup) = resolver.ns_lookup(input).await {
			records.ns.extend(lookup.iter().map(|r| r.0.to_string()));
		}
		if let Ok(lookup) = resolver.txt_lookup(input).await {
			records.txt.extend(lookup.iter().map(|r| r.to_string()));
		}

		let detections = self.engine.classify(&records);
		Ok(ServiceOutput::Detect(DetectOutput { detections }))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut detections = Vec::new();
		for result in results {
			if let ServiceOutput::Detect(o) = result {
				detections.extend(o.detections);
			}
		}
		ServiceOutput::Detect(DetectOutput { detections })
	}
}
