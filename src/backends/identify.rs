use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::detect::{Detection, DetectionEngine, RecordSet};
use crate::pap::PapLevel;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IdentifyOutput {
	pub detections: Vec<Detection>,
}

impl IdentifyOutput {
	pub fn is_empty(&self) -> bool {
		self.detections.is_empty()
	}
}

/// Wire shape the `identify` CLI collaborator serializes `--cname`/`--mx`/
/// `--ns`/`--txt` flag values into before handing them to `dispatch` as a
/// single input string — `identify` takes no positional/stdin input, but
/// the `Service` contract is `run(input: &str, ..)`, so the flags are
/// packed here rather than special-casing the dispatcher for one backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyInput {
	#[serde(default)]
	pub cname: Vec<String>,
	#[serde(default)]
	pub mx: Vec<String>,
	#[serde(default)]
	pub ns: Vec<String>,
	#[serde(default)]
	pub txt: Vec<String>,
}

impl IdentifyInput {
	pub fn to_wire(&self) -> String {
		serde_json::to_string(self).unwrap_or_default()
	}
}

pub struct IdentifyService {
	pub engine: DetectionEngine,
}

const NAME: &str = "identify";

#[async_trait]
impl Service for IdentifyService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Red
	}

	async fn run(&self, input: &str, _cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		let parsed: IdentifyInput =
			serde_json::from_str(input).map_err(|_| ServiceError::InvalidInput { service: NAME, input: input.to_string() })?;

		let records = RecordSet {
			cnames: parsed.cname,
			mx: parsed.mx,
			ns: parsed.ns,
			txt: parsed.txt,
		};
		let detections = self.engine.classify(&records);
		Ok(ServiceOutput::Identify(IdentifyOutput { detections }))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut detections = Vec::new();
		for result in results {
			if let ServiceOutput::Identify(o) = result {
				detections.extend(o.detections);
			}
		}
		ServiceOutput::Identify(IdentifyOutput { detections })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::detect::patterns::{Patterns, SuffixRule};

	#[tokio::test]
	async fn single_cname_yields_one_cdn_detection() {
		let patterns = Patterns {
			cdn: vec![SuffixRule { suffix: "cloudfront.net".to_string(), provider: "AWS CloudFront".to_string() }],
			..Default::default()
		};
		let service = IdentifyService { engine: DetectionEngine::new(patterns) };
		let input = IdentifyInput { cname: vec!["abc.cloudfront.net.".to_string()], ..Default::default() }.to_wire();

		let cancel = CancellationToken::new();
		let ServiceOutput::Identify(output) = service.run(&input, &cancel).await.unwrap() else {
			panic!("expected Identify output");
		};
		assert_eq!(output.detections.len(), 1);
		assert_eq!(output.detections[0].provider, "AWS CloudFront");
	}
}
