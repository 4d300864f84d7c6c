pub mod patterns;

use std::collections::HashSet;

use serde::Serialize;

pub use patterns::{Patterns, PatternStore};

/// The DNS record values collected for one domain (or supplied directly
/// by `identify`), grouped by the category the engine matches against.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
	pub cnames: Vec<String>,
	pub mx: Vec<String>,
	pub ns: Vec<String>,
	pub txt: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
	Cdn,
	Email,
	Dns,
	Verification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
	Cname,
	Mx,
	Ns,
	Txt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
	pub kind: DetectionKind,
	pub provider: String,
	pub evidence: String,
	pub source: EvidenceSource,
}

pub struct DetectionEngine {
	patterns: Patterns,
}

impl DetectionEngine {
	pub fn new(patterns: Patterns) -> Self {
		DetectionEngine { patterns }
	}

	pub fn classify(&self, records: &RecordSet) -> Vec<Detection> {
		let mut seen: HashSet<(String, String)> = HashSet::new();
		let mut out = Vec::new();

		for host in &records.cnames {
			for rule in &self.patterns.cdn {
				if suffix_matches(host, &rule.suffix) {
					push(&mut out, &mut seen, DetectionKind::Cdn, &rule.provider, host, EvidenceSource::Cname);
				}
			}
		}

		for host in &records.mx {
			for rule in &self.patterns.email {
				if suffix_matches(host, &rule.suffix) {
					push(&mut out, &mut seen, DetectionKind::Email, &rule.provider, host, EvidenceSource::Mx);
				}
			}
		}

		for host in &records.ns {
			for rule in &self.patterns.dns {
				if dns_rule_matches(host, rule) {
					push(&mut out, &mut seen, DetectionKind::Dns, &rule.provider, host, EvidenceSource::Ns);
				}
			}
		}

		for value in &records.txt {
			for rule in &self.patterns.txt {
				if value.contains(&rule.substring) {
					let kind = match rule.kind {
						patterns::TxtKind::Email => DetectionKind::Email,
						patterns::TxtKind::Verification => DetectionKind::Verification,
					};
					push(&mut out, &mut seen, kind, &rule.provider, value, EvidenceSource::Txt);
				}
			}
		}

		out
	}
}

fn push(
	out: &mut Vec<Detection>,
	seen: &mut HashSet<(String, String)>,
	kind: DetectionKind,
	provider: &str,
	evidence: &str,
	source: EvidenceSource,
) {
	let key = (provider.to_string(), evidence.to_string());
	if !seen.insert(key) {
		return;
	}
	out.push(Detection {
		kind,
		provider: provider.to_string(),
		evidence: evidence.to_string(),
		source,
	});
}

fn trim_trailing_dot(host: &str) -> &str {
	host.strip_suffix('.').unwrap_or(host)
}

fn suffix_matches(host: &str, suffix: &str) -> bool {
	let host = trim_trailing_dot(host).to_ascii_lowercase();
	let suffix = suffix.to_ascii_lowercase();
	host == suffix || host.ends_with(&format!(".{suffix}"))
}

fn dns_rule_matches(host: &str, rule: &patterns::DnsRule) -> bool {
	let trimmed = trim_trailing_dot(host).to_ascii_lowercase();
	if let Some(suffix) = &rule.suffix {
		if suffix_matches(host, suffix) {
			return true;
		}
	}
	if let Some(contains) = &rule.contains {
		if trimmed.contains(&contains.to_ascii_lowercase()) {
			return true;
		}
	}
	false
}

#[cfg(test)]
mod tests {
	use super::*;
	use patterns::{DnsRule, SuffixRule, TxtKind, TxtRule};

	fn sample_patterns() -> Patterns {
		Patterns {
			cdn: vec![SuffixRule {
				suffix: "cloudfront.net".to_string(),
				provider: "AWS CloudFront".to_string(),
			}],
			email: vec![SuffixRule {
				suffix: "protection.outlook.com".to_string(),
				provider: "Microsoft 365".to_string(),
			}],
			dns: vec![DnsRule {
				suffix: None,
				contains: Some("awsdns".to_string()),
				provider: "AWS Route 53".to_string(),
			}],
			txt: vec![TxtRule {
				substring: "v=spf1".to_string(),
				provider: "SPF".to_string(),
				kind: TxtKind::Email,
			}],
		}
	}

	#[test]
	fn cname_suffix_match_yields_cdn_detection() {
		let engine = DetectionEngine::new(sample_patterns());
		let records = RecordSet {
			cnames: vec!["abc.cloudfront.net.".to_string()],
			..Default::default()
		};
		let detections = engine.classify(&records);
		assert_eq!(detections.len(), 1);
		assert_eq!(detections[0].kind, DetectionKind::Cdn);
		assert_eq!(detections[0].provider, "AWS CloudFront");
		assert_eq!(detections[0].evidence, "abc.cloudfront.net.");
		assert_eq!(detections[0].source, EvidenceSource::Cname);
	}

	#[test]
	fn duplicate_evidence_is_idempotent() {
		let engine = DetectionEngine::new(sample_patterns());
		let records = RecordSet {
			ns: vec!["ns-123.awsdns-45.com.".to_string(), "ns-123.awsdns-45.com.".to_string()],
			..Default::default()
		};
		let detections = engine.classify(&records);
		assert_eq!(detections.len(), 1);
	}

	#[test]
	fn empty_patterns_yield_no_detections() {
		let engine = DetectionEngine::new(Patterns::default());
		let records = RecordSet {
			cnames: vec!["abc.cloudfront.net.".to_string()],
			mx: vec!["mail.protection.outlook.com.".to_string()],
			ns: vec!["ns-123.awsdns-45.com.".to_string()],
			txt: vec!["v=spf1 include:_spf.example.com ~all".to_string()],
		};
		assert!(engine.classify(&records).is_empty());
	}

	#[test]
	fn dns_contains_rule_matches_substring() {
		let engine = DetectionEngine::new(sample_patterns());
		let records = RecordSet {
			ns: vec!["ns-123.awsdns-45.com.".to_string()],
			..Default::default()
		};
		let detections = engine.classify(&records);
		assert_eq!(detections.len(), 1);
		assert_eq!(detections[0].kind, DetectionKind::Dns);
	}

	#[test]
	fn txt_substring_match_yields_verification_or_email_kind() {
		let engine = DetectionEngine::new(sample_patterns());
		let records = RecordSet {
			txt: vec!["v=spf1 include:_spf.example.com ~all".to_string()],
			..Default::default()
		};
		let detections = engine.classify(&records);
		assert_eq!(detections.len(), 1);
		assert_eq!(detections[0].kind, DetectionKind::Email);
		assert_eq!(detections[0].source, EvidenceSource::Txt);
	}
}
