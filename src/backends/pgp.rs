use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backends::{is_domain, is_email};
use crate::http_client::HttpClient;
use crate::pap::PapLevel;
use crate::retry::RetryPolicy;
use crate::service::{Service, ServiceError, ServiceOutput};

#[derive(Debug, Clone, Serialize)]
pub struct PgpKey {
	pub key_id: String,
	pub uids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PgpOutput {
	pub keys: Vec<PgpKey>,
}

impl PgpOutput {
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

pub struct PgpService {
	pub http: HttpClient,
}

const NAME: &str = "pgp";
const KEYSERVER: &str = "https://keys.openpgp.org";

#[async_trait]
impl Service for PgpService {
	fn name(&self) -> &'static str {
		NAME
	}

	fn pap(&self) -> PapLevel {
		PapLevel::Amber
	}

	async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<ServiceOutput, ServiceError> {
		if !is_email(input) && !is_domain(input) && input.split_whitespace().count() < 1 {
			return Err(ServiceError::InvalidInput { service: NAME, input: input.to_string() });
		}

		let url = format!(
			"{KEYSERVER}/pks/lookup?op=index&options=mr&search={}",
			url::form_urlencoded::byte_serialize(input.as_bytes()).collect::<String>()
		);
		let policy = RetryPolicy::new(&self.http);
		let response = policy
			.execute(NAME, Method::GET, &url, |b| b, cancel)
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: e })?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Ok(ServiceOutput::Pgp(PgpOutput::default()));
		}
		if !response.status().is_success() {
			return Err(ServiceError::Upstream {
				service: NAME,
				source: crate::error::TridentError::RequestFailed {
					service: NAME,
					source: anyhow::anyhow!("keys.openpgp.org returned status {}", response.status()),
				},
			});
		}

		let body = response
			.text()
			.await
			.map_err(|e| ServiceError::Upstream { service: NAME, source: crate::error::TridentError::RequestFailed { service: NAME, source: e.into() } })?;

		Ok(ServiceOutput::Pgp(PgpOutput { keys: parse_hkp_mr_index(&body) }))
	}

	fn aggregate(&self, results: Vec<ServiceOutput>) -> ServiceOutput {
		let mut keys = Vec::new();
		for result in results {
			if let ServiceOutput::Pgp(o) = result {
				keys.extend(o.keys);
			}
		}
		ServiceOutput::Pgp(PgpOutput { keys })
	}
}

/// Parses the HKP machine-readable index format (`options=mr`): one
/// `pub:keyid:algo:keylen:creationdate:expirationdate:flags` line per key
/// followed by its `uid:uid-string:...` lines.
fn parse_hkp_mr_index(body: &str) -> Vec<PgpKey> {
	let mut keys = Vec::new();
	let mut current: Option<PgpKey> = None;

	for line in body.lines() {
		let mut fields = line.split(':');
		match fields.next() {
			Some("pub") => {
				if let Some(key) = current.take() {
					keys.push(key);
				}
				let key_id = fields.next().unwrap_or_default().to_string();
				if !key_id.is_empty() {
					current = Some(PgpKey { key_id, uids: Vec::new() });
				}
			},
			Some("uid") => {
				if let Some(key) = current.as_mut() {
					if let Some(uid) = fields.next() {
						key.uids.push(percent_decode(uid));
					}
				}
			},
			_ => {},
		}
	}
	if let Some(key) = current.take() {
		keys.push(key);
	}
	keys
}

/// Minimal percent-decoder for HKP `uid` field values (`%20`, `%3C`, ...).
/// Invalid escapes pass through literally rather than erroring — the mr
/// index is display data, not a security boundary.
fn percent_decode(input: &str) -> String {
	let bytes = input.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' && i + 2 < bytes.len() {
			if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
				if let Ok(byte) = u8::from_str_radix(hex, 16) {
					out.push(byte);
					i += 3;
					continue;
				}
			}
		}
		out.push(bytes[i]);
		i += 1;
	}
	String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_pub_and_uid_lines() {
		let body = "info:1:1\npub:ABCDEF1234567890:1:2048:1234567890:::\nuid:Jane%20Doe%20%3Cjane%40example.com%3E:1234567890::\n";
		let keys = parse_hkp_mr_index(body);
		assert_eq!(keys.len(), 1);
		assert_eq!(keys[0].key_id, "ABCDEF1234567890");
		assert_eq!(keys[0].uids, vec!["Jane Doe <jane@example.com>".to_string()]);
	}

	#[test]
	fn empty_body_yields_no_keys() {
		assert!(parse_hkp_mr_index("info:1:0\n").is_empty());
	}
}
