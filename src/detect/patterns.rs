use std::path::Path;

use rust_embed::Embed;
use serde::{Deserialize, Serialize};

use crate::error::TridentError;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SuffixRule {
	pub suffix: String,
	pub provider: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DnsRule {
	#[serde(default)]
	pub suffix: Option<String>,
	#[serde(default)]
	pub contains: Option<String>,
	pub provider: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxtKind {
	Email,
	Verification,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TxtRule {
	pub substring: String,
	pub provider: String,
	pub kind: TxtKind,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Patterns {
	#[serde(default)]
	pub cdn: Vec<SuffixRule>,
	#[serde(default)]
	pub email: Vec<SuffixRule>,
	#[serde(default)]
	pub dns: Vec<DnsRule>,
	#[serde(default)]
	pub txt: Vec<TxtRule>,
}

#[derive(Embed)]
#[folder = "data/"]
#[include = "patterns.yaml"]
struct EmbeddedDefaults;

pub struct PatternStore;

impl PatternStore {
	/// Tries `explicit`, then `<config_dir>/detect.yaml`, then
	/// `<config_dir>/detect-downloaded.yaml`, then the embedded default,
	/// stopping at the first path that *exists*. A path that exists but
	/// fails to parse fails the whole call; it never falls through.
	pub fn load(explicit: Option<&Path>, config_dir: &Path) -> Result<Patterns, TridentError> {
		let candidates = [
			explicit.map(Path::to_path_buf),
			Some(config_dir.join("detect.yaml")),
			Some(config_dir.join("detect-downloaded.yaml")),
		];

		for candidate in candidates.into_iter().flatten() {
			if candidate.exists() {
				let raw = std::fs::read_to_string(&candidate).map_err(|e| {
					TridentError::ConfigError(format!("failed to read pattern file {}: {e}", candidate.display()))
				})?;
				return parse_patterns(&raw, &candidate.display().to_string());
			}
		}

		let embedded = EmbeddedDefaults::get("patterns.yaml")
			.ok_or_else(|| TridentError::ConfigError("embedded default patterns.yaml missing from binary".to_string()))?;
		let raw = std::str::from_utf8(embedded.data.as_ref())
			.map_err(|e| TridentError::ConfigError(format!("embedded patterns.yaml is not valid utf-8: {e}")))?;
		parse_patterns(raw, "<embedded>")
	}

	/// Fetches a patterns YAML over HTTPS using a plain, non-rate-limited
	/// client (pap = White, ambient collaborator for the `download`
	/// subcommand), validates it parses before committing, then writes
	/// atomically: tmp file in the same directory, fsync, rename over dest.
	pub async fn download(url: &str, dest: &Path) -> Result<(), TridentError> {
		let client = reqwest::Client::builder()
			.user_agent(concat!("trident/", env!("CARGO_PKG_VERSION")))
			.build()
			.map_err(|e| TridentError::ConfigError(format!("failed to build download client: {e}")))?;

		let response = client
			.get(url)
			.send()
			.await
			.map_err(|e| TridentError::ConfigError(format!("failed to fetch {url}: {e}")))?;
		if !response.status().is_success() {
			return Err(TridentError::ConfigError(format!(
				"failed to fetch {url}: status {}",
				response.status()
			)));
		}
		let body = response
			.text()
			.await
			.map_err(|e| TridentError::ConfigError(format!("failed to read response body from {url}: {e}")))?;

		parse_patterns(&body, url)?;

		let dir = dest.parent().ok_or_else(|| TridentError::ConfigError(format!("{} has no parent directory", dest.display())))?;
		std::fs::create_dir_all(dir)
			.map_err(|e| TridentError::ConfigError(format!("failed to create {}: {e}", dir.display())))?;

		let tmp = dir.join(format!(".{}.tmp", dest.file_name().and_then(|n| n.to_str()).unwrap_or("detect-downloaded.yaml")));
		{
			use std::io::Write;
			let mut file = std::fs::File::create(&tmp)
				.map_err(|e| TridentError::ConfigError(format!("failed to create {}: {e}", tmp.display())))?;
			file.write_all(body.as_bytes())
				.map_err(|e| TridentError::ConfigError(format!("failed to write {}: {e}", tmp.display())))?;
			file.sync_all()
				.map_err(|e| TridentError::ConfigError(format!("failed to fsync {}: {e}", tmp.display())))?;
		}
		std::fs::rename(&tmp, dest)
			.map_err(|e| TridentError::ConfigError(format!("failed to rename {} to {}: {e}", tmp.display(), dest.display())))?;
		Ok(())
	}
}

fn parse_patterns(raw: &str, source: &str) -> Result<Patterns, TridentError> {
	serde_yaml::from_str(raw).map_err(|e| TridentError::ConfigError(format!("failed to parse pattern file {source}: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn embedded_defaults_parse() {
		let patterns = PatternStore::load(None, Path::new("/nonexistent-trident-config-dir")).unwrap();
		assert!(!patterns.cdn.is_empty(), "embedded defaults should ship at least one cdn rule");
	}

	#[test]
	fn explicit_path_takes_precedence_and_must_parse() {
		let dir = std::env::temp_dir().join(format!("trident-patternstore-test-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let bad = dir.join("bad.yaml");
		std::fs::write(&bad, "cdn: [{suffix: }]").unwrap();

		let err = PatternStore::load(Some(&bad), &dir).unwrap_err();
		assert!(matches!(err, TridentError::ConfigError(_)));

		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn empty_pattern_file_parses_to_zero_entries() {
		let dir = std::env::temp_dir().join(format!("trident-patternstore-empty-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let empty = dir.join("empty.yaml");
		std::fs::write(&empty, "cdn: []\nemail: []\ndns: []\ntxt: []\n").unwrap();

		let patterns = PatternStore::load(Some(&empty), &dir).unwrap();
		assert!(patterns.cdn.is_empty());
		assert!(patterns.email.is_empty());
		assert!(patterns.dns.is_empty());
		assert!(patterns.txt.is_empty());

		std::fs::remove_dir_all(&dir).ok();
	}
}
