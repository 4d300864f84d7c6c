use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::TridentError;
use crate::pap::PapLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
	Table,
	Json,
	Text,
}

impl Default for OutputFormat {
	fn default() -> Self {
		OutputFormat::Table
	}
}

#[derive(Debug, thiserror::Error)]
#[error("unknown output format {0:?}, expected one of table, json, text")]
pub struct OutputFormatParseError(String);

impl std::str::FromStr for OutputFormat {
	type Err = OutputFormatParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"table" => Ok(OutputFormat::Table),
			"json" => Ok(OutputFormat::Json),
			"text" => Ok(OutputFormat::Text),
			other => Err(OutputFormatParseError(other.to_string())),
		}
	}
}

/// Everything optional, `#[serde(default)]`: deserialized straight from
/// `config.yaml` and merged under CLI flags and `TRIDENT_*` env vars.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pap_limit: Option<PapLevel>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output: Option<OutputFormat>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub concurrency: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proxy: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tls_fingerprint: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub patterns_file: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub defang: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub verbose: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
	pub pap_limit: PapLevel,
	pub output: OutputFormat,
	pub concurrency: usize,
	pub proxy: Option<String>,
	pub user_agent: Option<String>,
	pub tls_fingerprint: Option<String>,
	pub patterns_file: Option<PathBuf>,
	pub defang: bool,
	pub verbose: bool,
}

impl Default for ResolvedConfig {
	fn default() -> Self {
		ResolvedConfig {
			pap_limit: PapLevel::White,
			output: OutputFormat::Table,
			concurrency: 10,
			proxy: None,
			user_agent: None,
			tls_fingerprint: None,
			patterns_file: None,
			defang: false,
			verbose: false,
		}
	}
}

pub fn config_dir() -> Option<PathBuf> {
	ProjectDirs::from("", "", "trident").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Merges, highest precedence first: `cli` overrides > `TRIDENT_*` env >
/// `config.yaml` > built-in default.
pub fn resolve(cli: RawConfig, dir: &Path) -> Result<ResolvedConfig, TridentError> {
	let config_file = dir.join("config.yaml");
	check_permissions(&config_file, dir);

	let mut figment = Figment::new();
	if config_file.exists() {
		figment = figment.merge(Yaml::file(&config_file));
	}
	// No `.split("_")`: that nests two-word keys like `TRIDENT_PAP_LIMIT`
	// as `pap.limit`, which never binds the flat `pap_limit` field.
	// Without it, figment lowercases the stripped env var directly
	// (`TRIDENT_PAP_LIMIT` -> `pap_limit`), matching the struct field.
	figment = figment.merge(Env::prefixed("TRIDENT_"));
	figment = figment.merge(Serialized::defaults(cli));

	let raw: RawConfig = figment.extract()?;
	let defaults = ResolvedConfig::default();

	let concurrency = raw.concurrency.unwrap_or(defaults.concurrency);
	if concurrency == 0 {
		return Err(TridentError::ConfigError("concurrency must be >= 1".to_string()));
	}

	Ok(ResolvedConfig {
		pap_limit: raw.pap_limit.unwrap_or(defaults.pap_limit),
		output: raw.output.unwrap_or(defaults.output),
		concurrency,
		proxy: raw.proxy,
		user_agent: raw.user_agent,
		tls_fingerprint: raw.tls_fingerprint,
		patterns_file: raw.patterns_file,
		defang: raw.defang.unwrap_or(defaults.defang),
		verbose: raw.verbose.unwrap_or(defaults.verbose),
	})
}

/// Unix-only: warns (does not fail) if `config.yaml` is `0600`-violating
/// or its directory isn't `0700`. No-op on non-unix targets.
#[cfg(unix)]
fn check_permissions(config_file: &Path, dir: &Path) {
	use std::os::unix::fs::PermissionsExt;

	if let Ok(meta) = std::fs::metadata(config_file) {
		let mode = meta.permissions().mode() & 0o777;
		if mode & 0o077 != 0 {
			tracing::warn!(path = %config_file.display(), mode = format!("{mode:o}"), "config file is group/world readable");
		}
	}
	if let Ok(meta) = std::fs::metadata(dir) {
		let mode = meta.permissions().mode() & 0o777;
		if mode != 0o700 {
			tracing::warn!(path = %dir.display(), mode = format!("{mode:o}"), "config directory is not 0700");
		}
	}
}

#[cfg(not(unix))]
fn check_permissions(_config_file: &Path, _dir: &Path) {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_concurrency_is_a_config_error() {
		let dir = std::env::temp_dir().join(format!("trident-config-test-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let cli = RawConfig { concurrency: Some(0), ..Default::default() };
		let err = resolve(cli, &dir).unwrap_err();
		assert!(matches!(err, TridentError::ConfigError(_)));
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn defaults_apply_when_nothing_set() {
		let dir = std::env::temp_dir().join(format!("trident-config-test-default-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let resolved = resolve(RawConfig::default(), &dir).unwrap();
		assert_eq!(resolved.pap_limit, PapLevel::White);
		assert_eq!(resolved.concurrency, 10);
		std::fs::remove_dir_all(&dir).ok();
	}
}
