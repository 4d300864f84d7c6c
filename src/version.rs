use std::fmt::{self, Display, Formatter};

/// Grounded on the teacher's `version::BuildInfo`, simplified: trident
/// has no proto/codegen build script, so there is no generated
/// `AGENTGATEWAY_BUILD_*` env block to read from — version info comes
/// straight from Cargo's own compile-time env vars instead.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
	pub version: String,
	pub rust_version: String,
	pub git_revision: String,
}

impl BuildInfo {
	pub fn new() -> Self {
		BuildInfo {
			version: env!("CARGO_PKG_VERSION").to_string(),
			rust_version: rustc_version(),
			git_revision: option_env!("TRIDENT_GIT_REVISION").unwrap_or("unknown").to_string(),
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		BuildInfo::new()
	}
}

impl Display for BuildInfo {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "trident {} (rustc {}, revision {})", self.version, self.rust_version, self.git_revision)
	}
}

fn rustc_version() -> String {
	option_env!("TRIDENT_RUSTC_VERSION").unwrap_or("unknown").to_string()
}
