use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Permissible Actions Protocol ceiling: how actively an operation is
/// allowed to touch its target. Lower variants are declared first so the
/// derived `Ord` gives us RED < AMBER < GREEN < WHITE for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PapLevel {
	/// No network calls of any kind: pure local pattern matching.
	Red,
	/// Third-party servers queried; does not directly reveal interest to
	/// the target (public APIs, DoH, Team Cymru).
	Amber,
	/// Direct interaction with the target's own infrastructure.
	Green,
	/// Unrestricted.
	White,
}

impl Default for PapLevel {
	fn default() -> Self {
		PapLevel::White
	}
}

#[derive(Debug, thiserror::Error)]
#[error("unknown pap level {0:?}, expected one of red, amber, green, white")]
pub struct PapParseError(String);

impl PapLevel {
	/// `required <= self` under RED < AMBER < GREEN < WHITE.
	pub fn allows(&self, required: PapLevel) -> bool {
		required <= *self
	}

	pub fn parse(input: &str) -> Result<PapLevel, PapParseError> {
		match input.trim().to_ascii_lowercase().as_str() {
			"red" => Ok(PapLevel::Red),
			"amber" => Ok(PapLevel::Amber),
			"green" => Ok(PapLevel::Green),
			"white" => Ok(PapLevel::White),
			other => Err(PapParseError(other.to_string())),
		}
	}
}

impl FromStr for PapLevel {
	type Err = PapParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		PapLevel::parse(s)
	}
}

impl fmt::Display for PapLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			PapLevel::Red => "red",
			PapLevel::Amber => "amber",
			PapLevel::Green => "green",
			PapLevel::White => "white",
		};
		f.write_str(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ordering_matches_spec() {
		assert!(PapLevel::Red < PapLevel::Amber);
		assert!(PapLevel::Amber < PapLevel::Green);
		assert!(PapLevel::Green < PapLevel::White);
	}

	#[test]
	fn parse_is_case_insensitive_and_trims() {
		assert_eq!(PapLevel::parse("  Amber\n").unwrap(), PapLevel::Amber);
		assert_eq!(PapLevel::parse("WHITE").unwrap(), PapLevel::White);
	}

	#[test]
	fn parse_rejects_unknown() {
		assert!(PapLevel::parse("blue").is_err());
	}

	#[test]
	fn parse_is_inverse_of_display() {
		for level in [PapLevel::Red, PapLevel::Amber, PapLevel::Green, PapLevel::White] {
			assert_eq!(PapLevel::parse(&level.to_string()).unwrap(), level);
		}
	}

	#[test]
	fn allows_is_total_order_containment() {
		for limit in [PapLevel::Red, PapLevel::Amber, PapLevel::Green, PapLevel::White] {
			for required in [PapLevel::Red, PapLevel::Amber, PapLevel::Green, PapLevel::White] {
				assert_eq!(limit.allows(required), required <= limit);
			}
		}
	}
}
