pub mod apex;
pub mod crtsh;
pub mod cymru;
pub mod detect_backend;
pub mod dns;
pub mod identify;
pub mod pgp;
pub mod quad9;
pub mod threatminer;

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;

static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[0-9a-fA-F]{32}|[0-9a-fA-F]{40}|[0-9a-fA-F]{64})$").expect("static hash regex is valid"));

/// Shared input-type classification helpers; each backend's `run` calls
/// one of these before doing any I/O and returns `ServiceError::InvalidInput`
/// on mismatch.
pub fn is_ip(input: &str) -> bool {
	input.parse::<IpAddr>().is_ok()
}

pub fn is_domain(input: &str) -> bool {
	!input.is_empty() && input.contains('.') && !input.chars().any(char::is_whitespace) && !is_ip(input)
}

pub fn is_asn_token(input: &str) -> bool {
	input.strip_prefix("AS").is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Matches MD5 (32 hex chars), SHA1 (40), or SHA256 (64) — the three hash
/// lengths ThreatMiner's `sample.php` accepts.
pub fn is_hash(input: &str) -> bool {
	HASH_RE.is_match(input)
}

pub fn is_email(input: &str) -> bool {
	let Some((local, domain)) = input.split_once('@') else {
		return false;
	};
	!local.is_empty() && is_domain(domain)
}
