use std::time::{Duration, Instant};

use reqwest::{Client, Proxy};
use tracing::debug;
use url::Url;

use crate::error::TridentError;
use crate::ratelimit::RateLimiter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a backend needs to make rate-limited, retried HTTP calls:
/// one `reqwest::Client`, one `RateLimiter` tuned to that backend's
/// published RPS. Binding the limiter here (not globally) means no
/// backend code path can forget to rate-limit its own upstream.
#[derive(Clone)]
pub struct HttpClient {
	pub client: Client,
	pub rate_limiter: RateLimiter,
	pub debug: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
	pub proxy: Option<String>,
	pub user_agent: Option<String>,
	pub tls_fingerprint: Option<String>,
	pub debug: bool,
}

const UA_PRESETS: &[(&str, &str)] = &[
	(
		"chrome",
		"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
	),
	(
		"firefox",
		"Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
	),
	(
		"safari",
		"Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
	),
];

fn default_user_agent() -> String {
	format!(
		"trident/{} (+https://github.com/trident-recon/trident)",
		env!("CARGO_PKG_VERSION")
	)
}

fn resolve_ua_string(explicit: Option<&str>) -> String {
	match explicit {
		None => default_user_agent(),
		Some(name) => UA_PRESETS
			.iter()
			.find(|(preset, _)| preset.eq_ignore_ascii_case(name))
			.map(|(_, full)| full.to_string())
			.unwrap_or_else(|| name.to_string()),
	}
}

/// Pure display-resolver: human-readable effective proxy value, never
/// performs I/O.
pub fn resolve_proxy(explicit: Option<&str>) -> String {
	if let Some(p) = explicit {
		return p.to_string();
	}
	for var in ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY", "http_proxy", "https_proxy", "all_proxy"] {
		if std::env::var(var).is_ok() {
			return "<from environment>".to_string();
		}
	}
	String::new()
}

/// Pure display-resolver: literal UA, preset name, or the computed default.
pub fn resolve_user_agent(explicit: Option<&str>) -> String {
	resolve_ua_string(explicit)
}

/// Pure display-resolver: TLS fingerprint preset name, or empty.
pub fn resolve_tls_fingerprint(explicit: Option<&str>) -> String {
	explicit.unwrap_or_default().to_string()
}

pub struct HttpClientFactory;

impl HttpClientFactory {
	/// Builds a ready HTTP client for one backend invocation.
	///
	/// `rps`/`burst` are the backend's own published rate, not a global
	/// setting — each upstream gets its own limiter bound to its own
	/// client.
	pub fn build(cfg: &HttpClientConfig, rps: f64, burst: u32) -> Result<HttpClient, TridentError> {
		let mut builder = Client::builder()
			.user_agent(resolve_ua_string(cfg.user_agent.as_deref()))
			.timeout(DEFAULT_TIMEOUT)
			.connect_timeout(DEFAULT_CONNECT_TIMEOUT);

		if let Some(proxy_url) = &cfg.proxy {
			let url = Url::parse(proxy_url)
				.map_err(|e| TridentError::ConfigError(format!("invalid proxy url {proxy_url:?}: {e}")))?;
			match url.scheme() {
				"http" | "https" | "socks5" => {
					let proxy = Proxy::all(url.as_str())
						.map_err(|e| TridentError::ConfigError(format!("invalid proxy {proxy_url:?}: {e}")))?;
					builder = builder.proxy(proxy);
				},
				other => {
					return Err(TridentError::ConfigError(format!(
						"unsupported proxy scheme {other:?}, expected http, https, or socks5"
					)));
				},
			}
		}

		// `cfg.tls_fingerprint` is recorded for display only (see
		// resolve_tls_fingerprint): reqwest's rustls backend has no public
		// ClientHello-fingerprint knob, so when a preset is requested but
		// unavailable we fall back to the default TLS stack rather than
		// erroring.

		let client = builder
			.build()
			.map_err(|e| TridentError::ConfigError(format!("failed to build http client: {e}")))?;

		Ok(HttpClient {
			client,
			rate_limiter: RateLimiter::new(rps, burst),
			debug: cfg.debug,
		})
	}
}

impl HttpClient {
	/// Logs method/url/status/timing for debug mode, and up to 512 bytes
	/// of the response body for non-2xx responses.
	pub async fn log_debug(&self, method: &str, url: &str, start: Instant, status: Option<u16>, body_snippet: Option<&str>) {
		if !self.debug {
			return;
		}
		let elapsed = start.elapsed();
		debug!(
			method,
			url,
			status,
			connect_and_total_ms = elapsed.as_millis() as u64,
			body_snippet,
			"http request"
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolve_user_agent_prefers_preset_then_literal_then_default() {
		assert!(resolve_user_agent(Some("chrome")).contains("Chrome"));
		assert_eq!(resolve_user_agent(Some("my-bot/1.0")), "my-bot/1.0");
		assert!(resolve_user_agent(None).starts_with("trident/"));
	}

	#[test]
	fn resolve_proxy_returns_literal_when_explicit() {
		assert_eq!(resolve_proxy(Some("socks5://127.0.0.1:9050")), "socks5://127.0.0.1:9050");
	}

	#[test]
	fn factory_rejects_unsupported_proxy_scheme() {
		let cfg = HttpClientConfig {
			proxy: Some("ftp://example.com".to_string()),
			..Default::default()
		};
		let err = HttpClientFactory::build(&cfg, 1.0, 1).unwrap_err();
		assert!(matches!(err, TridentError::ConfigError(_)));
	}

	#[test]
	fn factory_accepts_socks5_proxy() {
		let cfg = HttpClientConfig {
			proxy: Some("socks5://127.0.0.1:9050".to_string()),
			..Default::default()
		};
		assert!(HttpClientFactory::build(&cfg, 1.0, 1).is_ok());
	}
}
