use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TridentError;
use crate::http_client::HttpClient;

const MAX_RETRIES: u32 = 3;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
const FALLBACK_WITH_RESPONSE: Duration = Duration::from_secs(5);
const FALLBACK_TRANSPORT_ERROR: Duration = Duration::from_secs(1);

/// Wraps one `HttpClient` with the rate-limit + retry pipeline every
/// HTTP-backed `Service` goes through.
pub struct RetryPolicy<'a> {
	http: &'a HttpClient,
}

impl<'a> RetryPolicy<'a> {
	pub fn new(http: &'a HttpClient) -> Self {
		RetryPolicy { http }
	}

	pub async fn execute(
		&self,
		service: &'static str,
		method: Method,
		url: &str,
		build: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
		cancel: &CancellationToken,
	) -> Result<Response, TridentError> {
		let mut attempt = 0u32;
		loop {
			self.http.rate_limiter.wait(cancel).await?;

			if cancel.is_cancelled() {
				return Err(TridentError::Cancelled);
			}

			let start = std::time::Instant::now();
			let req = build(self.http.client.request(method.clone(), url));
			let outcome = tokio::select! {
				res = req.send() => res,
				_ = cancel.cancelled() => return Err(TridentError::Cancelled),
			};

			let status = outcome.as_ref().ok().map(|r| r.status().as_u16());
			self.http.log_debug(method.as_str(), url, start, status, None).await;

			match should_retry(&outcome) {
				Retry::No => {
					return outcome.map_err(|e| TridentError::RequestFailed {
						service,
						source: e.into(),
					});
				},
				Retry::Yes if attempt < MAX_RETRIES => {
					attempt += 1;
					let delay = retry_delay(&outcome);
					warn!(service, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
					tokio::select! {
						_ = tokio::time::sleep(delay) => {},
						_ = cancel.cancelled() => return Err(TridentError::Cancelled),
					}
					continue;
				},
				Retry::Yes => {
					return outcome.map_err(|e| TridentError::RequestFailed {
						service,
						source: e.into(),
					});
				},
			}
		}
	}
}

enum Retry {
	Yes,
	No,
}

/// Retry predicate. `outcome` may be a transport error with *no* inner
/// response at all — the predicate must treat that as "no status" and
/// never unwrap a response that doesn't exist.
fn should_retry(outcome: &Result<Response, reqwest::Error>) -> Retry {
	match outcome {
		Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => Retry::Yes,
		Ok(_) => Retry::No,
		Err(e) => {
			if e.is_timeout() || e.is_connect() || e.is_request() {
				Retry::Yes
			} else {
				Retry::No
			}
		},
	}
}

fn retry_delay(outcome: &Result<Response, reqwest::Error>) -> Duration {
	match outcome {
		Ok(resp) => parse_retry_after(resp.headers().get(reqwest::header::RETRY_AFTER).and_then(|v| v.to_str().ok())),
		Err(_) => FALLBACK_TRANSPORT_ERROR,
	}
}

/// `parse_retry_after("")` = fallback (5s); `parse_retry_after("2")` = 2s;
/// any value >= 60 clamped to 60s; HTTP-date handled via RFC 2822 parsing
/// (`Retry-After` uses the IMF-fixdate grammar, which chrono's RFC 2822
/// parser accepts).
fn parse_retry_after(header: Option<&str>) -> Duration {
	let Some(value) = header else {
		return FALLBACK_WITH_RESPONSE;
	};
	if let Ok(secs) = value.trim().parse::<u64>() {
		return Duration::from_secs(secs.min(MAX_RETRY_AFTER.as_secs()));
	}
	if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
		let now = chrono::Utc::now();
		let delta = date.with_timezone(&chrono::Utc) - now;
		let secs = delta.num_seconds().max(0) as u64;
		return Duration::from_secs(secs.min(MAX_RETRY_AFTER.as_secs()));
	}
	debug!(value, "unparseable Retry-After header, using fallback");
	FALLBACK_WITH_RESPONSE
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_retry_after_empty_is_fallback() {
		assert_eq!(parse_retry_after(None), FALLBACK_WITH_RESPONSE);
		assert_eq!(parse_retry_after(Some("")), FALLBACK_WITH_RESPONSE);
	}

	#[test]
	fn parse_retry_after_integer_seconds() {
		assert_eq!(parse_retry_after(Some("2")), Duration::from_secs(2));
	}

	#[test]
	fn parse_retry_after_clamps_to_60() {
		assert_eq!(parse_retry_after(Some("600")), Duration::from_secs(60));
	}

	#[test]
	fn parse_retry_after_unparseable_falls_back() {
		assert_eq!(parse_retry_after(Some("not-a-value")), FALLBACK_WITH_RESPONSE);
	}

	#[tokio::test]
	async fn retry_predicate_never_panics_on_transport_error() {
		// A transport error carries no response; make sure the predicate
		// path that matters (Err branch) doesn't attempt to read a status.
		// Use a connect timeout of ~0 against a non-routable address so the
		// failure is a transport error, not an actual network round trip.
		let client = reqwest::Client::builder()
			.connect_timeout(Duration::from_millis(1))
			.build()
			.unwrap();
		let err: Result<Response, reqwest::Error> = client.get("http://10.255.255.1:81").send().await;
		assert!(err.is_err());
		assert!(matches!(should_retry(&err), Retry::Yes | Retry::No));
	}
}
