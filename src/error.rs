use thiserror::Error;

use crate::pap::PapLevel;

/// Every error kind the core distinguishes when dispatching a backend.
///
/// `NoData` is deliberately absent here: an empty-but-successful result is
/// represented by `DispatchOutcome::NoData`, not by this enum, so "no data"
/// can never accidentally be treated as a failure.
#[derive(Debug, Error)]
pub enum TridentError {
	#[error("backend {service} rejected input {input:?}")]
	InvalidInput { service: &'static str, input: String },

	#[error("{service} requires pap level {required} but the configured limit is {limit}")]
	PapBlocked {
		service: &'static str,
		required: PapLevel,
		limit: PapLevel,
	},

	#[error("request to {service} failed: {source}")]
	RequestFailed {
		service: &'static str,
		#[source]
		source: anyhow::Error,
	},

	#[error("operation cancelled")]
	Cancelled,

	#[error("configuration error: {0}")]
	ConfigError(String),
}

impl From<figment::Error> for TridentError {
	fn from(value: figment::Error) -> Self {
		TridentError::ConfigError(value.to_string())
	}
}

pub type Result<T> = std::result::Result<T, TridentError>;
