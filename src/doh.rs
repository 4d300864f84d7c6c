use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use crate::error::TridentError;
use crate::http_client::HttpClient;
use crate::retry::RetryPolicy;

const QUAD9_ENDPOINT: &str = "https://dns.quad9.net:5053/dns-query";
const SERVICE_NAME: &str = "quad9";

#[derive(Debug, Clone)]
pub struct DohRecord {
	pub name: String,
	pub record_type: RecordType,
	pub ttl: u32,
	pub data: String,
}

#[derive(Debug, Clone)]
pub struct DohResponse {
	pub status: ResponseCode,
	pub has_authority: bool,
	pub answers: Vec<DohRecord>,
}

pub struct DohClient<'a> {
	http: &'a HttpClient,
}

impl<'a> DohClient<'a> {
	pub fn new(http: &'a HttpClient) -> Self {
		DohClient { http }
	}

	pub async fn query(
		&self,
		name: &str,
		rrtype: RecordType,
		cancel: &CancellationToken,
	) -> Result<DohResponse, TridentError> {
		let wire = encode_query(name, rrtype)?;
		let encoded = URL_SAFE_NO_PAD.encode(wire);

		let policy = RetryPolicy::new(self.http);
		let response = policy
			.execute(
				SERVICE_NAME,
				Method::GET,
				QUAD9_ENDPOINT,
				|builder| {
					builder
						.query(&[("dns", encoded.as_str())])
						.header("Accept", "application/dns-message")
				},
				cancel,
			)
			.await?;

		if !response.status().is_success() {
			let status = response.status().as_u16();
			let body = response.text().await.unwrap_or_default();
			let snippet: String = body.chars().take(200).collect();
			return Err(TridentError::RequestFailed {
				service: SERVICE_NAME,
				source: anyhow::anyhow!("doh request failed: status {status}, body {snippet:?}"),
			});
		}

		let bytes = response
			.bytes()
			.await
			.map_err(|e| TridentError::RequestFailed {
				service: SERVICE_NAME,
				source: e.into(),
			})?;
		decode_response(&bytes)
	}
}

fn encode_query(name: &str, rrtype: RecordType) -> Result<Vec<u8>, TridentError> {
	let name = Name::from_ascii(name).map_err(|e| TridentError::ConfigError(format!("invalid dns name {name:?}: {e}")))?;
	let query = Query::query(name, rrtype);

	let mut message = Message::new();
	message
		.set_id(rand::random::<u16>())
		.set_message_type(MessageType::Query)
		.set_op_code(OpCode::Query)
		.set_recursion_desired(true)
		.add_query(query);

	message
		.to_bytes()
		.map_err(|e| TridentError::ConfigError(format!("failed to encode dns query: {e}")))
}

fn decode_response(bytes: &[u8]) -> Result<DohResponse, TridentError> {
	let message = Message::from_bytes(bytes)
		.map_err(|e| TridentError::RequestFailed { service: SERVICE_NAME, source: e.into() })?;

	let has_authority = !message.name_servers().is_empty();
	let answers = message.answers().iter().map(record_to_doh).collect();

	Ok(DohResponse {
		status: message.response_code(),
		has_authority,
		answers,
	})
}

fn record_to_doh(record: &Record) -> DohRecord {
	let data = record
		.data()
		.map(rdata_to_string)
		.unwrap_or_default();
	DohRecord {
		name: record.name().to_string(),
		record_type: record.record_type(),
		ttl: record.ttl(),
		data,
	}
}

fn rdata_to_string(rdata: &RData) -> String {
	match rdata {
		RData::A(ip) => ip.to_string(),
		RData::AAAA(ip) => ip.to_string(),
		RData::NS(name) => name.to_string(),
		RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange()),
		RData::CNAME(name) => name.to_string(),
		RData::SOA(soa) => format!(
			"{} {} {} {} {} {} {}",
			soa.mname(),
			soa.rname(),
			soa.serial(),
			soa.refresh(),
			soa.retry(),
			soa.expire(),
			soa.minimum()
		),
		RData::SRV(srv) => format!("{} {} {} {}", srv.priority(), srv.weight(), srv.port(), srv.target()),
		RData::TXT(txt) => txt
			.iter()
			.map(|b| String::from_utf8_lossy(b).into_owned())
			.collect::<Vec<_>>()
			.join(""),
		RData::CAA(caa) => format!("{:?}", caa),
		RData::DNSSEC(dnssec) => format!("{:?}", dnssec),
		RData::HTTPS(https) => format!("{:?}", https),
		other => format!("{other:?}"),
	}
}

/// Classifies a `rrtype` name for `DNSClass::IN`, used by callers that
/// build queries dynamically (the apex aggregate service sweeps many
/// record types).
pub fn dns_class_in() -> DNSClass {
	DNSClass::IN
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_then_decode_preserves_name_and_type() {
		let wire = encode_query("example.com.", RecordType::A).unwrap();
		let message = Message::from_bytes(&wire).unwrap();
		let query = message.queries().first().unwrap();
		assert_eq!(query.name().to_string(), "example.com.");
		assert_eq!(query.query_type(), RecordType::A);
	}

	#[test]
	fn decode_response_reports_authority_presence() {
		// Build a minimal response with an authority section and confirm
		// has_authority reflects it; quad9's NXDOMAIN-block verdict
		// depends on this flag.
		let mut message = Message::new();
		message.set_message_type(MessageType::Response);
		message.set_response_code(ResponseCode::NXDomain);
		let soa_name = Name::from_ascii("example.com.").unwrap();
		let ns_record = Record::from_rdata(soa_name, 300, RData::NS(Name::from_ascii("ns1.example.com.").unwrap()));
		message.add_name_server(ns_record);

		let bytes = message.to_bytes().unwrap();
		let decoded = decode_response(&bytes).unwrap();
		assert!(decoded.has_authority);
		assert_eq!(decoded.status, ResponseCode::NXDomain);
	}
}
