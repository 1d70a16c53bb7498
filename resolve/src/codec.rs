//! The message codec is the one external collaborator the core always
//! treats as opaque: build a query, encode it, decode a reply. Everything
//! past this boundary is plain wire bytes; everything before it is
//! `hickory_proto` types.

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

use crate::error::ConnectionError;
use crate::record::{AnswerRecord, RecordKind, Ttl};

fn to_record_type(kind: RecordKind) -> RecordType {
	match kind {
		RecordKind::A => RecordType::A,
		RecordKind::Aaaa => RecordType::AAAA,
		RecordKind::Cname => RecordType::CNAME,
		RecordKind::Dname => RecordType::DNAME,
		RecordKind::Other(code) => RecordType::from(code),
	}
}

fn from_record_type(rt: RecordType) -> RecordKind {
	match rt {
		RecordType::A => RecordKind::A,
		RecordType::AAAA => RecordKind::Aaaa,
		RecordType::CNAME => RecordKind::Cname,
		RecordType::DNAME => RecordKind::Dname,
		other => RecordKind::Other(u16::from(other)),
	}
}

/// Strips the trailing root-label dot `hickory_proto::rr::Name`'s `Display`
/// always emits, so record text matches what a caller typed in.
fn name_text(name: &Name) -> String {
	let text = name.to_string();
	text.strip_suffix('.').map(str::to_owned).unwrap_or(text)
}

/// A decoded response, reduced to exactly what the multiplexer needs.
pub struct DecodedResponse {
	pub id: u16,
	pub is_response: bool,
	pub response_code: u16,
	pub truncated: bool,
	pub answers: Vec<AnswerRecord>,
}

/// The boundary over an external encoder/decoder: build a query, encode it,
/// decode a response. No other codec behavior is assumed by the rest of the
/// core.
pub trait MessageCodec {
	fn build_query(&self, id: u16, qname: &str, kind: RecordKind) -> Result<Vec<u8>, ConnectionError>;
	fn decode_response(&self, bytes: &[u8]) -> Result<DecodedResponse, ConnectionError>;
}

/// The default codec, backed by `hickory-proto`.
#[derive(Default)]
pub struct HickoryCodec;

impl MessageCodec for HickoryCodec {
	fn build_query(&self, id: u16, qname: &str, kind: RecordKind) -> Result<Vec<u8>, ConnectionError> {
		let name = Name::from_ascii(qname).map_err(|err| ConnectionError::new(format!("invalid query name '{qname}': {err}")))?;

		let mut message = Message::new();
		message.set_id(id);
		message.set_message_type(MessageType::Query);
		message.set_recursion_desired(true);
		message.add_query(Query::query(name, to_record_type(kind)));

		message.to_bytes().map_err(|err| ConnectionError::new(format!("failed to encode query: {err}")))
	}

	fn decode_response(&self, bytes: &[u8]) -> Result<DecodedResponse, ConnectionError> {
		let message = Message::from_bytes(bytes).map_err(|err| ConnectionError::new(format!("failed to decode response: {err}")))?;

		let answers = message
			.answers()
			.iter()
			.filter_map(|record| answer_from_record(record))
			.collect();

		Ok(DecodedResponse {
			id: message.id(),
			is_response: message.message_type() == MessageType::Response,
			response_code: u8::from(message.response_code()) as u16,
			truncated: message.truncated(),
			answers,
		})
	}
}

fn answer_from_record(record: &Record) -> Option<AnswerRecord> {
	let kind = from_record_type(record.record_type());
	let ttl = Ttl::Seconds(record.ttl());

	let data = match record.data() {
		Some(RData::A(addr)) => addr.to_string(),
		Some(RData::AAAA(addr)) => addr.to_string(),
		Some(RData::CNAME(name)) => name_text(name),
		Some(RData::DNAME(name)) => name_text(name),
		Some(other) => other.to_string(),
		None => return None,
	};

	Some(AnswerRecord::new(data, kind, ttl))
}

/// `ResponseCode::NoError` carries code 0; anything else is a server-side
/// failure the multiplexer surfaces to the caller.
pub fn is_success(code: u16) -> bool {
	code == u8::from(ResponseCode::NoError) as u16
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_query_round_trips_through_the_wire_format() {
		let codec = HickoryCodec;
		let bytes = codec.build_query(0x1234, "example.test", RecordKind::Aaaa).unwrap();

		let message = Message::from_bytes(&bytes).unwrap();
		assert_eq!(message.id(), 0x1234);
		assert_eq!(message.message_type(), MessageType::Query);
		assert!(message.recursion_desired());
		assert_eq!(message.queries().len(), 1);
		assert_eq!(message.queries()[0].query_type(), RecordType::AAAA);
		assert_eq!(name_text(message.queries()[0].name()), "example.test");
	}

	#[test]
	fn build_query_rejects_invalid_names() {
		let codec = HickoryCodec;
		assert!(codec.build_query(1, "exa mple", RecordKind::A).is_err());
	}

	#[test]
	fn decode_response_reports_truncation_and_response_code() {
		let mut message = Message::new();
		message.set_id(7);
		message.set_message_type(MessageType::Response);
		message.set_response_code(ResponseCode::ServFail);
		message.set_truncated(true);

		let codec = HickoryCodec;
		let decoded = codec.decode_response(&message.to_bytes().unwrap()).unwrap();

		assert_eq!(decoded.id, 7);
		assert!(decoded.is_response);
		assert!(decoded.truncated);
		assert!(!is_success(decoded.response_code));
	}

	#[test]
	fn decode_response_extracts_a_record() {
		let mut message = Message::new();
		message.set_id(9);
		message.set_message_type(MessageType::Response);

		let name = Name::from_ascii("example.test.").unwrap();
		let mut record = Record::new();
		record.set_name(name);
		record.set_record_type(RecordType::A);
		record.set_ttl(300);
		record.set_data(Some(RData::A("93.184.216.34".parse().unwrap())));
		message.add_answer(record);

		let codec = HickoryCodec;
		let decoded = codec.decode_response(&message.to_bytes().unwrap()).unwrap();

		assert_eq!(decoded.answers.len(), 1);
		assert_eq!(decoded.answers[0].kind, RecordKind::A);
		assert_eq!(decoded.answers[0].data, "93.184.216.34");
		assert_eq!(decoded.answers[0].ttl.seconds(), Some(300));
	}

	#[test]
	fn decode_response_rejects_garbage_bytes() {
		let codec = HickoryCodec;
		assert!(codec.decode_response(&[0u8; 1]).is_err());
	}
}
