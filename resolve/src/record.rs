use std::fmt;

/// The DNS record kinds the resolver reasons about by behavior. Any other
/// type code round-trips through `Other` without special handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
	A,
	Aaaa,
	Cname,
	Dname,
	Other(u16),
}

impl RecordKind {
	pub fn code(self) -> u16 {
		match self {
			RecordKind::A => 1,
			RecordKind::Aaaa => 28,
			RecordKind::Cname => 5,
			RecordKind::Dname => 39,
			RecordKind::Other(code) => code,
		}
	}

	pub fn from_code(code: u16) -> Self {
		match code {
			1 => RecordKind::A,
			28 => RecordKind::Aaaa,
			5 => RecordKind::Cname,
			39 => RecordKind::Dname,
			other => RecordKind::Other(other),
		}
	}

	pub fn is_alias(self) -> bool {
		matches!(self, RecordKind::Cname | RecordKind::Dname)
	}
}

impl fmt::Display for RecordKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RecordKind::A => write!(f, "A"),
			RecordKind::Aaaa => write!(f, "AAAA"),
			RecordKind::Cname => write!(f, "CNAME"),
			RecordKind::Dname => write!(f, "DNAME"),
			RecordKind::Other(code) => write!(f, "TYPE{code}"),
		}
	}
}

/// The time-to-live of an [`AnswerRecord`]. `Unset` marks records sourced
/// from the hosts file or an IP literal: they are never cached and never
/// expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
	Seconds(u32),
	Unset,
}

impl Ttl {
	pub fn seconds(self) -> Option<u32> {
		match self {
			Ttl::Seconds(s) => Some(s),
			Ttl::Unset => None,
		}
	}
}

/// One (address-or-target, kind, ttl) triple, as returned by an upstream or
/// synthesized from local data (hosts file, IP literal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
	pub data: String,
	pub kind: RecordKind,
	pub ttl: Ttl,
}

impl AnswerRecord {
	pub fn new(data: impl Into<String>, kind: RecordKind, ttl: Ttl) -> Self {
		Self { data: data.into(), kind, ttl }
	}

	pub fn unset(data: impl Into<String>, kind: RecordKind) -> Self {
		Self::new(data, kind, Ttl::Unset)
	}
}
