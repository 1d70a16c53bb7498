use std::net::{Ipv4Addr, Ipv6Addr};

/// What an input string turned out to be, per the host-name/IP-literal
/// classification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	Ip4Literal,
	Ip6Literal,
	HostName,
	Invalid,
}

/// Classifies `name` as an IPv4 literal, an IPv6 literal, a candidate host
/// name, or invalid. Host names are validated against RFC 1035 label rules;
/// matching is case-insensitive.
pub fn classify(name: &str) -> Classification {
	if name.parse::<Ipv4Addr>().is_ok() {
		return Classification::Ip4Literal;
	}

	if name.parse::<Ipv6Addr>().is_ok() {
		return Classification::Ip6Literal;
	}

	if is_valid_hostname(name) {
		Classification::HostName
	} else {
		Classification::Invalid
	}
}

pub fn is_valid_hostname(name: &str) -> bool {
	if name.is_empty() || name.len() > 253 {
		return false;
	}

	name.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
	let bytes = label.as_bytes();

	if bytes.is_empty() || bytes.len() > 63 {
		return false;
	}

	let is_alnum = |b: u8| b.is_ascii_alphanumeric();

	if !is_alnum(bytes[0]) || !is_alnum(*bytes.last().unwrap()) {
		return false;
	}

	bytes.iter().all(|&b| is_alnum(b) || b == b'-')
}

/// Lowercases a name for use as a cache/hosts-map key. DNS names are
/// case-insensitive; the resolver normalizes to lowercase before any lookup.
pub fn normalize(name: &str) -> String {
	name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_ip4_literal() {
		assert_eq!(classify("127.0.0.1"), Classification::Ip4Literal);
	}

	#[test]
	fn classifies_ip6_literal() {
		assert_eq!(classify("::1"), Classification::Ip6Literal);
	}

	#[test]
	fn classifies_hostname() {
		assert_eq!(classify("example.test"), Classification::HostName);
	}

	#[test]
	fn rejects_254_byte_hostname() {
		let label = "a".repeat(63);
		let name = format!("{label}.{label}.{label}.{}", "a".repeat(62));
		assert_eq!(name.len(), 254);
		assert!(!is_valid_hostname(&name));
	}

	#[test]
	fn accepts_253_byte_hostname() {
		let label = "a".repeat(63);
		let name = format!("{label}.{label}.{label}.{}", "a".repeat(61));
		assert_eq!(name.len(), 253);
		assert!(is_valid_hostname(&name));
	}

	#[test]
	fn rejects_label_starting_with_hyphen() {
		assert!(!is_valid_hostname("-abc.test"));
	}

	#[test]
	fn rejects_label_ending_with_hyphen() {
		assert!(!is_valid_hostname("abc-.test"));
	}

	#[test]
	fn rejects_empty_label() {
		assert!(!is_valid_hostname("abc..test"));
	}

	#[test]
	fn rejects_invalid_characters() {
		assert_eq!(classify("exa_mple.test"), Classification::Invalid);
	}
}
