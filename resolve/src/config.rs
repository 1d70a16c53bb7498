use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::hosts::{default_path, FsHostsSource, HostsSource};
use crate::record::RecordKind;

pub const DEFAULT_SERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_REQUEST_ID: u32 = 65536;
pub const MAX_CHAIN_HOPS: u32 = 30;

/// Process-lifetime settings that do not vary per call, passed once to
/// [`crate::Resolver::init`].
pub struct ResolverConfig {
	pub hosts_path: PathBuf,
	pub hosts_source: Arc<dyn HostsSource>,
	pub idle_timeout: Duration,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		Self {
			hosts_path: default_path(),
			hosts_source: Arc::new(FsHostsSource),
			idle_timeout: IDLE_TIMEOUT,
		}
	}
}

/// Per-call options recognized by `resolve`/`query`.
#[derive(Clone)]
pub struct Options {
	pub server: Option<String>,
	pub timeout: Duration,
	pub no_hosts: bool,
	pub reload_hosts: bool,
	pub no_cache: bool,
	pub types: Vec<RecordKind>,
	pub recurse: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			server: None,
			timeout: DEFAULT_TIMEOUT,
			no_hosts: false,
			reload_hosts: false,
			no_cache: false,
			types: vec![RecordKind::A, RecordKind::Aaaa],
			recurse: false,
		}
	}
}

impl Options {
	pub fn server_spec(&self) -> String {
		self.server.clone().unwrap_or_else(|| format!("{DEFAULT_SERVER}:{DEFAULT_PORT}"))
	}

	/// De-duplicates `types`, preserving the first occurrence's position —
	/// this is the order the final answer list is sorted by.
	pub fn dedup_types(mut types: Vec<RecordKind>) -> Vec<RecordKind> {
		let mut seen = std::collections::HashSet::new();
		types.retain(|kind| seen.insert(*kind));
		types
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dedup_types_keeps_first_occurrence_order() {
		let types = vec![RecordKind::Aaaa, RecordKind::A, RecordKind::Aaaa, RecordKind::Cname, RecordKind::A];
		assert_eq!(Options::dedup_types(types), vec![RecordKind::Aaaa, RecordKind::A, RecordKind::Cname]);
	}

	#[test]
	fn server_spec_defaults_to_default_server_and_port() {
		let options = Options::default();
		assert_eq!(options.server_spec(), "8.8.8.8:53");
	}

	#[test]
	fn server_spec_uses_caller_supplied_value() {
		let mut options = Options::default();
		options.server = Some("1.1.1.1:53".to_owned());
		assert_eq!(options.server_spec(), "1.1.1.1:53");
	}
}
