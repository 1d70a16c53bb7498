use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use crate::name::{classify, normalize, Classification};
use crate::record::RecordKind;

/// The platform's default hosts-file path. Overridable via
/// [`crate::config::ResolverConfig::hosts_path`] — tests use this to point
/// at a fixture instead of touching the real system file.
pub fn default_path() -> PathBuf {
	if cfg!(windows) {
		PathBuf::from(r"C:\Windows\system32\drivers\etc\hosts")
	} else {
		PathBuf::from("/etc/hosts")
	}
}

/// The file-read half of the hosts loader, injectable so the actual file
/// read can be swapped for a fixture or a non-blocking implementation. The
/// default just reads the file synchronously; the caller (`Resolver`)
/// defers the call via `cx.defer` so it never runs inline with dispatch of
/// other work.
pub trait HostsSource: Send + Sync {
	fn read(&self, path: &Path) -> io::Result<String>;
}

#[derive(Default)]
pub struct FsHostsSource;

impl HostsSource for FsHostsSource {
	fn read(&self, path: &Path) -> io::Result<String> {
		std::fs::read_to_string(path)
	}
}

/// A (record kind, lowercased name) → address-literal mapping loaded from
/// the hosts file, plus the always-present `localhost` synthetic entry.
#[derive(Debug, Clone, Default)]
pub struct HostsMap {
	entries: HashMap<(RecordKind, String), String>,
}

impl HostsMap {
	pub fn lookup(&self, name: &str, kind: RecordKind) -> Option<&str> {
		if normalize(name) == "localhost" {
			return match kind {
				RecordKind::A => Some("127.0.0.1"),
				RecordKind::Aaaa => Some("::1"),
				_ => None,
			};
		}

		self.entries.get(&(kind, normalize(name))).map(String::as_str)
	}
}

/// Loads and parses the hosts file at `path` via `source`. A missing or
/// unreadable file yields an empty map — this is not an error.
pub fn load(path: &Path, source: &dyn HostsSource) -> HostsMap {
	let text = match source.read(path) {
		Ok(text) => text,
		Err(err) => {
			log::debug!("hosts file '{}' unavailable: {err}", path.display());
			return HostsMap::default();
		}
	};

	parse(&text)
}

fn parse(text: &str) -> HostsMap {
	let mut entries = HashMap::new();

	for line in text.lines() {
		let line = match line.split_once('#') {
			Some((before, _)) => before,
			None => line,
		};

		let mut fields = line.split_whitespace();

		let Some(literal) = fields.next() else { continue };

		let kind = if literal.parse::<Ipv4Addr>().is_ok() {
			RecordKind::A
		} else if literal.parse::<Ipv6Addr>().is_ok() {
			RecordKind::Aaaa
		} else {
			continue;
		};

		for name in fields {
			if classify(name) != Classification::HostName {
				continue;
			}

			// Later lines override earlier ones.
			entries.insert((kind, normalize(name)), literal.to_owned());
		}
	}

	HostsMap { entries }
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Fixture(&'static str);

	impl HostsSource for Fixture {
		fn read(&self, _path: &Path) -> io::Result<String> {
			Ok(self.0.to_owned())
		}
	}

	struct Missing;

	impl HostsSource for Missing {
		fn read(&self, _path: &Path) -> io::Result<String> {
			Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
		}
	}

	#[test]
	fn missing_file_yields_empty_map() {
		let map = load(Path::new("/nonexistent"), &Missing);
		assert_eq!(map.lookup("router.lan", RecordKind::A), None);
	}

	#[test]
	fn localhost_resolves_without_file_entries() {
		let map = load(Path::new("/hosts"), &Missing);
		assert_eq!(map.lookup("localhost", RecordKind::A), Some("127.0.0.1"));
		assert_eq!(map.lookup("LocalHost", RecordKind::Aaaa), Some("::1"));
	}

	#[test]
	fn parses_names_case_insensitively() {
		let map = load(Path::new("/hosts"), &Fixture("192.168.1.1 Router.LAN gateway\n"));
		assert_eq!(map.lookup("router.lan", RecordKind::A), Some("192.168.1.1"));
		assert_eq!(map.lookup("gateway", RecordKind::A), Some("192.168.1.1"));
	}

	#[test]
	fn strips_comments_and_blank_lines() {
		let map = load(Path::new("/hosts"), &Fixture("# comment\n\n10.0.0.1 box.lan # trailing\n"));
		assert_eq!(map.lookup("box.lan", RecordKind::A), Some("10.0.0.1"));
	}

	#[test]
	fn later_lines_override_earlier_ones() {
		let map = load(Path::new("/hosts"), &Fixture("10.0.0.1 box.lan\n10.0.0.2 box.lan\n"));
		assert_eq!(map.lookup("box.lan", RecordKind::A), Some("10.0.0.2"));
	}

	#[test]
	fn v6_literal_maps_to_aaaa() {
		let map = load(Path::new("/hosts"), &Fixture("::1 box6.lan\n"));
		assert_eq!(map.lookup("box6.lan", RecordKind::Aaaa), Some("::1"));
		assert_eq!(map.lookup("box6.lan", RecordKind::A), None);
	}

	#[test]
	fn fs_hosts_source_reads_a_real_file() {
		use std::io::Write;

		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "192.168.1.1 router.lan").unwrap();

		let map = load(file.path(), &FsHostsSource);
		assert_eq!(map.lookup("router.lan", RecordKind::A), Some("192.168.1.1"));
	}
}
