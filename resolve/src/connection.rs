use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

use stakker::Fwd;

use crate::error::ConnectionError;

/// A UDP datagram carrying a DNS response never exceeds this size.
const UDP_CHUNK: usize = 512;
/// Large enough to take one maximum-size length-prefixed TCP message
/// (65535 bytes) in a single `recv`.
const TCP_CHUNK: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
	Udp,
	Tcp,
}

/// The canonical `udp://ip:port` / `tcp://ip:port` form of an upstream
/// server, used as both the connection table key and the wire label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uri {
	pub transport: Transport,
	pub addr: SocketAddr,
}

impl Uri {
	pub fn new(transport: Transport, addr: SocketAddr) -> Self {
		Self { transport, addr }
	}

	/// The same host/port, over TCP — used when a UDP reply is truncated.
	pub fn as_tcp(self) -> Self {
		Self { transport: Transport::Tcp, addr: self.addr }
	}
}

impl fmt::Display for Uri {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let scheme = match self.transport {
			Transport::Udp => "udp",
			Transport::Tcp => "tcp",
		};

		match self.addr.ip() {
			IpAddr::V6(ip) => write!(f, "{scheme}://[{ip}]:{}", self.addr.port()),
			ip => write!(f, "{scheme}://{ip}:{}", self.addr.port()),
		}
	}
}

/// Parses a caller-supplied `server` option: `addr`, `addr:port`, or
/// `[v6]:port`. Uses `rsplit_once(':')` so a trailing `:port` is always
/// taken as the port, even for a bare (non-bracketed) address.
pub fn parse_server(spec: &str, default_port: u16) -> Result<SocketAddr, ConnectionError> {
	if let Some(rest) = spec.strip_prefix('[') {
		let Some((host, tail)) = rest.split_once(']') else {
			return Err(ConnectionError::new(format!("malformed bracketed server address '{spec}'")));
		};

		let ip: Ipv6Addr = host.parse().map_err(|_| ConnectionError::new(format!("'{host}' is not a valid IPv6 address")))?;

		let port = match tail.strip_prefix(':') {
			Some(p) => p.parse().map_err(|_| ConnectionError::new(format!("'{p}' is not a valid port")))?,
			None => default_port,
		};

		return Ok(SocketAddr::new(IpAddr::V6(ip), port));
	}

	if let Ok(ip) = spec.parse::<IpAddr>() {
		return Ok(SocketAddr::new(ip, default_port));
	}

	match spec.rsplit_once(':') {
		Some((host, port)) => {
			let ip: IpAddr = host.parse().map_err(|_| ConnectionError::new(format!("'{host}' is not a valid IP address")))?;
			let port: u16 = port.parse().map_err(|_| ConnectionError::new(format!("'{port}' is not a valid port")))?;
			Ok(SocketAddr::new(ip, port))
		}
		None => Err(ConnectionError::new(format!("'{spec}' is not a valid server address"))),
	}
}

enum Socket {
	Udp(runtime::Io<UdpSocket>),
	Tcp(runtime::Io<TcpStream>),
}

/// State for reassembling 16-bit big-endian length-prefixed TCP frames:
/// append to the buffer on every readable event, then drain out as many
/// complete messages as are available.
#[derive(Default)]
struct TcpFramer {
	buf: Vec<u8>,
	len: Option<u16>,
}

impl TcpFramer {
	fn push(&mut self, chunk: &[u8]) {
		self.buf.extend_from_slice(chunk);
	}

	fn next_frame(&mut self) -> Option<Vec<u8>> {
		if self.len.is_none() && self.buf.len() >= 2 {
			let len = u16::from_be_bytes([self.buf[0], self.buf[1]]);
			self.buf.drain(..2);
			self.len = Some(len);
		}

		let len = self.len? as usize;

		if self.buf.len() < len {
			return None;
		}

		let frame = self.buf.drain(..len).collect();
		self.len = None;
		Some(frame)
	}
}

/// An open connection to one upstream server: its socket, TCP framing
/// state, outstanding request ids, and idle-expiry bookkeeping.
pub struct ServerConn {
	uri: Uri,
	socket: Socket,
	framer: TcpFramer,
	outstanding: HashSet<u16>,
	idle_expiry: Option<Instant>,
}

impl ServerConn {
	pub fn open(uri: Uri, fwd: Fwd<Box<[u8]>>) -> Result<Self, ConnectionError> {
		let socket = match uri.transport {
			Transport::Udp => {
				let bind = if uri.addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
				let sock = UdpSocket::bind(bind).map_err(|e| ConnectionError::from_io("binding UDP socket", e))?;
				sock.connect(uri.addr).map_err(|e| ConnectionError::from_io("connecting UDP socket", e))?;
				sock.set_nonblocking(true).map_err(|e| ConnectionError::from_io("setting UDP socket nonblocking", e))?;
				Socket::Udp(runtime::Io::new(sock, UDP_CHUNK, fwd))
			}
			Transport::Tcp => {
				let sock = TcpStream::connect(uri.addr).map_err(|e| ConnectionError::from_io("connecting TCP socket", e))?;
				sock.set_nonblocking(true).map_err(|e| ConnectionError::from_io("setting TCP socket nonblocking", e))?;
				Socket::Tcp(runtime::Io::new(sock, TCP_CHUNK, fwd))
			}
		};

		Ok(Self {
			uri,
			socket,
			framer: TcpFramer::default(),
			outstanding: HashSet::new(),
			idle_expiry: None,
		})
	}

	pub fn uri(&self) -> Uri {
		self.uri
	}

	/// Sends one encoded query. UDP payloads go as-is; TCP payloads are
	/// prefixed with their 16-bit big-endian length.
	pub fn send(&self, payload: &[u8]) -> Result<(), ConnectionError> {
		let result = match &self.socket {
			Socket::Udp(io) => io.write(payload),
			Socket::Tcp(io) => {
				let len: u16 = payload.len().try_into().map_err(|_| ConnectionError::new("query too large for TCP length prefix"))?;

				let mut framed = Vec::with_capacity(payload.len() + 2);
				framed.extend_from_slice(&len.to_be_bytes());
				framed.extend_from_slice(payload);
				io.write(&framed)
			}
		};

		result.map(|_| ()).map_err(|_| ConnectionError::new(format!("write to {} failed or was short", self.uri)))
	}

	/// Feeds one chunk read off the wire and returns every complete message
	/// it yielded. `Err` means the connection is fatally broken (the peer
	/// closed a TCP stream) and must be torn down.
	pub fn on_read(&mut self, chunk: Box<[u8]>) -> Result<Vec<Vec<u8>>, ConnectionError> {
		match &self.socket {
			Socket::Udp(_) => Ok(vec![chunk.into_vec()]),
			Socket::Tcp(_) => {
				if chunk.is_empty() {
					return Err(ConnectionError::new(format!("{} closed by peer", self.uri)));
				}

				self.framer.push(&chunk);

				let mut messages = Vec::new();
				while let Some(frame) = self.framer.next_frame() {
					messages.push(frame);
				}

				Ok(messages)
			}
		}
	}

	pub fn mark_sent(&mut self, id: u16) {
		self.outstanding.insert(id);
		self.idle_expiry = None;
	}

	/// Returns whether the connection just became idle (empty outstanding
	/// set), so the caller can record an idle-expiry for it.
	pub fn mark_done(&mut self, id: u16) -> bool {
		self.outstanding.remove(&id);
		self.outstanding.is_empty()
	}

	pub fn outstanding(&self) -> &HashSet<u16> {
		&self.outstanding
	}

	pub fn is_idle(&self) -> bool {
		self.outstanding.is_empty()
	}

	pub fn set_idle_expiry(&mut self, idle_timeout: Duration) {
		self.idle_expiry = Some(Instant::now() + idle_timeout);
	}

	pub fn idle_expired(&self, now: Instant) -> bool {
		matches!(self.idle_expiry, Some(expiry) if now >= expiry)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::DEFAULT_PORT;

	#[test]
	fn parse_server_bare_ip_uses_default_port() {
		let addr = parse_server("8.8.8.8", DEFAULT_PORT).unwrap();
		assert_eq!(addr, SocketAddr::new(IpAddr::V4("8.8.8.8".parse().unwrap()), 53));
	}

	#[test]
	fn parse_server_with_explicit_port() {
		let addr = parse_server("8.8.8.8:5353", DEFAULT_PORT).unwrap();
		assert_eq!(addr.port(), 5353);
	}

	#[test]
	fn parse_server_bracketed_v6_with_port() {
		let addr = parse_server("[2001:4860:4860::8888]:53", DEFAULT_PORT).unwrap();
		assert!(addr.is_ipv6());
		assert_eq!(addr.port(), 53);
	}

	#[test]
	fn parse_server_bracketed_v6_without_port_uses_default() {
		let addr = parse_server("[::1]", 53).unwrap();
		assert_eq!(addr.port(), 53);
	}

	#[test]
	fn parse_server_rejects_garbage() {
		assert!(parse_server("not-an-address", DEFAULT_PORT).is_err());
	}

	#[test]
	fn tcp_framer_reassembles_one_frame_split_across_pushes() {
		let mut framer = TcpFramer::default();
		let message = b"hello dns";
		let mut framed = Vec::new();
		framed.extend_from_slice(&(message.len() as u16).to_be_bytes());
		framed.extend_from_slice(message);

		framer.push(&framed[..3]);
		assert!(framer.next_frame().is_none());

		framer.push(&framed[3..]);
		assert_eq!(framer.next_frame().unwrap(), message);
		assert!(framer.next_frame().is_none());
	}

	#[test]
	fn tcp_framer_drains_multiple_complete_frames_in_one_push() {
		let mut framer = TcpFramer::default();
		let mut framed = Vec::new();
		for message in [&b"one"[..], &b"two"[..]] {
			framed.extend_from_slice(&(message.len() as u16).to_be_bytes());
			framed.extend_from_slice(message);
		}

		framer.push(&framed);
		assert_eq!(framer.next_frame().unwrap(), b"one");
		assert_eq!(framer.next_frame().unwrap(), b"two");
		assert!(framer.next_frame().is_none());
	}

	#[test]
	fn uri_display_brackets_ipv6() {
		let uri = Uri::new(Transport::Udp, SocketAddr::new(IpAddr::V6("::1".parse().unwrap()), 53));
		assert_eq!(uri.to_string(), "udp://[::1]:53");
	}

	#[test]
	fn as_tcp_preserves_address() {
		let udp = Uri::new(Transport::Udp, SocketAddr::new(IpAddr::V4("1.2.3.4".parse().unwrap()), 53));
		let tcp = udp.as_tcp();
		assert_eq!(tcp.transport, Transport::Tcp);
		assert_eq!(tcp.addr, udp.addr);
	}
}
