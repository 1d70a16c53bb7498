use std::io::{self, ErrorKind};
use std::time::Duration;

use log::error;
use stakker::Fwd;

pub mod error;
pub mod logger;
mod rt;
pub mod time;

pub use rt::*;

#[cfg(target_family = "unix")]
mod sys {
	pub use std::os::fd::{AsRawFd, RawFd};

	pub use libc::{c_void as BufType, poll, pollfd as Poll, recv, send, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};

	pub fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
		t.as_raw_fd()
	}
}

#[cfg(target_family = "windows")]
mod sys {
	pub use std::os::windows::io::AsRawSocket as AsRawFd;

	pub use u8 as BufType;
	pub use windows_sys::Win32::Networking::WinSock::{
		recv, send, WSAPoll as poll, POLLERR, POLLHUP, POLLNVAL, POLLRDNORM as POLLIN, POLLWRNORM as POLLOUT, SOCKET as RawFd, WSAPOLLFD as Poll,
	};

	pub fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
		t.as_raw_socket() as _
	}
}

pub use sys::AsRawFd;
use sys::*;

use error::Result;

fn as_timeout(t: Option<Duration>) -> i32 {
	t.and_then(|d| d.as_millis().try_into().ok()).unwrap_or(-1)
}

fn ret_to_err(val: isize) -> Result<Option<usize>> {
	match TryInto::<usize>::try_into(val) {
		Ok(n) => Ok(Some(n)),
		Err(_) => {
			let err = io::Error::last_os_error();

			if matches!(err.kind(), ErrorKind::WouldBlock) {
				return Ok(None);
			}

			error!("I/O operation failed: {err}");
			Err(())
		}
	}
}

fn send_bytes(fd: RawFd, buf: &[u8]) -> Result<bool> {
	let r = unsafe { sys::send(fd, buf.as_ptr() as *const BufType, buf.len() as _, 0) };

	if let Some(n) = ret_to_err(r as _)? {
		if n != buf.len() {
			error!("Only sent {}/{} bytes to socket", n, buf.len());
			return Err(());
		}

		Ok(true)
	} else {
		Ok(false)
	}
}

/// Reads at most one chunk of `cap` bytes. Returns `Ok(None)` on EWOULDBLOCK,
/// `Ok(Some(buf))` with the buffer truncated to the bytes actually read, and
/// `Err` on a hard failure. A zero-length read (the peer closed a stream
/// socket) is reported as `Ok(Some(empty))` so callers can distinguish it
/// from EWOULDBLOCK.
fn recv_bytes(fd: RawFd, cap: usize) -> Result<Option<Box<[u8]>>> {
	let mut buf = vec![0u8; cap];

	let r = unsafe { sys::recv(fd, buf.as_mut_ptr() as *mut BufType, buf.len() as _, 0) };

	if let Some(n) = ret_to_err(r as _)? {
		buf.truncate(n);
		Ok(Some(buf.into_boxed_slice()))
	} else {
		Ok(None)
	}
}

struct Entry {
	fwd: Fwd<Box<[u8]>>,
	/// Size of the next `recv` chunk. 512 for UDP (the DNS datagram cap);
	/// large enough to take a full TCP length-prefixed message in one go
	/// otherwise.
	chunk: usize,
	queue: Vec<Box<[u8]>>,
}

impl Entry {
	fn flush_read(&mut self, fd: RawFd) -> Result {
		while let Some(buf) = recv_bytes(fd, self.chunk)? {
			let eof = buf.is_empty();
			self.fwd.fwd(buf);

			if eof {
				// Zero-byte read: the peer closed the connection. Stop
				// draining — a further recv would just spin at EOF.
				break;
			}
		}

		Ok(())
	}

	fn flush_write(&mut self, fd: RawFd) -> Result {
		assert!(!self.queue.is_empty());

		loop {
			let Some(buf) = self.queue.last() else { return Ok(()) };

			if !send_bytes(fd, buf)? {
				return Ok(());
			}

			self.queue.pop();
		}
	}
}

thread_local! {
	static GLOBAL: std::cell::RefCell<State> = const {
		std::cell::RefCell::new(State {
			fds: Vec::new(),
			entries: Vec::new(),
		})
	};
}

struct State {
	fds: Vec<Poll>,
	entries: Vec<Entry>,
}

impl State {
	fn with<X, F: FnOnce(&mut Self) -> X>(f: F) -> X {
		GLOBAL.with(|x| f(&mut x.borrow_mut()))
	}

	fn idx_of<T: AsRawFd>(&mut self, socket: &T) -> usize {
		let raw = as_raw(socket);
		self.fds.iter().position(|f| f.fd == raw).expect("socket is registered")
	}

	/// Returns whether any sockets are still registered for polling.
	pub fn is_io(&self) -> bool {
		!self.fds.is_empty()
	}

	/// Polls every registered socket, dispatching readable/writable events
	/// to their `Entry`. Returns whether anything was ready.
	pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool> {
		if self.fds.is_empty() {
			return Ok(false);
		}

		let ret = unsafe {
			poll(
				self.fds.as_mut_ptr(),
				self.fds.len().try_into().expect("fewer than u32::MAX fds"),
				as_timeout(timeout),
			)
		};

		let mut pending: u32 = ret.try_into().map_err(|_| error!("poll() failed: {}", io::Error::last_os_error()))?;

		if pending == 0 {
			return Ok(false);
		}

		for idx in 0..self.fds.len() {
			let Poll { fd, events, revents } = &mut self.fds[idx];
			let entry = &mut self.entries[idx];

			if *revents == 0 {
				continue;
			}

			if *revents & POLLERR != 0 {
				error!("socket error while polling fd {fd}");
				return Err(());
			}

			if *revents & POLLNVAL != 0 {
				error!("invalid fd {fd} while polling");
				return Err(());
			}

			if *revents & (POLLIN | POLLHUP) != 0 {
				entry.flush_read(*fd)?;
			}

			if *revents & POLLOUT != 0 {
				entry.flush_write(*fd)?;
			}

			*events = POLLIN;

			if !entry.queue.is_empty() {
				*events |= POLLOUT;
			}

			*revents = 0;

			pending -= 1;

			if pending == 0 {
				break;
			}
		}

		Ok(true)
	}
}

/// Registers a readable/writable event with the process's poll(2) loop.
pub fn is_io() -> bool {
	State::with(State::is_io)
}

/// Drives one round of polling for every registered socket. Called by the
/// embedding event loop between stakker timer ticks.
pub fn poll(timeout: Option<Duration>) -> Result<bool> {
	State::with(|s| s.poll(timeout))
}

/// A non-blocking socket registered with the process-wide poll(2) loop.
/// Owns nothing about the DNS protocol — it just forwards raw chunks read
/// off the wire and buffers writes that would otherwise block.
pub struct Io<T: AsRawFd> {
	inner: T,
}

impl<T: AsRawFd> Io<T> {
	/// `chunk` bounds the size of a single `recv()`. For UDP this should be
	/// the datagram cap (512); for TCP it should be large enough to take one
	/// length-prefixed message without forcing extra poll round-trips.
	pub fn new(inner: T, chunk: usize, fwd: Fwd<Box<[u8]>>) -> Self {
		State::with(|s| {
			s.fds.push(Poll { fd: as_raw(&inner), events: POLLIN, revents: 0 });
			s.entries.push(Entry { fwd, chunk, queue: Vec::new() });
		});

		Self { inner }
	}

	pub fn get_ref(&self) -> &T {
		&self.inner
	}

	/// Writes `buf` to the socket. Returns `Ok(true)` if it was written
	/// immediately, `Ok(false)` if it was queued pending writable-readiness,
	/// and `Err` on a hard failure or short write.
	pub fn write(&self, buf: &[u8]) -> Result<bool> {
		if send_bytes(as_raw(&self.inner), buf)? {
			return Ok(true);
		}

		State::with(|s| {
			let idx = s.idx_of(&self.inner);
			s.entries[idx].queue.insert(0, buf.into());
			s.fds[idx].events |= POLLOUT;
		});

		Ok(false)
	}
}

impl<T: AsRawFd> Drop for Io<T> {
	fn drop(&mut self) {
		State::with(|s| {
			let idx = s.idx_of(&self.inner);
			s.entries.swap_remove(idx);
			s.fds.swap_remove(idx);
		});
	}
}
