use std::collections::HashMap;
use std::time::Instant;

use stakker::{fwd_to, Ret, CX};

use crate::cache::{AnswerCache, CacheKey};
use crate::codec::{is_success, MessageCodec};
use crate::connection::{parse_server, ServerConn, Transport, Uri};
use crate::error::{ConnectionError, ResolveError};
use crate::record::{AnswerRecord, RecordKind};
use crate::Resolver;

/// Answers grouped by kind, as a single upstream reply can (and for CNAME
/// chases, does) carry more than one record type in its answer section.
pub type GroupedAnswers = HashMap<RecordKind, Vec<AnswerRecord>>;

pub(crate) struct PendingRequest {
	pub name: String,
	pub kind: RecordKind,
	pub uri: Uri,
	pub ret: Ret<Result<GroupedAnswers, ResolveError>>,
}

impl Resolver {
	/// Allocates a fresh 16-bit id, wrapping in `[1, MAX_REQUEST_ID)` and
	/// skipping any id still present in the global pending table.
	pub(crate) fn allocate_id(&mut self) -> u16 {
		loop {
			self.next_id = if (self.next_id as u32 + 1) >= crate::config::MAX_REQUEST_ID {
				1
			} else {
				self.next_id + 1
			};

			if !self.pending.contains_key(&self.next_id) {
				return self.next_id;
			}
		}
	}

	/// Looks up (or lazily opens) the connection for `uri`.
	fn connection(&mut self, cx: CX![], uri: Uri) -> Result<&mut ServerConn, ConnectionError> {
		if !self.connections.contains_key(&uri) {
			let actor = cx.access_actor().clone();
			let fwd = fwd_to!([actor], on_socket_data(uri) as (Box<[u8]>));
			let conn = ServerConn::open(uri, fwd)?;
			self.connections.insert(uri, conn);
			self.ensure_tick(cx);
		}

		Ok(self.connections.get_mut(&uri).expect("just inserted"))
	}

	/// Dispatches one query for `(name, kind)` against `uri`. `ret` is
	/// completed by the dispatch callback (possibly after a TCP retry).
	pub(crate) fn request(&mut self, cx: CX![], uri: Uri, name: String, kind: RecordKind, ret: Ret<Result<GroupedAnswers, ResolveError>>) {
		let conn = match self.connection(cx, uri) {
			Ok(conn) => conn,
			Err(err) => {
				ret.ret(Err(ResolveError::Connection(err)));
				return;
			}
		};

		let id = self.allocate_id();

		let payload = match self.codec.build_query(id, &name, kind) {
			Ok(payload) => payload,
			Err(err) => {
				// A connection may have just been opened to reach this
				// point. It has no outstanding requests yet, so it needs an
				// idle-expiry set explicitly — nothing else will mark it.
				if let Some(conn) = self.connections.get_mut(&uri) {
					if conn.is_idle() {
						conn.set_idle_expiry(self.config.idle_timeout);
					}
				}

				ret.ret(Err(ResolveError::Connection(err)));
				return;
			}
		};

		self.pending.insert(id, PendingRequest { name, kind, uri, ret });

		let conn = self.connections.get_mut(&uri).expect("connection just resolved");
		conn.mark_sent(id);

		if let Err(err) = conn.send(&payload) {
			self.fail_connection(cx, uri, err);
		}
	}

	/// Parses `server_spec` and issues `request` against it, defaulting to
	/// UDP (truncation escalates to TCP automatically).
	pub(crate) fn request_to_server(
		&mut self,
		cx: CX![],
		server_spec: &str,
		name: String,
		kind: RecordKind,
		ret: Ret<Result<GroupedAnswers, ResolveError>>,
	) {
		match parse_server(server_spec, crate::config::DEFAULT_PORT) {
			Ok(addr) => self.request(cx, Uri::new(Transport::Udp, addr), name, kind, ret),
			Err(err) => ret.ret(Err(ResolveError::Connection(err))),
		}
	}

	/// The per-connection dispatch callback: decodes one frame and routes it
	/// back to its originating pending request.
	pub(crate) fn on_socket_data(&mut self, cx: CX![], uri: Uri, chunk: Box<[u8]>) {
		let Some(conn) = self.connections.get_mut(&uri) else { return };

		let messages = match conn.on_read(chunk) {
			Ok(messages) => messages,
			Err(err) => {
				self.fail_connection(cx, uri, err);
				return;
			}
		};

		for message in messages {
			self.handle_message(cx, uri, &message);
		}
	}

	fn handle_message(&mut self, cx: CX![], uri: Uri, bytes: &[u8]) {
		let decoded = match self.codec.decode_response(bytes) {
			Ok(decoded) => decoded,
			Err(err) => {
				log::warn!("undecodable frame from {uri}: {err}");
				self.fail_connection(cx, uri, err);
				return;
			}
		};

		if !self.pending.contains_key(&decoded.id) {
			log::trace!("dropping reply for unknown or completed request id {}", decoded.id);
			return;
		}

		if !decoded.is_response {
			self.fail_connection(cx, uri, ConnectionError::new("server replied with a QUERY, not a RESPONSE"));
			return;
		}

		if !is_success(decoded.response_code) {
			self.finalize(cx, decoded.id, Err(ResolveError::ServerFailure(decoded.response_code)));
			return;
		}

		if decoded.truncated {
			if uri.transport == Transport::Udp {
				self.reissue_via_tcp(cx, decoded.id);
			} else {
				self.finalize(cx, decoded.id, Err(ResolveError::TruncationUnrecoverable));
			}
			return;
		}

		if decoded.answers.is_empty() {
			self.finalize(cx, decoded.id, Err(ResolveError::NoRecord));
			return;
		}

		let mut grouped: GroupedAnswers = HashMap::new();
		for record in decoded.answers {
			grouped.entry(record.kind).or_default().push(record);
		}

		self.finalize(cx, decoded.id, Ok(grouped));
	}

	/// Re-issues the same question over TCP to the same host/port, chaining
	/// the new request's completion to the original waiter.
	fn reissue_via_tcp(&mut self, cx: CX![], id: u16) {
		let Some(pending) = self.pending.remove(&id) else { return };

		if let Some(conn) = self.connections.get_mut(&pending.uri) {
			if conn.mark_done(id) {
				conn.set_idle_expiry(self.config.idle_timeout);
			}
		}

		let tcp_uri = pending.uri.as_tcp();
		self.request(cx, tcp_uri, pending.name, pending.kind, pending.ret);
	}

	/// Removes the request from both tables, updates idle-expiry, writes
	/// the cache on success, and completes the waiter.
	fn finalize(&mut self, cx: CX![], id: u16, result: Result<GroupedAnswers, ResolveError>) {
		let Some(pending) = self.pending.remove(&id) else { return };

		if let Some(conn) = self.connections.get_mut(&pending.uri) {
			if conn.mark_done(id) {
				conn.set_idle_expiry(self.config.idle_timeout);
			}
		}

		let _ = cx;

		if let Ok(ref grouped) = result {
			for (kind, records) in grouped {
				self.cache.set(CacheKey::new(&pending.name, *kind), records.clone());
			}
		}

		pending.ret.ret(result);
	}

	/// Tears down a faulted connection and fails every request still
	/// outstanding on it with the same error.
	pub(crate) fn fail_connection(&mut self, cx: CX![], uri: Uri, err: ConnectionError) {
		log::warn!("connection {uri} failed: {err}");

		let Some(conn) = self.connections.remove(&uri) else { return };
		let ids: Vec<u16> = conn.outstanding().iter().copied().collect();
		drop(conn);

		for id in ids {
			self.finalize(cx, id, Err(ResolveError::Connection(err.clone())));
		}
	}

	pub(crate) fn ensure_tick(&mut self, cx: CX![]) {
		if self.tick_scheduled {
			return;
		}

		self.tick_scheduled = true;
		self.schedule_tick(cx);
	}

	fn schedule_tick(&mut self, cx: CX![]) {
		let actor = cx.access_actor().clone();
		cx.after(std::time::Duration::from_secs(1), move |s| actor.apply(s, |this, cx| this.tick(cx)));
	}

	/// The 1 Hz idle-connection sweep, plus an opportunistic cache sweep.
	/// Self-disables once no connections remain.
	fn tick(&mut self, cx: CX![]) {
		let now = Instant::now();

		let expired: Vec<Uri> = self.connections.iter().filter(|(_, conn)| conn.idle_expired(now)).map(|(uri, _)| *uri).collect();

		for uri in expired {
			log::debug!("closing idle connection {uri}");
			self.connections.remove(&uri);
		}

		self.cache.sweep(now);

		if self.connections.is_empty() {
			self.tick_scheduled = false;
		} else {
			self.schedule_tick(cx);
		}
	}
}
