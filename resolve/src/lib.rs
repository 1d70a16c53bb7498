//! Asynchronous DNS stub resolver core, driven by a `stakker` event loop.
//!
//! `Resolver` is a single actor: it owns the message codec, the answer
//! cache, the cached hosts map, every open server connection, and every
//! in-flight request or top-level call. An embedder constructs it with
//! [`Resolver::init`], keeps the returned `ActorOwn<Resolver>` alive, and
//! drives the surrounding event loop itself (see the `runtime` crate for a
//! ready-made one).

mod api;
mod cache;
mod codec;
mod config;
mod connection;
mod error;
mod hosts;
mod mux;
mod name;
mod record;
mod recurse;

pub use cache::{AnswerCache, CacheKey, MemoryCache};
pub use codec::{DecodedResponse, HickoryCodec, MessageCodec};
pub use config::{Options, ResolverConfig, DEFAULT_PORT, DEFAULT_SERVER, DEFAULT_TIMEOUT, IDLE_TIMEOUT, MAX_CHAIN_HOPS, MAX_REQUEST_ID};
pub use error::{ConnectionError, ResolveError};
pub use hosts::{default_path, FsHostsSource, HostsSource};
pub use record::{AnswerRecord, RecordKind, Ttl};

use std::collections::HashMap;

use stakker::CX;

use api::ResolveCall;
use connection::{ServerConn, Uri};
use hosts::HostsMap;
use mux::PendingRequest;
use recurse::HopState;

/// The resolver actor: the codec, the cache, the hosts map, every open
/// server connection, and every in-flight request or top-level call live
/// here and nowhere else.
pub struct Resolver {
	codec: Box<dyn MessageCodec>,
	cache: Box<dyn AnswerCache>,
	hosts: Option<HostsMap>,
	config: ResolverConfig,

	connections: HashMap<Uri, ServerConn>,
	pending: HashMap<u16, PendingRequest>,
	next_id: u16,
	tick_scheduled: bool,

	recursions: HashMap<u64, HopState>,
	next_call_id: u64,

	resolves: HashMap<u64, ResolveCall>,
	next_resolve_id: u64,
}

impl Resolver {
	/// Constructs the actor. There is no asynchronous setup on this path —
	/// the hosts file is read lazily on first use — so this always succeeds
	/// synchronously, unlike actors that defer their own creation.
	pub fn init(_cx: CX![], config: ResolverConfig) -> Option<Self> {
		Some(Self {
			codec: Box::new(HickoryCodec::default()),
			cache: Box::new(MemoryCache::new()),
			hosts: None,
			config,

			connections: HashMap::new(),
			pending: HashMap::new(),
			next_id: 0,
			tick_scheduled: false,

			recursions: HashMap::new(),
			next_call_id: 0,

			resolves: HashMap::new(),
			next_resolve_id: 0,
		})
	}
}
