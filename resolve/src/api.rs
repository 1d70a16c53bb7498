use stakker::{ret_to, FixedTimerKey, Ret, CX};

use crate::cache::{AnswerCache, CacheKey};
use crate::config::Options;
use crate::error::ResolveError;
use crate::hosts;
use crate::mux::GroupedAnswers;
use crate::name::{classify, normalize, Classification};
use crate::record::{AnswerRecord, RecordKind};
use crate::Resolver;

/// The aggregator for one top-level `resolve`/`query` call: the records
/// already satisfied from the hosts file or cache, the per-type upstream
/// sub-queries still outstanding, and the overall timeout racing them.
pub(crate) struct ResolveCall {
	order: Vec<RecordKind>,
	local: Vec<AnswerRecord>,
	collected: GroupedAnswers,
	remaining: u32,
	last_error: Option<ResolveError>,
	timer: Option<FixedTimerKey>,
	ret: Ret<Result<Vec<AnswerRecord>, ResolveError>>,
}

impl Resolver {
	/// Resolves `name` for a caller-chosen set of record kinds (default
	/// `[A, AAAA]`). An IP literal is returned directly as a single-element
	/// list, without touching the hosts file, cache, or any server.
	pub fn resolve(&mut self, cx: CX![], name: impl Into<String>, options: Options, ret: Ret<Result<Vec<AnswerRecord>, ResolveError>>) {
		let requested = if options.types.is_empty() { vec![RecordKind::A, RecordKind::Aaaa] } else { options.types.clone() };
		let types = Options::dedup_types(requested);
		self.dispatch(cx, name.into(), types, options, false, true, ret);
	}

	/// Resolves `name` for a single record kind, with CNAME/DNAME chasing
	/// enabled only when `options.recurse` is set. Unlike `resolve`, an IP
	/// literal is rejected with `InvalidName` rather than taken as a
	/// shortcut — there is no single record kind a literal unambiguously
	/// answers for an arbitrary caller-requested `kind`.
	pub fn query(&mut self, cx: CX![], name: impl Into<String>, kind: RecordKind, options: Options, ret: Ret<Result<Vec<AnswerRecord>, ResolveError>>) {
		let recurse = options.recurse;
		self.dispatch(cx, name.into(), vec![kind], options, recurse, false, ret);
	}

	#[allow(clippy::too_many_arguments)]
	fn dispatch(
		&mut self,
		cx: CX![],
		name: String,
		types: Vec<RecordKind>,
		options: Options,
		recurse: bool,
		literal_shortcut: bool,
		ret: Ret<Result<Vec<AnswerRecord>, ResolveError>>,
	) {
		if let Some(result) = Self::literal_or_invalid(&name, literal_shortcut) {
			ret.ret(result);
			return;
		}

		let name = normalize(&name);
		let need_hosts = !options.no_hosts && (self.hosts.is_none() || options.reload_hosts);

		if need_hosts {
			let actor = cx.access_actor().clone();
			let source = self.config.hosts_source.clone();
			let path = self.config.hosts_path.clone();

			cx.defer(move |s| {
				let map = hosts::load(&path, source.as_ref());
				actor.apply(s, move |this, cx| {
					this.hosts = Some(map);
					this.continue_dispatch(cx, name, types, options, recurse, ret);
				})
			});
			return;
		}

		self.continue_dispatch(cx, name, types, options, recurse, ret);
	}

	fn continue_dispatch(&mut self, cx: CX![], name: String, types: Vec<RecordKind>, options: Options, recurse: bool, ret: Ret<Result<Vec<AnswerRecord>, ResolveError>>) {
		let mut local = Vec::new();
		let mut remaining;

		if options.no_hosts {
			remaining = types.clone();
		} else {
			remaining = Vec::new();
			let hosts = self.hosts.clone().unwrap_or_default();

			for kind in &types {
				match hosts.lookup(&name, *kind) {
					Some(literal) => local.push(AnswerRecord::unset(literal, *kind)),
					None => remaining.push(*kind),
				}
			}
		}

		if remaining.is_empty() {
			ret.ret(Ok(Self::order_answers(&types, local)));
			return;
		}

		if !options.no_cache {
			let mut still_remaining = Vec::new();

			for kind in remaining {
				match self.cache.get(&CacheKey::new(&name, kind)) {
					Some(records) => local.extend(records),
					None => still_remaining.push(kind),
				}
			}

			remaining = still_remaining;
		}

		if remaining.is_empty() {
			ret.ret(Ok(Self::order_answers(&types, local)));
			return;
		}

		self.dispatch_queries(cx, name, types, remaining, options, recurse, local, ret);
	}

	#[allow(clippy::too_many_arguments)]
	fn dispatch_queries(
		&mut self,
		cx: CX![],
		name: String,
		order: Vec<RecordKind>,
		remaining: Vec<RecordKind>,
		options: Options,
		recurse: bool,
		local: Vec<AnswerRecord>,
		ret: Ret<Result<Vec<AnswerRecord>, ResolveError>>,
	) {
		let server = options.server_spec();
		let call_id = self.next_resolve_id;
		self.next_resolve_id += 1;

		let actor = cx.access_actor().clone();
		let timer = cx.after(options.timeout, move |s| actor.apply(s, move |this, cx| this.resolve_timeout(cx, call_id)));

		let call = ResolveCall {
			order,
			local,
			collected: GroupedAnswers::new(),
			remaining: remaining.len() as u32,
			last_error: None,
			timer: Some(timer),
			ret,
		};
		self.resolves.insert(call_id, call);

		for kind in remaining {
			let actor = cx.access_actor().clone();
			let sub_ret = ret_to!([actor], on_resolve_sub(call_id, kind) as (Result<GroupedAnswers, ResolveError>));

			if recurse {
				self.recurse(cx, name.clone(), kind, server.clone(), sub_ret);
			} else {
				self.request_to_server(cx, &server, name.clone(), kind, sub_ret);
			}
		}
	}

	/// One per-type sub-query's completion. A failing type contributes
	/// nothing but its error, to be surfaced only if every type ultimately
	/// comes up empty.
	pub(crate) fn on_resolve_sub(&mut self, cx: CX![], call_id: u64, _kind: RecordKind, result: Result<GroupedAnswers, ResolveError>) {
		let Some(call) = self.resolves.get_mut(&call_id) else { return };

		match result {
			Ok(grouped) => {
				for (kind, mut records) in grouped {
					call.collected.entry(kind).or_default().append(&mut records);
				}
			}
			Err(err) => call.last_error = Some(err),
		}

		call.remaining -= 1;
		if call.remaining == 0 {
			self.finish_resolve(cx, call_id);
		}
	}

	fn finish_resolve(&mut self, cx: CX![], call_id: u64) {
		let Some(call) = self.resolves.remove(&call_id) else { return };

		if let Some(timer) = call.timer {
			cx.timer_del(timer);
		}

		let mut records = call.local;
		for group in call.collected.into_values() {
			records.extend(group);
		}

		if records.is_empty() {
			call.ret.ret(Err(call.last_error.unwrap_or(ResolveError::NoRecord)));
		} else {
			call.ret.ret(Ok(Self::order_answers(&call.order, records)));
		}
	}

	/// Fires when a call's overall timeout elapses before every sub-query
	/// has reported. Outstanding upstream requests are left running; their
	/// late replies still populate the cache but land on a call id no
	/// longer in `self.resolves`, so `on_resolve_sub` silently drops them.
	fn resolve_timeout(&mut self, _cx: CX![], call_id: u64) {
		if let Some(call) = self.resolves.remove(&call_id) {
			call.ret.ret(Err(ResolveError::Timeout));
		}
	}

	/// Classifies `name` and, if it terminates the call on its own (a
	/// literal taken as a shortcut, a literal rejected because no shortcut
	/// applies, or plain invalid input), returns the result to complete
	/// with. `None` means `name` is a candidate host name and dispatch
	/// should continue to the hosts file.
	fn literal_or_invalid(name: &str, literal_shortcut: bool) -> Option<Result<Vec<AnswerRecord>, ResolveError>> {
		match classify(name) {
			Classification::Ip4Literal if literal_shortcut => Some(Ok(vec![AnswerRecord::unset(name, RecordKind::A)])),
			Classification::Ip6Literal if literal_shortcut => Some(Ok(vec![AnswerRecord::unset(name, RecordKind::Aaaa)])),
			Classification::Ip4Literal | Classification::Ip6Literal | Classification::Invalid => Some(Err(ResolveError::InvalidName(name.to_owned()))),
			Classification::HostName => None,
		}
	}

	/// Orders `records` by the caller's requested type order: every record
	/// of the first requested type, then the second, and so on, with
	/// anything left over appended last.
	fn order_answers(order: &[RecordKind], mut records: Vec<AnswerRecord>) -> Vec<AnswerRecord> {
		let mut result = Vec::with_capacity(records.len());

		for kind in order {
			let mut i = 0;
			while i < records.len() {
				if records[i].kind == *kind {
					result.push(records.remove(i));
				} else {
					i += 1;
				}
			}
		}

		result.append(&mut records);
		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::Ttl;

	fn a(data: &str) -> AnswerRecord {
		AnswerRecord::new(data, RecordKind::A, Ttl::Seconds(60))
	}

	fn aaaa(data: &str) -> AnswerRecord {
		AnswerRecord::new(data, RecordKind::Aaaa, Ttl::Seconds(60))
	}

	#[test]
	fn resolve_takes_the_ip4_literal_shortcut() {
		let result = Resolver::literal_or_invalid("1.2.3.4", true);
		assert_eq!(result, Some(Ok(vec![AnswerRecord::unset("1.2.3.4", RecordKind::A)])));
	}

	#[test]
	fn resolve_takes_the_ip6_literal_shortcut() {
		let result = Resolver::literal_or_invalid("::1", true);
		assert_eq!(result, Some(Ok(vec![AnswerRecord::unset("::1", RecordKind::Aaaa)])));
	}

	#[test]
	fn query_rejects_an_ip_literal_instead_of_taking_the_shortcut() {
		let result = Resolver::literal_or_invalid("1.2.3.4", false);
		assert_eq!(result, Some(Err(ResolveError::InvalidName("1.2.3.4".to_owned()))));
	}

	#[test]
	fn invalid_names_are_rejected_regardless_of_the_shortcut() {
		assert_eq!(Resolver::literal_or_invalid("exa mple", true), Some(Err(ResolveError::InvalidName("exa mple".to_owned()))));
		assert_eq!(Resolver::literal_or_invalid("exa mple", false), Some(Err(ResolveError::InvalidName("exa mple".to_owned()))));
	}

	#[test]
	fn host_names_continue_past_the_literal_check() {
		assert_eq!(Resolver::literal_or_invalid("example.test", true), None);
		assert_eq!(Resolver::literal_or_invalid("example.test", false), None);
	}

	#[test]
	fn order_answers_groups_by_requested_type_order() {
		let records = vec![aaaa("::1"), a("1.1.1.1"), aaaa("::2"), a("2.2.2.2")];
		let ordered = Resolver::order_answers(&[RecordKind::Aaaa, RecordKind::A], records);

		assert_eq!(ordered.iter().map(|r| r.kind).collect::<Vec<_>>(), vec![RecordKind::Aaaa, RecordKind::Aaaa, RecordKind::A, RecordKind::A]);
	}

	#[test]
	fn order_answers_appends_unrequested_kinds_last() {
		let cname = AnswerRecord::new("target.test", RecordKind::Cname, Ttl::Seconds(60));
		let records = vec![cname.clone(), a("1.1.1.1")];
		let ordered = Resolver::order_answers(&[RecordKind::A], records);

		assert_eq!(ordered, vec![a("1.1.1.1"), cname]);
	}
}
