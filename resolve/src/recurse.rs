use std::collections::HashMap;

use stakker::{ret_to, Ret, CX};

use crate::error::ResolveError;
use crate::mux::GroupedAnswers;
use crate::record::RecordKind;
use crate::Resolver;

/// State for one in-flight hop of a CNAME/DNAME chase: the three
/// augmented-type sub-queries fired in parallel, and what to do once all of
/// them have reported back.
pub(crate) struct HopState {
	name: String,
	requested: RecordKind,
	server: String,
	hop: u32,
	remaining: u32,
	merged: GroupedAnswers,
	last_error: Option<ResolveError>,
	ret: Ret<Result<GroupedAnswers, ResolveError>>,
}

impl Resolver {
	/// Drives a bounded CNAME/DNAME chase for a single requested kind. `ret`
	/// is completed once a terminal record of `requested` kind is found, the
	/// chain is too long, or no progress can be made.
	pub(crate) fn recurse(&mut self, cx: CX![], name: String, requested: RecordKind, server: String, ret: Ret<Result<GroupedAnswers, ResolveError>>) {
		if requested.is_alias() {
			ret.ret(Err(ResolveError::InvalidName(name)));
			return;
		}

		self.start_hop(cx, name, requested, server, 0, ret);
	}

	fn start_hop(&mut self, cx: CX![], name: String, requested: RecordKind, server: String, hop: u32, ret: Ret<Result<GroupedAnswers, ResolveError>>) {
		if hop >= crate::config::MAX_CHAIN_HOPS {
			ret.ret(Err(ResolveError::ChainTooLong));
			return;
		}

		let mut augmented = vec![requested, RecordKind::Cname, RecordKind::Dname];
		augmented.dedup();

		let call_id = self.next_call_id;
		self.next_call_id += 1;

		let state = HopState {
			name: name.clone(),
			requested,
			server: server.clone(),
			hop,
			remaining: augmented.len() as u32,
			merged: HashMap::new(),
			last_error: None,
			ret,
		};
		self.recursions.insert(call_id, state);

		for kind in augmented {
			let actor = cx.access_actor().clone();
			let sub_ret: Ret<Result<GroupedAnswers, ResolveError>> = ret_to!([actor], on_hop_result(call_id) as (Result<GroupedAnswers, ResolveError>));
			self.request_to_server(cx, &server, name.clone(), kind, sub_ret);
		}
	}

	/// Collects one of a hop's three sub-query results. Once all three have
	/// reported, decides whether the chase is done, must take another hop,
	/// or has failed.
	pub(crate) fn on_hop_result(&mut self, cx: CX![], call_id: u64, result: Result<GroupedAnswers, ResolveError>) {
		let Some(state) = self.recursions.get_mut(&call_id) else { return };

		match result {
			Ok(grouped) => {
				for (kind, mut records) in grouped {
					state.merged.entry(kind).or_default().append(&mut records);
				}
			}
			Err(err) => state.last_error = Some(err),
		}

		state.remaining -= 1;
		if state.remaining > 0 {
			return;
		}

		let state = self.recursions.remove(&call_id).expect("present");

		if let Some(records) = state.merged.get(&state.requested).filter(|r| !r.is_empty()) {
			let mut result = GroupedAnswers::new();
			result.insert(state.requested, records.clone());
			state.ret.ret(Ok(result));
			return;
		}

		// DNAME takes precedence over CNAME when both are present.
		let target = state
			.merged
			.get(&RecordKind::Dname)
			.and_then(|records| records.first())
			.or_else(|| state.merged.get(&RecordKind::Cname).and_then(|records| records.first()));

		match target {
			Some(record) => {
				let next_name = record.data.clone();
				self.start_hop(cx, next_name, state.requested, state.server, state.hop + 1, state.ret);
			}
			None => {
				state.ret.ret(Err(state.last_error.unwrap_or(ResolveError::NoRecord)));
			}
		}
	}
}
