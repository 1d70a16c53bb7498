//! A minimal unit-error result used by the socket-polling plumbing, where the
//! diagnostic has already been logged at the point of failure and callers
//! only need to know that something went wrong.

use core::result;

#[doc(hidden)]
pub trait Ext<T, E> {
	fn ok_or(self, f: impl FnOnce(E)) -> Option<T>;
}

impl<T, E> Ext<T, E> for result::Result<T, E> {
	fn ok_or(self, f: impl FnOnce(E)) -> Option<T> {
		match self {
			Ok(v) => Some(v),
			Err(e) => {
				f(e);
				None
			}
		}
	}
}

pub type Result<T = (), E = ()> = result::Result<T, E>;

pub use Ext as _;
