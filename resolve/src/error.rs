use std::io;
use std::sync::Arc;

/// Every error the resolver core can surface to a caller, per the response
/// code/truncation/timeout/etc. taxonomy the protocol demands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
	#[error("'{0}' is not a valid host name or IP literal")]
	InvalidName(String),

	#[error("upstream returned response code {0}")]
	ServerFailure(u16),

	#[error("upstream returned no answer records")]
	NoRecord,

	#[error("reply was truncated over TCP")]
	TruncationUnrecoverable,

	#[error("connection failure: {0}")]
	Connection(#[from] ConnectionError),

	#[error("CNAME/DNAME chain exceeded 30 hops")]
	ChainTooLong,

	#[error("resolution timed out")]
	Timeout,
}

/// Wraps the underlying I/O or decode diagnostic so [`ResolveError`] stays
/// `Clone` (several pending requests on a torn-down connection all need a
/// copy of the same failure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ConnectionError {
	message: Arc<str>,
}

impl ConnectionError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into().into() }
	}

	pub fn from_io(context: &str, err: io::Error) -> Self {
		Self::new(format!("{context}: {err}"))
	}
}

impl From<io::Error> for ConnectionError {
	fn from(err: io::Error) -> Self {
		Self::new(err.to_string())
	}
}
