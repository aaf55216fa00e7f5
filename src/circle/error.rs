use std::error;
use std::fmt;

use crate::db;

/// An error that can occur when operating on a circle
#[derive(Debug, PartialEq)]
pub struct Error {
	kind: ErrorKind,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Error {
		Error { kind }
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}
}

/// The kind of an error that can occur.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
	/// Input rejected before any state was touched
	Validation(&'static str),
	/// The caller is not allowed to do this
	Forbidden(&'static str),
	NotFound(&'static str),
	/// A state precondition did not hold
	Conflict(String),
	Database(db::Error),
	/// A broken internal invariant, not a caller mistake
	Internal(&'static str),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.kind {
			ErrorKind::Validation(msg) => write!(f, "invalid input: {}", msg),
			ErrorKind::Forbidden(msg) => write!(f, "forbidden: {}", msg),
			ErrorKind::NotFound(what) => write!(f, "{} not found", what),
			ErrorKind::Conflict(msg) => write!(f, "conflict: {}", msg),
			ErrorKind::Database(e) => write!(f, "db error: {}", e),
			ErrorKind::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl error::Error for Error {}

impl From<db::Error> for Error {
	fn from(e: db::Error) -> Self {
		Error::new(ErrorKind::Database(e))
	}
}

impl From<diesel::r2d2::PoolError> for Error {
	fn from(e: diesel::r2d2::PoolError) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		Error::new(ErrorKind::Database(db::Error::from(e)))
	}
}
