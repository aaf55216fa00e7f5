pub use error::{Error, ErrorKind};
pub use loans::{LoanBook, LoanTerms, NewLoanBook};
pub use registry::{NewGroupSpec, NewRegistry, Registry};
pub use savings::{
	GroupContribution, GroupSavings, MemberSavings, NewSavingsLedger, SavingsLedger,
	UpcomingContribution, UserSavings,
};

pub mod error;
mod loans;
mod registry;
mod savings;

use crate::types::Time;

pub type Result<T> = std::result::Result<T, Error>;

/// Source of "now" for review stamps, due dates and month windows
pub trait Clock {
	fn now(&self) -> Time {
		chrono::Utc::now().naive_utc()
	}
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {}
