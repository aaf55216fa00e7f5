#![allow(warnings)]
#[macro_use]
extern crate diesel;


mod schema;
pub mod circle;
pub mod db;
pub mod group;
pub mod join_request;
pub mod loan;
pub mod membership;
pub mod notify;
pub mod transaction;
pub mod types;
pub mod upi;

#[cfg(test)]
mod testutil;

pub use circle::{
	Clock, Error, ErrorKind, GroupContribution, GroupSavings, LoanBook, LoanTerms, MemberSavings,
	NewGroupSpec, NewLoanBook, NewRegistry, NewSavingsLedger, Registry, SavingsLedger, SystemClock,
	UpcomingContribution, UserSavings,
};
pub use db::Pool;
pub use group::{Group, SavingsFrequency};
pub use join_request::{JoinRequest, RequestStatus};
pub use loan::{Loan, LoanStatus, RepaymentStatus};
pub use membership::{MemberRole, MemberStatus, Membership};
pub use notify::{LogNotifier, Notice, Notifier};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use types::{Id, Time};
pub use upi::{PaymentGateway, PaymentHandle, UpiGateway};
