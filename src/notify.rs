use log::info;

use crate::types::Id;

/// Outbound member notification, dispatched after the state change commits
///
/// Delivery is best-effort: a dropped notice never rolls back the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Notice<'a> {
	JoinApproved { group: &'a str, user_id: Id },
	JoinRejected { group: &'a str, user_id: Id },
	LoanApproved { group: &'a str, user_id: Id, amount: i64 },
	LoanRejected { group: &'a str, user_id: Id },
	PenaltyApplied { group: &'a str, user_id: Id, penalty_amount: i64 },
}

pub trait Notifier {
	fn notify(&self, notice: Notice) -> Result<(), String>;
}

/// Default sink: the application log
pub struct LogNotifier;

impl Notifier for LogNotifier {
	fn notify(&self, notice: Notice) -> Result<(), String> {
		info!("notice: {:?}", notice);
		Ok(())
	}
}
