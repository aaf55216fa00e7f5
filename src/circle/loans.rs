use diesel::SqliteConnection;
use log::{debug, info, warn};

use crate::{db, loan, transaction};
use crate::loan::{Loan, LoanApproval, LoanPenalty, LoanStatus, NewLoan, RepaymentStatus};
use crate::notify::{Notice, Notifier};
use crate::transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
use crate::types::{Id, Time, TimeExt};

use super::error::{Error, ErrorKind};
use super::registry::Registry;
use super::{Clock, Result};

/// Peer-reviewed loan lifecycle: request, leader review, repayment and
/// penalties
pub struct LoanBook<'a> {
	db: db::Pool,
	registry: Registry<'a>,
	clock: &'a dyn Clock,
	notifier: &'a dyn Notifier,
}

/// Parameter object for creating a new LoanBook
pub struct NewLoanBook<'a> {
	pub db: db::Pool,
	pub registry: Registry<'a>,
	pub clock: &'a dyn Clock,
	pub notifier: &'a dyn Notifier,
}

/// Terms the leader sets when approving a loan
pub struct LoanTerms<'a> {
	pub due_date: Time,
	/// Whole percent on the principal
	pub interest_rate: i16,
	/// How the disbursement is handed over
	pub payment_method: &'a str,
}

impl<'a> LoanBook<'a> {
	pub fn new(v: NewLoanBook<'a>) -> Self {
		LoanBook {
			db: v.db,
			registry: v.registry,
			clock: v.clock,
			notifier: v.notifier,
		}
	}

	/// File a loan request against the group pot
	pub fn request(&self, group_id: Id, user: Id, amount: i64, purpose: &str) -> Result<Loan> {
		if amount <= 0 {
			return Err(Error::new(ErrorKind::Validation("loan amount must be positive")));
		}
		if purpose.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("loan purpose is required")));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.registry.ensure_member(conn, group_id, user)?;

		let requested = loan::insert(conn, NewLoan {
			group_id,
			user_id: user,
			amount,
			purpose,
			status: LoanStatus::Pending,
			requested_at: now,
		})?;

		debug!("user {} requested a loan of {} from group {}", user, amount, group_id);
		Ok(requested)
	}

	pub fn group_loans(&self, group_id: Id, caller: Id, status: Option<LoanStatus>) -> Result<Vec<Loan>> {
		let conn = &mut self.db.get()?;
		self.registry.ensure_member(conn, group_id, caller)?;
		loan::for_group(conn, group_id, status).map_err(Into::into)
	}

	pub fn user_loans(&self, user: Id, status: Option<LoanStatus>) -> Result<Vec<Loan>> {
		let conn = &mut self.db.get()?;
		loan::for_user(conn, user, status).map_err(Into::into)
	}

	/// Approve a pending request and disburse the principal
	///
	/// A group hands out at most one loan per calendar month; the check runs
	/// inside the same transaction as the writes so two leaders racing on the
	/// same month cannot both get through
	pub fn approve(&self, group_id: Id, loan_id: Id, approver: Id, terms: LoanTerms) -> Result<(Loan, Transaction)> {
		let now = self.clock.now();
		if terms.interest_rate < 0 {
			return Err(Error::new(ErrorKind::Validation("interest rate cannot be negative")));
		}
		if terms.due_date <= now {
			return Err(Error::new(ErrorKind::Validation("due date must be in the future")));
		}
		if terms.payment_method.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("payment method is required")));
		}

		let conn = &mut self.db.get()?;
		self.registry.ensure_leader(conn, group_id, approver)?;
		let target = Registry::group_of(conn, group_id)?;

		let (approved, disbursement) = conn.immediate_transaction::<(Loan, Transaction), Error, _>(|conn| {
			let pending = Self::loan_in_group(conn, group_id, loan_id)?;
			if pending.status != LoanStatus::Pending {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"loan {} has already been {}",
					pending.id, pending.status
				))));
			}

			let month = now.month_start();
			if loan::approved_in(conn, group_id, month, month.add_months(1))? > 0 {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"group {} already has an approved loan this month",
					group_id
				))));
			}

			let approved = loan::approve(conn, pending.id, &LoanApproval {
				status: LoanStatus::Approved,
				interest_rate: terms.interest_rate,
				due_date: terms.due_date,
				approved_by: approver,
				approved_at: now,
			})?;

			let reference = transaction::generate_reference("LOAN", now);
			let disbursement = transaction::insert(conn, NewTransaction {
				group_id,
				user_id: approved.user_id,
				amount: approved.amount,
				transaction_type: TransactionType::Loan,
				payment_method: terms.payment_method,
				transaction_reference: &reference,
				status: TransactionStatus::Completed,
				description: &format!("Loan approved for {}", approved.purpose),
				upi_transaction_id: None,
				upi_payment_link: None,
				qr_code_url: None,
				upi_status: None,
				created_at: now,
			})?;

			Ok((approved, disbursement))
		})?;

		info!(
			"loan {} of {} approved for user {} by user {}",
			approved.id, approved.amount, approved.user_id, approver
		);
		self.send(Notice::LoanApproved {
			group: &target.name,
			user_id: approved.user_id,
			amount: approved.amount,
		});
		Ok((approved, disbursement))
	}

	/// Turn a pending request down; no ledger entry is written
	pub fn reject(&self, group_id: Id, loan_id: Id, approver: Id) -> Result<Loan> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.registry.ensure_leader(conn, group_id, approver)?;
		let target = Registry::group_of(conn, group_id)?;

		let rejected = conn.immediate_transaction::<Loan, Error, _>(|conn| {
			let pending = Self::loan_in_group(conn, group_id, loan_id)?;
			if pending.status != LoanStatus::Pending {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"loan {} has already been {}",
					pending.id, pending.status
				))));
			}

			loan::reject(conn, pending.id, approver, now).map_err(Into::into)
		})?;

		info!("loan {} rejected by user {}", rejected.id, approver);
		self.send(Notice::LoanRejected { group: &target.name, user_id: rejected.user_id });
		Ok(rejected)
	}

	/// Pay a loan down; settles it once principal, interest and any penalty
	/// are covered
	pub fn repay(&self, loan_id: Id, payer: Id, amount: i64, payment_method: &str) -> Result<(Loan, Transaction)> {
		if amount <= 0 {
			return Err(Error::new(ErrorKind::Validation("repayment amount must be positive")));
		}
		if payment_method.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("payment method is required")));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		let current = Self::loan_by_id(conn, loan_id)?;
		if current.user_id != payer {
			return Err(Error::new(ErrorKind::Forbidden("only the borrower can repay a loan")));
		}

		let (settled, repayment) = conn.immediate_transaction::<(Loan, Transaction), Error, _>(|conn| {
			let current = Self::loan_by_id(conn, loan_id)?;
			if current.is_terminal() {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"cannot repay a {} loan",
					current.status
				))));
			}

			let reference = transaction::generate_reference("LOAN", now);
			let repayment = transaction::insert(conn, NewTransaction {
				group_id: current.group_id,
				user_id: payer,
				amount,
				transaction_type: TransactionType::Repayment,
				payment_method,
				transaction_reference: &reference,
				status: TransactionStatus::Completed,
				description: &format!("Repayment for loan #{}", current.id),
				upi_transaction_id: None,
				upi_payment_link: None,
				qr_code_url: None,
				upi_status: None,
				created_at: now,
			})?;

			let updated = loan::add_repayment(conn, loan_id, amount, now)?;
			// a partial payment keeps whatever status the loan already had,
			// so overdue never slides back to approved
			let (status, repayment_status) = if updated.repaid_amount >= updated.total_due() {
				(LoanStatus::Paid, RepaymentStatus::Completed)
			} else if updated.repaid_amount > 0 {
				(updated.status, RepaymentStatus::Partial)
			} else {
				(updated.status, RepaymentStatus::Pending)
			};
			let settled = loan::set_repayment_state(conn, loan_id, status, repayment_status)?;

			Ok((settled, repayment))
		})?;

		info!(
			"user {} repaid {} on loan {}, {} outstanding",
			payer, amount, settled.id, settled.outstanding()
		);
		Ok((settled, repayment))
	}

	/// Put a late fee on a loan past its due date
	///
	/// The fee is a flat percentage of the principal; applying it again
	/// recomputes rather than stacks
	pub fn apply_penalty(&self, group_id: Id, loan_id: Id, leader: Id, penalty_rate: i16) -> Result<Loan> {
		if penalty_rate <= 0 {
			return Err(Error::new(ErrorKind::Validation("penalty rate must be positive")));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.registry.ensure_leader(conn, group_id, leader)?;
		let target = Registry::group_of(conn, group_id)?;

		let penalized = conn.immediate_transaction::<Loan, Error, _>(|conn| {
			let current = Self::loan_in_group(conn, group_id, loan_id)?;
			match current.due_date {
				None => {
					return Err(Error::new(ErrorKind::Conflict(format!(
						"loan {} has no due date",
						current.id
					))));
				}
				Some(due) if due >= now => {
					return Err(Error::new(ErrorKind::Conflict(format!(
						"loan {} is not past due",
						current.id
					))));
				}
				Some(_) => {}
			}
			if current.is_terminal() {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"cannot penalize a {} loan",
					current.status
				))));
			}

			let penalty_amount = current.amount * i64::from(penalty_rate) / 100;
			loan::apply_penalty(conn, current.id, &LoanPenalty {
				status: LoanStatus::Overdue,
				penalty_rate,
				penalty_amount,
			})
			.map_err(Into::into)
		})?;

		info!(
			"penalty of {} applied to loan {} by user {}",
			penalized.penalty_amount, penalized.id, leader
		);
		self.send(Notice::PenaltyApplied {
			group: &target.name,
			user_id: penalized.user_id,
			penalty_amount: penalized.penalty_amount,
		});
		Ok(penalized)
	}

	/// Loans past their due date and not yet settled, soonest due first
	pub fn overdue(&self, group_id: Id, caller: Id) -> Result<Vec<Loan>> {
		let conn = &mut self.db.get()?;
		self.registry.ensure_leader(conn, group_id, caller)?;
		loan::overdue_for_group(conn, group_id, self.clock.now()).map_err(Into::into)
	}

	fn loan_by_id(conn: &mut SqliteConnection, loan_id: Id) -> Result<Loan> {
		match loan::find(conn, loan_id) {
			Ok(l) => Ok(l),
			Err(db::Error::RecordNotFound) => Err(Error::new(ErrorKind::NotFound("loan"))),
			Err(e) => Err(e.into()),
		}
	}

	fn loan_in_group(conn: &mut SqliteConnection, group_id: Id, loan_id: Id) -> Result<Loan> {
		let found = Self::loan_by_id(conn, loan_id)?;
		if found.group_id != group_id {
			return Err(Error::new(ErrorKind::NotFound("loan")));
		}
		Ok(found)
	}

	fn send(&self, notice: Notice) {
		if let Err(reason) = self.notifier.notify(notice) {
			warn!("notice dropped: {}", reason);
		}
	}
}
