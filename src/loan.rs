use std::str::FromStr;

use diesel::{
	backend::Backend,
	deserialize::{self, FromSql},
	prelude::*,
	serialize::{self, IsNull, Output, ToSql},
	sql_types::Text,
	sqlite::Sqlite,
	SqliteConnection,
};
use strum;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::schema::loans;
use crate::types::{Id, Time};

/// A member's loan against the group pot
///
/// Interest and penalty terms live on the row once set; the amounts they
/// imply are derived, never stored
#[derive(Queryable, Identifiable, PartialEq, Debug, Clone)]
pub struct Loan {
	pub id: Id,
	pub group_id: Id,
	pub user_id: Id,
	/// Principal, whole currency units
	pub amount: i64,
	pub purpose: String,
	pub status: LoanStatus,
	/// Whole percent, fixed when the loan is approved
	pub interest_rate: i16,
	pub due_date: Option<Time>,
	pub approved_by: Option<Id>,
	pub approved_at: Option<Time>,
	pub repaid_amount: i64,
	pub repayment_status: RepaymentStatus,
	/// Whole percent of the principal, fixed when a penalty is applied
	pub penalty_rate: i16,
	pub penalty_amount: i64,
	pub last_repayment_date: Option<Time>,
	pub requested_at: Time,
}

impl Loan {
	/// Interest charge on the principal, floor division
	pub fn interest_amount(&self) -> i64 {
		self.amount * i64::from(self.interest_rate) / 100
	}

	/// Principal plus interest plus any applied penalty
	pub fn total_due(&self) -> i64 {
		self.amount + self.interest_amount() + self.penalty_amount
	}

	pub fn outstanding(&self) -> i64 {
		(self.total_due() - self.repaid_amount).max(0)
	}

	/// Rejected and paid loans never change again
	pub fn is_terminal(&self) -> bool {
		matches!(self.status, LoanStatus::Rejected | LoanStatus::Paid)
	}
}

#[derive(Insertable)]
#[diesel(table_name = loans)]
pub struct NewLoan<'a> {
	pub group_id: Id,
	pub user_id: Id,
	pub amount: i64,
	pub purpose: &'a str,
	pub status: LoanStatus,
	pub requested_at: Time,
}

/// Terms written when the leader approves the loan
#[derive(AsChangeset)]
#[diesel(table_name = loans)]
pub struct LoanApproval {
	pub status: LoanStatus,
	pub interest_rate: i16,
	pub due_date: Time,
	pub approved_by: Id,
	pub approved_at: Time,
}

/// Penalty terms; a second penalty overwrites the first
#[derive(AsChangeset)]
#[diesel(table_name = loans)]
pub struct LoanPenalty {
	pub status: LoanStatus,
	pub penalty_rate: i16,
	pub penalty_amount: i64,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum LoanStatus {
	Pending,
	Approved,
	Rejected,
	Overdue,
	Paid,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum RepaymentStatus {
	Pending,
	Partial,
	Completed,
}

impl ToSql<Text, Sqlite> for LoanStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for LoanStatus {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		LoanStatus::from_str(&s).map_err(Into::into)
	}
}

impl ToSql<Text, Sqlite> for RepaymentStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for RepaymentStatus {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		RepaymentStatus::from_str(&s).map_err(Into::into)
	}
}

pub fn insert(conn: &mut SqliteConnection, loan: NewLoan) -> db::Result<Loan> {
	diesel::insert_into(loans::table)
		.values(&loan)
		.get_result(conn)
		.map_err(Into::into)
}

pub fn find(conn: &mut SqliteConnection, id: Id) -> db::Result<Loan> {
	loans::table
		.find(id)
		.select(loans::all_columns)
		.first(conn)
		.map_err(Into::into)
}

pub fn approve(conn: &mut SqliteConnection, id: Id, approval: &LoanApproval) -> db::Result<Loan> {
	diesel::update(loans::table)
		.filter(loans::id.eq(id))
		.set(approval)
		.get_result(conn)
		.map_err(Into::into)
}

pub fn reject(conn: &mut SqliteConnection, id: Id, reviewer: Id, at: Time) -> db::Result<Loan> {
	diesel::update(loans::table)
		.filter(loans::id.eq(id))
		.set((
			loans::status.eq(LoanStatus::Rejected),
			loans::approved_by.eq(reviewer),
			loans::approved_at.eq(at),
		))
		.get_result(conn)
		.map_err(Into::into)
}

/// Fold a repayment into the running total
pub fn add_repayment(conn: &mut SqliteConnection, id: Id, amount: i64, at: Time) -> db::Result<Loan> {
	diesel::update(loans::table)
		.filter(loans::id.eq(id))
		.set((
			loans::repaid_amount.eq(loans::repaid_amount + amount),
			loans::last_repayment_date.eq(at),
		))
		.get_result(conn)
		.map_err(Into::into)
}

pub fn set_repayment_state(conn: &mut SqliteConnection, id: Id, status: LoanStatus, repayment_status: RepaymentStatus) -> db::Result<Loan> {
	diesel::update(loans::table)
		.filter(loans::id.eq(id))
		.set((
			loans::status.eq(status),
			loans::repayment_status.eq(repayment_status),
		))
		.get_result(conn)
		.map_err(Into::into)
}

pub fn apply_penalty(conn: &mut SqliteConnection, id: Id, penalty: &LoanPenalty) -> db::Result<Loan> {
	diesel::update(loans::table)
		.filter(loans::id.eq(id))
		.set(penalty)
		.get_result(conn)
		.map_err(Into::into)
}

/// Loans still in approved status whose approval falls inside `[from, to)`
///
/// Rejections stamp the same review columns, so the status filter matters
pub fn approved_in(conn: &mut SqliteConnection, group_id: Id, from: Time, to: Time) -> db::Result<i64> {
	loans::table
		.filter(loans::group_id.eq(group_id))
		.filter(loans::status.eq(LoanStatus::Approved))
		.filter(loans::approved_at.ge(from))
		.filter(loans::approved_at.lt(to))
		.count()
		.get_result(conn)
		.map_err(Into::into)
}

/// Approved loans past their due date and not yet settled
pub fn overdue_for_group(conn: &mut SqliteConnection, group_id: Id, now: Time) -> db::Result<Vec<Loan>> {
	loans::table
		.filter(loans::group_id.eq(group_id))
		.filter(loans::status.eq_any(vec![LoanStatus::Approved, LoanStatus::Overdue]))
		.filter(loans::due_date.lt(now))
		.filter(loans::repayment_status.ne(RepaymentStatus::Completed))
		.select(loans::all_columns)
		.order(loans::due_date.asc())
		.load(conn)
		.map_err(Into::into)
}

/// Whether the member holds a loan the group still has money in
pub fn active_exists(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<bool> {
	use diesel::dsl::exists;
	diesel::select(exists(
		loans::table
			.filter(loans::group_id.eq(group_id))
			.filter(loans::user_id.eq(user_id))
			.filter(loans::status.eq_any(vec![LoanStatus::Approved, LoanStatus::Overdue])),
	))
	.get_result(conn)
	.map_err(Into::into)
}

pub fn for_group(conn: &mut SqliteConnection, group_id: Id, status: Option<LoanStatus>) -> db::Result<Vec<Loan>> {
	let mut query = loans::table
		.filter(loans::group_id.eq(group_id))
		.into_boxed::<Sqlite>();
	if let Some(status) = status {
		query = query.filter(loans::status.eq(status));
	}
	query
		.order(loans::requested_at.desc())
		.load(conn)
		.map_err(Into::into)
}

pub fn for_user(conn: &mut SqliteConnection, user_id: Id, status: Option<LoanStatus>) -> db::Result<Vec<Loan>> {
	let mut query = loans::table
		.filter(loans::user_id.eq(user_id))
		.into_boxed::<Sqlite>();
	if let Some(status) = status {
		query = query.filter(loans::status.eq(status));
	}
	query
		.order(loans::requested_at.desc())
		.load(conn)
		.map_err(Into::into)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn loan(amount: i64, interest_rate: i16, penalty_amount: i64, repaid: i64) -> Loan {
		Loan {
			id: 1,
			group_id: 1,
			user_id: 2,
			amount,
			purpose: "seed stock".to_string(),
			status: LoanStatus::Approved,
			interest_rate,
			due_date: None,
			approved_by: Some(1),
			approved_at: None,
			repaid_amount: repaid,
			repayment_status: RepaymentStatus::Pending,
			penalty_rate: 0,
			penalty_amount,
			last_repayment_date: None,
			requested_at: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
		}
	}

	#[test]
	fn total_due_adds_interest_and_penalty() {
		assert_eq!(loan(1000, 10, 0, 0).total_due(), 1100);
		assert_eq!(loan(1000, 10, 50, 0).total_due(), 1150);
		assert_eq!(loan(1000, 0, 0, 0).total_due(), 1000);
	}

	#[test]
	fn interest_uses_floor_division() {
		assert_eq!(loan(1005, 10, 0, 0).interest_amount(), 100);
		assert_eq!(loan(99, 10, 0, 0).interest_amount(), 9);
	}

	#[test]
	fn outstanding_never_goes_negative() {
		assert_eq!(loan(1000, 10, 0, 550).outstanding(), 550);
		assert_eq!(loan(1000, 10, 0, 1200).outstanding(), 0);
	}

	#[test]
	fn terminal_states() {
		let mut l = loan(1000, 10, 0, 0);
		assert!(!l.is_terminal());
		l.status = LoanStatus::Paid;
		assert!(l.is_terminal());
		l.status = LoanStatus::Rejected;
		assert!(l.is_terminal());
		l.status = LoanStatus::Overdue;
		assert!(!l.is_terminal());
	}
}
