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
use rand::Rng;
use strum;
use strum_macros::{Display, EnumString};

use crate::db;
use crate::schema::transactions;
use crate::types::{Id, Time};

/// One ledger entry: a contribution, a disbursement or a repayment
///
/// Rows are append-only; the status may move pending -> completed exactly
/// once, nothing else ever changes
#[derive(Queryable, Identifiable, PartialEq, Debug, Clone)]
pub struct Transaction {
	pub id: Id,
	pub group_id: Id,
	pub user_id: Id,
	pub amount: i64,
	pub transaction_type: TransactionType,
	/// Opaque label for how the money moved
	pub payment_method: String,
	/// Unique ledger reference
	pub transaction_reference: String,
	pub status: TransactionStatus,
	pub description: String,
	pub upi_transaction_id: Option<String>,
	pub upi_payment_link: Option<String>,
	pub qr_code_url: Option<String>,
	/// Opaque gateway echo, recorded as received
	pub upi_status: Option<String>,
	pub created_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction<'a> {
	pub group_id: Id,
	pub user_id: Id,
	pub amount: i64,
	pub transaction_type: TransactionType,
	pub payment_method: &'a str,
	pub transaction_reference: &'a str,
	pub status: TransactionStatus,
	pub description: &'a str,
	pub upi_transaction_id: Option<&'a str>,
	pub upi_payment_link: Option<&'a str>,
	pub qr_code_url: Option<&'a str>,
	pub upi_status: Option<&'a str>,
	pub created_at: Time,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
	/// A member's contribution into the pot
	Deposit,
	/// The pot going out to a borrower
	Loan,
	/// A borrower paying their loan down
	Repayment,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
	Pending,
	Completed,
}

impl ToSql<Text, Sqlite> for TransactionType {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for TransactionType {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		TransactionType::from_str(&s).map_err(Into::into)
	}
}

impl ToSql<Text, Sqlite> for TransactionStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for TransactionStatus {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		TransactionStatus::from_str(&s).map_err(Into::into)
	}
}

/// `PREFIX-<millis>-<8 hex chars>`
pub fn generate_reference(prefix: &str, at: Time) -> String {
	let entropy: u32 = rand::thread_rng().gen();
	format!("{}-{}-{:08x}", prefix, at.and_utc().timestamp_millis(), entropy)
}

pub fn insert(conn: &mut SqliteConnection, transaction: NewTransaction) -> db::Result<Transaction> {
	diesel::insert_into(transactions::table)
		.values(&transaction)
		.get_result(conn)
		.map_err(Into::into)
}

pub fn find(conn: &mut SqliteConnection, id: Id) -> db::Result<Transaction> {
	transactions::table
		.find(id)
		.select(transactions::all_columns)
		.first(conn)
		.map_err(Into::into)
}

/// The one allowed mutation: pending -> completed
pub fn complete(conn: &mut SqliteConnection, id: Id) -> db::Result<Transaction> {
	diesel::update(transactions::table)
		.filter(transactions::id.eq(id))
		.set((
			transactions::status.eq(TransactionStatus::Completed),
			transactions::upi_status.eq("completed"),
		))
		.get_result(conn)
		.map_err(Into::into)
}

/// Completed ledger history for the group, newest first
pub fn completed_for_group(conn: &mut SqliteConnection, group_id: Id) -> db::Result<Vec<Transaction>> {
	transactions::table
		.filter(transactions::group_id.eq(group_id))
		.filter(transactions::status.eq(TransactionStatus::Completed))
		.select(transactions::all_columns)
		.order(transactions::created_at.desc())
		.load(conn)
		.map_err(Into::into)
}

/// Completed ledger history for the user across groups, newest first
pub fn completed_for_user(conn: &mut SqliteConnection, user_id: Id) -> db::Result<Vec<Transaction>> {
	transactions::table
		.filter(transactions::user_id.eq(user_id))
		.filter(transactions::status.eq(TransactionStatus::Completed))
		.select(transactions::all_columns)
		.order(transactions::created_at.desc())
		.load(conn)
		.map_err(Into::into)
}

pub fn completed_deposits_for_group(conn: &mut SqliteConnection, group_id: Id) -> db::Result<Vec<Transaction>> {
	transactions::table
		.filter(transactions::group_id.eq(group_id))
		.filter(transactions::transaction_type.eq(TransactionType::Deposit))
		.filter(transactions::status.eq(TransactionStatus::Completed))
		.select(transactions::all_columns)
		.load(conn)
		.map_err(Into::into)
}

pub fn completed_deposits_for_user(conn: &mut SqliteConnection, user_id: Id) -> db::Result<Vec<Transaction>> {
	transactions::table
		.filter(transactions::user_id.eq(user_id))
		.filter(transactions::transaction_type.eq(TransactionType::Deposit))
		.filter(transactions::status.eq(TransactionStatus::Completed))
		.select(transactions::all_columns)
		.load(conn)
		.map_err(Into::into)
}

/// When the member last contributed to the group, if ever
pub fn last_deposit_at(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<Option<Time>> {
	transactions::table
		.filter(transactions::group_id.eq(group_id))
		.filter(transactions::user_id.eq(user_id))
		.filter(transactions::transaction_type.eq(TransactionType::Deposit))
		.filter(transactions::status.eq(TransactionStatus::Completed))
		.order(transactions::created_at.desc())
		.select(transactions::created_at)
		.first(conn)
		.optional()
		.map_err(Into::into)
}
