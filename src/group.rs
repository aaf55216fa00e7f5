use std::str::FromStr;

use chrono::Duration;
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
use crate::schema::{group_members, groups};
use crate::types::{Id, Time, TimeExt};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LEN: usize = 6;

/// A savings circle: members pay a fixed amount into the pot on a fixed
/// cadence, and may borrow against it
#[derive(Queryable, Identifiable, PartialEq, Debug, Clone)]
pub struct Group {
	pub id: Id,
	pub name: String,
	pub description: String,
	/// Shareable invite code, unique across all groups
	pub group_code: String,
	/// User id of the group's leader
	pub created_by: Id,
	pub savings_frequency: SavingsFrequency,
	/// Expected contribution per cycle, whole currency units
	pub savings_amount: i64,
	/// Default interest rate offered on loans, whole percent
	pub interest_rate: i16,
	/// Default loan duration in days
	pub default_loan_duration: i16,
	/// Running total of completed contributions
	pub total_savings: i64,
	pub leader_upi_id: Option<String>,
	pub leader_upi_name: Option<String>,
	pub created_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = groups)]
pub struct NewGroup<'a> {
	pub name: &'a str,
	pub description: &'a str,
	pub group_code: &'a str,
	pub created_by: Id,
	pub savings_frequency: SavingsFrequency,
	pub savings_amount: i64,
	pub interest_rate: i16,
	pub default_loan_duration: i16,
	pub created_at: Time,
}

/// The leader's collection endpoint for UPI contributions
#[derive(AsChangeset)]
#[diesel(table_name = groups)]
pub struct UpiDetails<'a> {
	pub leader_upi_id: &'a str,
	pub leader_upi_name: &'a str,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum SavingsFrequency {
	Weekly,
	Monthly,
	Quarterly,
}

impl SavingsFrequency {
	/// When the next contribution falls due, counting from `from`
	pub fn next_due_from(&self, from: Time) -> Time {
		match self {
			SavingsFrequency::Weekly => from + Duration::days(7),
			SavingsFrequency::Monthly => from.add_months(1),
			SavingsFrequency::Quarterly => from.add_months(3),
		}
	}
}

impl ToSql<Text, Sqlite> for SavingsFrequency {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for SavingsFrequency {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		SavingsFrequency::from_str(&s).map_err(Into::into)
	}
}

/// Random invite code drawn from [`CODE_ALPHABET`]
pub fn generate_code() -> String {
	let mut rng = rand::thread_rng();
	(0..CODE_LEN)
		.map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
		.collect()
}

pub fn insert(conn: &mut SqliteConnection, group: NewGroup) -> db::Result<Group> {
	diesel::insert_into(groups::table)
		.values(&group)
		.get_result(conn)
		.map_err(Into::into)
}

pub fn find(conn: &mut SqliteConnection, id: Id) -> db::Result<Group> {
	groups::table
		.find(id)
		.select(groups::all_columns)
		.first(conn)
		.map_err(Into::into)
}

pub fn find_by_code(conn: &mut SqliteConnection, code: &str) -> db::Result<Group> {
	groups::table
		.filter(groups::group_code.eq(code))
		.select(groups::all_columns)
		.first(conn)
		.map_err(Into::into)
}

pub fn code_exists(conn: &mut SqliteConnection, code: &str) -> db::Result<bool> {
	use diesel::dsl::exists;
	diesel::select(exists(groups::table.filter(groups::group_code.eq(code))))
		.get_result(conn)
		.map_err(Into::into)
}

/// Fold a completed contribution into the group's running total
pub fn add_savings(conn: &mut SqliteConnection, id: Id, amount: i64) -> db::Result<Group> {
	diesel::update(groups::table)
		.filter(groups::id.eq(id))
		.set(groups::total_savings.eq(groups::total_savings + amount))
		.get_result(conn)
		.map_err(Into::into)
}

pub fn set_upi_details(conn: &mut SqliteConnection, id: Id, upi: &UpiDetails) -> db::Result<Group> {
	diesel::update(groups::table)
		.filter(groups::id.eq(id))
		.set(upi)
		.get_result(conn)
		.map_err(Into::into)
}

/// Groups the user belongs to, in any membership state
pub fn for_user(conn: &mut SqliteConnection, user_id: Id) -> db::Result<Vec<Group>> {
	groups::table
		.inner_join(group_members::table)
		.filter(group_members::user_id.eq(user_id))
		.select(groups::all_columns)
		.order(groups::created_at.desc())
		.load(conn)
		.map_err(Into::into)
}

/// Groups the user leads
pub fn led_by(conn: &mut SqliteConnection, user_id: Id) -> db::Result<Vec<Group>> {
	groups::table
		.filter(groups::created_by.eq(user_id))
		.select(groups::all_columns)
		.order(groups::created_at.desc())
		.load(conn)
		.map_err(Into::into)
}
