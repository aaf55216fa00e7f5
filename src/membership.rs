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
use crate::schema::group_members;
use crate::types::{Id, Time};

/// A user's standing inside one group
///
/// `current_balance` mirrors the member's completed contributions and is
/// only ever moved by the same transaction that writes the ledger row
#[derive(Queryable, Identifiable, PartialEq, Debug, Clone)]
#[diesel(table_name = group_members)]
pub struct Membership {
	pub id: Id,
	pub group_id: Id,
	pub user_id: Id,
	pub role: MemberRole,
	pub status: MemberStatus,
	pub current_balance: i64,
	pub joined_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = group_members)]
pub struct NewMembership {
	pub group_id: Id,
	pub user_id: Id,
	pub role: MemberRole,
	pub status: MemberStatus,
	pub joined_at: Time,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum MemberRole {
	Member,
	/// The group's creator; exactly one per group
	Leader,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum MemberStatus {
	Pending,
	Approved,
}

impl ToSql<Text, Sqlite> for MemberRole {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for MemberRole {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		MemberRole::from_str(&s).map_err(Into::into)
	}
}

impl ToSql<Text, Sqlite> for MemberStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for MemberStatus {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		MemberStatus::from_str(&s).map_err(Into::into)
	}
}

pub fn insert(conn: &mut SqliteConnection, membership: NewMembership) -> db::Result<Membership> {
	diesel::insert_into(group_members::table)
		.values(&membership)
		.get_result(conn)
		.map_err(Into::into)
}

pub fn find(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<Membership> {
	group_members::table
		.filter(group_members::group_id.eq(group_id))
		.filter(group_members::user_id.eq(user_id))
		.select(group_members::all_columns)
		.first(conn)
		.map_err(Into::into)
}

/// All memberships in the group, leader first
pub fn for_group(conn: &mut SqliteConnection, group_id: Id) -> db::Result<Vec<Membership>> {
	group_members::table
		.filter(group_members::group_id.eq(group_id))
		.select(group_members::all_columns)
		.order((group_members::role.asc(), group_members::joined_at.asc()))
		.load(conn)
		.map_err(Into::into)
}

pub fn approved_for_group(conn: &mut SqliteConnection, group_id: Id) -> db::Result<Vec<Membership>> {
	group_members::table
		.filter(group_members::group_id.eq(group_id))
		.filter(group_members::status.eq(MemberStatus::Approved))
		.select(group_members::all_columns)
		.order((group_members::role.asc(), group_members::joined_at.asc()))
		.load(conn)
		.map_err(Into::into)
}

pub fn for_user(conn: &mut SqliteConnection, user_id: Id) -> db::Result<Vec<Membership>> {
	group_members::table
		.filter(group_members::user_id.eq(user_id))
		.select(group_members::all_columns)
		.order(group_members::joined_at.asc())
		.load(conn)
		.map_err(Into::into)
}

pub fn set_status(conn: &mut SqliteConnection, id: Id, status: MemberStatus) -> db::Result<Membership> {
	diesel::update(group_members::table)
		.filter(group_members::id.eq(id))
		.set(group_members::status.eq(status))
		.get_result(conn)
		.map_err(Into::into)
}

/// Fold a completed contribution into the member's balance
pub fn increment_balance(conn: &mut SqliteConnection, group_id: Id, user_id: Id, amount: i64) -> db::Result<Membership> {
	diesel::update(group_members::table)
		.filter(group_members::group_id.eq(group_id))
		.filter(group_members::user_id.eq(user_id))
		.set(group_members::current_balance.eq(group_members::current_balance + amount))
		.get_result(conn)
		.map_err(Into::into)
}

pub fn remove(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<usize> {
	diesel::delete(
		group_members::table
			.filter(group_members::group_id.eq(group_id))
			.filter(group_members::user_id.eq(user_id)),
	)
	.execute(conn)
	.map_err(Into::into)
}

pub fn is_leader(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<bool> {
	use diesel::dsl::exists;
	diesel::select(exists(
		group_members::table
			.filter(group_members::group_id.eq(group_id))
			.filter(group_members::user_id.eq(user_id))
			.filter(group_members::role.eq(MemberRole::Leader))
			.filter(group_members::status.eq(MemberStatus::Approved)),
	))
	.get_result(conn)
	.map_err(Into::into)
}

pub fn is_approved_member(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<bool> {
	use diesel::dsl::exists;
	diesel::select(exists(
		group_members::table
			.filter(group_members::group_id.eq(group_id))
			.filter(group_members::user_id.eq(user_id))
			.filter(group_members::status.eq(MemberStatus::Approved)),
	))
	.get_result(conn)
	.map_err(Into::into)
}
