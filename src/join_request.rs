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
use crate::schema::join_requests;
use crate::types::{Id, Time};

/// A user's request to join a group, reviewed by the leader
#[derive(Queryable, Identifiable, PartialEq, Debug, Clone)]
pub struct JoinRequest {
	pub id: Id,
	pub group_id: Id,
	pub user_id: Id,
	pub status: RequestStatus,
	pub reviewed_by: Option<Id>,
	pub reviewed_at: Option<Time>,
	pub created_at: Time,
}

#[derive(Insertable)]
#[diesel(table_name = join_requests)]
pub struct NewJoinRequest {
	pub group_id: Id,
	pub user_id: Id,
	pub status: RequestStatus,
	pub created_at: Time,
}

#[derive(AsExpression, FromSqlRow, Copy, Clone, Eq, PartialEq, EnumString, Display, Debug)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
	Pending,
	Approved,
	Rejected,
}

impl ToSql<Text, Sqlite> for RequestStatus {
	fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
		out.set_value(self.to_string());
		Ok(IsNull::No)
	}
}

impl FromSql<Text, Sqlite> for RequestStatus {
	fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
		let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
		RequestStatus::from_str(&s).map_err(Into::into)
	}
}

/// Create the request, or put a previously rejected one back to pending
///
/// One row per (group, user); re-joining re-opens the old row
pub fn upsert_pending(conn: &mut SqliteConnection, request: NewJoinRequest) -> db::Result<JoinRequest> {
	let created_at = request.created_at;
	diesel::insert_into(join_requests::table)
		.values(&request)
		.on_conflict((join_requests::group_id, join_requests::user_id))
		.do_update()
		.set((
			join_requests::status.eq(RequestStatus::Pending),
			join_requests::reviewed_by.eq(None::<Id>),
			join_requests::reviewed_at.eq(None::<Time>),
			join_requests::created_at.eq(created_at),
		))
		.get_result(conn)
		.map_err(Into::into)
}

pub fn find(conn: &mut SqliteConnection, id: Id) -> db::Result<JoinRequest> {
	join_requests::table
		.find(id)
		.select(join_requests::all_columns)
		.first(conn)
		.map_err(Into::into)
}

pub fn pending_exists(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<bool> {
	use diesel::dsl::exists;
	diesel::select(exists(
		join_requests::table
			.filter(join_requests::group_id.eq(group_id))
			.filter(join_requests::user_id.eq(user_id))
			.filter(join_requests::status.eq(RequestStatus::Pending)),
	))
	.get_result(conn)
	.map_err(Into::into)
}

/// Pending requests awaiting the leader's review, newest first
pub fn pending_for_group(conn: &mut SqliteConnection, group_id: Id) -> db::Result<Vec<JoinRequest>> {
	join_requests::table
		.filter(join_requests::group_id.eq(group_id))
		.filter(join_requests::status.eq(RequestStatus::Pending))
		.select(join_requests::all_columns)
		.order(join_requests::created_at.desc())
		.load(conn)
		.map_err(Into::into)
}

/// Stamp the reviewer's decision on the request
pub fn resolve(conn: &mut SqliteConnection, id: Id, status: RequestStatus, reviewer: Id, at: Time) -> db::Result<JoinRequest> {
	diesel::update(join_requests::table)
		.filter(join_requests::id.eq(id))
		.set((
			join_requests::status.eq(status),
			join_requests::reviewed_by.eq(reviewer),
			join_requests::reviewed_at.eq(at),
		))
		.get_result(conn)
		.map_err(Into::into)
}

pub fn delete_for_member(conn: &mut SqliteConnection, group_id: Id, user_id: Id) -> db::Result<usize> {
	diesel::delete(
		join_requests::table
			.filter(join_requests::group_id.eq(group_id))
			.filter(join_requests::user_id.eq(user_id)),
	)
	.execute(conn)
	.map_err(Into::into)
}
