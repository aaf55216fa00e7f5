use diesel::SqliteConnection;
use tempfile::TempDir;

use crate::{db, group, membership};
use crate::group::{Group, NewGroup, SavingsFrequency};
use crate::membership::{MemberRole, MemberStatus, Membership, NewMembership};
use crate::types::{Id, Time};

/// A fresh store in a scratch directory; dropped with the test
pub struct Fixture {
	pub pool: db::Pool,
	_dir: TempDir,
}

impl Fixture {
	pub fn new() -> Self {
		let dir = tempfile::tempdir().unwrap();
		let url = dir.path().join("circle.db");
		let pool = db::connect(url.to_str().unwrap()).unwrap();
		Fixture { pool, _dir: dir }
	}

	pub fn conn(&self) -> db::Conn {
		self.pool.get().unwrap()
	}

	/// A group with its leader already enrolled and approved
	pub fn insert_group(&self, conn: &mut SqliteConnection, leader: Id, code: &str, savings_amount: i64) -> Group {
		let created = group::insert(conn, NewGroup {
			name: "Village fund",
			description: "Pooled savings for the village",
			group_code: code,
			created_by: leader,
			savings_frequency: SavingsFrequency::Monthly,
			savings_amount,
			interest_rate: 10,
			default_loan_duration: 30,
			created_at: time(2026, 1, 1),
		})
		.unwrap();

		membership::insert(conn, NewMembership {
			group_id: created.id,
			user_id: leader,
			role: MemberRole::Leader,
			status: MemberStatus::Approved,
			joined_at: time(2026, 1, 1),
		})
		.unwrap();

		created
	}

	pub fn insert_member(&self, conn: &mut SqliteConnection, group_id: Id, user_id: Id, status: MemberStatus) -> Membership {
		membership::insert(conn, NewMembership {
			group_id,
			user_id,
			role: MemberRole::Member,
			status,
			joined_at: time(2026, 1, 2),
		})
		.unwrap()
	}
}

/// Noon on the given day; tests never care about the clock below that
pub fn time(y: i32, m: u32, d: u32) -> Time {
	chrono::NaiveDate::from_ymd_opt(y, m, d)
		.unwrap()
		.and_hms_opt(12, 0, 0)
		.unwrap()
}
