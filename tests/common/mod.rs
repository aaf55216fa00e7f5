#![allow(dead_code)]

use std::cell::Cell;

use tempfile::TempDir;

pub use bachat_api::*;

pub struct TestUsers {}

impl TestUsers {
	pub const LEADER: Id = 1;
	pub const MEMBER: Id = 2;
	pub const OUTSIDER: Id = 3;
}

/// Clock the tests move by hand
pub struct ManualClock {
	now: Cell<Time>,
}

impl ManualClock {
	pub fn new(start: Time) -> Self {
		ManualClock { now: Cell::new(start) }
	}

	pub fn set(&self, at: Time) {
		self.now.set(at);
	}

	pub fn advance_days(&self, days: i64) {
		self.now.set(self.now.get() + chrono::Duration::days(days));
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Time {
		self.now.get()
	}
}

/// A fresh store plus the collaborators every service wants
pub struct Fixture {
	pub pool: Pool,
	pub clock: ManualClock,
	pub notifier: LogNotifier,
	pub gateway: UpiGateway,
	_dir: TempDir,
}

impl Fixture {
	pub fn new() -> Self {
		let _ = pretty_env_logger::try_init();
		let dir = tempfile::tempdir().unwrap();
		let url = dir.path().join("circle.db");
		let pool = bachat_api::db::connect(url.to_str().unwrap()).unwrap();

		Fixture {
			pool,
			clock: ManualClock::new(time(2026, 3, 10)),
			notifier: LogNotifier,
			gateway: UpiGateway,
			_dir: dir,
		}
	}

	pub fn registry(&self) -> Registry {
		Registry::new(NewRegistry {
			db: self.pool.clone(),
			clock: &self.clock,
			notifier: &self.notifier,
		})
	}

	pub fn loan_book(&self) -> LoanBook {
		LoanBook::new(NewLoanBook {
			db: self.pool.clone(),
			registry: self.registry(),
			clock: &self.clock,
			notifier: &self.notifier,
		})
	}

	pub fn savings(&self) -> SavingsLedger {
		SavingsLedger::new(NewSavingsLedger {
			db: self.pool.clone(),
			registry: self.registry(),
			clock: &self.clock,
			gateway: &self.gateway,
		})
	}

	/// A group with one approved member, driven through the real enrollment
	/// flow rather than seeded rows
	pub fn group_with_member(&self, leader: Id, member: Id, savings_amount: i64) -> Group {
		self.group_with_frequency(leader, member, savings_amount, SavingsFrequency::Monthly)
	}

	pub fn group_with_frequency(&self, leader: Id, member: Id, savings_amount: i64, frequency: SavingsFrequency) -> Group {
		let registry = self.registry();
		let circle = registry
			.create_group(leader, NewGroupSpec {
				name: "Street savings",
				description: "Pooled savings for the street",
				savings_frequency: frequency,
				savings_amount,
				interest_rate: 10,
				default_loan_duration: 30,
			})
			.unwrap();

		let request = registry.join_by_code(member, &circle.group_code).unwrap();
		registry.approve_join_request(circle.id, request.id, leader).unwrap();
		circle
	}
}

pub fn time(y: i32, m: u32, d: u32) -> Time {
	chrono::NaiveDate::from_ymd_opt(y, m, d)
		.unwrap()
		.and_hms_opt(12, 0, 0)
		.unwrap()
}
