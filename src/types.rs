use chrono::{Datelike, Months, NaiveDateTime};

pub type Id = i32;
pub type Time = NaiveDateTime;

pub trait TimeExt {
	fn add_months(&self, num_months: u32) -> Time;
	fn month_start(&self) -> Time;
}

impl TimeExt for Time {
	/// Same day `num_months` later, clamped to the end of a shorter month
	fn add_months(&self, num_months: u32) -> Time {
		self.checked_add_months(Months::new(num_months)).unwrap_or(*self)
	}

	/// Midnight on the first day of this instant's calendar month
	fn month_start(&self) -> Time {
		self.date()
			.with_day(1)
			.and_then(|d| d.and_hms_opt(0, 0, 0))
			.unwrap_or(*self)
	}
}
