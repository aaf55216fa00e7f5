use diesel::SqliteConnection;
use log::{debug, info, warn};

use crate::{db, group, join_request, loan, membership};
use crate::group::{Group, NewGroup, SavingsFrequency};
use crate::join_request::{JoinRequest, NewJoinRequest, RequestStatus};
use crate::membership::{MemberRole, MemberStatus, Membership, NewMembership};
use crate::notify::{Notice, Notifier};
use crate::types::{Id, Time};

use super::error::{Error, ErrorKind};
use super::{Clock, Result};

/// How many random invite codes to try before giving up
const CODE_ATTEMPTS: usize = 8;

/// Membership registry: group creation, the enrollment workflow, and the
/// authorization checks the other services lean on
pub struct Registry<'a> {
	db: db::Pool,
	clock: &'a dyn Clock,
	notifier: &'a dyn Notifier,
}

/// Parameter object for creating a new Registry
pub struct NewRegistry<'a> {
	pub db: db::Pool,
	pub clock: &'a dyn Clock,
	pub notifier: &'a dyn Notifier,
}

/// Parameters for creating a group
pub struct NewGroupSpec<'a> {
	pub name: &'a str,
	pub description: &'a str,
	pub savings_frequency: SavingsFrequency,
	/// Expected contribution per cycle, whole currency units
	pub savings_amount: i64,
	/// Default interest rate offered on loans, whole percent
	pub interest_rate: i16,
	/// Default loan duration in days
	pub default_loan_duration: i16,
}

impl<'a> Registry<'a> {
	pub fn new(v: NewRegistry<'a>) -> Self {
		Registry {
			db: v.db,
			clock: v.clock,
			notifier: v.notifier,
		}
	}

	/// Create a group and enroll its creator as the approved leader
	pub fn create_group(&self, creator: Id, spec: NewGroupSpec) -> Result<Group> {
		if spec.name.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("group name is required")));
		}
		if spec.description.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("group description is required")));
		}
		if spec.savings_amount <= 0 {
			return Err(Error::new(ErrorKind::Validation("savings amount must be positive")));
		}
		if spec.interest_rate < 0 {
			return Err(Error::new(ErrorKind::Validation("interest rate cannot be negative")));
		}
		if spec.default_loan_duration <= 0 {
			return Err(Error::new(ErrorKind::Validation("loan duration must be positive")));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;

		for _ in 0..CODE_ATTEMPTS {
			let code = group::generate_code();
			if group::code_exists(conn, &code)? {
				continue;
			}
			if let Some(created) = Self::try_create(conn, creator, &spec, &code, now)? {
				info!("group {} ({}) created by user {}", created.id, created.group_code, creator);
				return Ok(created);
			}
		}
		Err(Error::new(ErrorKind::Internal("no unused group code after repeated draws")))
	}

	/// One creation attempt; `None` means the code lost a race to a
	/// concurrent creator and is worth another draw
	fn try_create(
		conn: &mut SqliteConnection,
		creator: Id,
		spec: &NewGroupSpec,
		code: &str,
		now: Time,
	) -> Result<Option<Group>> {
		let outcome = conn.immediate_transaction::<Group, Error, _>(|conn| {
			let created = group::insert(conn, NewGroup {
				name: spec.name,
				description: spec.description,
				group_code: code,
				created_by: creator,
				savings_frequency: spec.savings_frequency,
				savings_amount: spec.savings_amount,
				interest_rate: spec.interest_rate,
				default_loan_duration: spec.default_loan_duration,
				created_at: now,
			})?;

			membership::insert(conn, NewMembership {
				group_id: created.id,
				user_id: creator,
				role: MemberRole::Leader,
				status: MemberStatus::Approved,
				joined_at: now,
			})?;

			Ok(created)
		});

		match outcome {
			Ok(created) => Ok(Some(created)),
			// the code is the only unique column these inserts touch
			Err(e) if matches!(e.kind(), ErrorKind::Database(db::Error::RecordAlreadyExists)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Ask to join the group behind an invite code
	///
	/// Leaves a pending join request and a pending membership behind; the
	/// leader resolves both in one step
	pub fn join_by_code(&self, user: Id, code: &str) -> Result<JoinRequest> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;

		let target = match group::find_by_code(conn, code) {
			Ok(g) => g,
			Err(db::Error::RecordNotFound) => return Err(Error::new(ErrorKind::NotFound("group"))),
			Err(e) => return Err(e.into()),
		};

		let request = conn.immediate_transaction::<JoinRequest, Error, _>(|conn| {
			match membership::find(conn, target.id, user) {
				Ok(m) if m.status == MemberStatus::Approved => {
					return Err(Error::new(ErrorKind::Conflict(format!(
						"user {} is already a member of {}",
						user, target.name
					))));
				}
				Ok(_) => {
					return Err(Error::new(ErrorKind::Conflict(format!(
						"user {} is already waiting for approval to join {}",
						user, target.name
					))));
				}
				Err(db::Error::RecordNotFound) => {}
				Err(e) => return Err(e.into()),
			}

			if join_request::pending_exists(conn, target.id, user)? {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"user {} already has a pending request for {}",
					user, target.name
				))));
			}

			let request = join_request::upsert_pending(conn, NewJoinRequest {
				group_id: target.id,
				user_id: user,
				status: RequestStatus::Pending,
				created_at: now,
			})?;

			membership::insert(conn, NewMembership {
				group_id: target.id,
				user_id: user,
				role: MemberRole::Member,
				status: MemberStatus::Pending,
				joined_at: now,
			})?;

			Ok(request)
		})?;

		debug!("user {} asked to join group {}", user, target.group_code);
		Ok(request)
	}

	/// Approve a pending join request and its paired membership
	pub fn approve_join_request(&self, group_id: Id, request_id: Id, reviewer: Id) -> Result<JoinRequest> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.ensure_leader(conn, group_id, reviewer)?;
		let target = Self::group_of(conn, group_id)?;

		let request = conn.immediate_transaction::<JoinRequest, Error, _>(|conn| {
			let request = Self::pending_request(conn, group_id, request_id)?;
			let request = join_request::resolve(conn, request.id, RequestStatus::Approved, reviewer, now)?;

			match membership::find(conn, group_id, request.user_id) {
				Ok(m) => {
					membership::set_status(conn, m.id, MemberStatus::Approved)?;
				}
				// every request is created together with its membership row
				Err(db::Error::RecordNotFound) => {
					return Err(Error::new(ErrorKind::Internal("join request has no membership row")));
				}
				Err(e) => return Err(e.into()),
			}

			Ok(request)
		})?;

		info!("join request {} approved by user {}", request.id, reviewer);
		self.send(Notice::JoinApproved { group: &target.name, user_id: request.user_id });
		Ok(request)
	}

	/// Reject a pending join request and drop its paired membership
	pub fn reject_join_request(&self, group_id: Id, request_id: Id, reviewer: Id) -> Result<JoinRequest> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.ensure_leader(conn, group_id, reviewer)?;
		let target = Self::group_of(conn, group_id)?;

		let request = conn.immediate_transaction::<JoinRequest, Error, _>(|conn| {
			let request = Self::pending_request(conn, group_id, request_id)?;
			let request = join_request::resolve(conn, request.id, RequestStatus::Rejected, reviewer, now)?;
			membership::remove(conn, group_id, request.user_id)?;

			Ok(request)
		})?;

		info!("join request {} rejected by user {}", request.id, reviewer);
		self.send(Notice::JoinRejected { group: &target.name, user_id: request.user_id });
		Ok(request)
	}

	pub fn group(&self, group_id: Id, caller: Id) -> Result<(Group, Vec<Membership>)> {
		let conn = &mut self.db.get()?;
		self.ensure_member(conn, group_id, caller)?;
		let target = Self::group_of(conn, group_id)?;
		let members = membership::for_group(conn, group_id)?;
		Ok((target, members))
	}

	/// Ungated lookup for invite previews
	pub fn group_by_code(&self, code: &str) -> Result<Group> {
		let conn = &mut self.db.get()?;
		match group::find_by_code(conn, code) {
			Ok(g) => Ok(g),
			Err(db::Error::RecordNotFound) => Err(Error::new(ErrorKind::NotFound("group"))),
			Err(e) => Err(e.into()),
		}
	}

	pub fn members(&self, group_id: Id, caller: Id) -> Result<Vec<Membership>> {
		let conn = &mut self.db.get()?;
		self.ensure_member(conn, group_id, caller)?;
		membership::for_group(conn, group_id).map_err(Into::into)
	}

	/// Join requests awaiting review, newest first
	pub fn pending_requests(&self, group_id: Id, caller: Id) -> Result<Vec<JoinRequest>> {
		let conn = &mut self.db.get()?;
		self.ensure_leader(conn, group_id, caller)?;
		join_request::pending_for_group(conn, group_id).map_err(Into::into)
	}

	pub fn groups_for(&self, user: Id) -> Result<Vec<Group>> {
		let conn = &mut self.db.get()?;
		group::for_user(conn, user).map_err(Into::into)
	}

	pub fn leader_groups_for(&self, user: Id) -> Result<Vec<Group>> {
		let conn = &mut self.db.get()?;
		group::led_by(conn, user).map_err(Into::into)
	}

	pub fn is_leader(&self, group_id: Id, user: Id) -> Result<bool> {
		let conn = &mut self.db.get()?;
		membership::is_leader(conn, group_id, user).map_err(Into::into)
	}

	pub fn is_approved_member(&self, group_id: Id, user: Id) -> Result<bool> {
		let conn = &mut self.db.get()?;
		membership::is_approved_member(conn, group_id, user).map_err(Into::into)
	}

	/// Leader kicks a member out; money must be settled first
	pub fn remove_member(&self, group_id: Id, member: Id, caller: Id) -> Result<()> {
		let conn = &mut self.db.get()?;
		self.ensure_leader(conn, group_id, caller)?;
		if member == caller {
			return Err(Error::new(ErrorKind::Validation("the leader cannot be removed from their own group")));
		}

		Self::delete_membership(conn, group_id, member)?;
		info!("user {} removed from group {} by user {}", member, group_id, caller);
		Ok(())
	}

	/// Member walks away on their own; same settlement rules
	pub fn leave(&self, group_id: Id, user: Id) -> Result<()> {
		let conn = &mut self.db.get()?;
		let m = match membership::find(conn, group_id, user) {
			Ok(m) => m,
			Err(db::Error::RecordNotFound) => return Err(Error::new(ErrorKind::NotFound("membership"))),
			Err(e) => return Err(e.into()),
		};
		if m.role == MemberRole::Leader {
			return Err(Error::new(ErrorKind::Validation("the leader cannot leave their own group")));
		}

		Self::delete_membership(conn, group_id, user)?;
		info!("user {} left group {}", user, group_id);
		Ok(())
	}

	/// Gate: the caller holds the leader role in the group
	pub(super) fn ensure_leader(&self, conn: &mut SqliteConnection, group_id: Id, user: Id) -> Result<()> {
		if membership::is_leader(conn, group_id, user)? {
			Ok(())
		} else {
			Err(Error::new(ErrorKind::Forbidden("requires the group leader")))
		}
	}

	/// Gate: the caller is an approved member of the group
	pub(super) fn ensure_member(&self, conn: &mut SqliteConnection, group_id: Id, user: Id) -> Result<()> {
		if membership::is_approved_member(conn, group_id, user)? {
			Ok(())
		} else {
			Err(Error::new(ErrorKind::Forbidden("requires an approved group member")))
		}
	}

	/// Membership rows only go away while no money hangs off them
	fn delete_membership(conn: &mut SqliteConnection, group_id: Id, user: Id) -> Result<()> {
		conn.immediate_transaction::<(), Error, _>(|conn| {
			let m = match membership::find(conn, group_id, user) {
				Ok(m) => m,
				Err(db::Error::RecordNotFound) => return Err(Error::new(ErrorKind::NotFound("membership"))),
				Err(e) => return Err(e.into()),
			};
			if m.current_balance != 0 {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"member {} still holds a balance of {}",
					user, m.current_balance
				))));
			}
			if loan::active_exists(conn, group_id, user)? {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"member {} still has an active loan",
					user
				))));
			}

			membership::remove(conn, group_id, user)?;
			join_request::delete_for_member(conn, group_id, user)?;
			Ok(())
		})
	}

	fn pending_request(conn: &mut SqliteConnection, group_id: Id, request_id: Id) -> Result<JoinRequest> {
		let request = match join_request::find(conn, request_id) {
			Ok(r) => r,
			Err(db::Error::RecordNotFound) => return Err(Error::new(ErrorKind::NotFound("join request"))),
			Err(e) => return Err(e.into()),
		};
		if request.group_id != group_id {
			return Err(Error::new(ErrorKind::NotFound("join request")));
		}
		if request.status != RequestStatus::Pending {
			return Err(Error::new(ErrorKind::Conflict(format!(
				"join request {} is already {}",
				request.id, request.status
			))));
		}
		Ok(request)
	}

	pub(super) fn group_of(conn: &mut SqliteConnection, group_id: Id) -> Result<Group> {
		match group::find(conn, group_id) {
			Ok(g) => Ok(g),
			Err(db::Error::RecordNotFound) => Err(Error::new(ErrorKind::NotFound("group"))),
			Err(e) => Err(e.into()),
		}
	}

	fn send(&self, notice: Notice) {
		if let Err(reason) = self.notifier.notify(notice) {
			warn!("notice dropped: {}", reason);
		}
	}
}
