use std::collections::HashMap;

use diesel::SqliteConnection;
use log::{debug, info};

use crate::{db, group, membership, transaction};
use crate::group::{Group, SavingsFrequency, UpiDetails};
use crate::membership::{MemberRole, MemberStatus};
use crate::transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
use crate::types::{Id, Time};
use crate::upi::{self, CollectionRequest, PaymentGateway};

use super::error::{Error, ErrorKind};
use super::registry::Registry;
use super::{Clock, Result};

/// Contribution ledger: deposits into the pot, the UPI collection flow and
/// the read-only savings reports
pub struct SavingsLedger<'a> {
	db: db::Pool,
	registry: Registry<'a>,
	clock: &'a dyn Clock,
	gateway: &'a dyn PaymentGateway,
}

/// Parameter object for creating a new SavingsLedger
pub struct NewSavingsLedger<'a> {
	pub db: db::Pool,
	pub registry: Registry<'a>,
	pub clock: &'a dyn Clock,
	pub gateway: &'a dyn PaymentGateway,
}

/// One member's standing in the group savings summary
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSavings {
	pub user_id: Id,
	pub role: MemberRole,
	pub current_balance: i64,
	pub total_contributed: i64,
	pub contribution_count: i64,
}

/// Per-member breakdown of a group's pot
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSavings {
	pub group_name: String,
	/// What each member is expected to pay per cycle
	pub expected_contribution: i64,
	/// Approved members, largest contributor first
	pub members: Vec<MemberSavings>,
	pub total_savings: i64,
}

/// A user's deposits into one of their groups
#[derive(Debug, Clone, PartialEq)]
pub struct GroupContribution {
	pub group_id: Id,
	pub group_name: String,
	pub expected_amount: i64,
	pub savings_frequency: SavingsFrequency,
	pub total_contributed: i64,
	pub contribution_count: i64,
	pub current_balance: i64,
}

/// Cross-group rollup of everything a user has put away
#[derive(Debug, Clone, PartialEq)]
pub struct UserSavings {
	pub total_savings: i64,
	pub groups_contributed_to: i64,
	pub total_contributions: i64,
	/// Largest contribution first
	pub groups: Vec<GroupContribution>,
}

/// When a member's next contribution falls due; derived, never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingContribution {
	pub group_id: Id,
	pub group_name: String,
	pub amount: i64,
	pub frequency: SavingsFrequency,
	pub current_balance: i64,
	pub last_contribution: Option<Time>,
	pub next_due: Time,
}

impl<'a> SavingsLedger<'a> {
	pub fn new(v: NewSavingsLedger<'a>) -> Self {
		SavingsLedger {
			db: v.db,
			registry: v.registry,
			clock: v.clock,
			gateway: v.gateway,
		}
	}

	/// Pay the group's fixed contribution into the pot
	///
	/// The ledger row, the member balance and the group total move together
	/// or not at all
	pub fn contribute(&self, group_id: Id, user: Id, payment_method: &str) -> Result<Transaction> {
		if payment_method.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("payment method is required")));
		}

		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.registry.ensure_member(conn, group_id, user)?;
		let target = Registry::group_of(conn, group_id)?;

		let deposit = conn.immediate_transaction::<Transaction, Error, _>(|conn| {
			let reference = transaction::generate_reference("TXN", now);
			let deposit = transaction::insert(conn, NewTransaction {
				group_id,
				user_id: user,
				amount: target.savings_amount,
				transaction_type: TransactionType::Deposit,
				payment_method,
				transaction_reference: &reference,
				status: TransactionStatus::Completed,
				description: &format!("Contribution to {}", target.name),
				upi_transaction_id: None,
				upi_payment_link: None,
				qr_code_url: None,
				upi_status: None,
				created_at: now,
			})?;

			membership::increment_balance(conn, group_id, user, target.savings_amount)?;
			group::add_savings(conn, group_id, target.savings_amount)?;

			Ok(deposit)
		})?;

		info!("user {} contributed {} to group {}", user, deposit.amount, group_id);
		Ok(deposit)
	}

	/// Point the group's UPI collections at the leader's account
	pub fn set_upi_details(&self, group_id: Id, caller: Id, upi_id: &str, display_name: &str) -> Result<Group> {
		if !upi::validate_upi_id(upi_id) {
			return Err(Error::new(ErrorKind::Validation("UPI id must look like name@bank")));
		}
		if display_name.trim().is_empty() {
			return Err(Error::new(ErrorKind::Validation("payee display name is required")));
		}

		let conn = &mut self.db.get()?;
		self.registry.ensure_leader(conn, group_id, caller)?;

		let updated = group::set_upi_details(conn, group_id, &UpiDetails {
			leader_upi_id: upi_id,
			leader_upi_name: display_name,
		})?;

		info!("group {} now collects UPI payments at {}", group_id, upi_id);
		Ok(updated)
	}

	/// Open a UPI collection for the member's contribution
	///
	/// Writes a pending ledger row carrying the gateway handle; balances move
	/// only when the payment is completed
	pub fn generate_upi_payment(&self, group_id: Id, user: Id) -> Result<Transaction> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;
		self.registry.ensure_member(conn, group_id, user)?;
		let target = Registry::group_of(conn, group_id)?;

		let payee_upi_id = match target.leader_upi_id.as_deref() {
			Some(id) => id,
			None => {
				return Err(Error::new(ErrorKind::Validation(
					"the group leader has not configured UPI details",
				)));
			}
		};
		let payee_name = target.leader_upi_name.as_deref().unwrap_or(&target.name);

		let note = format!("Contribution to {} by member {}", target.name, user);
		let handle = self.gateway.collection_request(&CollectionRequest {
			payee_upi_id,
			payee_name,
			amount: target.savings_amount,
			note: &note,
			at: now,
		});

		let reference = transaction::generate_reference("TXN", now);
		let pending = transaction::insert(conn, NewTransaction {
			group_id,
			user_id: user,
			amount: target.savings_amount,
			transaction_type: TransactionType::Deposit,
			payment_method: "upi",
			transaction_reference: &reference,
			status: TransactionStatus::Pending,
			description: &note,
			upi_transaction_id: Some(&handle.upi_transaction_id),
			upi_payment_link: Some(&handle.payment_link),
			qr_code_url: handle.qr_code_url.as_deref(),
			upi_status: Some("initiated"),
			created_at: now,
		})?;

		debug!("user {} opened UPI collection {} for group {}", user, pending.transaction_reference, group_id);
		Ok(pending)
	}

	/// Peek at a payment the caller initiated; never completes it
	pub fn payment_status(&self, transaction_id: Id, caller: Id) -> Result<Transaction> {
		let conn = &mut self.db.get()?;
		let found = Self::transaction_by_id(conn, transaction_id)?;
		// scoped to the payer, so anyone else sees nothing
		if found.user_id != caller {
			return Err(Error::new(ErrorKind::NotFound("transaction")));
		}
		Ok(found)
	}

	/// Confirm a pending UPI payment and move the money
	///
	/// Either the payer or the group leader may confirm; a second call finds
	/// the row completed and fails, so balances move exactly once
	pub fn complete_upi_payment(&self, transaction_id: Id, caller: Id) -> Result<Transaction> {
		let conn = &mut self.db.get()?;
		let found = Self::transaction_by_id(conn, transaction_id)?;
		if found.user_id != caller && !membership::is_leader(conn, found.group_id, caller)? {
			return Err(Error::new(ErrorKind::Forbidden("requires the payer or the group leader")));
		}

		let completed = conn.immediate_transaction::<Transaction, Error, _>(|conn| {
			let current = Self::transaction_by_id(conn, transaction_id)?;
			if current.status == TransactionStatus::Completed {
				return Err(Error::new(ErrorKind::Conflict(format!(
					"transaction {} is already completed",
					current.id
				))));
			}
			// the payer may have left while the collection sat pending; there
			// is no balance row left to credit
			match membership::find(conn, current.group_id, current.user_id) {
				Ok(_) => {}
				Err(db::Error::RecordNotFound) => {
					return Err(Error::new(ErrorKind::Conflict(format!(
						"user {} is no longer a member of group {}",
						current.user_id, current.group_id
					))));
				}
				Err(e) => return Err(e.into()),
			}

			let completed = transaction::complete(conn, current.id)?;
			membership::increment_balance(conn, current.group_id, current.user_id, current.amount)?;
			group::add_savings(conn, current.group_id, current.amount)?;

			Ok(completed)
		})?;

		info!("payment {} of {} completed by user {}", completed.id, completed.amount, caller);
		Ok(completed)
	}

	/// Completed ledger history for the group, newest first
	pub fn group_transactions(&self, group_id: Id, caller: Id) -> Result<Vec<Transaction>> {
		let conn = &mut self.db.get()?;
		self.registry.ensure_member(conn, group_id, caller)?;
		transaction::completed_for_group(conn, group_id).map_err(Into::into)
	}

	/// Everything the user has moved across all their groups, newest first
	pub fn user_transactions(&self, user: Id) -> Result<Vec<Transaction>> {
		let conn = &mut self.db.get()?;
		transaction::completed_for_user(conn, user).map_err(Into::into)
	}

	/// Who has paid what into the group pot
	pub fn savings_summary(&self, group_id: Id, caller: Id) -> Result<GroupSavings> {
		let conn = &mut self.db.get()?;
		self.registry.ensure_member(conn, group_id, caller)?;
		let target = Registry::group_of(conn, group_id)?;

		let mut by_member: HashMap<Id, (i64, i64)> = HashMap::new();
		for deposit in transaction::completed_deposits_for_group(conn, group_id)? {
			let entry = by_member.entry(deposit.user_id).or_insert((0, 0));
			entry.0 += deposit.amount;
			entry.1 += 1;
		}

		let mut members = Vec::new();
		for m in membership::approved_for_group(conn, group_id)? {
			let (total_contributed, contribution_count) = by_member.get(&m.user_id).copied().unwrap_or((0, 0));
			members.push(MemberSavings {
				user_id: m.user_id,
				role: m.role,
				current_balance: m.current_balance,
				total_contributed,
				contribution_count,
			});
		}
		members.sort_by(|a, b| b.total_contributed.cmp(&a.total_contributed));
		let total_savings = members.iter().map(|m| m.total_contributed).sum();

		Ok(GroupSavings {
			group_name: target.name,
			expected_contribution: target.savings_amount,
			members,
			total_savings,
		})
	}

	/// Everything the user has put away, rolled up and broken out per group
	pub fn user_savings(&self, user: Id) -> Result<UserSavings> {
		let conn = &mut self.db.get()?;

		let mut by_group: HashMap<Id, (i64, i64)> = HashMap::new();
		let mut total_savings = 0;
		let mut total_contributions = 0;
		for deposit in transaction::completed_deposits_for_user(conn, user)? {
			let entry = by_group.entry(deposit.group_id).or_insert((0, 0));
			entry.0 += deposit.amount;
			entry.1 += 1;
			total_savings += deposit.amount;
			total_contributions += 1;
		}

		let mut groups = Vec::new();
		for m in membership::for_user(conn, user)? {
			if m.status != MemberStatus::Approved {
				continue;
			}
			let g = group::find(conn, m.group_id)?;
			let (total_contributed, contribution_count) = by_group.get(&g.id).copied().unwrap_or((0, 0));
			groups.push(GroupContribution {
				group_id: g.id,
				group_name: g.name,
				expected_amount: g.savings_amount,
				savings_frequency: g.savings_frequency,
				total_contributed,
				contribution_count,
				current_balance: m.current_balance,
			});
		}
		groups.sort_by(|a, b| b.total_contributed.cmp(&a.total_contributed));

		Ok(UserSavings {
			total_savings,
			groups_contributed_to: by_group.len() as i64,
			total_contributions,
			groups,
		})
	}

	/// When each of the user's contributions falls due next
	///
	/// Projected from the last completed deposit, or from now for members who
	/// have not paid in yet
	pub fn upcoming_contributions(&self, user: Id) -> Result<Vec<UpcomingContribution>> {
		let now = self.clock.now();
		let conn = &mut self.db.get()?;

		let mut upcoming = Vec::new();
		for m in membership::for_user(conn, user)? {
			if m.status != MemberStatus::Approved {
				continue;
			}
			let g = group::find(conn, m.group_id)?;
			let last = transaction::last_deposit_at(conn, g.id, user)?;
			let next_due = g.savings_frequency.next_due_from(last.unwrap_or(now));
			upcoming.push(UpcomingContribution {
				group_id: g.id,
				group_name: g.name,
				amount: g.savings_amount,
				frequency: g.savings_frequency,
				current_balance: m.current_balance,
				last_contribution: last,
				next_due,
			});
		}
		Ok(upcoming)
	}

	fn transaction_by_id(conn: &mut SqliteConnection, id: Id) -> Result<Transaction> {
		match transaction::find(conn, id) {
			Ok(t) => Ok(t),
			Err(db::Error::RecordNotFound) => Err(Error::new(ErrorKind::NotFound("transaction"))),
			Err(e) => Err(e.into()),
		}
	}
}
