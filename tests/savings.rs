mod common;

use common::*;

#[test]
fn contributions_move_the_ledger_and_both_counters_together() {
	let f = Fixture::new();
	let registry = f.registry();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);

	let deposit = savings.contribute(circle.id, TestUsers::MEMBER, "cash").unwrap();
	assert_eq!(deposit.amount, 500);
	assert_eq!(deposit.transaction_type, TransactionType::Deposit);
	assert_eq!(deposit.status, TransactionStatus::Completed);
	assert_eq!(deposit.description, "Contribution to Street savings");
	assert!(deposit.transaction_reference.starts_with("TXN-"));

	let (fresh, members) = registry.group(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(fresh.total_savings, 500);
	let balance_of = |user: Id| members.iter().find(|m| m.user_id == user).unwrap().current_balance;
	assert_eq!(balance_of(TestUsers::MEMBER), 500);
	assert_eq!(balance_of(TestUsers::LEADER), 0);

	savings.contribute(circle.id, TestUsers::LEADER, "cash").unwrap();
	let (fresh, _) = registry.group(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(fresh.total_savings, 1000);
}

#[test]
fn contributions_require_an_approved_member() {
	let f = Fixture::new();
	let registry = f.registry();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);

	let err = savings.contribute(circle.id, TestUsers::OUTSIDER, "cash").unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));

	registry.join_by_code(TestUsers::OUTSIDER, &circle.group_code).unwrap();
	let err = savings.contribute(circle.id, TestUsers::OUTSIDER, "cash").unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));

	let err = savings.contribute(circle.id, TestUsers::MEMBER, "  ").unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Validation(_)));
}

#[test]
fn upi_details_belong_to_the_leader() {
	let f = Fixture::new();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);

	let err = savings.set_upi_details(circle.id, TestUsers::MEMBER, "asha@upi", "Asha").unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));

	for bad in ["plain", "@bank", "name@", "two words@bank", "name@ba nk"] {
		let err = savings.set_upi_details(circle.id, TestUsers::LEADER, bad, "Asha").unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::Validation(_)), "accepted {:?}", bad);
	}
	let err = savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", " ").unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Validation(_)));

	let updated = savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", "Asha").unwrap();
	assert_eq!(updated.leader_upi_id.as_deref(), Some("asha@upi"));
	assert_eq!(updated.leader_upi_name.as_deref(), Some("Asha"));
}

#[test]
fn a_upi_collection_stays_pending_until_confirmed() {
	let f = Fixture::new();
	let registry = f.registry();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);

	// no collection endpoint, no link
	let err = savings.generate_upi_payment(circle.id, TestUsers::MEMBER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Validation(_)));

	savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", "Asha").unwrap();
	let pending = savings.generate_upi_payment(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(pending.status, TransactionStatus::Pending);
	assert_eq!(pending.payment_method, "upi");
	assert_eq!(pending.amount, 500);
	assert_eq!(pending.upi_status.as_deref(), Some("initiated"));
	assert!(pending.upi_transaction_id.as_deref().unwrap().starts_with("UPI_"));
	let link = pending.upi_payment_link.as_deref().unwrap();
	assert!(link.starts_with("upi://pay?"));
	assert!(link.contains("pa=asha%40upi"));
	assert!(link.contains("pn=Asha"));
	assert!(link.contains("am=500"));
	assert!(link.contains("cu=INR"));
	assert!(link.contains("tn=Contribution%20to"));
	assert_eq!(pending.qr_code_url, None);

	// nothing moved yet
	let (fresh, _) = registry.group(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(fresh.total_savings, 0);

	let peek = savings.payment_status(pending.id, TestUsers::MEMBER).unwrap();
	assert_eq!(peek.status, TransactionStatus::Pending);

	let completed = savings.complete_upi_payment(pending.id, TestUsers::MEMBER).unwrap();
	assert_eq!(completed.status, TransactionStatus::Completed);
	assert_eq!(completed.upi_status.as_deref(), Some("completed"));

	let (fresh, members) = registry.group(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(fresh.total_savings, 500);
	let member = members.iter().find(|m| m.user_id == TestUsers::MEMBER).unwrap();
	assert_eq!(member.current_balance, 500);
}

#[test]
fn confirming_twice_moves_the_money_exactly_once() {
	let f = Fixture::new();
	let registry = f.registry();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);
	savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", "Asha").unwrap();
	let pending = savings.generate_upi_payment(circle.id, TestUsers::MEMBER).unwrap();

	savings.complete_upi_payment(pending.id, TestUsers::MEMBER).unwrap();
	let err = savings.complete_upi_payment(pending.id, TestUsers::MEMBER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Conflict(_)));
	let err = savings.complete_upi_payment(pending.id, TestUsers::LEADER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Conflict(_)));

	let (fresh, members) = registry.group(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(fresh.total_savings, 500);
	let member = members.iter().find(|m| m.user_id == TestUsers::MEMBER).unwrap();
	assert_eq!(member.current_balance, 500);
}

#[test]
fn the_leader_may_confirm_on_the_payers_behalf() {
	let f = Fixture::new();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);
	savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", "Asha").unwrap();
	let pending = savings.generate_upi_payment(circle.id, TestUsers::MEMBER).unwrap();

	// a stranger may not, and the payment status is the payer's business
	let err = savings.complete_upi_payment(pending.id, TestUsers::OUTSIDER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));
	let err = savings.payment_status(pending.id, TestUsers::LEADER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::NotFound(_)));

	let completed = savings.complete_upi_payment(pending.id, TestUsers::LEADER).unwrap();
	assert_eq!(completed.status, TransactionStatus::Completed);
}

#[test]
fn a_collection_left_behind_by_a_departed_payer_cannot_complete() {
	let f = Fixture::new();
	let registry = f.registry();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);
	savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", "Asha").unwrap();
	let pending = savings.generate_upi_payment(circle.id, TestUsers::MEMBER).unwrap();

	// a pending collection holds no balance, so nothing stops the payer leaving
	registry.leave(circle.id, TestUsers::MEMBER).unwrap();

	let err = savings.complete_upi_payment(pending.id, TestUsers::LEADER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Conflict(_)));

	// the row stays pending and the pot stays untouched
	let stale = savings.payment_status(pending.id, TestUsers::MEMBER).unwrap();
	assert_eq!(stale.status, TransactionStatus::Pending);
	let (fresh, _) = registry.group(circle.id, TestUsers::LEADER).unwrap();
	assert_eq!(fresh.total_savings, 0);
}

#[test]
fn histories_carry_completed_rows_only_newest_first() {
	let f = Fixture::new();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);
	savings.set_upi_details(circle.id, TestUsers::LEADER, "asha@upi", "Asha").unwrap();

	let pending = savings.generate_upi_payment(circle.id, TestUsers::MEMBER).unwrap();
	assert!(savings.group_transactions(circle.id, TestUsers::MEMBER).unwrap().is_empty());
	assert!(savings.user_transactions(TestUsers::MEMBER).unwrap().is_empty());

	f.clock.advance_days(1);
	let cash = savings.contribute(circle.id, TestUsers::MEMBER, "cash").unwrap();
	f.clock.advance_days(1);
	savings.complete_upi_payment(pending.id, TestUsers::MEMBER).unwrap();

	// the confirmed collection keeps the date it was opened on
	let history = savings.group_transactions(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(history.iter().map(|t| t.id).collect::<Vec<_>>(), vec![cash.id, pending.id]);
	let personal = savings.user_transactions(TestUsers::MEMBER).unwrap();
	assert_eq!(personal.len(), 2);

	let err = savings.group_transactions(circle.id, TestUsers::OUTSIDER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));
}

#[test]
fn the_summary_breaks_the_pot_down_by_member() {
	let f = Fixture::new();
	let registry = f.registry();
	let savings = f.savings();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);

	savings.contribute(circle.id, TestUsers::LEADER, "cash").unwrap();
	savings.contribute(circle.id, TestUsers::LEADER, "cash").unwrap();
	savings.contribute(circle.id, TestUsers::MEMBER, "cash").unwrap();
	// someone still waiting for approval stays out of the summary
	registry.join_by_code(TestUsers::OUTSIDER, &circle.group_code).unwrap();

	let summary = savings.savings_summary(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(summary.group_name, "Street savings");
	assert_eq!(summary.expected_contribution, 500);
	assert_eq!(summary.total_savings, 1500);

	assert_eq!(summary.members.len(), 2);
	assert_eq!(summary.members[0].user_id, TestUsers::LEADER);
	assert_eq!(summary.members[0].role, MemberRole::Leader);
	assert_eq!(summary.members[0].total_contributed, 1000);
	assert_eq!(summary.members[0].contribution_count, 2);
	assert_eq!(summary.members[0].current_balance, 1000);
	assert_eq!(summary.members[1].user_id, TestUsers::MEMBER);
	assert_eq!(summary.members[1].total_contributed, 500);
	assert_eq!(summary.members[1].contribution_count, 1);

	let err = savings.savings_summary(circle.id, TestUsers::OUTSIDER).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));
}

#[test]
fn user_savings_roll_up_across_groups() {
	let f = Fixture::new();
	let savings = f.savings();
	let street = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);
	let village = f.group_with_member(4, TestUsers::MEMBER, 1000);

	savings.contribute(street.id, TestUsers::MEMBER, "cash").unwrap();
	savings.contribute(village.id, TestUsers::MEMBER, "cash").unwrap();
	savings.contribute(village.id, TestUsers::MEMBER, "cash").unwrap();

	let rollup = savings.user_savings(TestUsers::MEMBER).unwrap();
	assert_eq!(rollup.total_savings, 2500);
	assert_eq!(rollup.groups_contributed_to, 2);
	assert_eq!(rollup.total_contributions, 3);

	assert_eq!(rollup.groups.len(), 2);
	assert_eq!(rollup.groups[0].group_id, village.id);
	assert_eq!(rollup.groups[0].total_contributed, 2000);
	assert_eq!(rollup.groups[0].contribution_count, 2);
	assert_eq!(rollup.groups[0].expected_amount, 1000);
	assert_eq!(rollup.groups[0].current_balance, 2000);
	assert_eq!(rollup.groups[1].group_id, street.id);
	assert_eq!(rollup.groups[1].total_contributed, 500);

	// a member who never paid in still shows their groups, zeroed
	let idle = savings.user_savings(TestUsers::LEADER).unwrap();
	assert_eq!(idle.total_savings, 0);
	assert_eq!(idle.groups_contributed_to, 0);
	assert_eq!(idle.groups.len(), 1);
	assert_eq!(idle.groups[0].total_contributed, 0);
}

#[test]
fn upcoming_contributions_project_from_the_last_deposit() {
	let f = Fixture::new();
	let savings = f.savings();
	let street = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);
	let club = f.group_with_frequency(4, TestUsers::MEMBER, 200, SavingsFrequency::Weekly);

	// nothing paid in yet, so both project from now
	let upcoming = savings.upcoming_contributions(TestUsers::MEMBER).unwrap();
	let for_group = |gid: Id| upcoming.iter().find(|u| u.group_id == gid).unwrap();
	assert_eq!(for_group(street.id).last_contribution, None);
	assert_eq!(for_group(street.id).next_due, time(2026, 4, 10));
	assert_eq!(for_group(club.id).frequency, SavingsFrequency::Weekly);
	assert_eq!(for_group(club.id).next_due, time(2026, 3, 17));

	f.clock.set(time(2026, 3, 15));
	savings.contribute(street.id, TestUsers::MEMBER, "cash").unwrap();

	let upcoming = savings.upcoming_contributions(TestUsers::MEMBER).unwrap();
	let street_next = upcoming.iter().find(|u| u.group_id == street.id).unwrap();
	assert_eq!(street_next.last_contribution, Some(time(2026, 3, 15)));
	assert_eq!(street_next.next_due, time(2026, 4, 15));
	assert_eq!(street_next.amount, 500);
	assert_eq!(street_next.current_balance, 500);
}

#[test]
fn concurrent_contributions_all_land() {
	let f = Fixture::new();
	let registry = f.registry();
	let circle = f.group_with_member(TestUsers::LEADER, TestUsers::MEMBER, 500);

	let handles: Vec<_> = (0..2)
		.map(|_| {
			let pool = f.pool.clone();
			let group_id = circle.id;
			std::thread::spawn(move || {
				let clock = SystemClock;
				let notifier = LogNotifier;
				let gateway = UpiGateway;
				let savings = SavingsLedger::new(NewSavingsLedger {
					db: pool.clone(),
					registry: Registry::new(NewRegistry {
						db: pool.clone(),
						clock: &clock,
						notifier: &notifier,
					}),
					clock: &clock,
					gateway: &gateway,
				});
				savings.contribute(group_id, TestUsers::MEMBER, "cash").unwrap();
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap();
	}

	// both writes survive: no lost update, no double count
	let (fresh, members) = registry.group(circle.id, TestUsers::MEMBER).unwrap();
	assert_eq!(fresh.total_savings, 1000);
	let member = members.iter().find(|m| m.user_id == TestUsers::MEMBER).unwrap();
	assert_eq!(member.current_balance, 1000);
}
