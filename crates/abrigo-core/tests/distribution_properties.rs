use abrigo_core::ledger;
use abrigo_core::AidNetwork;
use chrono::{DateTime, Duration, TimeZone, Utc};
use contracts::{
    Attribution, DistributionError, EntryRequest, ExitOutcome, ExitRequest, MovementKind,
    NewBeneficiary, NewStockItem, PolicyConfig,
};
use proptest::prelude::*;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

fn seeded_network() -> (AidNetwork, i64, i64) {
    let mut network = AidNetwork::new(PolicyConfig::default());
    let institution = network.bootstrap_administrative(
        "Civil Protection",
        "admin",
        "admin@gov.cv",
        "Duty Officer",
        base_time(),
    );
    let item = network
        .add_item(
            &NewStockItem {
                name: "Rice".to_string(),
                description: None,
                unit: "kg".to_string(),
                category: Some("food".to_string()),
            },
            base_time(),
        )
        .expect("item")
        .id;
    network
        .register_beneficiary(
            &NewBeneficiary {
                national_id: "111".to_string(),
                name: "Maria".to_string(),
                ..NewBeneficiary::default()
            },
            Some(institution),
            base_time(),
        )
        .expect("beneficiary");
    (network, institution, item)
}

#[derive(Debug, Clone)]
enum Op {
    Entry(u16),
    Exit(u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u16..=50).prop_map(Op::Entry),
        (1u16..=50).prop_map(Op::Exit),
    ]
}

proptest! {
    /// Ledger conservation: after any committed sequence, the on-hand figure
    /// equals entries minus exits replayed over the full history.
    #[test]
    fn property_1_on_hand_equals_entry_sum_minus_exit_sum(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut network, institution, item) = seeded_network();
        let mut at = base_time();

        for op in &ops {
            at += Duration::minutes(1);
            match op {
                Op::Entry(quantity) => {
                    network
                        .register_entry(
                            &EntryRequest {
                                item_id: item,
                                quantity: f64::from(*quantity),
                                institution_id: institution,
                                donation_source: None,
                                reason: None,
                                observations: None,
                            },
                            at,
                        )
                        .expect("entries always commit");
                }
                Op::Exit(quantity) => {
                    // Forced, so advisories never mask the stock check; the
                    // engine may still reject on insufficient stock.
                    let _ = network.request_exit(
                        &ExitRequest {
                            item_id: item,
                            quantity: f64::from(*quantity),
                            beneficiary_id: "111".to_string(),
                            institution_id: institution,
                            force: true,
                            delivery_location: None,
                            reason: None,
                            observations: None,
                        },
                        at,
                    );
                }
            }

            let expected: f64 = network
                .ledger
                .entries()
                .iter()
                .filter(|entry| entry.item_id == item)
                .map(|entry| {
                    if entry.movement.is_exit() {
                        -entry.quantity
                    } else {
                        entry.quantity
                    }
                })
                .sum();
            let on_hand = ledger::total_on_hand(network.ledger.entries(), item);
            prop_assert_eq!(on_hand, expected);
        }
    }

    /// No overdraw: whatever the sequence, committed exits never exceed
    /// committed entries and the global on-hand never goes negative.
    #[test]
    fn property_2_global_on_hand_never_goes_negative(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut network, institution, item) = seeded_network();
        let mut at = base_time();

        for op in &ops {
            at += Duration::minutes(1);
            match op {
                Op::Entry(quantity) => {
                    network
                        .register_entry(
                            &EntryRequest {
                                item_id: item,
                                quantity: f64::from(*quantity),
                                institution_id: institution,
                                donation_source: None,
                                reason: None,
                                observations: None,
                            },
                            at,
                        )
                        .expect("entries always commit");
                }
                Op::Exit(quantity) => {
                    let before = ledger::total_on_hand(network.ledger.entries(), item);
                    let result = network.request_exit(
                        &ExitRequest {
                            item_id: item,
                            quantity: f64::from(*quantity),
                            beneficiary_id: "111".to_string(),
                            institution_id: institution,
                            force: true,
                            delivery_location: None,
                            reason: None,
                            observations: None,
                        },
                        at,
                    );
                    match result {
                        Ok(outcome) => prop_assert!(outcome.is_committed()),
                        Err(DistributionError::InsufficientStock { on_hand, shortfall, .. }) => {
                            prop_assert_eq!(on_hand, before);
                            prop_assert!(shortfall > 0.0);
                        }
                        Err(other) => return Err(TestCaseError::fail(format!("unexpected error {other}"))),
                    }
                }
            }
            prop_assert!(ledger::total_on_hand(network.ledger.entries(), item) >= 0.0);
        }
    }

    /// Idempotent advisory replay: identical inputs with no intervening
    /// writes give identical alerts and suggestions.
    #[test]
    fn property_3_evaluation_replay_is_idempotent(
        ops in prop::collection::vec(op_strategy(), 0..25),
        quantity in 1u16..=30,
    ) {
        let (mut network, institution, item) = seeded_network();
        let mut at = base_time();
        for op in &ops {
            at += Duration::minutes(1);
            match op {
                Op::Entry(q) => {
                    let _ = network.register_entry(
                        &EntryRequest {
                            item_id: item,
                            quantity: f64::from(*q),
                            institution_id: institution,
                            donation_source: None,
                            reason: None,
                            observations: None,
                        },
                        at,
                    );
                }
                Op::Exit(q) => {
                    let _ = network.request_exit(
                        &ExitRequest {
                            item_id: item,
                            quantity: f64::from(*q),
                            beneficiary_id: "111".to_string(),
                            institution_id: institution,
                            force: true,
                            delivery_location: None,
                            reason: None,
                            observations: None,
                        },
                        at,
                    );
                }
            }
        }

        let probe = at + Duration::hours(1);
        let first = network.evaluate_distribution("111", item, f64::from(quantity), probe);
        let second = network.evaluate_distribution("111", item, f64::from(quantity), probe);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn property_4_redacted_history_carries_no_free_text_keys() {
    let (mut network, institution, item) = seeded_network();
    let other = network.bootstrap_administrative(
        "Red Cross",
        "redcross",
        "office@redcross.cv",
        "Coordinator",
        base_time(),
    );
    network
        .register_entry(
            &EntryRequest {
                item_id: item,
                quantity: 20.0,
                institution_id: institution,
                donation_source: None,
                reason: None,
                observations: None,
            },
            base_time(),
        )
        .expect("entry commits");
    let outcome = network
        .request_exit(
            &ExitRequest {
                item_id: item,
                quantity: 2.0,
                beneficiary_id: "111".to_string(),
                institution_id: institution,
                force: true,
                delivery_location: Some("school gym".to_string()),
                reason: Some("storm relief".to_string()),
                observations: Some("household of five".to_string()),
            },
            base_time() + Duration::hours(1),
        )
        .expect("exit commits");
    assert!(matches!(outcome, ExitOutcome::Committed { .. }));

    let result = network
        .lookup_beneficiary("111", other, base_time() + Duration::hours(2))
        .expect("beneficiary resolves");
    assert_eq!(result.total_others, 1);

    let serialized = serde_json::to_value(&result.others).expect("serialize");
    for row in serialized.as_array().expect("array") {
        let object = row.as_object().expect("object");
        assert!(!object.contains_key("reason"));
        assert!(!object.contains_key("observations"));
        assert!(!object.contains_key("delivery_location"));
        assert!(object.contains_key("item_name"));
        assert!(object.contains_key("quantity"));
        assert!(object.contains_key("institution_name"));
    }
}

#[test]
fn property_5_orphan_reassignment_preserves_row_and_beneficiary_counts() {
    let (mut network, admin, item) = seeded_network();
    let doomed = network.bootstrap_administrative(
        "Closing Mission",
        "mission",
        "mission@relief.cv",
        "Coordinator",
        base_time(),
    );
    network
        .register_entry(
            &EntryRequest {
                item_id: item,
                quantity: 50.0,
                institution_id: admin,
                donation_source: None,
                reason: None,
                observations: None,
            },
            base_time(),
        )
        .expect("entry commits");

    for i in 0..3i64 {
        network
            .register_beneficiary(
                &NewBeneficiary {
                    national_id: format!("90{i}"),
                    name: format!("Beneficiary {i}"),
                    ..NewBeneficiary::default()
                },
                Some(doomed),
                base_time(),
            )
            .expect("beneficiary");
        network
            .request_exit(
                &ExitRequest {
                    item_id: item,
                    quantity: 1.0,
                    beneficiary_id: format!("90{i}"),
                    institution_id: doomed,
                    force: true,
                    delivery_location: None,
                    reason: None,
                    observations: None,
                },
                base_time() + Duration::minutes(i),
            )
            .expect("exit commits");
    }

    let rows_before = network.ledger.len();
    let beneficiaries_before = network.registry.beneficiary_count();

    let removal = network
        .remove_institution(doomed)
        .expect("removal accepted");
    assert_eq!(removal.orphaned_entries, 3);
    assert_eq!(removal.reassigned_beneficiaries, 3);

    assert_eq!(network.ledger.len(), rows_before);
    assert_eq!(network.registry.beneficiary_count(), beneficiaries_before);
    for i in 0..3 {
        assert_eq!(
            network
                .registry
                .beneficiary(&format!("90{i}"))
                .expect("kept")
                .registered_by,
            Some(admin)
        );
    }
    let orphaned = network
        .ledger
        .entries()
        .iter()
        .filter(|entry| entry.attribution == Attribution::Orphaned)
        .count();
    assert_eq!(orphaned, 3);
    assert!(network
        .ledger
        .entries()
        .iter()
        .filter(|entry| matches!(entry.movement, MovementKind::Entry { .. }))
        .all(|entry| entry.attribution == Attribution::Institution { id: admin }));
}
