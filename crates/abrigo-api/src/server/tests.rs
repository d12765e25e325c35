use super::*;

use chrono::TimeZone;
use contracts::{DistributionError, ExitOutcome, PolicyConfig};

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

fn temp_sqlite(tag: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "abrigo_server_{tag}_{}.sqlite",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn pagination_enforces_bounds() {
    let (start, end, next_cursor) = paginate(100, Some(10), Some(20)).expect("page works");
    assert_eq!(start, 10);
    assert_eq!(end, 30);
    assert_eq!(next_cursor, Some(30));

    let (_, end, next_cursor) = paginate(25, Some(10), Some(20)).expect("short tail");
    assert_eq!(end, 25);
    assert_eq!(next_cursor, None);

    assert!(paginate(5, Some(10), Some(1)).is_err());
    assert!(paginate(5, None, Some(0)).is_err());
}

#[test]
fn distribution_errors_map_to_expected_status_codes() {
    let cases = [
        (
            DistributionError::ItemNotFound(9),
            StatusCode::NOT_FOUND,
        ),
        (
            DistributionError::InvalidQuantity(-1.0),
            StatusCode::BAD_REQUEST,
        ),
        (
            DistributionError::InsufficientStock {
                item_name: "Rice".to_string(),
                unit: "kg".to_string(),
                requested: 35.0,
                on_hand: 30.0,
                shortfall: 5.0,
            },
            StatusCode::BAD_REQUEST,
        ),
        (
            DistributionError::DuplicateUsername("caritas".to_string()),
            StatusCode::CONFLICT,
        ),
    ];
    for (err, expected) in cases {
        let mapped = HttpApiError::from(&err);
        assert_eq!(mapped.status, expected, "for {err}");
        assert_eq!(mapped.error.error_code, err.error_code());
    }
}

#[test]
fn insufficient_stock_message_carries_the_shortfall() {
    let err = DistributionError::InsufficientStock {
        item_name: "Rice".to_string(),
        unit: "kg".to_string(),
        requested: 35.0,
        on_hand: 30.0,
        shortfall: 5.0,
    };
    let mapped = HttpApiError::from(&err);
    assert!(mapped.error.message.contains("short 5 kg"));
    assert!(mapped.error.message.contains("available 30 kg"));
}

#[test]
fn facade_persists_and_reloads_the_aggregate() {
    let path = temp_sqlite("reload");
    let caritas;
    let rice;

    {
        let mut api = ReliefApi::new(PolicyConfig::default());
        api.attach_sqlite_store(&path).expect("store attaches");
        caritas = api
            .bootstrap_administrative(
                "Caritas",
                "caritas",
                "caritas@relief.cv",
                "Director",
                fixed_now(),
            )
            .expect("bootstrap persists");
        rice = api
            .add_item(
                &contracts::NewStockItem {
                    name: "Rice".to_string(),
                    description: None,
                    unit: "kg".to_string(),
                    category: Some("food".to_string()),
                },
                fixed_now(),
            )
            .expect("item persists")
            .id;
        api.register_beneficiary(
            &contracts::NewBeneficiary {
                national_id: "111".to_string(),
                name: "Maria".to_string(),
                ..contracts::NewBeneficiary::default()
            },
            Some(caritas),
            fixed_now(),
        )
        .expect("beneficiary persists");
        api.register_entry(
            &EntryRequest {
                item_id: rice,
                quantity: 30.0,
                institution_id: caritas,
                donation_source: Some("food bank".to_string()),
                reason: None,
                observations: None,
            },
            fixed_now(),
        )
        .expect("entry persists");
        let outcome = api
            .request_exit(
                &ExitRequest {
                    item_id: rice,
                    quantity: 5.0,
                    beneficiary_id: "111".to_string(),
                    institution_id: caritas,
                    force: false,
                    delivery_location: None,
                    reason: None,
                    observations: None,
                },
                fixed_now(),
            )
            .expect("exit commits");
        assert!(matches!(outcome, ExitOutcome::Committed { .. }));
    }

    let mut reloaded = ReliefApi::new(PolicyConfig::default());
    reloaded.attach_sqlite_store(&path).expect("store reattaches");

    assert_eq!(
        reloaded.on_hand(rice, None).expect("item known after reload"),
        25.0
    );
    assert_eq!(
        reloaded
            .on_hand(rice, Some(caritas))
            .expect("institution-scoped figure"),
        25.0
    );
    let lookup = reloaded
        .lookup_beneficiary("111", caritas, fixed_now())
        .expect("beneficiary reloads");
    assert_eq!(lookup.total_mine, 1);
    assert_eq!(lookup.beneficiary.name, "Maria");

    // New writes continue the persisted id sequence.
    let entry = reloaded
        .register_entry(
            &EntryRequest {
                item_id: rice,
                quantity: 1.0,
                institution_id: caritas,
                donation_source: None,
                reason: None,
                observations: None,
            },
            fixed_now(),
        )
        .expect("entry after reload");
    assert_eq!(entry.entry_id, 3);
}

#[test]
fn advisory_outcomes_write_nothing_through_the_facade() {
    let path = temp_sqlite("advisory");
    let mut api = ReliefApi::new(PolicyConfig::default());
    api.attach_sqlite_store(&path).expect("store attaches");
    let caritas = api
        .bootstrap_administrative(
            "Caritas",
            "caritas",
            "caritas@relief.cv",
            "Director",
            fixed_now(),
        )
        .expect("bootstrap");
    let rice = api
        .add_item(
            &contracts::NewStockItem {
                name: "Rice".to_string(),
                description: None,
                unit: "kg".to_string(),
                category: Some("food".to_string()),
            },
            fixed_now(),
        )
        .expect("item")
        .id;
    api.register_beneficiary(
        &contracts::NewBeneficiary {
            national_id: "111".to_string(),
            name: "Maria".to_string(),
            ..contracts::NewBeneficiary::default()
        },
        Some(caritas),
        fixed_now(),
    )
    .expect("beneficiary");
    api.register_entry(
        &EntryRequest {
            item_id: rice,
            quantity: 100.0,
            institution_id: caritas,
            donation_source: None,
            reason: None,
            observations: None,
        },
        fixed_now(),
    )
    .expect("entry");

    // 12 kg at once exceeds the 10 kg / 30 day rice cap.
    let outcome = api
        .request_exit(
            &ExitRequest {
                item_id: rice,
                quantity: 12.0,
                beneficiary_id: "111".to_string(),
                institution_id: caritas,
                force: false,
                delivery_location: None,
                reason: None,
                observations: None,
            },
            fixed_now(),
        )
        .expect("advisory outcome");
    assert!(matches!(
        outcome,
        ExitOutcome::RequiresConfirmation { .. }
    ));

    let mut reloaded = ReliefApi::new(PolicyConfig::default());
    reloaded.attach_sqlite_store(&path).expect("reattach");
    assert_eq!(reloaded.on_hand(rice, None).expect("on hand"), 100.0);
}
