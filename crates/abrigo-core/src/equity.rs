//! Read-side equity analytics over the ledger: coverage, per-zone
//! distribution, and most/least-served beneficiaries. Never mutates state
//! and never gates a transaction; the guard only borrows the least-served
//! ranking for its suggestions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use contracts::{
    EquityReport, LeastServedBeneficiary, ServedBeneficiary, ZoneDistribution,
    DEFAULT_REPORT_WINDOW_DAYS, SCHEMA_VERSION_V1,
};

use crate::ledger::StockLedger;
use crate::registry::Registry;

const UNSPECIFIED_ZONE: &str = "unspecified";

/// Beneficiaries ranked by how few exits they received in the trailing
/// 30-day window, optionally narrowed to one category (fuzzy substring
/// match, as the policy table uses). Zero-count beneficiaries rank first;
/// ties break on name so the ranking is deterministic.
pub fn least_served_in_category(
    registry: &Registry,
    ledger: &StockLedger,
    category: Option<&str>,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<LeastServedBeneficiary> {
    let window_start = now - Duration::days(i64::from(DEFAULT_REPORT_WINDOW_DAYS));
    let needle = category.map(str::to_lowercase);

    let mut counts: BTreeMap<&str, u64> = registry
        .beneficiaries()
        .map(|beneficiary| (beneficiary.national_id.as_str(), 0))
        .collect();

    for entry in ledger.entries() {
        let Some(beneficiary_id) = entry.movement.beneficiary_id() else {
            continue;
        };
        if entry.recorded_at < window_start {
            continue;
        }
        if let Some(needle) = &needle {
            let in_category = registry
                .item(entry.item_id)
                .and_then(|item| item.category.as_deref())
                .is_some_and(|category| category.to_lowercase().contains(needle));
            if !in_category {
                continue;
            }
        }
        if let Some(count) = counts.get_mut(beneficiary_id) {
            *count += 1;
        }
    }

    let mut ranked: Vec<LeastServedBeneficiary> = counts
        .into_iter()
        .filter_map(|(national_id, exit_count)| {
            registry
                .beneficiary(national_id)
                .map(|beneficiary| LeastServedBeneficiary {
                    national_id: beneficiary.national_id.clone(),
                    name: beneficiary.name.clone(),
                    zone: beneficiary.zone.clone(),
                    exit_count,
                })
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.exit_count
            .cmp(&b.exit_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(limit);
    ranked
}

/// Coverage and distribution statistics over a trailing window.
pub fn equity_report(
    registry: &Registry,
    ledger: &StockLedger,
    window_days: u32,
    top_n: usize,
    now: DateTime<Utc>,
) -> EquityReport {
    let window_start = now - Duration::days(i64::from(window_days));

    let mut per_beneficiary: BTreeMap<&str, u64> = registry
        .beneficiaries()
        .map(|beneficiary| (beneficiary.national_id.as_str(), 0))
        .collect();
    let mut by_zone: BTreeMap<String, u64> = BTreeMap::new();

    for entry in ledger.entries() {
        let Some(beneficiary_id) = entry.movement.beneficiary_id() else {
            continue;
        };
        if entry.recorded_at < window_start {
            continue;
        }
        let Some(beneficiary) = registry.beneficiary(beneficiary_id) else {
            continue;
        };
        if let Some(count) = per_beneficiary.get_mut(beneficiary_id) {
            *count += 1;
        }
        let zone = beneficiary
            .zone
            .clone()
            .unwrap_or_else(|| UNSPECIFIED_ZONE.to_string());
        *by_zone.entry(zone).or_insert(0) += 1;
    }

    let total_beneficiaries = per_beneficiary.len() as u64;
    let beneficiaries_served = per_beneficiary.values().filter(|count| **count > 0).count() as u64;
    let coverage_percent = if total_beneficiaries == 0 {
        0.0
    } else {
        let ratio = beneficiaries_served as f64 / total_beneficiaries as f64;
        (ratio * 1000.0).round() / 10.0
    };

    let mut served: Vec<ServedBeneficiary> = per_beneficiary
        .into_iter()
        .filter_map(|(national_id, exit_count)| {
            registry
                .beneficiary(national_id)
                .map(|beneficiary| ServedBeneficiary {
                    national_id: beneficiary.national_id.clone(),
                    name: beneficiary.name.clone(),
                    exit_count,
                })
        })
        .collect();

    let mut top_served = served.clone();
    top_served.sort_by(|a, b| {
        b.exit_count
            .cmp(&a.exit_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    top_served.truncate(top_n);

    served.sort_by(|a, b| {
        a.exit_count
            .cmp(&b.exit_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    served.truncate(top_n);

    EquityReport {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        window_days,
        total_beneficiaries,
        beneficiaries_served,
        coverage_percent,
        by_zone: by_zone
            .into_iter()
            .map(|(zone, exit_count)| ZoneDistribution { zone, exit_count })
            .collect(),
        top_served,
        least_served: served,
    }
}
