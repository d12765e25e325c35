//! Duplicate-aid guard: category caps over rolling windows plus frequency
//! heuristics. Everything here is advisory by design — in a humanitarian
//! context a human can always override with explicit confirmation, so the
//! guard reports and suggests but never blocks on its own.

use chrono::{DateTime, Duration, Utc};
use contracts::{
    EvaluationReport, ItemId, PolicyConfig, FREQUENT_DISTRIBUTION_THRESHOLD, SHORT_INTERVAL_DAYS,
};

use crate::equity;
use crate::ledger::{exits_for_beneficiary, StockLedger};
use crate::registry::Registry;

const SUGGESTED_ALTERNATES: usize = 3;

/// Evaluates a prospective hand-out against the category policy and the
/// beneficiary's recent history. Unknown item or beneficiary yields a
/// not-found report rather than an error; an item outside every configured
/// category is allowed by default.
pub fn evaluate(
    registry: &Registry,
    ledger: &StockLedger,
    config: &PolicyConfig,
    beneficiary_id: &str,
    item_id: ItemId,
    proposed_quantity: f64,
    now: DateTime<Utc>,
) -> EvaluationReport {
    let (Some(item), Some(beneficiary)) =
        (registry.item(item_id), registry.beneficiary(beneficiary_id))
    else {
        return EvaluationReport {
            can_distribute: false,
            alerts: vec!["item or beneficiary not found".to_string()],
            suggestions: Vec::new(),
        };
    };

    let mut report = EvaluationReport::allow();

    let Some((category_key, category_policy)) = item
        .category
        .as_deref()
        .and_then(|category| config.category_for(category))
    else {
        return report;
    };

    let unit = item.unit.as_str();
    let window_days = category_policy.window_days;
    let window_start = now - Duration::days(i64::from(window_days));
    let received: f64 = exits_for_beneficiary(ledger.entries(), beneficiary_id)
        .filter(|entry| entry.item_id == item_id && entry.recorded_at >= window_start)
        .map(|entry| entry.quantity)
        .sum();
    let projected = received + proposed_quantity;

    if let Some(cap) = PolicyConfig::cap_for(category_policy, &item.name) {
        if projected > cap {
            report.alerts.push(format!(
                "{} already received {received}{unit} of {} in the last {window_days} days; \
                 this hand-out of {proposed_quantity}{unit} would total {projected}{unit}, \
                 exceeding the recommended limit of {cap}{unit}",
                beneficiary.name, item.name,
            ));

            let remainder = cap - received;
            if remainder > 0.0 {
                report.suggestions.push(format!(
                    "distribute at most {remainder}{unit} of {} to stay within the limit",
                    item.name,
                ));
            } else {
                report.suggestions.push(format!(
                    "consider another {category_key} item, or wait a few days before a new hand-out",
                ));
            }
        }
    }

    let short_window_start = now - Duration::days(SHORT_INTERVAL_DAYS);
    let same_item_recent = exits_for_beneficiary(ledger.entries(), beneficiary_id)
        .filter(|entry| entry.item_id == item_id && entry.recorded_at >= short_window_start)
        .count();
    if same_item_recent > 0 {
        report.alerts.push(format!(
            "{} already received {} in the last {SHORT_INTERVAL_DAYS} days; \
             confirm the repeat hand-out is really necessary",
            beneficiary.name, item.name,
        ));
    }

    let total_recent = exits_for_beneficiary(ledger.entries(), beneficiary_id)
        .filter(|entry| entry.recorded_at >= short_window_start)
        .count();
    if total_recent >= FREQUENT_DISTRIBUTION_THRESHOLD {
        report.alerts.push(format!(
            "{} received {total_recent} hand-outs in the last {SHORT_INTERVAL_DAYS} days; \
             consider prioritizing other beneficiaries",
            beneficiary.name,
        ));
    }

    let least_served =
        equity::least_served_in_category(registry, ledger, Some(category_key), 5, now);
    let alternates: Vec<&str> = least_served
        .iter()
        .filter(|candidate| candidate.national_id != beneficiary_id)
        .take(SUGGESTED_ALTERNATES)
        .map(|candidate| candidate.name.as_str())
        .collect();
    if !alternates.is_empty() {
        report.suggestions.push(format!(
            "consider prioritizing {} (fewest {category_key} hand-outs in the last 30 days)",
            alternates.join(", "),
        ));
    }

    report
}
