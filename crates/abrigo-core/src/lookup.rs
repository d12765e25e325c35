//! Cross-tenant beneficiary lookup.
//!
//! A beneficiary record is visible to every institution — duplicate
//! prevention requires global visibility — but movement detail is
//! partitioned: the requesting institution sees its own records in full,
//! everyone else's only as redacted rows. The redacted shape carries no
//! reason, observations or delivery location by construction.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use contracts::{
    InstitutionId, InstitutionRef, LedgerEntry, LookupResult, RedactedMovement,
    SCHEMA_VERSION_V1, SHORT_INTERVAL_DAYS,
};

use crate::ledger::{exits_for_beneficiary, StockLedger};
use crate::registry::Registry;

/// Resolves a beneficiary by national id for one requesting institution.
/// Returns `None` when the id is unknown anywhere in the system.
pub fn resolve(
    registry: &Registry,
    ledger: &StockLedger,
    national_id: &str,
    requesting_institution: InstitutionId,
    now: DateTime<Utc>,
) -> Option<LookupResult> {
    let beneficiary = registry.beneficiary(national_id)?.clone();

    let mut exits: Vec<&LedgerEntry> = exits_for_beneficiary(ledger.entries(), national_id).collect();
    exits.sort_by(|a, b| {
        b.recorded_at
            .cmp(&a.recorded_at)
            .then_with(|| b.entry_id.cmp(&a.entry_id))
    });

    let mut mine = Vec::new();
    let mut others = Vec::new();
    let mut helping_institutions = BTreeSet::new();

    for entry in &exits {
        if let Some(id) = entry.attribution.institution_id() {
            if let Some(institution) = registry.institution(id) {
                helping_institutions.insert(institution.name.clone());
            }
        }

        if entry.attribution.is_institution(requesting_institution) {
            mine.push((*entry).clone());
        } else {
            let institution = entry
                .attribution
                .institution_id()
                .and_then(|id| registry.institution(id));
            others.push(RedactedMovement {
                recorded_at: entry.recorded_at,
                item_name: registry
                    .item(entry.item_id)
                    .map(|item| item.name.clone())
                    .unwrap_or_else(|| format!("item {}", entry.item_id)),
                quantity: entry.quantity,
                institution_name: institution.map(|i| i.name.clone()),
                institution_kind: institution.map(|i| i.kind),
            });
        }
    }

    let warnings = build_warnings(registry, &exits, requesting_institution, now);

    let registered_by = beneficiary
        .registered_by
        .and_then(|id| registry.institution(id))
        .map(|institution| InstitutionRef {
            name: institution.name.clone(),
            kind: institution.kind,
        });

    Some(LookupResult {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        beneficiary,
        registered_by,
        total_mine: mine.len(),
        total_others: others.len(),
        mine,
        others,
        helping_institutions: helping_institutions.into_iter().collect(),
        warnings,
    })
}

/// Fraud-relevant warnings over the full exit history: recent help from any
/// institution, and separately whether the requester itself already helped
/// this week.
fn build_warnings(
    registry: &Registry,
    exits: &[&LedgerEntry],
    requesting_institution: InstitutionId,
    now: DateTime<Utc>,
) -> Vec<String> {
    let cutoff = now - Duration::days(SHORT_INTERVAL_DAYS);
    let recent: Vec<&&LedgerEntry> = exits
        .iter()
        .filter(|entry| entry.recorded_at >= cutoff)
        .collect();

    let mut warnings = Vec::new();
    if !recent.is_empty() {
        let names: BTreeSet<String> = recent
            .iter()
            .filter_map(|entry| entry.attribution.institution_id())
            .filter_map(|id| registry.institution(id))
            .map(|institution| institution.name.clone())
            .collect();
        let source = if names.is_empty() {
            "institutions no longer registered".to_string()
        } else {
            names.into_iter().collect::<Vec<_>>().join(", ")
        };
        warnings.push(format!(
            "received {} hand-out(s) in the last {SHORT_INTERVAL_DAYS} days from: {source}",
            recent.len(),
        ));
    }

    let own_recent = recent
        .iter()
        .filter(|entry| entry.attribution.is_institution(requesting_institution))
        .count();
    if own_recent > 0 {
        warnings.push(format!(
            "this institution already helped this beneficiary {own_recent} time(s) in the last week",
        ));
    }

    warnings
}
