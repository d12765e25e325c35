//! Append-only stock ledger and on-hand aggregation.
//!
//! The ledger is the only source of truth for quantities. On-hand figures are
//! pure functions of an entry slice so they can be tested in isolation from
//! any persistence.

use chrono::{DateTime, Utc};
use contracts::{
    Attribution, DistributionError, EntryAnnotation, EntryId, InstitutionId, ItemId, LedgerEntry,
    MovementKind, SCHEMA_VERSION_V1,
};

#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    entries: Vec<LedgerEntry>,
    next_entry_id: EntryId,
}

impl StockLedger {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_entry_id: 1,
        }
    }

    /// Rebuilds a ledger from persisted rows, which must be in append order.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let next_entry_id = entries
            .iter()
            .map(|entry| entry.entry_id)
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            entries,
            next_entry_id,
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, entry_id: EntryId) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.entry_id == entry_id)
    }

    /// Appends one movement. The caller validates the quantity; the ledger
    /// itself only guards the append-only discipline.
    pub fn append(
        &mut self,
        item_id: ItemId,
        attribution: Attribution,
        movement: MovementKind,
        quantity: f64,
        recorded_at: DateTime<Utc>,
        reason: Option<String>,
        observations: Option<String>,
    ) -> &LedgerEntry {
        debug_assert!(quantity > 0.0, "ledger quantities are strictly positive");
        let entry = LedgerEntry {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            entry_id: self.next_entry_id,
            item_id,
            attribution,
            movement,
            quantity,
            recorded_at,
            reason,
            observations,
        };
        self.next_entry_id += 1;
        self.entries.push(entry);
        self.entries.last().expect("entry just appended")
    }

    /// Updates the free-text fields of an entry owned by `institution_id`.
    /// Direction, quantity and references are immutable; direction-specific
    /// metadata only applies to the matching direction.
    pub fn annotate(
        &mut self,
        entry_id: EntryId,
        institution_id: InstitutionId,
        annotation: &EntryAnnotation,
    ) -> Result<&LedgerEntry, DistributionError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.entry_id == entry_id)
            .ok_or(DistributionError::EntryNotFound(entry_id))?;

        if !entry.attribution.is_institution(institution_id) {
            return Err(DistributionError::ForeignEntry(entry_id));
        }

        if let Some(reason) = &annotation.reason {
            entry.reason = Some(reason.clone());
        }
        if let Some(observations) = &annotation.observations {
            entry.observations = Some(observations.clone());
        }
        match &mut entry.movement {
            MovementKind::Entry { donation_source } => {
                if let Some(source) = &annotation.donation_source {
                    *donation_source = Some(source.clone());
                }
            }
            MovementKind::Exit {
                delivery_location, ..
            } => {
                if let Some(location) = &annotation.delivery_location {
                    *delivery_location = Some(location.clone());
                }
            }
        }

        Ok(entry)
    }

    /// Flips every entry attributed to `institution_id` to `Orphaned` and
    /// returns how many were touched. Rows are kept; only attribution changes.
    pub fn orphan_institution(&mut self, institution_id: InstitutionId) -> u64 {
        let mut orphaned = 0;
        for entry in &mut self.entries {
            if entry.attribution.is_institution(institution_id) {
                entry.attribution = Attribution::Orphaned;
                orphaned += 1;
            }
        }
        orphaned
    }

    /// Removes the most recent entry if it matches `entry_id`. This exists
    /// solely as compensation for a failed persistence flush, so memory and
    /// store never diverge; the ledger is append-only in normal operation.
    pub fn revoke_last(&mut self, entry_id: EntryId) -> bool {
        if self.entries.last().map(|entry| entry.entry_id) == Some(entry_id) {
            self.entries.pop();
            true
        } else {
            false
        }
    }
}

fn signed_quantity(entry: &LedgerEntry) -> f64 {
    if entry.movement.is_exit() {
        -entry.quantity
    } else {
        entry.quantity
    }
}

/// Global on-hand for an item: entries minus exits over every institution.
pub fn total_on_hand(entries: &[LedgerEntry], item_id: ItemId) -> f64 {
    entries
        .iter()
        .filter(|entry| entry.item_id == item_id)
        .map(signed_quantity)
        .sum()
}

/// Per-institution on-hand. Institutions draw from a shared pool, so this
/// figure can legitimately go negative.
pub fn on_hand_for_institution(
    entries: &[LedgerEntry],
    item_id: ItemId,
    institution_id: InstitutionId,
) -> f64 {
    entries
        .iter()
        .filter(|entry| {
            entry.item_id == item_id && entry.attribution.is_institution(institution_id)
        })
        .map(signed_quantity)
        .sum()
}

/// All exits handed to one beneficiary, in ledger order.
pub fn exits_for_beneficiary<'a>(
    entries: &'a [LedgerEntry],
    national_id: &'a str,
) -> impl Iterator<Item = &'a LedgerEntry> {
    entries
        .iter()
        .filter(move |entry| entry.movement.beneficiary_id() == Some(national_id))
}
