use super::*;

use contracts::{LedgerEntry, MovementFilter};
use serde_json::{json, Value};

impl AidNetwork {
    /// An institution's own movements, newest first, with optional direction,
    /// item and date filters. Pagination is the caller's concern.
    pub fn movements_for_institution(
        &self,
        institution_id: InstitutionId,
        filter: &MovementFilter,
    ) -> Vec<&LedgerEntry> {
        let mut movements: Vec<&LedgerEntry> = self
            .ledger
            .entries()
            .iter()
            .filter(|entry| entry.attribution.is_institution(institution_id))
            .filter(|entry| match filter.direction {
                Some(direction) => entry.movement.direction() == direction,
                None => true,
            })
            .filter(|entry| match filter.item_id {
                Some(item_id) => entry.item_id == item_id,
                None => true,
            })
            .filter(|entry| match filter.from {
                Some(from) => entry.recorded_at >= from,
                None => true,
            })
            .filter(|entry| match filter.to {
                Some(to) => entry.recorded_at < to,
                None => true,
            })
            .collect();
        movements.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| b.entry_id.cmp(&a.entry_id))
        });
        movements
    }

    /// Stock summary for one institution's dashboard: per-item global
    /// on-hand next to the institution's own entered/exited totals. Items
    /// with no movement anywhere are skipped.
    pub fn stock_overview(&self, institution_id: InstitutionId) -> Value {
        let mut items = Vec::new();
        let mut total_entered = 0.0;
        let mut total_exited = 0.0;

        for item in self.registry.active_items(None, None) {
            let global = ledger::total_on_hand(self.ledger.entries(), item.id);
            let own_balance =
                ledger::on_hand_for_institution(self.ledger.entries(), item.id, institution_id);
            let (entered, exited) = self
                .ledger
                .entries()
                .iter()
                .filter(|entry| {
                    entry.item_id == item.id && entry.attribution.is_institution(institution_id)
                })
                .fold((0.0, 0.0), |(entered, exited), entry| {
                    if entry.movement.is_exit() {
                        (entered, exited + entry.quantity)
                    } else {
                        (entered + entry.quantity, exited)
                    }
                });
            total_entered += entered;
            total_exited += exited;

            if global != 0.0 || own_balance != 0.0 || entered != 0.0 || exited != 0.0 {
                items.push(json!({
                    "item_id": item.id,
                    "name": item.name,
                    "unit": item.unit,
                    "category": item.category,
                    "on_hand_global": global,
                    "on_hand_institution": own_balance,
                    "entered_by_institution": entered,
                    "exited_by_institution": exited,
                }));
            }
        }

        json!({
            "items": items,
            "totals": {
                "entered": total_entered,
                "exited": total_exited,
            },
        })
    }
}
