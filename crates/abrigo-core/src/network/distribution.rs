use super::*;

use contracts::{
    Attribution, BeneficiarySummary, EntryAnnotation, EntryId, EntryRequest, ExitOutcome,
    ExitRequest, ItemSummary, LedgerEntry, MovementKind,
};

impl AidNetwork {
    /// One distribution attempt: validate → stock check → policy check →
    /// either ask for confirmation or commit exactly one exit entry.
    ///
    /// Nothing is written before the final append, and the append itself is
    /// a single operation, so any failure leaves the ledger untouched.
    /// `RequiresConfirmation` carries no server-side pending state: the
    /// caller re-submits the full request with `force = true` and every
    /// check runs again against current data.
    pub fn request_exit(
        &mut self,
        request: &ExitRequest,
        now: DateTime<Utc>,
    ) -> Result<ExitOutcome, DistributionError> {
        // VALIDATING
        if !(request.quantity > 0.0) {
            return Err(DistributionError::InvalidQuantity(request.quantity));
        }
        let item = self
            .registry
            .item(request.item_id)
            .cloned()
            .ok_or(DistributionError::ItemNotFound(request.item_id))?;
        if self.registry.institution(request.institution_id).is_none() {
            return Err(DistributionError::InstitutionNotFound(
                request.institution_id,
            ));
        }
        // Exits never create beneficiaries implicitly.
        let lookup = self
            .lookup_beneficiary(&request.beneficiary_id, request.institution_id, now)
            .ok_or_else(|| DistributionError::BeneficiaryNotFound(request.beneficiary_id.clone()))?;

        // STOCK_CHECKED — the gate is the global pool, not the requester's
        // own balance.
        let on_hand = ledger::total_on_hand(self.ledger.entries(), item.id);
        if on_hand < request.quantity {
            return Err(DistributionError::InsufficientStock {
                item_name: item.name,
                unit: item.unit,
                requested: request.quantity,
                on_hand,
                shortfall: request.quantity - on_hand,
            });
        }

        // POLICY_CHECKED — guard alerts and cross-tenant warnings merge into
        // one advisory list.
        let evaluation = self.evaluate_distribution(
            &request.beneficiary_id,
            request.item_id,
            request.quantity,
            now,
        );
        let mut alerts = evaluation.alerts;
        alerts.extend(lookup.warnings.iter().cloned());
        let suggestions = evaluation.suggestions;

        if !alerts.is_empty() && !request.force {
            return Ok(ExitOutcome::RequiresConfirmation {
                alerts,
                suggestions,
                beneficiary: BeneficiarySummary {
                    national_id: lookup.beneficiary.national_id.clone(),
                    name: lookup.beneficiary.name.clone(),
                    zone: lookup.beneficiary.zone.clone(),
                },
                item: ItemSummary {
                    item_id: item.id,
                    name: item.name,
                    unit: item.unit,
                },
                requested_quantity: request.quantity,
            });
        }

        // COMMITTED
        let entry = self
            .ledger
            .append(
                item.id,
                Attribution::Institution {
                    id: request.institution_id,
                },
                MovementKind::Exit {
                    beneficiary_id: request.beneficiary_id.clone(),
                    delivery_location: request.delivery_location.clone(),
                },
                request.quantity,
                now,
                request.reason.clone(),
                request.observations.clone(),
            )
            .clone();

        Ok(ExitOutcome::Committed {
            entry,
            alerts,
            suggestions,
        })
    }

    /// Records an incoming donation. No policy checks: only exits are
    /// rate-limited.
    pub fn register_entry(
        &mut self,
        request: &EntryRequest,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, DistributionError> {
        if !(request.quantity > 0.0) {
            return Err(DistributionError::InvalidQuantity(request.quantity));
        }
        if self.registry.item(request.item_id).is_none() {
            return Err(DistributionError::ItemNotFound(request.item_id));
        }
        if self.registry.institution(request.institution_id).is_none() {
            return Err(DistributionError::InstitutionNotFound(
                request.institution_id,
            ));
        }

        let entry = self.ledger.append(
            request.item_id,
            Attribution::Institution {
                id: request.institution_id,
            },
            MovementKind::Entry {
                donation_source: request.donation_source.clone(),
            },
            request.quantity,
            now,
            request.reason.clone(),
            request.observations.clone(),
        );
        Ok(entry.clone())
    }

    /// Post-hoc annotation of an entry's free-text fields, restricted to the
    /// attributed institution.
    pub fn annotate_entry(
        &mut self,
        entry_id: EntryId,
        institution_id: InstitutionId,
        annotation: &EntryAnnotation,
    ) -> Result<LedgerEntry, DistributionError> {
        self.ledger
            .annotate(entry_id, institution_id, annotation)
            .map(LedgerEntry::clone)
    }

    /// Compensation hook for the persistence layer: drops the most recent
    /// entry after a flush that could not be completed. Not part of normal
    /// operation.
    pub fn revoke_entry(&mut self, entry_id: EntryId) -> bool {
        self.ledger.revoke_last(entry_id)
    }
}
