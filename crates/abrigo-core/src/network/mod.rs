//! The aid network aggregate: entity registry plus stock ledger behind one
//! synchronous writer. All mutations flow through `&mut self`, so callers
//! that serialize access to the aggregate (the API facade holds it behind a
//! single lock) get the check-then-commit discipline for free.

mod admin;
mod distribution;
mod inspect;

use chrono::{DateTime, Utc};
use contracts::{
    DistributionError, EquityReport, EvaluationReport, InstitutionId, ItemId,
    LeastServedBeneficiary, LookupResult, PolicyConfig,
};

use crate::equity;
use crate::ledger::{self, StockLedger};
use crate::lookup;
use crate::policy;
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct AidNetwork {
    pub registry: Registry,
    pub ledger: StockLedger,
    policy: PolicyConfig,
}

impl AidNetwork {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            registry: Registry::new(),
            ledger: StockLedger::new(),
            policy,
        }
    }

    /// Reassembles an aggregate from persisted state.
    pub fn from_parts(registry: Registry, ledger: StockLedger, policy: PolicyConfig) -> Self {
        Self {
            registry,
            ledger,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Installs a new policy configuration. Overrides are whole immutable
    /// values (see [`PolicyConfig::with_cap`]), never in-place edits.
    pub fn set_policy(&mut self, policy: PolicyConfig) {
        self.policy = policy;
    }

    /// On-hand for an item, globally or scoped to one institution. Always a
    /// fresh aggregate over the ledger.
    pub fn on_hand(
        &self,
        item_id: ItemId,
        institution_id: Option<InstitutionId>,
    ) -> Result<f64, DistributionError> {
        if self.registry.item(item_id).is_none() {
            return Err(DistributionError::ItemNotFound(item_id));
        }
        Ok(match institution_id {
            Some(institution_id) => {
                ledger::on_hand_for_institution(self.ledger.entries(), item_id, institution_id)
            }
            None => ledger::total_on_hand(self.ledger.entries(), item_id),
        })
    }

    /// Advisory-only policy evaluation (§ duplicate-aid guard). Safe to call
    /// for unknown ids; the report carries a not-found alert instead of
    /// failing.
    pub fn evaluate_distribution(
        &self,
        beneficiary_id: &str,
        item_id: ItemId,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> EvaluationReport {
        policy::evaluate(
            &self.registry,
            &self.ledger,
            &self.policy,
            beneficiary_id,
            item_id,
            quantity,
            now,
        )
    }

    pub fn lookup_beneficiary(
        &self,
        national_id: &str,
        requesting_institution: InstitutionId,
        now: DateTime<Utc>,
    ) -> Option<LookupResult> {
        lookup::resolve(
            &self.registry,
            &self.ledger,
            national_id,
            requesting_institution,
            now,
        )
    }

    pub fn equity_report(
        &self,
        window_days: u32,
        top_n: usize,
        now: DateTime<Utc>,
    ) -> EquityReport {
        equity::equity_report(&self.registry, &self.ledger, window_days, top_n, now)
    }

    pub fn least_served(
        &self,
        category: Option<&str>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<LeastServedBeneficiary> {
        equity::least_served_in_category(&self.registry, &self.ledger, category, limit, now)
    }
}
