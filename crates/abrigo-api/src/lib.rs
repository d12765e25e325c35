//! In-process API facade: the aid network aggregate plus SQLite persistence.
//!
//! All mutations run through `&mut self`, so a facade held behind one lock
//! serializes every check-then-commit sequence. Ledger writes are flushed as
//! append-only deltas; entity changes are upserted eagerly. A busy store is
//! retried once by re-running the whole sequence against current data.

mod persistence;
mod server;

use std::fmt;
use std::path::Path;

use abrigo_core::ledger::StockLedger;
use abrigo_core::registry::Registry;
use abrigo_core::AidNetwork;
use chrono::{DateTime, Utc};
use contracts::{
    Beneficiary, BeneficiaryUpdate, DistributionError, EntryAnnotation, EntryId, EntryRequest,
    EquityReport, EvaluationReport, ExitOutcome, ExitRequest, Institution, InstitutionId,
    InstitutionRemoval, LeastServedBeneficiary, LedgerEntry, LookupResult, MovementFilter,
    NewBeneficiary, NewInstitution, NewStockItem, PolicyConfig, StockItem,
};
pub use persistence::{PersistedNetwork, PersistenceError, SqliteStore};
pub use server::{serve, ServerError};

/// A facade operation failed either in the engine or in the store.
#[derive(Debug)]
pub enum RequestError {
    Distribution(DistributionError),
    Persistence(PersistenceError),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distribution(err) => write!(f, "{err}"),
            Self::Persistence(err) => write!(f, "persistence failure: {err}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<DistributionError> for RequestError {
    fn from(value: DistributionError) -> Self {
        Self::Distribution(value)
    }
}

impl From<PersistenceError> for RequestError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value)
    }
}

#[derive(Debug)]
struct PersistenceState {
    store: SqliteStore,
    persisted_entry_count: usize,
}

#[derive(Debug)]
pub struct ReliefApi {
    network: AidNetwork,
    persistence: Option<PersistenceState>,
}

impl ReliefApi {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            network: AidNetwork::new(policy),
            persistence: None,
        }
    }

    /// Opens (or creates) a SQLite store and replaces the in-memory
    /// aggregate with the persisted state, keeping the configured policy.
    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteStore::open(path)?;
        let persisted = store.load_network()?;
        let persisted_entry_count = persisted.entries.len();

        let registry = Registry::from_parts(
            persisted.institutions,
            persisted.beneficiaries,
            persisted.items,
        );
        let ledger = StockLedger::from_entries(persisted.entries);
        self.network =
            AidNetwork::from_parts(registry, ledger, self.network.policy().clone());
        self.persistence = Some(PersistenceState {
            store,
            persisted_entry_count,
        });
        Ok(())
    }

    pub fn network(&self) -> &AidNetwork {
        &self.network
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn on_hand(
        &self,
        item_id: i64,
        institution_id: Option<InstitutionId>,
    ) -> Result<f64, DistributionError> {
        self.network.on_hand(item_id, institution_id)
    }

    pub fn evaluate_distribution(
        &self,
        beneficiary_id: &str,
        item_id: i64,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> EvaluationReport {
        self.network
            .evaluate_distribution(beneficiary_id, item_id, quantity, now)
    }

    pub fn lookup_beneficiary(
        &self,
        national_id: &str,
        requesting_institution: InstitutionId,
        now: DateTime<Utc>,
    ) -> Option<LookupResult> {
        self.network
            .lookup_beneficiary(national_id, requesting_institution, now)
    }

    pub fn equity_report(&self, window_days: u32, top_n: usize, now: DateTime<Utc>) -> EquityReport {
        self.network.equity_report(window_days, top_n, now)
    }

    pub fn least_served(
        &self,
        category: Option<&str>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<LeastServedBeneficiary> {
        self.network.least_served(category, limit, now)
    }

    pub fn movements(
        &self,
        institution_id: InstitutionId,
        filter: &MovementFilter,
    ) -> Vec<LedgerEntry> {
        self.network
            .movements_for_institution(institution_id, filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn stock_overview(&self, institution_id: InstitutionId) -> serde_json::Value {
        self.network.stock_overview(institution_id)
    }

    pub fn policy(&self) -> &PolicyConfig {
        self.network.policy()
    }

    // ------------------------------------------------------------------
    // Write side: ledger
    // ------------------------------------------------------------------

    /// One distribution attempt, persisted. A busy store retries the whole
    /// check-then-commit sequence once, re-validating against current data.
    pub fn request_exit(
        &mut self,
        request: &ExitRequest,
        now: DateTime<Utc>,
    ) -> Result<ExitOutcome, RequestError> {
        match self.request_exit_once(request, now) {
            Err(RequestError::Persistence(err)) if err.is_busy() => {
                tracing::warn!(
                    item_id = request.item_id,
                    "store busy during exit commit; retrying check-then-commit once"
                );
                self.request_exit_once(request, now)
            }
            other => other,
        }
    }

    fn request_exit_once(
        &mut self,
        request: &ExitRequest,
        now: DateTime<Utc>,
    ) -> Result<ExitOutcome, RequestError> {
        let outcome = self.network.request_exit(request, now)?;

        if let ExitOutcome::Committed { entry, alerts, .. } = &outcome {
            if request.force && !alerts.is_empty() {
                tracing::warn!(
                    entry_id = entry.entry_id,
                    beneficiary_id = %request.beneficiary_id,
                    alert_count = alerts.len(),
                    "distribution committed over advisory alerts"
                );
            } else {
                tracing::info!(
                    entry_id = entry.entry_id,
                    beneficiary_id = %request.beneficiary_id,
                    quantity = request.quantity,
                    "distribution committed"
                );
            }
            if let Err(err) = self.flush_ledger() {
                // Keep memory and store consistent before surfacing failure.
                self.network.revoke_entry(entry.entry_id);
                return Err(err.into());
            }
        }

        Ok(outcome)
    }

    /// Records a donation, persisted with the same busy-retry discipline.
    pub fn register_entry(
        &mut self,
        request: &EntryRequest,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, RequestError> {
        match self.register_entry_once(request, now) {
            Err(RequestError::Persistence(err)) if err.is_busy() => {
                tracing::warn!(
                    item_id = request.item_id,
                    "store busy during entry commit; retrying once"
                );
                self.register_entry_once(request, now)
            }
            other => other,
        }
    }

    fn register_entry_once(
        &mut self,
        request: &EntryRequest,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, RequestError> {
        let entry = self.network.register_entry(request, now)?;
        if let Err(err) = self.flush_ledger() {
            self.network.revoke_entry(entry.entry_id);
            return Err(err.into());
        }
        Ok(entry)
    }

    pub fn annotate_entry(
        &mut self,
        entry_id: EntryId,
        institution_id: InstitutionId,
        annotation: &EntryAnnotation,
    ) -> Result<LedgerEntry, RequestError> {
        let entry = self
            .network
            .annotate_entry(entry_id, institution_id, annotation)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.rewrite_entry(&entry)?;
        }
        Ok(entry)
    }

    fn flush_ledger(&mut self) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Ok(());
        };
        let new_entries = &self.network.ledger.entries()[state.persisted_entry_count..];
        if new_entries.is_empty() {
            return Ok(());
        }
        state.store.append_entries(new_entries)?;
        state.persisted_entry_count = self.network.ledger.entries().len();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Write side: registry administration
    // ------------------------------------------------------------------

    pub fn bootstrap_administrative(
        &mut self,
        name: &str,
        username: &str,
        email: &str,
        responsible: &str,
        now: DateTime<Utc>,
    ) -> Result<InstitutionId, RequestError> {
        let id = self
            .network
            .bootstrap_administrative(name, username, email, responsible, now);
        self.persist_institution(id)?;
        Ok(id)
    }

    pub fn register_institution(
        &mut self,
        new: &NewInstitution,
        now: DateTime<Utc>,
    ) -> Result<Institution, RequestError> {
        let institution = self.network.register_institution(new, now)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.upsert_institution(&institution)?;
        }
        Ok(institution)
    }

    pub fn approve_institution(
        &mut self,
        id: InstitutionId,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Institution, RequestError> {
        let institution = self.network.approve_institution(id, approved_by, now)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.upsert_institution(&institution)?;
        }
        tracing::info!(institution_id = id, approved_by, "institution approved");
        Ok(institution)
    }

    pub fn deactivate_institution(&mut self, id: InstitutionId) -> Result<(), RequestError> {
        self.network.deactivate_institution(id)?;
        self.persist_institution(id)?;
        Ok(())
    }

    /// Removes an institution and persists the orphaned ledger rows and
    /// reassigned beneficiaries in the same pass.
    pub fn remove_institution(
        &mut self,
        id: InstitutionId,
    ) -> Result<InstitutionRemoval, RequestError> {
        let removal = self.network.remove_institution(id)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.delete_institution(id)?;
            // Idempotent rewrites: every orphaned row and every beneficiary
            // of the fallback institution, including ones from earlier
            // removals.
            for entry in self.network.ledger.entries() {
                if entry.attribution == contracts::Attribution::Orphaned {
                    state.store.rewrite_entry(entry)?;
                }
            }
            for beneficiary in self.network.registry.beneficiaries() {
                if beneficiary.registered_by == Some(removal.fallback_institution) {
                    state.store.upsert_beneficiary(beneficiary)?;
                }
            }
        }
        tracing::info!(
            institution_id = id,
            fallback = removal.fallback_institution,
            orphaned_entries = removal.orphaned_entries,
            reassigned_beneficiaries = removal.reassigned_beneficiaries,
            "institution removed"
        );
        Ok(removal)
    }

    pub fn register_beneficiary(
        &mut self,
        new: &NewBeneficiary,
        registered_by: Option<InstitutionId>,
        now: DateTime<Utc>,
    ) -> Result<Beneficiary, RequestError> {
        let beneficiary = self.network.register_beneficiary(new, registered_by, now)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.upsert_beneficiary(&beneficiary)?;
        }
        Ok(beneficiary)
    }

    pub fn update_beneficiary(
        &mut self,
        national_id: &str,
        update: &BeneficiaryUpdate,
    ) -> Result<Beneficiary, RequestError> {
        let beneficiary = self.network.update_beneficiary(national_id, update)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.upsert_beneficiary(&beneficiary)?;
        }
        Ok(beneficiary)
    }

    pub fn add_item(
        &mut self,
        new: &NewStockItem,
        now: DateTime<Utc>,
    ) -> Result<StockItem, RequestError> {
        let item = self.network.add_item(new, now)?;
        if let Some(state) = self.persistence.as_mut() {
            state.store.upsert_item(&item)?;
        }
        Ok(item)
    }

    /// Installs a cap override as a whole new policy value.
    pub fn override_policy_cap(
        &mut self,
        category: &str,
        item: &str,
        max_quantity: f64,
        window_days: u32,
    ) -> PolicyConfig {
        let next = self
            .network
            .policy()
            .with_cap(category, item, max_quantity, window_days);
        self.network.set_policy(next.clone());
        tracing::info!(category, item, max_quantity, window_days, "policy cap overridden");
        next
    }

    fn persist_institution(&mut self, id: InstitutionId) -> Result<(), RequestError> {
        let Some(institution) = self.network.registry.institution(id).cloned() else {
            return Ok(());
        };
        if let Some(state) = self.persistence.as_mut() {
            state.store.upsert_institution(&institution)?;
        }
        Ok(())
    }
}
