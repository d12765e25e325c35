use super::*;

use contracts::{
    Beneficiary, BeneficiaryUpdate, Institution, InstitutionRemoval, NewBeneficiary,
    NewInstitution, NewStockItem, StockItem,
};

impl AidNetwork {
    /// Seeds a pre-approved administrative institution so the fallback-owner
    /// invariant holds before any other record exists.
    pub fn bootstrap_administrative(
        &mut self,
        name: &str,
        username: &str,
        email: &str,
        responsible: &str,
        now: DateTime<Utc>,
    ) -> InstitutionId {
        self.registry
            .create_administrative(name, username, email, responsible, now)
            .id
    }

    pub fn register_institution(
        &mut self,
        new: &NewInstitution,
        now: DateTime<Utc>,
    ) -> Result<Institution, DistributionError> {
        self.registry
            .register_institution(new, now)
            .map(Institution::clone)
    }

    pub fn approve_institution(
        &mut self,
        id: InstitutionId,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Institution, DistributionError> {
        self.registry
            .approve_institution(id, approved_by, now)
            .map(Institution::clone)
    }

    pub fn deactivate_institution(&mut self, id: InstitutionId) -> Result<(), DistributionError> {
        self.registry.deactivate_institution(id)
    }

    /// Removes an institution: beneficiaries it registered move to the
    /// fallback administrative institution, and every ledger entry it was
    /// attributed with becomes orphaned. Row counts never change.
    pub fn remove_institution(
        &mut self,
        id: InstitutionId,
    ) -> Result<InstitutionRemoval, DistributionError> {
        let (institution, fallback_institution, reassigned_beneficiaries) =
            self.registry.remove_institution(id)?;
        let orphaned_entries = self.ledger.orphan_institution(id);
        Ok(InstitutionRemoval {
            institution,
            fallback_institution,
            reassigned_beneficiaries,
            orphaned_entries,
        })
    }

    pub fn register_beneficiary(
        &mut self,
        new: &NewBeneficiary,
        registered_by: Option<InstitutionId>,
        now: DateTime<Utc>,
    ) -> Result<Beneficiary, DistributionError> {
        self.registry
            .register_beneficiary(new, registered_by, now)
            .map(Beneficiary::clone)
    }

    pub fn update_beneficiary(
        &mut self,
        national_id: &str,
        update: &BeneficiaryUpdate,
    ) -> Result<Beneficiary, DistributionError> {
        self.registry
            .update_beneficiary(national_id, update)
            .map(Beneficiary::clone)
    }

    pub fn add_item(
        &mut self,
        new: &NewStockItem,
        now: DateTime<Utc>,
    ) -> Result<StockItem, DistributionError> {
        self.registry.add_item(new, now).map(StockItem::clone)
    }
}
