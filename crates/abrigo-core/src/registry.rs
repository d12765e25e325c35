//! Entity registry: institutions, stock items, and beneficiaries.
//!
//! Beneficiaries are keyed by national id and readable system-wide; write
//! ownership stays with the registering institution and is enforced by the
//! surrounding layer. Institutions follow a pending-then-approved lifecycle,
//! and at least one administrative institution must always remain to absorb
//! orphaned records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contracts::{
    Beneficiary, BeneficiaryUpdate, DistributionError, Institution, InstitutionId,
    InstitutionKind, ItemId, NewBeneficiary, NewInstitution, NewStockItem, StockItem,
};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    institutions: BTreeMap<InstitutionId, Institution>,
    beneficiaries: BTreeMap<String, Beneficiary>,
    items: BTreeMap<ItemId, StockItem>,
    next_institution_id: InstitutionId,
    next_item_id: ItemId,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            institutions: BTreeMap::new(),
            beneficiaries: BTreeMap::new(),
            items: BTreeMap::new(),
            next_institution_id: 1,
            next_item_id: 1,
        }
    }

    /// Rebuilds a registry from persisted rows.
    pub fn from_parts(
        institutions: Vec<Institution>,
        beneficiaries: Vec<Beneficiary>,
        items: Vec<StockItem>,
    ) -> Self {
        let next_institution_id = institutions.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let next_item_id = items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        Self {
            institutions: institutions.into_iter().map(|i| (i.id, i)).collect(),
            beneficiaries: beneficiaries
                .into_iter()
                .map(|b| (b.national_id.clone(), b))
                .collect(),
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            next_institution_id,
            next_item_id,
        }
    }

    // ------------------------------------------------------------------
    // Institutions
    // ------------------------------------------------------------------

    pub fn institution(&self, id: InstitutionId) -> Option<&Institution> {
        self.institutions.get(&id)
    }

    pub fn institutions(&self) -> impl Iterator<Item = &Institution> {
        self.institutions.values()
    }

    pub fn pending_institutions(&self) -> Vec<&Institution> {
        self.institutions
            .values()
            .filter(|institution| !institution.approved)
            .collect()
    }

    /// Self-service registration. The record starts pending and inactive and
    /// cannot operate until approved.
    pub fn register_institution(
        &mut self,
        new: &NewInstitution,
        now: DateTime<Utc>,
    ) -> Result<&Institution, DistributionError> {
        let problems = validate_institution(new);
        if !problems.is_empty() {
            return Err(DistributionError::ValidationFailed(problems));
        }

        let username = new.username.trim().to_lowercase();
        let email = new.email.trim().to_lowercase();
        if self
            .institutions
            .values()
            .any(|institution| institution.username == username)
        {
            return Err(DistributionError::DuplicateUsername(username));
        }
        if self
            .institutions
            .values()
            .any(|institution| institution.email == email)
        {
            return Err(DistributionError::DuplicateEmail(email));
        }

        let id = self.next_institution_id;
        self.next_institution_id += 1;
        let institution = Institution {
            id,
            name: new.name.trim().to_string(),
            username,
            email,
            phone: trimmed(&new.phone),
            address: trimmed(&new.address),
            responsible: new.responsible.trim().to_string(),
            kind: new.kind,
            legal_document: trimmed(&new.legal_document),
            description: trimmed(&new.description),
            approved: false,
            active: false,
            administrative: false,
            created_at: now,
            approved_at: None,
            approved_by: None,
            admin_notes: None,
        };
        Ok(self.institutions.entry(id).or_insert(institution))
    }

    /// Creates a pre-approved administrative institution. Used when
    /// bootstrapping a deployment so the fallback-owner invariant holds from
    /// the first record on.
    pub fn create_administrative(
        &mut self,
        name: &str,
        username: &str,
        email: &str,
        responsible: &str,
        now: DateTime<Utc>,
    ) -> &Institution {
        let id = self.next_institution_id;
        self.next_institution_id += 1;
        let institution = Institution {
            id,
            name: name.to_string(),
            username: username.to_lowercase(),
            email: email.to_lowercase(),
            phone: None,
            address: None,
            responsible: responsible.to_string(),
            kind: InstitutionKind::Government,
            legal_document: None,
            description: None,
            approved: true,
            active: true,
            administrative: true,
            created_at: now,
            approved_at: Some(now),
            approved_by: Some("system".to_string()),
            admin_notes: None,
        };
        self.institutions.entry(id).or_insert(institution)
    }

    pub fn approve_institution(
        &mut self,
        id: InstitutionId,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<&Institution, DistributionError> {
        let institution = self
            .institutions
            .get_mut(&id)
            .ok_or(DistributionError::InstitutionNotFound(id))?;
        if institution.approved {
            return Err(DistributionError::AlreadyApproved(id));
        }
        institution.approved = true;
        institution.active = true;
        institution.approved_at = Some(now);
        institution.approved_by = Some(approved_by.to_string());
        Ok(institution)
    }

    pub fn deactivate_institution(&mut self, id: InstitutionId) -> Result<(), DistributionError> {
        let institution = self
            .institutions
            .get_mut(&id)
            .ok_or(DistributionError::InstitutionNotFound(id))?;
        institution.active = false;
        Ok(())
    }

    /// The lowest-id administrative institution other than `excluding`.
    pub fn fallback_institution(&self, excluding: InstitutionId) -> Option<InstitutionId> {
        self.institutions
            .values()
            .filter(|institution| institution.administrative && institution.id != excluding)
            .map(|institution| institution.id)
            .min()
    }

    /// Removes an institution and reassigns its registered beneficiaries to
    /// the fallback administrative institution. Refused when no fallback
    /// exists, which also protects the last administrative institution.
    /// Ledger attribution is handled by the caller.
    pub fn remove_institution(
        &mut self,
        id: InstitutionId,
    ) -> Result<(Institution, InstitutionId, u64), DistributionError> {
        if !self.institutions.contains_key(&id) {
            return Err(DistributionError::InstitutionNotFound(id));
        }
        let fallback = self
            .fallback_institution(id)
            .ok_or(DistributionError::NoFallbackInstitution(id))?;

        let mut reassigned = 0;
        for beneficiary in self.beneficiaries.values_mut() {
            if beneficiary.registered_by == Some(id) {
                beneficiary.registered_by = Some(fallback);
                reassigned += 1;
            }
        }

        let removed = self
            .institutions
            .remove(&id)
            .expect("presence checked above");
        Ok((removed, fallback, reassigned))
    }

    // ------------------------------------------------------------------
    // Beneficiaries
    // ------------------------------------------------------------------

    pub fn beneficiary(&self, national_id: &str) -> Option<&Beneficiary> {
        self.beneficiaries.get(national_id)
    }

    pub fn beneficiaries(&self) -> impl Iterator<Item = &Beneficiary> {
        self.beneficiaries.values()
    }

    pub fn beneficiary_count(&self) -> usize {
        self.beneficiaries.len()
    }

    pub fn register_beneficiary(
        &mut self,
        new: &NewBeneficiary,
        registered_by: Option<InstitutionId>,
        now: DateTime<Utc>,
    ) -> Result<&Beneficiary, DistributionError> {
        let national_id = new.national_id.trim().to_string();
        let mut problems = Vec::new();
        if national_id.is_empty() {
            problems.push("national id is required".to_string());
        }
        if new.name.trim().is_empty() {
            problems.push("name is required".to_string());
        }
        if !problems.is_empty() {
            return Err(DistributionError::ValidationFailed(problems));
        }

        if let Some(existing) = self.beneficiaries.get(&national_id) {
            return Err(DistributionError::DuplicateNationalId {
                national_id,
                registered_by: existing.registered_by,
            });
        }

        let beneficiary = Beneficiary {
            national_id: national_id.clone(),
            name: new.name.trim().to_string(),
            age: new.age,
            address: trimmed(&new.address),
            contact: trimmed(&new.contact),
            household_size: new.household_size,
            needs: trimmed(&new.needs),
            observations: trimmed(&new.observations),
            zone: trimmed(&new.zone),
            reported_losses: trimmed(&new.reported_losses),
            registered_by,
            registered_at: now,
        };
        Ok(self
            .beneficiaries
            .entry(national_id)
            .or_insert(beneficiary))
    }

    /// Applies a profile update. The national id and registration ownership
    /// are immutable here; ownership only changes through orphan
    /// reassignment.
    pub fn update_beneficiary(
        &mut self,
        national_id: &str,
        update: &BeneficiaryUpdate,
    ) -> Result<&Beneficiary, DistributionError> {
        let beneficiary = self
            .beneficiaries
            .get_mut(national_id)
            .ok_or_else(|| DistributionError::BeneficiaryNotFound(national_id.to_string()))?;

        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(DistributionError::ValidationFailed(vec![
                    "name is required".to_string(),
                ]));
            }
            beneficiary.name = name.trim().to_string();
        }
        if let Some(age) = update.age {
            beneficiary.age = Some(age);
        }
        if let Some(address) = &update.address {
            beneficiary.address = Some(address.clone());
        }
        if let Some(contact) = &update.contact {
            beneficiary.contact = Some(contact.clone());
        }
        if let Some(household_size) = update.household_size {
            beneficiary.household_size = Some(household_size);
        }
        if let Some(needs) = &update.needs {
            beneficiary.needs = Some(needs.clone());
        }
        if let Some(observations) = &update.observations {
            beneficiary.observations = Some(observations.clone());
        }
        if let Some(zone) = &update.zone {
            beneficiary.zone = Some(zone.clone());
        }
        if let Some(reported_losses) = &update.reported_losses {
            beneficiary.reported_losses = Some(reported_losses.clone());
        }
        Ok(beneficiary)
    }

    /// Beneficiaries registered by one institution, filtered by a free-text
    /// search over name, national id, and zone.
    pub fn search_beneficiaries(
        &self,
        institution_id: InstitutionId,
        search: &str,
    ) -> Vec<&Beneficiary> {
        let needle = search.trim().to_lowercase();
        let mut found: Vec<&Beneficiary> = self
            .beneficiaries
            .values()
            .filter(|beneficiary| beneficiary.registered_by == Some(institution_id))
            .filter(|beneficiary| {
                needle.is_empty()
                    || beneficiary.name.to_lowercase().contains(&needle)
                    || beneficiary.national_id.to_lowercase().contains(&needle)
                    || beneficiary
                        .zone
                        .as_deref()
                        .is_some_and(|zone| zone.to_lowercase().contains(&needle))
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    // ------------------------------------------------------------------
    // Stock items
    // ------------------------------------------------------------------

    pub fn item(&self, id: ItemId) -> Option<&StockItem> {
        self.items.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &StockItem> {
        self.items.values()
    }

    pub fn add_item(
        &mut self,
        new: &NewStockItem,
        now: DateTime<Utc>,
    ) -> Result<&StockItem, DistributionError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(DistributionError::ValidationFailed(vec![
                "item name is required".to_string(),
            ]));
        }
        if self
            .items
            .values()
            .any(|item| item.name.eq_ignore_ascii_case(&name))
        {
            return Err(DistributionError::DuplicateItemName(name));
        }

        let id = self.next_item_id;
        self.next_item_id += 1;
        let item = StockItem {
            id,
            name,
            description: trimmed(&new.description),
            unit: if new.unit.trim().is_empty() {
                "unit".to_string()
            } else {
                new.unit.trim().to_string()
            },
            category: trimmed(&new.category),
            active: true,
            created_at: now,
        };
        Ok(self.items.entry(id).or_insert(item))
    }

    /// Active items, optionally narrowed by category and a free-text search
    /// over name and description.
    pub fn active_items(&self, category: Option<&str>, search: Option<&str>) -> Vec<&StockItem> {
        let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
        let mut found: Vec<&StockItem> = self
            .items
            .values()
            .filter(|item| item.active)
            .filter(|item| match category {
                Some(category) => item.category.as_deref() == Some(category),
                None => true,
            })
            .filter(|item| {
                needle.is_empty()
                    || item.name.to_lowercase().contains(&needle)
                    || item
                        .description
                        .as_deref()
                        .is_some_and(|description| description.to_lowercase().contains(&needle))
            })
            .collect();
        found.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        found
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .items
            .values()
            .filter(|item| item.active)
            .filter_map(|item| item.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_institution(new: &NewInstitution) -> Vec<String> {
    let mut problems = Vec::new();
    if new.name.trim().is_empty() {
        problems.push("name is required".to_string());
    }
    if new.responsible.trim().is_empty() {
        problems.push("responsible contact is required".to_string());
    }

    let username = new.username.trim();
    if username.len() < 3 {
        problems.push("username must be at least 3 characters".to_string());
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        problems.push("username may only contain letters, digits and underscores".to_string());
    }

    let email = new.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        problems.push("email address is not valid".to_string());
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn new_institution(username: &str, email: &str) -> NewInstitution {
        NewInstitution {
            name: "Relief Works".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            phone: None,
            address: None,
            responsible: "Ana Pereira".to_string(),
            kind: InstitutionKind::Ngo,
            legal_document: None,
            description: None,
        }
    }

    #[test]
    fn registration_starts_pending_and_approval_activates() {
        let mut registry = Registry::new();
        let id = registry
            .register_institution(&new_institution("reliefworks", "contact@relief.org"), now())
            .expect("registration accepted")
            .id;

        let institution = registry.institution(id).expect("registered");
        assert!(!institution.approved);
        assert!(!institution.active);
        assert!(!institution.can_operate());

        let approved = registry
            .approve_institution(id, "admin", now())
            .expect("approval accepted");
        assert!(approved.can_operate());
        assert_eq!(approved.approved_by.as_deref(), Some("admin"));

        assert_eq!(
            registry.approve_institution(id, "admin", now()),
            Err(DistributionError::AlreadyApproved(id))
        );
    }

    #[test]
    fn registration_rejects_duplicates_and_malformed_fields() {
        let mut registry = Registry::new();
        registry
            .register_institution(&new_institution("reliefworks", "contact@relief.org"), now())
            .expect("first registration");

        let duplicate_username =
            registry.register_institution(&new_institution("ReliefWorks", "other@relief.org"), now());
        assert_eq!(
            duplicate_username,
            Err(DistributionError::DuplicateUsername(
                "reliefworks".to_string()
            ))
        );

        let duplicate_email =
            registry.register_institution(&new_institution("other", "Contact@Relief.org"), now());
        assert_eq!(
            duplicate_email,
            Err(DistributionError::DuplicateEmail(
                "contact@relief.org".to_string()
            ))
        );

        let malformed = registry.register_institution(&new_institution("x!", "not-an-email"), now());
        match malformed {
            Err(DistributionError::ValidationFailed(problems)) => {
                assert_eq!(problems.len(), 2);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn removal_reassigns_beneficiaries_to_the_fallback() {
        let mut registry = Registry::new();
        let admin = registry
            .create_administrative("Civil Protection", "admin", "admin@gov.cv", "Duty Officer", now())
            .id;
        let ngo = registry
            .register_institution(&new_institution("reliefworks", "contact@relief.org"), now())
            .expect("registered")
            .id;
        registry
            .approve_institution(ngo, "admin", now())
            .expect("approved");

        for (national_id, name) in [("111", "Maria"), ("222", "Joao")] {
            registry
                .register_beneficiary(
                    &NewBeneficiary {
                        national_id: national_id.to_string(),
                        name: name.to_string(),
                        ..NewBeneficiary::default()
                    },
                    Some(ngo),
                    now(),
                )
                .expect("beneficiary registered");
        }

        let (removed, fallback, reassigned) =
            registry.remove_institution(ngo).expect("removal accepted");
        assert_eq!(removed.id, ngo);
        assert_eq!(fallback, admin);
        assert_eq!(reassigned, 2);
        assert_eq!(registry.beneficiary_count(), 2);
        assert!(registry
            .beneficiaries()
            .all(|beneficiary| beneficiary.registered_by == Some(admin)));

        // The last administrative institution is protected.
        assert_eq!(
            registry.remove_institution(admin),
            Err(DistributionError::NoFallbackInstitution(admin))
        );
    }

    #[test]
    fn duplicate_national_id_reports_the_existing_owner() {
        let mut registry = Registry::new();
        let admin = registry
            .create_administrative("Civil Protection", "admin", "admin@gov.cv", "Duty Officer", now())
            .id;
        registry
            .register_beneficiary(
                &NewBeneficiary {
                    national_id: "111".to_string(),
                    name: "Maria".to_string(),
                    ..NewBeneficiary::default()
                },
                Some(admin),
                now(),
            )
            .expect("registered");

        let duplicate = registry.register_beneficiary(
            &NewBeneficiary {
                national_id: " 111 ".to_string(),
                name: "Someone Else".to_string(),
                ..NewBeneficiary::default()
            },
            None,
            now(),
        );
        assert_eq!(
            duplicate,
            Err(DistributionError::DuplicateNationalId {
                national_id: "111".to_string(),
                registered_by: Some(admin),
            })
        );
    }

    #[test]
    fn item_names_are_unique_case_insensitively() {
        let mut registry = Registry::new();
        registry
            .add_item(
                &NewStockItem {
                    name: "Rice".to_string(),
                    description: None,
                    unit: "kg".to_string(),
                    category: Some("food".to_string()),
                },
                now(),
            )
            .expect("item added");

        let duplicate = registry.add_item(
            &NewStockItem {
                name: "rice".to_string(),
                description: None,
                unit: "kg".to_string(),
                category: Some("food".to_string()),
            },
            now(),
        );
        assert_eq!(
            duplicate,
            Err(DistributionError::DuplicateItemName("rice".to_string()))
        );

        assert_eq!(registry.categories(), vec!["food".to_string()]);
    }
}
