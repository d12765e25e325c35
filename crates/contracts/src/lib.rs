//! v1 cross-boundary contracts for the relief engine, API, and persistence.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Days a same-item repeat hand-out is flagged as a short-interval duplicate.
pub const SHORT_INTERVAL_DAYS: i64 = 7;
/// Total hand-outs inside the short interval that trigger a frequency alert.
pub const FREQUENT_DISTRIBUTION_THRESHOLD: usize = 5;
/// Trailing window for least-served suggestions and the equity report.
pub const DEFAULT_REPORT_WINDOW_DAYS: u32 = 30;

pub type InstitutionId = i64;
pub type ItemId = i64;
pub type EntryId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionKind {
    Ngo,
    Government,
    Religious,
    Company,
    Cooperative,
    Association,
    Foundation,
    Other,
}

impl fmt::Display for InstitutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ngo => "ngo",
            Self::Government => "government",
            Self::Religious => "religious",
            Self::Company => "company",
            Self::Cooperative => "cooperative",
            Self::Association => "association",
            Self::Foundation => "foundation",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub responsible: String,
    pub kind: InstitutionKind,
    pub legal_document: Option<String>,
    pub description: Option<String>,
    pub approved: bool,
    pub active: bool,
    /// Eligible to absorb orphaned beneficiaries when another institution is removed.
    pub administrative: bool,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub admin_notes: Option<String>,
}

impl Institution {
    pub fn can_operate(&self) -> bool {
        self.active && self.approved
    }
}

/// Self-service registration payload. Records start pending and inactive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewInstitution {
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub responsible: String,
    pub kind: InstitutionKind,
    #[serde(default)]
    pub legal_document: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Beneficiary {
    /// National identity number. Primary key; every ledger reference uses it directly.
    pub national_id: String,
    pub name: String,
    pub age: Option<u32>,
    pub address: Option<String>,
    pub contact: Option<String>,
    pub household_size: Option<u32>,
    pub needs: Option<String>,
    pub observations: Option<String>,
    pub zone: Option<String>,
    pub reported_losses: Option<String>,
    pub registered_by: Option<InstitutionId>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBeneficiary {
    pub national_id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub household_size: Option<u32>,
    #[serde(default)]
    pub needs: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub reported_losses: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockItem {
    pub id: ItemId,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub category: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewStockItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_unit() -> String {
    "unit".to_string()
}

/// Profile mutation payload for a registered beneficiary. Fields left `None`
/// keep their current value; the national id itself is immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeneficiaryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub household_size: Option<u32>,
    #[serde(default)]
    pub needs: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub reported_losses: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Entry,
    Exit,
}

/// Movement attribution. An entry survives the deletion of its institution by
/// becoming `Orphaned` rather than carrying a dangling reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attribution {
    Institution { id: InstitutionId },
    Orphaned,
}

impl Attribution {
    pub fn institution_id(&self) -> Option<InstitutionId> {
        match self {
            Self::Institution { id } => Some(*id),
            Self::Orphaned => None,
        }
    }

    pub fn is_institution(&self, institution_id: InstitutionId) -> bool {
        matches!(self, Self::Institution { id } if *id == institution_id)
    }
}

/// Direction of a stock movement plus its direction-specific metadata.
/// Only exits reference a beneficiary; only entries carry a donation source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum MovementKind {
    Entry {
        #[serde(default)]
        donation_source: Option<String>,
    },
    Exit {
        beneficiary_id: String,
        #[serde(default)]
        delivery_location: Option<String>,
    },
}

impl MovementKind {
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }

    pub fn beneficiary_id(&self) -> Option<&str> {
        match self {
            Self::Exit { beneficiary_id, .. } => Some(beneficiary_id),
            Self::Entry { .. } => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Entry { .. } => Direction::Entry,
            Self::Exit { .. } => Direction::Exit,
        }
    }
}

/// One append-only stock movement. Direction, quantity and references are
/// immutable once written; only the free-text fields may be annotated later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub schema_version: String,
    #[serde(with = "serde_u64_string")]
    pub entry_id: EntryId,
    pub item_id: ItemId,
    pub attribution: Attribution,
    #[serde(flatten)]
    pub movement: MovementKind,
    pub quantity: f64,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

/// One distribution attempt as submitted by an institution's staff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExitRequest {
    pub item_id: ItemId,
    pub quantity: f64,
    pub beneficiary_id: String,
    pub institution_id: InstitutionId,
    /// Proceed despite advisory alerts. Requires an explicit human decision.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub delivery_location: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

/// An incoming donation. Entries are never rate-limited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryRequest {
    pub item_id: ItemId,
    pub quantity: f64,
    pub institution_id: InstitutionId,
    #[serde(default)]
    pub donation_source: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

/// Filters for an institution's own movement listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MovementFilter {
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

/// Post-hoc annotation of an entry's free-text fields. Fields left `None`
/// keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryAnnotation {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub donation_source: Option<String>,
    #[serde(default)]
    pub delivery_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryPolicy {
    pub window_days: u32,
    /// Cap keys match case-insensitively as substrings of the item name.
    pub caps: BTreeMap<String, f64>,
}

/// Category-level distribution caps. Immutable value; overrides build a new
/// configuration instead of mutating shared state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub categories: BTreeMap<String, CategoryPolicy>,
}

impl PolicyConfig {
    pub fn empty() -> Self {
        Self {
            categories: BTreeMap::new(),
        }
    }

    /// Copy-on-write administrative override for one cap.
    pub fn with_cap(
        &self,
        category: &str,
        item: &str,
        max_quantity: f64,
        window_days: u32,
    ) -> Self {
        let mut next = self.clone();
        let entry = next
            .categories
            .entry(category.to_lowercase())
            .or_insert_with(|| CategoryPolicy {
                window_days,
                caps: BTreeMap::new(),
            });
        entry.window_days = window_days;
        entry.caps.insert(item.to_lowercase(), max_quantity);
        next
    }

    /// Resolves the policy for an item's declared category. Keys match
    /// case-insensitively as substrings, so a policy keyed `food` covers a
    /// category declared as `Food / staples`.
    pub fn category_for(&self, declared_category: &str) -> Option<(&str, &CategoryPolicy)> {
        let declared = declared_category.to_lowercase();
        self.categories
            .iter()
            .find(|(key, _)| declared.contains(key.as_str()))
            .map(|(key, policy)| (key.as_str(), policy))
    }

    /// Resolves the quantity cap for an item name within one category, with
    /// the same fuzzy substring match ("Rice 1kg" matches a cap keyed "rice").
    pub fn cap_for(policy: &CategoryPolicy, item_name: &str) -> Option<f64> {
        let name = item_name.to_lowercase();
        policy
            .caps
            .iter()
            .find(|(key, _)| name.contains(key.as_str()))
            .map(|(_, cap)| *cap)
    }
}

impl Default for PolicyConfig {
    /// Production limits table: staple food monthly, clothing quarterly,
    /// hygiene bimonthly, furniture semi-annually.
    fn default() -> Self {
        fn caps(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
            pairs
                .iter()
                .map(|(name, cap)| (name.to_string(), *cap))
                .collect()
        }

        let mut categories = BTreeMap::new();
        categories.insert(
            "food".to_string(),
            CategoryPolicy {
                window_days: 30,
                caps: caps(&[
                    ("rice", 10.0),
                    ("beans", 8.0),
                    ("oil", 3.0),
                    ("sugar", 5.0),
                    ("water", 20.0),
                ]),
            },
        );
        categories.insert(
            "clothing".to_string(),
            CategoryPolicy {
                window_days: 90,
                caps: caps(&[("shirt", 3.0), ("trousers", 2.0), ("shoes", 1.0)]),
            },
        );
        categories.insert(
            "hygiene".to_string(),
            CategoryPolicy {
                window_days: 60,
                caps: caps(&[("soap", 5.0), ("toothpaste", 2.0), ("shampoo", 2.0)]),
            },
        );
        categories.insert(
            "furniture".to_string(),
            CategoryPolicy {
                window_days: 180,
                caps: caps(&[("mattress", 1.0), ("blanket", 2.0), ("sheet", 3.0)]),
            },
        );

        Self { categories }
    }
}

/// Advisory result of the duplicate-aid guard. Alerts never block on their
/// own; the orchestrator decides whether they require confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationReport {
    pub can_distribute: bool,
    pub alerts: Vec<String>,
    pub suggestions: Vec<String>,
}

impl EvaluationReport {
    pub fn allow() -> Self {
        Self {
            can_distribute: true,
            alerts: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeastServedBeneficiary {
    pub national_id: String,
    pub name: String,
    pub zone: Option<String>,
    pub exit_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstitutionRef {
    pub name: String,
    pub kind: InstitutionKind,
}

/// Movement row visible to a non-owning institution. The redaction is
/// structural: the type has no reason, observations or delivery-location
/// fields, regardless of what the underlying entry stores. Orphaned
/// movements carry no institution attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedactedMovement {
    pub recorded_at: DateTime<Utc>,
    pub item_name: String,
    pub quantity: f64,
    pub institution_name: Option<String>,
    pub institution_kind: Option<InstitutionKind>,
}

/// Cross-tenant beneficiary resolution: full detail for the requester's own
/// movements, redacted rows for everyone else's.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupResult {
    pub schema_version: String,
    pub beneficiary: Beneficiary,
    pub registered_by: Option<InstitutionRef>,
    pub mine: Vec<LedgerEntry>,
    pub others: Vec<RedactedMovement>,
    pub total_mine: usize,
    pub total_others: usize,
    /// Distinct names of every institution that ever recorded an exit for
    /// this beneficiary.
    pub helping_institutions: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeneficiarySummary {
    pub national_id: String,
    pub name: String,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSummary {
    pub item_id: ItemId,
    pub name: String,
    pub unit: String,
}

/// Result of a distribution attempt that passed validation and the stock
/// check. `RequiresConfirmation` is a successful-but-incomplete outcome, not
/// an error: nothing was written, and the caller re-submits with
/// `force = true` to proceed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitOutcome {
    RequiresConfirmation {
        alerts: Vec<String>,
        suggestions: Vec<String>,
        beneficiary: BeneficiarySummary,
        item: ItemSummary,
        requested_quantity: f64,
    },
    Committed {
        entry: LedgerEntry,
        #[serde(default)]
        alerts: Vec<String>,
        #[serde(default)]
        suggestions: Vec<String>,
    },
}

impl ExitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneDistribution {
    pub zone: String,
    pub exit_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServedBeneficiary {
    pub national_id: String,
    pub name: String,
    pub exit_count: u64,
}

/// Outcome of removing an institution: its movements become orphaned, its
/// registered beneficiaries move to the fallback administrative institution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstitutionRemoval {
    pub institution: Institution,
    pub fallback_institution: InstitutionId,
    pub reassigned_beneficiaries: u64,
    pub orphaned_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquityReport {
    pub schema_version: String,
    pub window_days: u32,
    pub total_beneficiaries: u64,
    pub beneficiaries_served: u64,
    /// Distinct beneficiaries served over registered, one decimal. 0.0 when
    /// nobody is registered.
    pub coverage_percent: f64,
    pub by_zone: Vec<ZoneDistribution>,
    pub top_served: Vec<ServedBeneficiary>,
    pub least_served: Vec<ServedBeneficiary>,
}

/// Shared error taxonomy. Policy advisories are not errors (see
/// [`ExitOutcome::RequiresConfirmation`]); everything here is a terminal
/// failure with no partial state change.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DistributionError {
    #[error("stock item {0} not found")]
    ItemNotFound(ItemId),
    #[error("beneficiary {0} is not registered in the system")]
    BeneficiaryNotFound(String),
    #[error("institution {0} not found")]
    InstitutionNotFound(InstitutionId),
    #[error("quantity must be greater than zero (got {0})")]
    InvalidQuantity(f64),
    #[error(
        "insufficient stock for {item_name}: requested {requested} {unit}, \
         available {on_hand} {unit} (short {shortfall} {unit})"
    )]
    InsufficientStock {
        item_name: String,
        unit: String,
        requested: f64,
        on_hand: f64,
        shortfall: f64,
    },
    #[error("a beneficiary with national id {national_id} is already registered")]
    DuplicateNationalId {
        national_id: String,
        registered_by: Option<InstitutionId>,
    },
    #[error("username {0} is already in use")]
    DuplicateUsername(String),
    #[error("email {0} is already in use")]
    DuplicateEmail(String),
    #[error("a stock item named {0} already exists")]
    DuplicateItemName(String),
    #[error("validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
    #[error("institution {0} is already approved")]
    AlreadyApproved(InstitutionId),
    #[error(
        "institution {0} cannot be removed: no fallback administrative institution available"
    )]
    NoFallbackInstitution(InstitutionId),
    #[error("ledger entry {0} not found")]
    EntryNotFound(EntryId),
    #[error("only the attributed institution may annotate entry {0}")]
    ForeignEntry(EntryId),
}

impl DistributionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ItemNotFound(_)
            | Self::BeneficiaryNotFound(_)
            | Self::InstitutionNotFound(_)
            | Self::EntryNotFound(_) => ErrorCode::NotFound,
            Self::InvalidQuantity(_) | Self::ValidationFailed(_) => ErrorCode::InvalidInput,
            Self::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            Self::DuplicateNationalId { .. }
            | Self::DuplicateUsername(_)
            | Self::DuplicateEmail(_)
            | Self::DuplicateItemName(_)
            | Self::AlreadyApproved(_)
            | Self::NoFallbackInstitution(_)
            | Self::ForeignEntry(_) => ErrorCode::Conflict,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidInput,
    InsufficientStock,
    Conflict,
    PersistenceFailure,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            details,
        }
    }
}

impl From<&DistributionError> for ApiError {
    fn from(err: &DistributionError) -> Self {
        Self::new(err.error_code(), err.to_string(), None)
    }
}

pub mod serde_u64_string {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_matching_is_case_insensitive_and_substring_based() {
        let config = PolicyConfig::default();
        let (key, policy) = config
            .category_for("Food / staples")
            .expect("food policy matches");
        assert_eq!(key, "food");
        assert_eq!(policy.window_days, 30);
        assert_eq!(PolicyConfig::cap_for(policy, "Rice 1kg"), Some(10.0));
        assert_eq!(PolicyConfig::cap_for(policy, "Lentils"), None);
        assert!(config.category_for("electronics").is_none());
    }

    #[test]
    fn with_cap_leaves_the_original_configuration_untouched() {
        let base = PolicyConfig::default();
        let overridden = base.with_cap("food", "lentils", 4.0, 30);

        let (_, policy) = overridden.category_for("food").expect("food policy");
        assert_eq!(PolicyConfig::cap_for(policy, "Lentils 500g"), Some(4.0));
        let (_, original) = base.category_for("food").expect("food policy");
        assert_eq!(PolicyConfig::cap_for(original, "Lentils 500g"), None);
    }

    #[test]
    fn ledger_entry_round_trips_with_string_encoded_id() {
        let entry = LedgerEntry {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            entry_id: 42,
            item_id: 7,
            attribution: Attribution::Institution { id: 3 },
            movement: MovementKind::Exit {
                beneficiary_id: "110022334".to_string(),
                delivery_location: Some("community center".to_string()),
            },
            quantity: 2.5,
            recorded_at: Utc::now(),
            reason: Some("flood response".to_string()),
            observations: None,
        };

        let serialized = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(serialized["entry_id"], "42");
        assert_eq!(serialized["direction"], "exit");
        assert_eq!(serialized["beneficiary_id"], "110022334");

        let decoded: LedgerEntry = serde_json::from_value(serialized).expect("deserialize");
        assert_eq!(entry, decoded);
    }

    #[test]
    fn orphaned_attribution_serializes_as_tagged_variant() {
        let attribution = Attribution::Orphaned;
        let serialized = serde_json::to_value(attribution).expect("serialize");
        assert_eq!(serialized["kind"], "orphaned");
        assert_eq!(attribution.institution_id(), None);
    }
}
