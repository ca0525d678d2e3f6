use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use medchain_core::{AggregateRoot, DomainError, DomainResult, ProductId, SupplierId};
use medchain_events::catalog::suppliers::{
    EvaluationUpdated, SupplierActivated, SupplierDeactivated, SupplierQualified,
    SupplierSuspended,
};

/// Days before expiry at which a certification counts as expiring soon.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

/// Weights of the general score: on-time delivery, product quality, emergency response.
pub const SCORE_WEIGHTS: (f64, f64, f64) = (0.40, 0.35, 0.25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupplierState {
    #[serde(rename = "ACTIVO")]
    Active,
    #[serde(rename = "SUSPENDIDO")]
    Suspended,
    #[serde(rename = "INACTIVO")]
    Inactive,
}

impl SupplierState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplierState::Active => "ACTIVO",
            SupplierState::Suspended => "SUSPENDIDO",
            SupplierState::Inactive => "INACTIVO",
        }
    }

    pub fn can_suspend(self) -> bool {
        self == SupplierState::Active
    }

    pub fn can_activate(self) -> bool {
        matches!(self, SupplierState::Suspended | SupplierState::Inactive)
    }

    pub fn can_deactivate(self) -> bool {
        matches!(self, SupplierState::Active | SupplierState::Suspended)
    }
}

impl core::fmt::Display for SupplierState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SupplierState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVO" | "ACTIVE" => Ok(SupplierState::Active),
            "SUSPENDIDO" | "SUSPENDED" => Ok(SupplierState::Suspended),
            "INACTIVO" | "INACTIVE" => Ok(SupplierState::Inactive),
            _ => Err(DomainError::validation(format!("unknown supplier state {s:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificationStatus {
    #[serde(rename = "ACTIVA")]
    Active,
    #[serde(rename = "POR_VENCER")]
    ExpiringSoon,
    #[serde(rename = "VENCIDA")]
    Expired,
}

/// A regulatory certification held by a supplier.
///
/// Its status is never stored; see [`Certification::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub certification_type: String,
    pub number: String,
    pub issuing_authority: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Certification {
    pub fn status(&self, now: DateTime<Utc>) -> CertificationStatus {
        self.status_within(now, Duration::days(EXPIRY_WARNING_DAYS))
    }

    pub fn status_within(&self, now: DateTime<Utc>, window: Duration) -> CertificationStatus {
        if self.expires_at < now {
            CertificationStatus::Expired
        } else if self.expires_at < now + window {
            CertificationStatus::ExpiringSoon
        } else {
            CertificationStatus::Active
        }
    }

    /// Whole days until expiry (negative once expired).
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }
}

/// Weighted performance scores, each in 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvaluation {
    general_score: f64,
    on_time_delivery: f64,
    product_quality: f64,
    emergency_response: f64,
    evaluated_at: DateTime<Utc>,
}

impl PerformanceEvaluation {
    pub fn new(
        on_time_delivery: f64,
        product_quality: f64,
        emergency_response: f64,
        evaluated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        for (name, value) in [
            ("on-time delivery", on_time_delivery),
            ("product quality", product_quality),
            ("emergency response", emergency_response),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(DomainError::validation(format!(
                    "{name} score must be within 0..=100, got {value}"
                )));
            }
        }
        let (w_delivery, w_quality, w_emergency) = SCORE_WEIGHTS;
        let general_score = on_time_delivery * w_delivery
            + product_quality * w_quality
            + emergency_response * w_emergency;
        Ok(Self {
            general_score,
            on_time_delivery,
            product_quality,
            emergency_response,
            evaluated_at,
        })
    }

    pub fn general_score(&self) -> f64 {
        self.general_score
    }

    pub fn on_time_delivery(&self) -> f64 {
        self.on_time_delivery
    }

    pub fn product_quality(&self) -> f64 {
        self.product_quality
    }

    pub fn emergency_response(&self) -> f64 {
        self.emergency_response
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticsCapability {
    pub cold_chain: bool,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub average_lead_time_days: u32,
    #[serde(default)]
    pub storage_capacity: u32,
    #[serde(default)]
    pub coverage_zones: Vec<String>,
}

impl LogisticsCapability {
    /// Whether goods needing `temperature` can be handled (0 = ambient).
    pub fn supports_temperature(&self, temperature: f64) -> bool {
        if temperature == 0.0 {
            return true;
        }
        self.cold_chain && (self.min_temperature..=self.max_temperature).contains(&temperature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "DISPONIBLE")]
    Available,
    #[serde(rename = "NO_DISPONIBLE")]
    Unavailable,
    #[serde(rename = "AGOTADO")]
    OutOfStock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferedProduct {
    pub product_id: ProductId,
    #[serde(default)]
    pub supplier_code: String,
    pub base_price: f64,
    pub availability: Availability,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSupplier {
    pub supplier_id: SupplierId,
    pub legal_name: String,
    pub business_name: String,
    pub tax_id: String,
    pub contacts: Vec<Contact>,
    pub offered_products: Vec<OfferedProduct>,
    pub certifications: Vec<Certification>,
    pub logistics: Option<LogisticsCapability>,
    pub evaluation: Option<PerformanceEvaluation>,
}

/// Replaceable descriptive data; state and evaluation are not part of it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SupplierUpdate {
    pub legal_name: Option<String>,
    pub business_name: Option<String>,
    pub contacts: Option<Vec<Contact>>,
    pub offered_products: Option<Vec<OfferedProduct>>,
    pub certifications: Option<Vec<Certification>>,
    pub logistics: Option<LogisticsCapability>,
}

/// Aggregate root: qualified supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    id: SupplierId,
    legal_name: String,
    business_name: String,
    tax_id: String,
    state: SupplierState,
    contacts: Vec<Contact>,
    offered_products: Vec<OfferedProduct>,
    certifications: Vec<Certification>,
    evaluation: Option<PerformanceEvaluation>,
    logistics: Option<LogisticsCapability>,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

fn validate_logistics(logistics: Option<&LogisticsCapability>) -> DomainResult<()> {
    match logistics {
        Some(l) if l.min_temperature > l.max_temperature => Err(DomainError::validation(
            "logistics temperature range must be ordered (min <= max)",
        )),
        _ => Ok(()),
    }
}

impl Supplier {
    /// Register an active supplier, returning its SupplierQualified payload.
    pub fn register(
        cmd: RegisterSupplier,
        now: DateTime<Utc>,
    ) -> DomainResult<(Self, SupplierQualified)> {
        if cmd.legal_name.trim().is_empty() {
            return Err(DomainError::validation("legal name must not be empty"));
        }
        if cmd.tax_id.trim().is_empty() {
            return Err(DomainError::validation("tax id must not be empty"));
        }
        validate_logistics(cmd.logistics.as_ref())?;

        let supplier = Self {
            id: cmd.supplier_id,
            legal_name: cmd.legal_name.trim().to_string(),
            business_name: cmd.business_name.trim().to_string(),
            tax_id: cmd.tax_id.trim().to_string(),
            state: SupplierState::Active,
            contacts: cmd.contacts,
            offered_products: cmd.offered_products,
            certifications: cmd.certifications,
            evaluation: cmd.evaluation,
            logistics: cmd.logistics,
            registered_at: now,
            updated_at: now,
            version: 1,
        };

        let event = SupplierQualified {
            legal_name: supplier.legal_name.clone(),
            business_name: supplier.business_name.clone(),
            general_score: supplier.general_score(),
            certifications: supplier
                .certifications
                .iter()
                .map(|c| c.certification_type.clone())
                .collect(),
            cold_chain: supplier.has_cold_chain(),
        };
        Ok((supplier, event))
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn legal_name(&self) -> &str {
        &self.legal_name
    }

    pub fn business_name(&self) -> &str {
        &self.business_name
    }

    pub fn tax_id(&self) -> &str {
        &self.tax_id
    }

    pub fn state(&self) -> SupplierState {
        self.state
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn offered_products(&self) -> &[OfferedProduct] {
        &self.offered_products
    }

    pub fn certifications(&self) -> &[Certification] {
        &self.certifications
    }

    pub fn evaluation(&self) -> Option<&PerformanceEvaluation> {
        self.evaluation.as_ref()
    }

    pub fn logistics(&self) -> Option<&LogisticsCapability> {
        self.logistics.as_ref()
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// General score, or 0 when never evaluated.
    pub fn general_score(&self) -> f64 {
        self.evaluation.as_ref().map_or(0.0, |e| e.general_score)
    }

    pub fn has_cold_chain(&self) -> bool {
        self.logistics.as_ref().is_some_and(|l| l.cold_chain)
    }

    pub fn average_lead_time_days(&self) -> u32 {
        self.logistics.as_ref().map_or(u32::MAX, |l| l.average_lead_time_days)
    }

    /// At least one certification has not expired at `now`.
    pub fn has_valid_certification(&self, now: DateTime<Utc>) -> bool {
        self.certifications
            .iter()
            .any(|c| c.status(now) != CertificationStatus::Expired)
    }

    pub fn holds_certification(&self, certification_type: &str) -> bool {
        self.certifications
            .iter()
            .any(|c| c.certification_type.eq_ignore_ascii_case(certification_type))
    }

    /// Certifications with `now < expires_at < now + window`.
    pub fn expiring_certifications(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> impl Iterator<Item = &Certification> {
        self.certifications
            .iter()
            .filter(move |c| c.expires_at > now && c.expires_at < now + window)
    }

    pub fn offer_for(&self, product_id: &ProductId) -> Option<&OfferedProduct> {
        self.offered_products.iter().find(|p| &p.product_id == product_id)
    }

    pub fn suspend(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<SupplierSuspended> {
        self.ensure(self.state.can_suspend(), "suspend")?;
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("suspension reason must not be empty"));
        }
        self.state = SupplierState::Suspended;
        self.touch(now);
        Ok(SupplierSuspended {
            reason,
            suspended_at: now,
        })
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<SupplierActivated> {
        self.ensure(self.state.can_activate(), "activate")?;
        self.state = SupplierState::Active;
        self.touch(now);
        Ok(SupplierActivated {
            legal_name: self.legal_name.clone(),
            general_score: self.general_score(),
            activated_at: now,
        })
    }

    pub fn deactivate(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<SupplierDeactivated> {
        self.ensure(self.state.can_deactivate(), "deactivate")?;
        self.state = SupplierState::Inactive;
        self.touch(now);
        Ok(SupplierDeactivated {
            reason: reason.into(),
            deactivated_at: now,
        })
    }

    /// Replace the evaluation. Not a state transition; legal in every state.
    pub fn evaluate(&mut self, evaluation: PerformanceEvaluation) -> EvaluationUpdated {
        let previous_score = self.general_score();
        let event = EvaluationUpdated {
            previous_score,
            new_score: evaluation.general_score,
            on_time_delivery: evaluation.on_time_delivery,
            product_quality: evaluation.product_quality,
            emergency_response: evaluation.emergency_response,
        };
        let at = evaluation.evaluated_at;
        self.evaluation = Some(evaluation);
        self.touch(at);
        event
    }

    /// Apply descriptive changes.
    pub fn update(&mut self, update: SupplierUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = &update.legal_name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("legal name must not be empty"));
            }
        }
        validate_logistics(update.logistics.as_ref())?;

        if let Some(name) = update.legal_name {
            self.legal_name = name.trim().to_string();
        }
        if let Some(name) = update.business_name {
            self.business_name = name.trim().to_string();
        }
        if let Some(contacts) = update.contacts {
            self.contacts = contacts;
        }
        if let Some(products) = update.offered_products {
            self.offered_products = products;
        }
        if let Some(certifications) = update.certifications {
            self.certifications = certifications;
        }
        if let Some(logistics) = update.logistics {
            self.logistics = Some(logistics);
        }
        self.touch(now);
        Ok(())
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> DomainResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(DomainError::invalid_transition("supplier", self.state, action))
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
