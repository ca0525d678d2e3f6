//! Supplier domain: qualified suppliers, their certifications and evaluations,
//! the audit trail model and supplier matching for generated orders.
//!
//! Pure domain logic only (no IO).

pub mod audit;
pub mod matching;
pub mod supplier;

pub use audit::{AuditTrace, ChangeType, SYSTEM_ACTOR};
pub use matching::{rank_candidates, special_requirements};
pub use supplier::{
    Availability, Certification, CertificationStatus, Contact, EXPIRY_WARNING_DAYS,
    LogisticsCapability, OfferedProduct, PerformanceEvaluation, RegisterSupplier, SCORE_WEIGHTS,
    Supplier, SupplierState, SupplierUpdate,
};
