//! Supplier selection for generated orders.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use medchain_core::Priority;
use medchain_events::catalog::orders::OrderLine;
use medchain_events::catalog::suppliers::SupplierCandidate;

use crate::supplier::{Availability, Supplier, SupplierState};

/// Requirements suppliers must meet for an order of `priority`.
pub fn special_requirements(priority: Priority) -> Vec<String> {
    let items: &[&str] = match priority {
        Priority::Critical => &[
            "Entrega urgente",
            "Capacidad de respuesta 24/7",
            "Certificaciones médicas vigentes",
        ],
        Priority::High => &["Entrega rápida", "Certificaciones médicas vigentes"],
        Priority::Medium => &["Certificaciones médicas vigentes"],
        Priority::Low => &["Certificaciones básicas"],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Number of ordered products `supplier` explicitly offers as available, or
/// `None` when its declared product list rules it out.
fn product_fit(supplier: &Supplier, lines: &[OrderLine]) -> Option<usize> {
    if supplier.offered_products().is_empty() {
        return Some(0);
    }
    let mut matched = 0;
    for line in lines {
        match supplier.offer_for(&line.product_id) {
            Some(offer) if offer.availability == Availability::Available => matched += 1,
            _ => return None,
        }
    }
    Some(matched)
}

fn handles_temperatures(supplier: &Supplier, lines: &[OrderLine]) -> bool {
    let needs_cold = lines.iter().any(|l| l.required_temperature != 0.0);
    if !needs_cold {
        return true;
    }
    match supplier.logistics() {
        Some(logistics) => lines
            .iter()
            .all(|l| logistics.supports_temperature(l.required_temperature)),
        None => false,
    }
}

/// Rank suppliers able to fulfil `lines`, best first.
///
/// Eligible: Active, at least one unexpired certification, able to hold any
/// required temperature, and offering every product as available (suppliers
/// without a product list are not filtered on products).
///
/// Ordering: explicit product matches desc, general score desc, lead time asc,
/// then supplier id.
pub fn rank_candidates(
    suppliers: &[Supplier],
    lines: &[OrderLine],
    now: DateTime<Utc>,
) -> Vec<SupplierCandidate> {
    let mut eligible: Vec<(usize, &Supplier)> = suppliers
        .iter()
        .filter(|s| s.state() == SupplierState::Active)
        .filter(|s| s.has_valid_certification(now))
        .filter(|s| handles_temperatures(s, lines))
        .filter_map(|s| product_fit(s, lines).map(|fit| (fit, s)))
        .collect();

    eligible.sort_by(|(fit_a, a), (fit_b, b)| {
        fit_b
            .cmp(fit_a)
            .then_with(|| {
                b.general_score()
                    .partial_cmp(&a.general_score())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.average_lead_time_days().cmp(&b.average_lead_time_days()))
            .then_with(|| a.id_typed().cmp(&b.id_typed()))
    });

    eligible
        .into_iter()
        .map(|(_, s)| SupplierCandidate {
            supplier_id: s.id_typed(),
            general_score: s.general_score(),
            average_lead_time_days: s.logistics().map_or(0, |l| l.average_lead_time_days),
        })
        .collect()
}
