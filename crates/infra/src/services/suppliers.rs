//! Supplier use cases: registration, lifecycle commands, evaluation, the
//! audit trail, certification expiry notices and the reactions to order
//! lifecycle events.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{Span, debug, info, warn};

use medchain_core::{AggregateRoot, DomainError, ExpectedVersion, SupplierId};
use medchain_events::catalog::orders::{OrderConfirmed, OrderGenerated, OrderReceived};
use medchain_events::catalog::suppliers::{CertificationExpiring, RequiredProduct, SupplierRequest};
use medchain_events::{CatalogEvent, EventEnvelope, MessageBus, MessageBusExt};
use medchain_suppliers::{
    AuditTrace, ChangeType, EXPIRY_WARNING_DAYS, PerformanceEvaluation, RegisterSupplier, SYSTEM_ACTOR,
    Supplier, SupplierState, SupplierUpdate, rank_candidates, special_requirements,
};

use super::ServiceResult;
use crate::audit::AuditSink;
use crate::store::{KeyedStore, index};

/// Sub-scores of a new performance evaluation, each 0..=100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluateSupplier {
    pub on_time_delivery: f64,
    pub product_quality: f64,
    pub emergency_response: f64,
}

pub struct SupplierService {
    suppliers: Arc<dyn KeyedStore<Supplier>>,
    traces: Arc<dyn KeyedStore<AuditTrace>>,
    audit: Arc<dyn AuditSink>,
    bus: Arc<dyn MessageBus>,
    expiry_window: Duration,
    log: Span,
}

impl SupplierService {
    pub fn new(
        suppliers: Arc<dyn KeyedStore<Supplier>>,
        traces: Arc<dyn KeyedStore<AuditTrace>>,
        audit: Arc<dyn AuditSink>,
        bus: Arc<dyn MessageBus>,
        log: Span,
    ) -> Self {
        Self {
            suppliers,
            traces,
            audit,
            bus,
            expiry_window: Duration::days(EXPIRY_WARNING_DAYS),
            log,
        }
    }

    pub fn with_expiry_window(mut self, window: Duration) -> Self {
        self.expiry_window = window;
        self
    }

    pub fn register(&self, cmd: RegisterSupplier, actor: &str, now: DateTime<Utc>) -> ServiceResult<Supplier> {
        let (supplier, event) = Supplier::register(cmd, now)?;
        let id = supplier.id_typed();
        self.suppliers.create(supplier.clone())?;
        self.audit.append(
            AuditTrace::new(
                id.to_string(),
                ChangeType::Creation,
                format!("supplier {} registered", supplier.legal_name()),
                now,
            )
            .values("", supplier.state().as_str())
            .by(actor),
        )?;
        self.publish(id, event, now)?;
        info!(
            parent: &self.log,
            supplier_id = %id,
            cold_chain = supplier.has_cold_chain(),
            certifications = supplier.certifications().len(),
            "supplier registered"
        );
        Ok(supplier)
    }

    pub fn get(&self, id: SupplierId) -> ServiceResult<Supplier> {
        self.suppliers
            .get(&id)?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub fn list(&self, state: Option<SupplierState>) -> ServiceResult<Vec<Supplier>> {
        Ok(match state {
            Some(state) => self.suppliers.query(index::STATE, state.as_str())?,
            None => self.suppliers.list()?,
        })
    }

    /// Audit trail of one supplier, oldest first.
    pub fn audit_trail(&self, id: SupplierId) -> ServiceResult<Vec<AuditTrace>> {
        Ok(self.traces.query(index::SUBJECT_ID, &id.to_string())?)
    }

    pub fn update(
        &self,
        id: SupplierId,
        update: SupplierUpdate,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Supplier> {
        let (mut supplier, expected) = self.load(id)?;
        let changed = changed_fields(&update);
        let before = supplier.legal_name().to_string();
        supplier.update(update, now)?;

        let trace = AuditTrace::new(
            id.to_string(),
            ChangeType::Update,
            format!("updated {}", changed.join(", ")),
            now,
        )
        .values(before, supplier.legal_name())
        .by(actor);
        self.store_and_audit(&supplier, expected, trace)?;
        info!(parent: &self.log, supplier_id = %id, fields = ?changed, "supplier updated");
        Ok(supplier)
    }

    pub fn evaluate(
        &self,
        id: SupplierId,
        cmd: EvaluateSupplier,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Supplier> {
        let evaluation = PerformanceEvaluation::new(
            cmd.on_time_delivery,
            cmd.product_quality,
            cmd.emergency_response,
            now,
        )?;
        let (mut supplier, expected) = self.load(id)?;
        let event = supplier.evaluate(evaluation);

        let trace = AuditTrace::new(id.to_string(), ChangeType::Evaluation, "performance evaluated", now)
            .values(format!("{:.2}", event.previous_score), format!("{:.2}", event.new_score))
            .by(actor);
        self.store_and_audit(&supplier, expected, trace)?;
        info!(
            parent: &self.log,
            supplier_id = %id,
            previous_score = event.previous_score,
            new_score = event.new_score,
            "supplier evaluated"
        );
        self.publish(id, event, now)?;
        Ok(supplier)
    }

    pub fn suspend(
        &self,
        id: SupplierId,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Supplier> {
        let (mut supplier, expected) = self.load(id)?;
        let from = supplier.state();
        let event = supplier.suspend(reason, now)?;
        let trace = AuditTrace::new(id.to_string(), ChangeType::Suspension, format!("suspended: {reason}"), now)
            .values(from.as_str(), supplier.state().as_str())
            .by(actor);
        self.store_and_audit(&supplier, expected, trace)?;
        self.publish(id, event, now)?;
        info!(parent: &self.log, supplier_id = %id, from = %from, reason, "supplier suspended");
        Ok(supplier)
    }

    pub fn activate(&self, id: SupplierId, actor: &str, now: DateTime<Utc>) -> ServiceResult<Supplier> {
        let (mut supplier, expected) = self.load(id)?;
        let from = supplier.state();
        let event = supplier.activate(now)?;
        let trace = AuditTrace::new(id.to_string(), ChangeType::Activation, "activated", now)
            .values(from.as_str(), supplier.state().as_str())
            .by(actor);
        self.store_and_audit(&supplier, expected, trace)?;
        self.publish(id, event, now)?;
        info!(parent: &self.log, supplier_id = %id, from = %from, "supplier activated");
        Ok(supplier)
    }

    pub fn deactivate(
        &self,
        id: SupplierId,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Supplier> {
        let (mut supplier, expected) = self.load(id)?;
        let from = supplier.state();
        let event = supplier.deactivate(reason, now)?;
        let trace = AuditTrace::new(id.to_string(), ChangeType::Deactivation, format!("deactivated: {reason}"), now)
            .values(from.as_str(), supplier.state().as_str())
            .by(actor);
        self.store_and_audit(&supplier, expected, trace)?;
        self.publish(id, event, now)?;
        info!(parent: &self.log, supplier_id = %id, from = %from, reason, "supplier deactivated");
        Ok(supplier)
    }

    /// Publish a CertificationExpiring notice for every certification expiring
    /// within the window. Returns the number of notices published.
    pub fn check_expiring_certifications(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let suppliers = self.suppliers.list()?;
        let mut published = 0;
        for supplier in &suppliers {
            for cert in supplier.expiring_certifications(now, self.expiry_window) {
                let event = CertificationExpiring {
                    certificate_number: cert.number.clone(),
                    certification_type: cert.certification_type.clone(),
                    expires_at: cert.expires_at,
                    days_remaining: cert.days_remaining(now),
                };
                match self.publish(supplier.id_typed(), event, now) {
                    Ok(()) => published += 1,
                    Err(err) => warn!(
                        parent: &self.log,
                        supplier_id = %supplier.id_typed(),
                        certificate = %cert.number,
                        error = ?err,
                        "failed to publish certification expiry notice"
                    ),
                }
            }
        }
        info!(
            parent: &self.log,
            suppliers = suppliers.len(),
            published,
            "certification expiry sweep finished"
        );
        Ok(published)
    }

    /// React to a generated order: rank the active suppliers that can fulfil
    /// it and publish a SupplierRequest. No request without active suppliers.
    pub fn request_suppliers(
        &self,
        order_id: &str,
        order: &OrderGenerated,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<SupplierRequest>> {
        let active = self.suppliers.query(index::STATE, SupplierState::Active.as_str())?;
        if active.is_empty() {
            warn!(
                parent: &self.log,
                order_id,
                order_number = %order.order_number,
                "no active suppliers; supplier request not emitted"
            );
            return Ok(None);
        }

        let candidates = rank_candidates(&active, &order.items, now);
        if candidates.is_empty() {
            warn!(
                parent: &self.log,
                order_id,
                active = active.len(),
                "no active supplier meets the order's requirements"
            );
        }

        let request = SupplierRequest {
            order_number: order.order_number.clone(),
            priority: order.priority,
            reason: order.reason.clone(),
            total_items: order.total_items,
            total_value: order.total_value,
            special_requirements: special_requirements(order.priority),
            required_products: order
                .items
                .iter()
                .map(|line| RequiredProduct {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    required_temperature: line.required_temperature,
                    cold_chain_required: line.required_temperature != 0.0,
                })
                .collect(),
            candidates,
        };
        self.bus.emit(&EventEnvelope::new(order_id, request.clone(), now))?;
        info!(
            parent: &self.log,
            order_id,
            priority = %request.priority,
            candidates = request.candidates.len(),
            "supplier request published"
        );
        Ok(Some(request))
    }

    pub fn record_order_confirmed(&self, order: &OrderConfirmed) -> ServiceResult<bool> {
        self.audit_order(
            order.supplier_id,
            &order.order_number,
            ChangeType::OrderConfirmed,
            order.confirmed_at,
        )
    }

    pub fn record_order_received(&self, order: &OrderReceived) -> ServiceResult<bool> {
        self.audit_order(
            order.supplier_id,
            &order.order_number,
            ChangeType::OrderReceived,
            order.received_at,
        )
    }

    /// Append an order-lifecycle trace to the supplier's audit trail.
    /// Supplier state is not touched.
    fn audit_order(
        &self,
        supplier_id: Option<SupplierId>,
        order_number: &str,
        change_type: ChangeType,
        at: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        let Some(supplier_id) = supplier_id else {
            warn!(parent: &self.log, order_number, "order event carries no supplier; nothing to audit");
            return Ok(false);
        };
        if self.suppliers.get(&supplier_id)?.is_none() {
            warn!(
                parent: &self.log,
                supplier_id = %supplier_id,
                order_number,
                "order event for unknown supplier ignored"
            );
            return Ok(false);
        }
        let already_audited = self
            .traces
            .query(index::SUBJECT_ID, &supplier_id.to_string())?
            .iter()
            .any(|t| t.change_type == change_type && t.new_value == order_number);
        if already_audited {
            debug!(
                parent: &self.log,
                supplier_id = %supplier_id,
                order_number,
                change_type = %change_type,
                "order event already audited"
            );
            return Ok(false);
        }
        self.audit.append(
            AuditTrace::new(
                supplier_id.to_string(),
                change_type,
                format!("order {order_number}: {change_type}"),
                at,
            )
            .values("", order_number)
            .by(SYSTEM_ACTOR),
        )?;
        info!(
            parent: &self.log,
            supplier_id = %supplier_id,
            order_number,
            change_type = %change_type,
            "order event audited"
        );
        Ok(true)
    }

    fn load(&self, id: SupplierId) -> ServiceResult<(Supplier, ExpectedVersion)> {
        let supplier = self.get(id)?;
        let expected = ExpectedVersion::Exact(AggregateRoot::version(&supplier));
        Ok((supplier, expected))
    }

    fn store_and_audit(
        &self,
        supplier: &Supplier,
        expected: ExpectedVersion,
        trace: AuditTrace,
    ) -> ServiceResult<()> {
        self.suppliers.update(supplier.clone(), expected)?;
        self.audit.append(trace)?;
        Ok(())
    }

    fn publish<E: CatalogEvent>(&self, id: SupplierId, event: E, now: DateTime<Utc>) -> ServiceResult<()> {
        self.bus.emit(&EventEnvelope::new(id.to_string(), event, now))?;
        Ok(())
    }
}

fn changed_fields(update: &SupplierUpdate) -> Vec<&'static str> {
    [
        ("legal_name", update.legal_name.is_some()),
        ("business_name", update.business_name.is_some()),
        ("contacts", update.contacts.is_some()),
        ("offered_products", update.offered_products.is_some()),
        ("certifications", update.certifications.is_some()),
        ("logistics", update.logistics.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
}

#[cfg(test)]
mod tests {
    use medchain_core::{OrderId, Priority, ProductId};
    use medchain_events::Topic;
    use medchain_events::catalog::orders::OrderLine;

    use super::*;
    use crate::audit::AuditError;
    use crate::services::ErrorKind;
    use crate::services::testing::{Fixture, registration};

    fn generated(priority: Priority, temperature: f64) -> OrderGenerated {
        OrderGenerated {
            order_number: "ORD-20260101-abcdef12".into(),
            supplier_id: None,
            reason: "stock low".into(),
            priority,
            total_items: 1,
            total_value: 90.0,
            items: vec![OrderLine {
                product_id: ProductId::new("sku-1").unwrap(),
                quantity: 45,
                unit_price: 2.0,
                required_temperature: temperature,
            }],
        }
    }

    #[test]
    fn registration_is_audited_and_announced() {
        let fx = Fixture::new();
        let now = Utc::now();
        let supplier = fx.suppliers.register(registration("Acme Pharma", now), "ops", now).unwrap();

        let trail = fx.suppliers.audit_trail(supplier.id_typed()).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].change_type, ChangeType::Creation);
        assert_eq!(trail[0].actor, "ops");
        assert_eq!(trail[0].new_value, "ACTIVO");
        assert_eq!(fx.published(Topic::SupplierEvents), 1);
    }

    #[test]
    fn lifecycle_commands_are_audited_in_order() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);

        fx.suppliers.suspend(id, "late deliveries", "ops", now).unwrap();
        let err = fx.suppliers.suspend(id, "again", "ops", now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        fx.suppliers.activate(id, "ops", now).unwrap();
        fx.suppliers.deactivate(id, "contract ended", "ops", now).unwrap();

        let kinds: Vec<ChangeType> = fx
            .suppliers
            .audit_trail(id)
            .unwrap()
            .into_iter()
            .map(|t| t.change_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ChangeType::Creation,
                ChangeType::Suspension,
                ChangeType::Activation,
                ChangeType::Deactivation
            ]
        );
        assert_eq!(fx.suppliers.list(Some(SupplierState::Inactive)).unwrap().len(), 1);
    }

    #[test]
    fn evaluation_replaces_the_score() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);
        let cmd = EvaluateSupplier {
            on_time_delivery: 100.0,
            product_quality: 80.0,
            emergency_response: 60.0,
        };
        let supplier = fx.suppliers.evaluate(id, cmd, "ops", now).unwrap();
        assert!((supplier.general_score() - 83.0).abs() < 1e-9);

        let out_of_range = EvaluateSupplier { on_time_delivery: 120.0, ..cmd };
        let err = fx.suppliers.evaluate(id, out_of_range, "ops", now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn update_records_changed_fields() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);
        let update = SupplierUpdate {
            legal_name: Some("Acme Pharma S.A.S.".into()),
            ..Default::default()
        };
        fx.suppliers.update(id, update, "ops", now).unwrap();

        let trail = fx.suppliers.audit_trail(id).unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.change_type, ChangeType::Update);
        assert_eq!(last.old_value, "Acme Pharma");
        assert_eq!(last.new_value, "Acme Pharma S.A.S.");
        assert!(last.description.contains("legal_name"));
    }

    #[test]
    fn generated_order_yields_ranked_request_with_requirements() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);

        let request = fx
            .suppliers
            .request_suppliers(&OrderId::new().to_string(), &generated(Priority::Critical, 0.0), now)
            .unwrap()
            .unwrap();
        assert_eq!(request.candidates[0].supplier_id, id);
        assert_eq!(request.special_requirements.len(), 3);
        assert_eq!(request.required_products[0].quantity, 45);
        assert!(!request.required_products[0].cold_chain_required);
        assert_eq!(fx.published(Topic::SupplierEvents), 2);
    }

    #[test]
    fn no_request_without_active_suppliers() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);
        fx.suppliers.suspend(id, "audit", "ops", now).unwrap();
        let before = fx.published(Topic::SupplierEvents);

        let request = fx
            .suppliers
            .request_suppliers(&OrderId::new().to_string(), &generated(Priority::High, 0.0), now)
            .unwrap();
        assert!(request.is_none());
        assert_eq!(fx.published(Topic::SupplierEvents), before);
    }

    #[test]
    fn confirmed_order_is_audited_without_state_change() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);
        let before = fx.suppliers.get(id).unwrap();

        let audited = fx
            .suppliers
            .record_order_confirmed(&OrderConfirmed {
                order_number: "ORD-1".into(),
                supplier_id: Some(id),
                confirmed_at: now,
            })
            .unwrap();
        assert!(audited);
        assert_eq!(fx.suppliers.get(id).unwrap(), before);
        let trail = fx.suppliers.audit_trail(id).unwrap();
        assert_eq!(trail.last().unwrap().change_type, ChangeType::OrderConfirmed);
        assert_eq!(trail.last().unwrap().actor, SYSTEM_ACTOR);
    }

    #[test]
    fn redelivered_order_event_is_audited_once() {
        let fx = Fixture::new();
        let now = Utc::now();
        let id = fx.supplier("Acme Pharma", now);
        let received = OrderReceived {
            order_number: "ORD-7".into(),
            supplier_id: Some(id),
            received_at: now,
        };

        assert!(fx.suppliers.record_order_received(&received).unwrap());
        assert!(!fx.suppliers.record_order_received(&received).unwrap());

        let other = OrderReceived { order_number: "ORD-8".into(), ..received };
        assert!(fx.suppliers.record_order_received(&other).unwrap());

        let received_traces = fx
            .suppliers
            .audit_trail(id)
            .unwrap()
            .into_iter()
            .filter(|t| t.change_type == ChangeType::OrderReceived)
            .count();
        assert_eq!(received_traces, 2);
    }

    #[test]
    fn unknown_or_missing_supplier_is_a_no_op() {
        let fx = Fixture::new();
        let now = Utc::now();
        let unknown = OrderReceived {
            order_number: "ORD-1".into(),
            supplier_id: Some(SupplierId::new()),
            received_at: now,
        };
        assert!(!fx.suppliers.record_order_received(&unknown).unwrap());
        let unassigned = OrderReceived { supplier_id: None, ..unknown };
        assert!(!fx.suppliers.record_order_received(&unassigned).unwrap());
    }

    #[test]
    fn audit_outage_is_transient() {
        let fx = Fixture::with_audit_failure(AuditError::Unavailable("disk full".into()));
        let now = Utc::now();
        let err = fx
            .suppliers
            .register(registration("Acme Pharma", now), "ops", now)
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn expiring_certifications_are_announced_once_each() {
        let fx = Fixture::new();
        let now = Utc::now();
        let mut cmd = registration("Acme Pharma", now);
        cmd.certifications = vec![
            Fixture::certification("INVIMA", now + Duration::days(10)),
            Fixture::certification("BPM", now + Duration::days(200)),
            Fixture::certification("ISO", now - Duration::days(1)),
        ];
        fx.suppliers.register(cmd, "ops", now).unwrap();
        let before = fx.published(Topic::NotificationEvents);

        assert_eq!(fx.suppliers.check_expiring_certifications(now).unwrap(), 1);
        assert_eq!(fx.published(Topic::NotificationEvents), before + 1);
    }
}
