//! # Domain Events
//!
//! Writes return their post-commit events instead of firing hooks from
//! inside the persistence layer.
//!
//! ```text
//! repository write ──► COMMIT ──► Committed { value, events }
//!                                         │
//!                                         ├──► caller uses value
//!                                         └──► EventSink / outbox ──► notifier
//! ```
//!
//! This module only decides *whether* an event is emitted. Delivery belongs
//! to the notification collaborator.

use serde::{Deserialize, Serialize};

use crate::catalog::ItemType;
use crate::stock::{ComboStockStatus, StockStatus};
use crate::types::{Domain, Plan, Subscription, Tenant, TenantStatus};

/// A state transition other systems may react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TenantCreated {
        tenant_id: String,
        owner_id: String,
    },
    TenantStatusChanged {
        tenant_id: String,
        from: TenantStatus,
        to: TenantStatus,
    },
    DomainCreated {
        tenant_id: String,
        domain_id: String,
        hostname: String,
    },
    DomainUpdated {
        tenant_id: String,
        domain_id: String,
        changed: Vec<String>,
    },
    SubscriptionCreated {
        tenant_id: String,
        subscription_id: String,
        plan_id: String,
    },
    SubscriptionUpdated {
        tenant_id: String,
        subscription_id: String,
        changed: Vec<String>,
    },
    /// Fanned out to every tenant on the plan.
    PlanUpdated {
        plan_id: String,
        tenant_ids: Vec<String>,
        changed: Vec<String>,
    },
    ProfileUpdated {
        user_id: String,
        tenant_id: Option<String>,
    },
    ItemCreated {
        tenant_id: String,
        item_id: String,
        item_type: ItemType,
    },
    ItemDeleted {
        tenant_id: String,
        item_id: String,
    },
    VariantStockChanged {
        tenant_id: String,
        variant_id: String,
        quantity: i64,
        status: StockStatus,
    },
    ComboStockStatusChanged {
        tenant_id: String,
        combo_id: String,
        from: ComboStockStatus,
        to: ComboStockStatus,
    },
}

impl DomainEvent {
    /// Stable name used as the outbox `event_type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::TenantCreated { .. } => "tenant_created",
            DomainEvent::TenantStatusChanged { .. } => "tenant_status_changed",
            DomainEvent::DomainCreated { .. } => "domain_created",
            DomainEvent::DomainUpdated { .. } => "domain_updated",
            DomainEvent::SubscriptionCreated { .. } => "subscription_created",
            DomainEvent::SubscriptionUpdated { .. } => "subscription_updated",
            DomainEvent::PlanUpdated { .. } => "plan_updated",
            DomainEvent::ProfileUpdated { .. } => "profile_updated",
            DomainEvent::ItemCreated { .. } => "item_created",
            DomainEvent::ItemDeleted { .. } => "item_deleted",
            DomainEvent::VariantStockChanged { .. } => "variant_stock_changed",
            DomainEvent::ComboStockStatusChanged { .. } => "combo_stock_status_changed",
        }
    }

    /// Tenant the event belongs to, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            DomainEvent::TenantCreated { tenant_id, .. }
            | DomainEvent::TenantStatusChanged { tenant_id, .. }
            | DomainEvent::DomainCreated { tenant_id, .. }
            | DomainEvent::DomainUpdated { tenant_id, .. }
            | DomainEvent::SubscriptionCreated { tenant_id, .. }
            | DomainEvent::SubscriptionUpdated { tenant_id, .. }
            | DomainEvent::ItemCreated { tenant_id, .. }
            | DomainEvent::ItemDeleted { tenant_id, .. }
            | DomainEvent::VariantStockChanged { tenant_id, .. }
            | DomainEvent::ComboStockStatusChanged { tenant_id, .. } => Some(tenant_id.as_str()),
            DomainEvent::ProfileUpdated { tenant_id, .. } => tenant_id.as_deref(),
            DomainEvent::PlanUpdated { .. } => None,
        }
    }

    /// Id of the entity the event is about.
    pub fn aggregate_id(&self) -> &str {
        match self {
            DomainEvent::TenantCreated { tenant_id, .. }
            | DomainEvent::TenantStatusChanged { tenant_id, .. } => tenant_id.as_str(),
            DomainEvent::DomainCreated { domain_id, .. }
            | DomainEvent::DomainUpdated { domain_id, .. } => domain_id.as_str(),
            DomainEvent::SubscriptionCreated {
                subscription_id, ..
            }
            | DomainEvent::SubscriptionUpdated {
                subscription_id, ..
            } => subscription_id.as_str(),
            DomainEvent::PlanUpdated { plan_id, .. } => plan_id.as_str(),
            DomainEvent::ProfileUpdated { user_id, .. } => user_id.as_str(),
            DomainEvent::ItemCreated { item_id, .. } | DomainEvent::ItemDeleted { item_id, .. } => {
                item_id.as_str()
            }
            DomainEvent::VariantStockChanged { variant_id, .. } => variant_id.as_str(),
            DomainEvent::ComboStockStatusChanged { combo_id, .. } => combo_id.as_str(),
        }
    }
}

// =============================================================================
// Committed<T>
// =============================================================================

/// Result of a committed write plus the events it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

impl<T> Committed<T> {
    pub fn new(value: T, events: Vec<DomainEvent>) -> Self {
        Committed { value, events }
    }

    pub fn quiet(value: T) -> Self {
        Committed {
            value,
            events: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Committed<U> {
        Committed {
            value: f(self.value),
            events: self.events,
        }
    }

    /// Publishes every event to `sink` and returns the value.
    pub fn dispatch(self, sink: &mut dyn EventSink) -> T {
        for event in &self.events {
            sink.publish(event);
        }
        self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Consumer of post-commit events.
pub trait EventSink {
    fn publish(&mut self, event: &DomainEvent);
}

impl EventSink for Vec<DomainEvent> {
    fn publish(&mut self, event: &DomainEvent) {
        self.push(event.clone());
    }
}

// =============================================================================
// Emission Rules
// =============================================================================

/// `TenantStatusChanged` when the status moved.
pub fn tenant_update_events(before: &Tenant, after: &Tenant) -> Vec<DomainEvent> {
    if before.status == after.status {
        return Vec::new();
    }
    vec![DomainEvent::TenantStatusChanged {
        tenant_id: after.id.clone(),
        from: before.status,
        to: after.status,
    }]
}

/// `DomainUpdated` when primary flag, SSL flag or kind changed.
pub fn domain_update_events(before: &Domain, after: &Domain) -> Vec<DomainEvent> {
    let mut changed = Vec::new();
    if before.is_primary != after.is_primary {
        changed.push("is_primary".to_string());
    }
    if before.ssl_enabled != after.ssl_enabled {
        changed.push("ssl_enabled".to_string());
    }
    if before.kind != after.kind {
        changed.push("kind".to_string());
    }

    if changed.is_empty() {
        return Vec::new();
    }
    vec![DomainEvent::DomainUpdated {
        tenant_id: after.tenant_id.clone(),
        domain_id: after.id.clone(),
        changed,
    }]
}

/// `SubscriptionUpdated` when status, end or trial end changed.
pub fn subscription_update_events(before: &Subscription, after: &Subscription) -> Vec<DomainEvent> {
    let mut changed = Vec::new();
    if before.status != after.status {
        changed.push("status".to_string());
    }
    if before.ends_at != after.ends_at {
        changed.push("ends_at".to_string());
    }
    if before.trial_ends_at != after.trial_ends_at {
        changed.push("trial_ends_at".to_string());
    }

    if changed.is_empty() {
        return Vec::new();
    }
    vec![DomainEvent::SubscriptionUpdated {
        tenant_id: after.tenant_id.clone(),
        subscription_id: after.id.clone(),
        changed,
    }]
}

/// `PlanUpdated` for the tenants on the plan when status, price or features
/// changed. No tenants, no event.
pub fn plan_update_events(before: &Plan, after: &Plan, tenant_ids: Vec<String>) -> Vec<DomainEvent> {
    let mut changed = Vec::new();
    if before.status != after.status {
        changed.push("status".to_string());
    }
    if before.price_cents != after.price_cents {
        changed.push("price".to_string());
    }
    if before.features != after.features {
        changed.push("features".to_string());
    }

    if changed.is_empty() || tenant_ids.is_empty() {
        return Vec::new();
    }
    vec![DomainEvent::PlanUpdated {
        plan_id: after.id.clone(),
        tenant_ids,
        changed,
    }]
}

/// `VariantStockChanged` when quantity or derived status moved.
pub fn stock_change_events(
    tenant_id: &str,
    variant_id: &str,
    before: (i64, StockStatus),
    after: (i64, StockStatus),
) -> Vec<DomainEvent> {
    if before == after {
        return Vec::new();
    }
    vec![DomainEvent::VariantStockChanged {
        tenant_id: tenant_id.to_string(),
        variant_id: variant_id.to_string(),
        quantity: after.0,
        status: after.1,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BillingCycle, DomainKind, PlanStatus};
    use chrono::Utc;

    fn domain() -> Domain {
        let now = Utc::now();
        Domain {
            id: "d1".into(),
            tenant_id: "t1".into(),
            hostname: "a.example.com".into(),
            kind: DomainKind::Subdomain,
            is_primary: false,
            ssl_enabled: false,
            ssl_expires_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn plan() -> Plan {
        let now = Utc::now();
        Plan {
            id: "p1".into(),
            name: "Starter".into(),
            description: None,
            price_cents: 900,
            currency: "USD".into(),
            features: vec!["catalog".into()],
            billing_cycle: BillingCycle::Monthly,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_domain_update_only_on_tracked_fields() {
        let before = domain();
        let mut after = before.clone();
        after.hostname = "b.example.com".into();
        assert!(domain_update_events(&before, &after).is_empty());

        after.is_primary = true;
        after.ssl_enabled = true;
        let events = domain_update_events(&before, &after);
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::DomainUpdated { changed, .. } => {
                assert_eq!(changed, &vec!["is_primary".to_string(), "ssl_enabled".to_string()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_plan_update_needs_tenants_and_tracked_change() {
        let before = plan();
        let mut after = before.clone();
        after.description = Some("new copy".into());
        assert!(plan_update_events(&before, &after, vec!["t1".into()]).is_empty());

        after.price_cents = 1200;
        assert!(plan_update_events(&before, &after, Vec::new()).is_empty());
        let events = plan_update_events(&before, &after, vec!["t1".into(), "t2".into()]);
        assert_eq!(events[0].event_type(), "plan_updated");
        assert_eq!(events[0].tenant_id(), None);
    }

    #[test]
    fn test_committed_dispatch() {
        let committed = Committed::new(
            42,
            vec![DomainEvent::ItemDeleted {
                tenant_id: "t1".into(),
                item_id: "i1".into(),
            }],
        );
        let mut sink: Vec<DomainEvent> = Vec::new();
        let value = committed.dispatch(&mut sink);
        assert_eq!(value, 42);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].aggregate_id(), "i1");
    }

    #[test]
    fn test_stock_change_events() {
        assert!(stock_change_events("t1", "v1", (3, StockStatus::LowStock), (3, StockStatus::LowStock)).is_empty());
        let events = stock_change_events("t1", "v1", (3, StockStatus::LowStock), (0, StockStatus::StockOut));
        assert_eq!(events[0].tenant_id(), Some("t1"));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = DomainEvent::TenantCreated {
            tenant_id: "t1".into(),
            owner_id: "u1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "tenant_created");
    }
}
