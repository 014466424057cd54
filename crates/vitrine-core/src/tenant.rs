//! # Tenant Context
//!
//! Every tenant-scoped repository method takes `&TenantContext` as an
//! explicit argument. There is no ambient "current tenant".
//!
//! ```text
//! request ──► RequestScope::Global          (default, global entities only)
//!                 │
//!                 │ resolve by id / hostname (vitrine-db TenantRepository)
//!                 ▼
//!             RequestScope::Tenant(ctx) ──► require_tenant() ──► &TenantContext
//!                                                                   │
//!                                         categories().create(&ctx, ..)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The acting tenant for one request or session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    tenant_id: String,
}

impl TenantContext {
    /// Wraps an already-resolved tenant id.
    ///
    /// Resolvers call this after confirming the tenant is live and active.
    pub fn resolved(tenant_id: impl Into<String>) -> Self {
        TenantContext {
            tenant_id: tenant_id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Rejects a row that belongs to another tenant.
    pub fn ensure_owns(&self, entity: &str, row_tenant_id: &str) -> CoreResult<()> {
        if row_tenant_id == self.tenant_id {
            Ok(())
        } else {
            Err(CoreError::scope(format!(
                "{} belongs to a different tenant",
                entity
            )))
        }
    }
}

/// Scope established for a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestScope {
    /// No tenant: only global entities (plans, users) are reachable.
    #[default]
    Global,
    Tenant(TenantContext),
}

impl RequestScope {
    /// Returns the tenant context or a `Scope` error.
    pub fn require_tenant(&self) -> CoreResult<&TenantContext> {
        match self {
            RequestScope::Tenant(ctx) => Ok(ctx),
            RequestScope::Global => Err(CoreError::scope(
                "operation requires a tenant but none is established",
            )),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RequestScope::Global)
    }
}

impl From<TenantContext> for RequestScope {
    fn from(ctx: TenantContext) -> Self {
        RequestScope::Tenant(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scope_is_global() {
        let scope = RequestScope::default();
        assert!(scope.is_global());
        assert!(matches!(scope.require_tenant(), Err(CoreError::Scope { .. })));
    }

    #[test]
    fn test_tenant_scope_yields_context() {
        let scope: RequestScope = TenantContext::resolved("t-1").into();
        assert_eq!(scope.require_tenant().unwrap().tenant_id(), "t-1");
    }

    #[test]
    fn test_ensure_owns() {
        let ctx = TenantContext::resolved("t-1");
        assert!(ctx.ensure_owns("brand", "t-1").is_ok());
        assert!(ctx.ensure_owns("brand", "t-2").is_err());
    }
}
