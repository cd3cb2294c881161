use stockpilot_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one tenant.
///
/// Workers pinned to a tenant use this to drop messages addressed to other tenants.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
