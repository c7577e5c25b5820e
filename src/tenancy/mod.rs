use crate::database::manager::DatabaseManager;
use crate::database::models::user::Principal;
use crate::error::ApiError;

/// A principal's tenant scope, established once at authentication and
/// passed explicitly to anything that routes queries. `None` means a
/// system-level principal with no tenant partition of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope(Option<String>);

/// Logical data components, used to pick a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Principals, credentials and the blacklist
    Users,
    /// Sessions and refresh bookkeeping
    Auth,
    /// Shipment records
    Shipments,
    /// Tracking events
    Tracking,
    /// Token shift records
    Shifts,
}

impl TenantScope {
    pub fn system() -> Self {
        TenantScope(None)
    }

    pub fn of(tenant_id: impl Into<String>) -> Self {
        TenantScope(Some(tenant_id.into()))
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Scope derived from the authenticated principal. Pure; no fallback to
    /// ambient state.
    pub fn resolve(principal: &Principal) -> Self {
        TenantScope(principal.tenant_id.clone())
    }
}

/// Static component-to-partition table. System components always live in
/// the main database; tenant-owned data goes to the tenant's partition.
pub fn route(component: Component, scope: &TenantScope) -> Result<String, ApiError> {
    let name = match component {
        Component::Users | Component::Auth => DatabaseManager::SYSTEM_DB_NAME.to_string(),
        Component::Shipments | Component::Tracking | Component::Shifts => match scope.tenant_id() {
            Some(tenant) => format!("tenant_{}", tenant.replace('-', "_")),
            None => DatabaseManager::SYSTEM_DB_NAME.to_string(),
        },
    };

    if !DatabaseManager::is_valid_db_name(&name) {
        return Err(ApiError::bad_request(format!(
            "Cannot route to partition for tenant scope: {:?}",
            scope.tenant_id()
        )));
    }
    Ok(name)
}

/// Cross-tenant access looks like a missing resource, never a forbidden one
pub fn authorize_tenant_scope(
    principal: &Principal,
    resource_tenant: Option<&str>,
) -> Result<(), ApiError> {
    match resource_tenant {
        None => Ok(()),
        Some(tenant) if principal.tenant_id.as_deref() == Some(tenant) => Ok(()),
        Some(_) => Err(ApiError::not_found("Resource not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::user::Role;
    use chrono::Utc;
    use uuid::Uuid;

    fn principal(tenant_id: Option<&str>) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "x".to_string(),
            role: Role::Shipper,
            tenant_id: tenant_id.map(String::from),
            company_name: None,
            phone: None,
            is_verified: true,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn system_components_route_to_main() {
        let scope = TenantScope::of("acme-1a2b");
        assert_eq!(route(Component::Users, &scope).unwrap(), "freight_main");
        assert_eq!(route(Component::Auth, &scope).unwrap(), "freight_main");
    }

    #[test]
    fn tenant_components_route_to_partition() {
        let scope = TenantScope::of("acme-1a2b");
        assert_eq!(route(Component::Shipments, &scope).unwrap(), "tenant_acme_1a2b");
        assert_eq!(route(Component::Shifts, &scope).unwrap(), "tenant_acme_1a2b");
    }

    #[test]
    fn scopeless_principal_routes_to_main() {
        let scope = TenantScope::system();
        assert_eq!(route(Component::Tracking, &scope).unwrap(), "freight_main");
    }

    #[test]
    fn hostile_scope_is_rejected() {
        let scope = TenantScope::of("x; DROP DATABASE");
        assert!(route(Component::Shipments, &scope).is_err());
    }

    #[test]
    fn cross_tenant_reads_look_absent() {
        let alice = principal(Some("acme-1"));
        assert!(authorize_tenant_scope(&alice, Some("acme-1")).is_ok());
        assert!(authorize_tenant_scope(&alice, None).is_ok());

        let err = authorize_tenant_scope(&alice, Some("globex-2")).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
