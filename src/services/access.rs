//! Seams to the platform's membership and entitlement services.
//!
//! Both live outside this service; the traits are the whole contract. The
//! bundled `StaticAccess` reads assignments from the config file for
//! deployments where the upstream gateway already enforces identity, and for
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;

/// Entitlement key gating the connector framework as a whole.
pub const DOCUMENT_FEEDS_CAPABILITY: &str = "document_feeds";

/// Membership checks.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn is_tenant_admin(&self, user_id: &str, tenant_id: &str) -> bool;
}

/// Subscription/feature checks.
#[async_trait]
pub trait Entitlements: Send + Sync {
    async fn tenant_has_capability(&self, tenant_id: &str, capability: &str) -> bool;
}

/// Config-driven implementation of both seams.
///
/// An empty map means "not enforced here": the check passes and enforcement
/// is the platform gateway's job. A non-empty map is authoritative.
pub struct StaticAccess {
    admins: HashMap<String, Vec<String>>,
    capabilities: HashMap<String, Vec<String>>,
}

impl StaticAccess {
    pub fn new(
        admins: HashMap<String, Vec<String>>,
        capabilities: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            admins,
            capabilities,
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticAccess {
    async fn is_tenant_admin(&self, user_id: &str, tenant_id: &str) -> bool {
        if self.admins.is_empty() {
            return true;
        }
        self.admins
            .get(tenant_id)
            .map(|users| users.iter().any(|u| u == user_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Entitlements for StaticAccess {
    async fn tenant_has_capability(&self, tenant_id: &str, capability: &str) -> bool {
        if self.capabilities.is_empty() {
            return true;
        }
        self.capabilities
            .get(tenant_id)
            .map(|caps| caps.iter().any(|c| c == capability))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_maps_allow() {
        let access = StaticAccess::new(HashMap::new(), HashMap::new());
        assert!(access.is_tenant_admin("anyone", "tenant-1").await);
        assert!(
            access
                .tenant_has_capability("tenant-1", DOCUMENT_FEEDS_CAPABILITY)
                .await
        );
    }

    #[tokio::test]
    async fn test_populated_maps_enforce() {
        let mut admins = HashMap::new();
        admins.insert("tenant-1".to_string(), vec!["alice".to_string()]);
        let mut caps = HashMap::new();
        caps.insert(
            "tenant-1".to_string(),
            vec![DOCUMENT_FEEDS_CAPABILITY.to_string()],
        );
        let access = StaticAccess::new(admins, caps);

        assert!(access.is_tenant_admin("alice", "tenant-1").await);
        assert!(!access.is_tenant_admin("bob", "tenant-1").await);
        assert!(!access.is_tenant_admin("alice", "tenant-2").await);

        assert!(
            access
                .tenant_has_capability("tenant-1", DOCUMENT_FEEDS_CAPABILITY)
                .await
        );
        assert!(
            !access
                .tenant_has_capability("tenant-2", DOCUMENT_FEEDS_CAPABILITY)
                .await
        );
    }
}
