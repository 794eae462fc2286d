//! Request-scoped tenant and identity context.

use serde::{Deserialize, Serialize};

use crate::db::{TenantRecord, UserRecord};
use crate::types::{TenantId, UserId};

/// Which credential selected the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    TenantApiKey,
    UserAccessKey,
    TenantIdFallback,
}

impl ResolutionSource {
    /// Whether a session token may still attach a user after this source.
    ///
    /// Access keys attach their own owner, so they never get enriched.
    pub fn allows_session_enrichment(self) -> bool {
        !matches!(self, Self::UserAccessKey)
    }
}

/// The user fields exposed to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<TenantId>,
    pub is_super_admin: bool,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.user_id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            tenant_id: user.tenant_id.clone(),
            is_super_admin: user.is_super_admin,
        }
    }
}

/// Outcome of tenant resolution for one request.
///
/// Created fresh per request and handed to downstream handlers through request
/// extensions. It is never shared across requests or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionContext {
    #[serde(rename = "tenantId")]
    tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    user: Option<UserSummary>,
    #[serde(skip)]
    source: Option<ResolutionSource>,
}

impl ResolutionContext {
    pub fn new(tenant_id: TenantId, source: ResolutionSource) -> Self {
        Self {
            tenant_id,
            user: None,
            source: Some(source),
        }
    }

    pub fn with_user(mut self, user: UserSummary) -> Self {
        self.user = Some(user);
        self
    }

    /// Replace the active tenant. Only the theme binding step narrows this.
    pub(crate) fn set_tenant(&mut self, tenant_id: TenantId) {
        self.tenant_id = tenant_id;
    }

    pub(crate) fn attach_user(&mut self, user: UserSummary) {
        self.user = Some(user);
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn user(&self) -> Option<&UserSummary> {
        self.user.as_ref()
    }

    pub fn source(&self) -> Option<ResolutionSource> {
        self.source
    }

    /// Whether the attached user (if any) may pick the tenant per request.
    pub fn is_super_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_super_admin)
    }
}

/// A tenant bound to a theme, as exposed to theme-scoped handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundTenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
}

impl From<&TenantRecord> for BoundTenant {
    fn from(tenant: &TenantRecord) -> Self {
        Self {
            id: tenant.tenant_id.clone(),
            name: tenant.name.clone(),
            slug: tenant.slug.clone(),
        }
    }
}

/// Result of theme-tenant binding for a theme-scoped request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeScope {
    #[serde(rename = "themeSlug")]
    pub theme_slug: String,
    #[serde(rename = "activeTenantId")]
    pub active_tenant_id: TenantId,
    /// Bound tenants, newest first. Narrowed to one for tenant-bound users.
    pub tenants: Vec<BoundTenant>,
}
