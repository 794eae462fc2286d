use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{ApiKeyHash, ApiKeyPrefix, TenantId, ThemeId, ThemeSlug, UserId};

/// Persisted representation of a tenant (table: `tenant`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Database record identifier.
    pub id: RecordId,
    /// Canonical tenant identifier handed to downstream handlers.
    pub tenant_id: TenantId,
    /// Human-friendly tenant name.
    pub name: String,
    /// URL slug, only used for theme-scoped routing.
    pub slug: String,
    /// Theme this tenant is bound to, if any.
    pub theme_id: Option<ThemeId>,
    /// When this record was first created.
    pub created_at: Option<Datetime>,
}

/// Payload used when inserting a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCreate {
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: String,
    pub theme_id: Option<ThemeId>,
}

/// Persisted representation of a theme (table: `theme`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRecord {
    pub id: RecordId,
    pub theme_id: ThemeId,
    pub slug: ThemeSlug,
    pub name: String,
    pub created_at: Option<Datetime>,
}

/// Payload used when inserting a new theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeCreate {
    pub theme_id: ThemeId,
    pub slug: ThemeSlug,
    pub name: String,
}

/// Persisted platform user (table: `user`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database record identifier
    pub id: RecordId,
    /// Platform user identifier, the `sub` of session tokens
    pub user_id: UserId,
    /// Owning tenant; `None` only for super admins
    pub tenant_id: Option<TenantId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    /// Role name within the tenant (not interpreted by this layer)
    pub role: String,
    /// Whether the user may select the active tenant per request
    pub is_super_admin: bool,
    /// Whether the user is active
    pub is_active: bool,
    pub created_at: Option<Datetime>,
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub role: String,
    pub is_super_admin: bool,
}

/// Persisted user-scoped access key (table: `access_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyRecord {
    /// Database record identifier
    pub id: RecordId,
    /// Owner of this key
    pub user_id: UserId,
    /// The key itself, stored lower-cased
    #[serde(rename = "secret")]
    pub key: String,
    /// Cleared on revocation, never set again by this layer
    pub is_active: bool,
    /// Last successful authentication with this key
    pub last_used_at: Option<Datetime>,
    pub created_at: Option<Datetime>,
}

/// Persisted tenant API key (table: `tenant_api_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantApiKeyRecord {
    /// Database identifier
    pub id: RecordId,
    /// Tenant this key selects
    pub tenant_id: TenantId,
    /// SHA-256 hash of the full key (never store raw keys)
    pub key_hash: ApiKeyHash,
    /// First part of the key for display/identification (e.g., "tn_abc12345")
    pub key_prefix: ApiKeyPrefix,
    /// Human-readable name for this key
    pub name: Option<String>,
    /// Whether the key is active (can be revoked)
    pub is_active: bool,
    pub created_at: Option<Datetime>,
}

/// Payload for creating a new tenant API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantApiKeyCreate {
    pub tenant_id: TenantId,
    pub key_hash: ApiKeyHash,
    pub key_prefix: ApiKeyPrefix,
    pub name: Option<String>,
}
