//! Tenant API key validation.
//!
//! A tenant API key selects a tenant without identifying a user. This layer
//! treats validation as a black box: a key either maps to a tenant id or it
//! does not.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::{Db, QueryBuilder};
use crate::types::{ApiKeyHash, ApiKeyPrefix, TenantId};

/// Validates an opaque tenant-scoped key.
#[async_trait]
pub trait TenantKeyValidator: Send + Sync {
    /// `Ok(None)` means the key is not a valid tenant key.
    async fn validate(&self, key: &str) -> Result<Option<TenantId>>;
}

/// Fixed key table, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantKeys {
    keys: HashMap<String, TenantId>,
}

impl StaticTenantKeys {
    pub fn new(keys: impl IntoIterator<Item = (String, TenantId)>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl TenantKeyValidator for StaticTenantKeys {
    async fn validate(&self, key: &str) -> Result<Option<TenantId>> {
        Ok(self.keys.get(key).cloned())
    }
}

/// Store-backed keys, looked up by SHA-256 hash.
pub struct StoredTenantKeys {
    db: Db,
}

impl StoredTenantKeys {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantKeyValidator for StoredTenantKeys {
    async fn validate(&self, key: &str) -> Result<Option<TenantId>> {
        let key_hash = hash_api_key(key);
        let Some(record) = QueryBuilder::find_tenant_api_key_by_hash(&self.db, &key_hash).await?
        else {
            return Ok(None);
        };

        if !record.is_active {
            debug!(prefix = %record.key_prefix, "tenant api key is deactivated");
            return Ok(None);
        }

        Ok(Some(record.tenant_id))
    }
}

/// Tries each validator in order and returns the first match.
#[derive(Default)]
pub struct ChainedTenantKeys {
    validators: Vec<Box<dyn TenantKeyValidator>>,
}

impl ChainedTenantKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl TenantKeyValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

#[async_trait]
impl TenantKeyValidator for ChainedTenantKeys {
    async fn validate(&self, key: &str) -> Result<Option<TenantId>> {
        for validator in &self.validators {
            if let Some(tenant_id) = validator.validate(key).await? {
                return Ok(Some(tenant_id));
            }
        }
        Ok(None)
    }
}

/// Hash an API key for storage and lookup (don't store raw keys).
pub fn hash_api_key(key: &str) -> ApiKeyHash {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let result = hasher.finalize();
    ApiKeyHash::new(format!("{:x}", result))
}

/// Generate a new tenant API key with the format: prefix_randompart
/// Returns (full_key, prefix, hash)
pub fn generate_tenant_api_key() -> (String, ApiKeyPrefix, ApiKeyHash) {
    use uuid::Uuid;

    let prefix = ApiKeyPrefix::new(format!("tn_{}", &Uuid::new_v4().simple().to_string()[..8]));
    let secret = Uuid::new_v4().simple().to_string();
    let full_key = format!("{}_{}", prefix, secret);
    let key_hash = hash_api_key(&full_key);

    (full_key, prefix, key_hash)
}
