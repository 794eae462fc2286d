//! Tenant directory: canonical tenant, theme and user lookups.

use anyhow::Result;

use crate::db::{Db, QueryBuilder, TenantRecord, UserRecord};
use crate::types::UserId;

/// Read-only view over tenants, their theme bindings, and users.
#[derive(Clone)]
pub struct TenantDirectory {
    db: Db,
}

impl TenantDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Resolve a raw tenant id candidate to its canonical record.
    pub async fn find_tenant(&self, raw_id: &str) -> Result<Option<TenantRecord>> {
        let raw_id = raw_id.trim();
        if raw_id.is_empty() {
            return Ok(None);
        }
        QueryBuilder::find_tenant_by_id(&self.db, raw_id).await
    }

    /// Tenants bound to the theme with this slug, most recently created first.
    ///
    /// An unknown slug yields an empty list.
    pub async fn tenants_for_theme(&self, theme_slug: &str) -> Result<Vec<TenantRecord>> {
        let Some(theme) = QueryBuilder::find_theme_by_slug(&self.db, theme_slug).await? else {
            return Ok(Vec::new());
        };
        QueryBuilder::find_tenants_by_theme(&self.db, &theme.theme_id).await
    }

    pub async fn find_user(&self, user_id: &UserId) -> Result<Option<UserRecord>> {
        QueryBuilder::find_user_by_id(&self.db, user_id).await
    }
}
