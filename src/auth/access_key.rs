//! User access key validation.

use async_trait::async_trait;
use std::sync::Arc;
use surrealdb::RecordId;
use tracing::{debug, warn};

use crate::auth::context::{ResolutionContext, ResolutionSource, UserSummary};
use crate::auth::credentials::Credentials;
use crate::auth::error::ResolutionError;
use crate::db::{Db, QueryBuilder};
use crate::types::TenantId;

/// Keys match case-insensitively and ignore surrounding whitespace.
pub fn normalize_access_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Records that an access key was just used.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record_use(&self, key_id: &RecordId) -> anyhow::Result<()>;
}

/// Writes `last_used_at` on the access key record.
pub struct StoredUsageRecorder {
    db: Db,
}

impl StoredUsageRecorder {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UsageRecorder for StoredUsageRecorder {
    async fn record_use(&self, key_id: &RecordId) -> anyhow::Result<()> {
        QueryBuilder::touch_access_key(&self.db, key_id).await
    }
}

/// Validates user-scoped access keys and resolves the owner's tenant.
#[derive(Clone)]
pub struct AccessKeyValidator {
    db: Db,
    usage: Arc<dyn UsageRecorder>,
}

impl AccessKeyValidator {
    pub fn new(db: Db) -> Self {
        let usage = Arc::new(StoredUsageRecorder::new(db.clone()));
        Self { db, usage }
    }

    pub fn with_usage_recorder(mut self, usage: Arc<dyn UsageRecorder>) -> Self {
        self.usage = usage;
        self
    }

    /// Resolve a raw key to a context carrying its owner.
    ///
    /// An unknown or revoked key yields the same `InvalidApiKey` error a bad
    /// tenant key would, so callers cannot tell which namespace they missed.
    pub async fn validate(
        &self,
        raw_key: &str,
        credentials: &Credentials,
    ) -> Result<ResolutionContext, ResolutionError> {
        let key = normalize_access_key(raw_key);
        if key.is_empty() {
            return Err(ResolutionError::InvalidApiKey);
        }

        let record = QueryBuilder::find_active_access_key(&self.db, &key)
            .await
            .map_err(|e| ResolutionError::from_store(&e))?
            .ok_or(ResolutionError::InvalidApiKey)?;

        let owner = QueryBuilder::find_user_by_id(&self.db, &record.user_id)
            .await
            .map_err(|e| ResolutionError::from_store(&e))?
            .ok_or(ResolutionError::InvalidApiKey)?;

        if !owner.is_active {
            debug!(user_id = %owner.user_id, "access key owner is inactive");
            return Err(ResolutionError::UserInactive);
        }

        let tenant_id = if owner.is_super_admin {
            credentials
                .override_tenant_id()
                .map(TenantId::new)
                .or_else(|| owner.tenant_id.clone())
        } else {
            owner.tenant_id.clone()
        };
        let tenant_id = tenant_id.ok_or(ResolutionError::NoTenantAssociated)?;

        self.schedule_touch(record.id.clone());

        debug!(
            user_id = %owner.user_id,
            tenant_id = %tenant_id,
            super_admin = owner.is_super_admin,
            "resolved tenant from user access key"
        );

        Ok(
            ResolutionContext::new(tenant_id, ResolutionSource::UserAccessKey)
                .with_user(UserSummary::from(&owner)),
        )
    }

    /// Best-effort usage update on a detached task. Never fails the request.
    fn schedule_touch(&self, id: RecordId) {
        let usage = Arc::clone(&self.usage);
        tokio::spawn(async move {
            if let Err(e) = usage.record_use(&id).await {
                warn!(key_id = %id, "failed to record access key use: {:#}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, TenantCreate, UserCreate, create_connection, ensure_schema};
    use crate::types::UserId;
    use http::{HeaderMap, HeaderValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every write, counting attempts.
    #[derive(Default)]
    struct FailingUsage {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl UsageRecorder for FailingUsage {
        async fn record_use(&self, _key_id: &RecordId) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("store rejected write")
        }
    }

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    async fn seed_user(db: &Db, user_id: &str, tenant: Option<&str>, super_admin: bool, key: &str) {
        if let Some(tenant) = tenant {
            QueryBuilder::create_tenant(
                db,
                &TenantCreate {
                    tenant_id: TenantId::new(tenant),
                    name: tenant.to_string(),
                    slug: tenant.to_string(),
                    theme_id: None,
                },
            )
            .await
            .unwrap();
        }
        QueryBuilder::create_user(
            db,
            &UserCreate {
                user_id: UserId::new(user_id),
                tenant_id: tenant.map(TenantId::new),
                first_name: Some("Test".to_string()),
                last_name: Some("User".to_string()),
                email: format!("{}@example.com", user_id),
                role: "editor".to_string(),
                is_super_admin: super_admin,
            },
        )
        .await
        .unwrap();
        QueryBuilder::create_access_key(db, &UserId::new(user_id), key)
            .await
            .unwrap();
    }

    fn overrides(header: Option<&str>, query: Option<&str>) -> Credentials {
        let mut headers = HeaderMap::new();
        if let Some(h) = header {
            headers.insert("x-tenant-id", HeaderValue::from_str(h).unwrap());
        }
        let query = query.map(|q| format!("tenantId={}", q));
        Credentials::from_request(&headers, query.as_deref())
    }

    #[test]
    fn test_normalize_access_key() {
        assert_eq!(normalize_access_key("  AbC123 \n"), "abc123");
    }

    #[tokio::test]
    async fn test_regular_user_ignores_overrides() {
        let db = setup_test_db().await;
        seed_user(&db, "user-1", Some("tenant-1"), false, "ak_regular").await;
        let validator = AccessKeyValidator::new(db);

        let ctx = validator
            .validate("ak_regular", &overrides(Some("tenant-h"), Some("tenant-q")))
            .await
            .unwrap();
        assert_eq!(ctx.tenant_id().as_str(), "tenant-1");
        assert_eq!(ctx.user().unwrap().id.as_str(), "user-1");
        assert_eq!(ctx.source(), Some(ResolutionSource::UserAccessKey));
    }

    #[tokio::test]
    async fn test_super_admin_override_precedence() {
        let db = setup_test_db().await;
        seed_user(&db, "root", Some("home"), true, "ak_root").await;
        let validator = AccessKeyValidator::new(db);

        let ctx = validator
            .validate("ak_root", &overrides(Some("tenant-h"), Some("tenant-q")))
            .await
            .unwrap();
        assert_eq!(ctx.tenant_id().as_str(), "tenant-q");

        let ctx = validator
            .validate("ak_root", &overrides(Some("tenant-h"), None))
            .await
            .unwrap();
        assert_eq!(ctx.tenant_id().as_str(), "tenant-h");

        let ctx = validator
            .validate("ak_root", &overrides(None, None))
            .await
            .unwrap();
        assert_eq!(ctx.tenant_id().as_str(), "home");
    }

    #[tokio::test]
    async fn test_super_admin_without_any_tenant() {
        let db = setup_test_db().await;
        seed_user(&db, "root", None, true, "ak_root").await;
        let validator = AccessKeyValidator::new(db);

        let err = validator
            .validate("ak_root", &Credentials::default())
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::NoTenantAssociated);
    }

    #[tokio::test]
    async fn test_case_insensitive_match() {
        let db = setup_test_db().await;
        seed_user(&db, "user-1", Some("tenant-1"), false, "Ak_MiXeD").await;
        let validator = AccessKeyValidator::new(db);

        for key in ["Ak_MiXeD", "AK_MIXED", "ak_mixed", "  ak_mixed  "] {
            let ctx = validator.validate(key, &Credentials::default()).await.unwrap();
            assert_eq!(ctx.tenant_id().as_str(), "tenant-1");
        }
    }

    #[tokio::test]
    async fn test_unknown_key_is_invalid() {
        let db = setup_test_db().await;
        let validator = AccessKeyValidator::new(db);
        let err = validator
            .validate("nope", &Credentials::default())
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::InvalidApiKey);
    }

    #[tokio::test]
    async fn test_inactive_owner() {
        let db = setup_test_db().await;
        seed_user(&db, "user-1", Some("tenant-1"), false, "ak_one").await;
        QueryBuilder::set_user_active(&db, &UserId::new("user-1"), false)
            .await
            .unwrap();
        let validator = AccessKeyValidator::new(db);

        let err = validator
            .validate("ak_one", &Credentials::default())
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::UserInactive);
    }

    #[tokio::test]
    async fn test_revocation_is_terminal() {
        let db = setup_test_db().await;
        seed_user(&db, "user-1", Some("tenant-1"), false, "ak_one").await;
        let validator = AccessKeyValidator::new(db.clone());

        assert!(validator.validate("ak_one", &Credentials::default()).await.is_ok());
        QueryBuilder::revoke_access_key(&db, "ak_one").await.unwrap();

        for _ in 0..3 {
            let err = validator
                .validate("AK_ONE", &Credentials::default())
                .await
                .unwrap_err();
            assert_eq!(err, ResolutionError::InvalidApiKey);
        }
    }

    #[tokio::test]
    async fn test_last_used_is_touched_eventually() {
        let db = setup_test_db().await;
        seed_user(&db, "user-1", Some("tenant-1"), false, "ak_one").await;
        let validator = AccessKeyValidator::new(db.clone());

        validator.validate("ak_one", &Credentials::default()).await.unwrap();

        let mut touched = false;
        for _ in 0..50 {
            let record = QueryBuilder::find_active_access_key(&db, "ak_one")
                .await
                .unwrap()
                .unwrap();
            if record.last_used_at.is_some() {
                touched = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(touched);
    }

    #[tokio::test]
    async fn test_failed_touch_does_not_affect_response() {
        let db = setup_test_db().await;
        seed_user(&db, "user-1", Some("tenant-1"), false, "ak_one").await;
        let usage = Arc::new(FailingUsage::default());
        let validator = AccessKeyValidator::new(db.clone()).with_usage_recorder(usage.clone());

        for _ in 0..2 {
            let ctx = validator.validate("ak_one", &Credentials::default()).await.unwrap();
            assert_eq!(ctx.tenant_id().as_str(), "tenant-1");
            assert_eq!(ctx.user().unwrap().id.as_str(), "user-1");
        }

        let mut attempts = 0;
        for _ in 0..50 {
            attempts = usage.attempts.load(Ordering::SeqCst);
            if attempts == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(attempts, 2);

        let record = QueryBuilder::find_active_access_key(&db, "ak_one")
            .await
            .unwrap()
            .unwrap();
        assert!(record.last_used_at.is_none());
    }
}
