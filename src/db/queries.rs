// Database query helpers for SurrealDB.
//
// Everything the resolution layer reads goes through here. The create helpers
// exist for the CLI and for tests; issuing credentials is not part of request
// handling.

use crate::db::schema::*;
use crate::types::{ApiKeyHash, ThemeId, UserId};
use anyhow::{Result, anyhow};
use surrealdb::RecordId;
use surrealdb::{Surreal, engine::any::Any};

pub struct QueryBuilder;

impl QueryBuilder {
    /// Look up a tenant by its canonical identifier.
    pub async fn find_tenant_by_id(
        db: &Surreal<Any>,
        tenant_id: &str,
    ) -> Result<Option<TenantRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM tenant
                WHERE tenant_id = $tenant_id
                LIMIT 1
                "#,
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await?;

        let tenant: Option<TenantRecord> = res.take(0)?;
        Ok(tenant)
    }

    pub async fn find_theme_by_slug(
        db: &Surreal<Any>,
        slug: &str,
    ) -> Result<Option<ThemeRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM theme
                WHERE slug = $slug
                LIMIT 1
                "#,
            )
            .bind(("slug", slug.to_string()))
            .await?;

        let theme: Option<ThemeRecord> = res.take(0)?;
        Ok(theme)
    }

    /// All tenants bound to a theme, most recently created first.
    pub async fn find_tenants_by_theme(
        db: &Surreal<Any>,
        theme_id: &ThemeId,
    ) -> Result<Vec<TenantRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM tenant
                WHERE theme_id = $theme_id
                ORDER BY created_at DESC
                "#,
            )
            .bind(("theme_id", theme_id.clone()))
            .await?;

        let tenants: Vec<TenantRecord> = res.take(0)?;
        Ok(tenants)
    }

    pub async fn find_user_by_id(
        db: &Surreal<Any>,
        user_id: &UserId,
    ) -> Result<Option<UserRecord>> {
        let mut res = db
            .query("SELECT * FROM user WHERE user_id = $user_id LIMIT 1")
            .bind(("user_id", user_id.clone()))
            .await?;

        let user: Option<UserRecord> = res.take(0)?;
        Ok(user)
    }

    /// Find an active access key by its normalized (trimmed, lower-cased) value.
    pub async fn find_active_access_key(
        db: &Surreal<Any>,
        normalized_key: &str,
    ) -> Result<Option<AccessKeyRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM access_key
                WHERE secret = $secret
                  AND is_active = true
                LIMIT 1
                "#,
            )
            .bind(("secret", normalized_key.to_string()))
            .await?;

        let key: Option<AccessKeyRecord> = res.take(0)?;
        Ok(key)
    }

    /// Record a successful authentication with an access key.
    pub async fn touch_access_key(db: &Surreal<Any>, id: &RecordId) -> Result<()> {
        db.query("UPDATE $id SET last_used_at = time::now()")
            .bind(("id", id.clone()))
            .await?
            .check()?;
        Ok(())
    }

    /// Revoke an access key. Returns `false` if no active key matched.
    pub async fn revoke_access_key(db: &Surreal<Any>, normalized_key: &str) -> Result<bool> {
        let mut res = db
            .query(
                r#"
                UPDATE access_key SET is_active = false
                WHERE secret = $secret
                  AND is_active = true
                RETURN AFTER
                "#,
            )
            .bind(("secret", normalized_key.to_string()))
            .await?;

        let revoked: Vec<AccessKeyRecord> = res.take(0)?;
        Ok(!revoked.is_empty())
    }

    pub async fn find_tenant_api_key_by_hash(
        db: &Surreal<Any>,
        key_hash: &ApiKeyHash,
    ) -> Result<Option<TenantApiKeyRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM tenant_api_key
                WHERE key_hash = $key_hash
                LIMIT 1
                "#,
            )
            .bind(("key_hash", key_hash.clone()))
            .await?;

        let key: Option<TenantApiKeyRecord> = res.take(0)?;
        Ok(key)
    }

    pub async fn create_theme(db: &Surreal<Any>, data: &ThemeCreate) -> Result<ThemeRecord> {
        let mut res = db
            .query(
                r#"
                CREATE theme CONTENT {
                    theme_id: $theme_id,
                    slug: $slug,
                    name: $name
                }
                "#,
            )
            .bind(("theme_id", data.theme_id.clone()))
            .bind(("slug", data.slug.clone()))
            .bind(("name", data.name.clone()))
            .await?;

        let created: Option<ThemeRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create theme record"))
    }

    pub async fn create_tenant(db: &Surreal<Any>, data: &TenantCreate) -> Result<TenantRecord> {
        let mut res = db
            .query(
                r#"
                CREATE tenant CONTENT {
                    tenant_id: $tenant_id,
                    name: $name,
                    slug: $slug,
                    theme_id: $theme_id
                }
                "#,
            )
            .bind(("tenant_id", data.tenant_id.clone()))
            .bind(("name", data.name.clone()))
            .bind(("slug", data.slug.clone()))
            .bind(("theme_id", data.theme_id.clone()))
            .await?;

        let created: Option<TenantRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create tenant record"))
    }

    pub async fn create_user(db: &Surreal<Any>, data: &UserCreate) -> Result<UserRecord> {
        if !data.is_super_admin && data.tenant_id.is_none() {
            return Err(anyhow!(
                "user {} must belong to a tenant unless they are a super admin",
                data.user_id
            ));
        }

        let mut res = db
            .query(
                r#"
                CREATE user CONTENT {
                    user_id: $user_id,
                    tenant_id: $tenant_id,
                    first_name: $first_name,
                    last_name: $last_name,
                    email: $email,
                    role: $role,
                    is_super_admin: $is_super_admin,
                    is_active: true
                }
                "#,
            )
            .bind(("user_id", data.user_id.clone()))
            .bind(("tenant_id", data.tenant_id.clone()))
            .bind(("first_name", data.first_name.clone()))
            .bind(("last_name", data.last_name.clone()))
            .bind(("email", data.email.clone()))
            .bind(("role", data.role.clone()))
            .bind(("is_super_admin", data.is_super_admin))
            .await?;

        let created: Option<UserRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create user record"))
    }

    pub async fn set_user_active(
        db: &Surreal<Any>,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<()> {
        db.query("UPDATE user SET is_active = $is_active WHERE user_id = $user_id")
            .bind(("user_id", user_id.clone()))
            .bind(("is_active", is_active))
            .await?
            .check()?;
        Ok(())
    }

    /// Store an access key for a user. The key is normalized before storage.
    pub async fn create_access_key(
        db: &Surreal<Any>,
        user_id: &UserId,
        key: &str,
    ) -> Result<AccessKeyRecord> {
        let mut res = db
            .query(
                r#"
                CREATE access_key CONTENT {
                    user_id: $user_id,
                    secret: $secret,
                    is_active: true
                }
                "#,
            )
            .bind(("user_id", user_id.clone()))
            .bind(("secret", key.trim().to_lowercase()))
            .await?;

        let created: Option<AccessKeyRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create access key record"))
    }

    pub async fn create_tenant_api_key(
        db: &Surreal<Any>,
        data: &TenantApiKeyCreate,
    ) -> Result<TenantApiKeyRecord> {
        let mut res = db
            .query(
                r#"
                CREATE tenant_api_key CONTENT {
                    tenant_id: $tenant_id,
                    key_hash: $key_hash,
                    key_prefix: $key_prefix,
                    name: $name,
                    is_active: true
                }
                "#,
            )
            .bind(("tenant_id", data.tenant_id.clone()))
            .bind(("key_hash", data.key_hash.clone()))
            .bind(("key_prefix", data.key_prefix.clone()))
            .bind(("name", data.name.clone()))
            .await?;

        let created: Option<TenantApiKeyRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create tenant api key record"))
    }

    /// Deactivate a tenant API key by its display prefix.
    pub async fn deactivate_tenant_api_key_by_prefix(
        db: &Surreal<Any>,
        key_prefix: &str,
    ) -> Result<bool> {
        let mut res = db
            .query(
                r#"
                UPDATE tenant_api_key SET is_active = false
                WHERE key_prefix = $key_prefix
                RETURN AFTER
                "#,
            )
            .bind(("key_prefix", key_prefix.to_string()))
            .await?;

        let updated: Vec<TenantApiKeyRecord> = res.take(0)?;
        Ok(!updated.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use crate::types::{TenantId, ThemeSlug};

    async fn setup_test_db() -> Surreal<Any> {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    fn tenant(id: &str, theme: Option<&str>) -> TenantCreate {
        TenantCreate {
            tenant_id: TenantId::new(id),
            name: format!("Tenant {}", id),
            slug: id.to_string(),
            theme_id: theme.map(ThemeId::new),
        }
    }

    #[tokio::test]
    async fn test_find_tenant_by_id() {
        let db = setup_test_db().await;
        QueryBuilder::create_tenant(&db, &tenant("tenant-1", None))
            .await
            .unwrap();

        let found = QueryBuilder::find_tenant_by_id(&db, "tenant-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tenant_id.as_str(), "tenant-1");
        assert!(found.theme_id.is_none());

        let missing = QueryBuilder::find_tenant_by_id(&db, "tenant-404").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_tenants_by_theme_newest_first() {
        let db = setup_test_db().await;
        QueryBuilder::create_theme(
            &db,
            &ThemeCreate {
                theme_id: ThemeId::new("theme-1"),
                slug: ThemeSlug::new("aurora"),
                name: "Aurora".to_string(),
            },
        )
        .await
        .unwrap();

        for id in ["tenant-a", "tenant-b", "tenant-c"] {
            QueryBuilder::create_tenant(&db, &tenant(id, Some("theme-1")))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        QueryBuilder::create_tenant(&db, &tenant("tenant-x", None))
            .await
            .unwrap();

        let theme = QueryBuilder::find_theme_by_slug(&db, "aurora")
            .await
            .unwrap()
            .unwrap();
        let tenants = QueryBuilder::find_tenants_by_theme(&db, &theme.theme_id)
            .await
            .unwrap();

        let ids: Vec<&str> = tenants.iter().map(|t| t.tenant_id.as_str()).collect();
        assert_eq!(ids, vec!["tenant-c", "tenant-b", "tenant-a"]);
    }

    #[tokio::test]
    async fn test_access_key_lifecycle() {
        let db = setup_test_db().await;
        let user_id = UserId::new("user-1");
        QueryBuilder::create_tenant(&db, &tenant("tenant-1", None))
            .await
            .unwrap();
        QueryBuilder::create_user(
            &db,
            &UserCreate {
                user_id: user_id.clone(),
                tenant_id: Some(TenantId::new("tenant-1")),
                first_name: None,
                last_name: None,
                email: "one@example.com".to_string(),
                role: "editor".to_string(),
                is_super_admin: false,
            },
        )
        .await
        .unwrap();

        let created = QueryBuilder::create_access_key(&db, &user_id, "  AK_MixedCase  ")
            .await
            .unwrap();
        assert_eq!(created.key, "ak_mixedcase");
        assert!(created.last_used_at.is_none());

        QueryBuilder::touch_access_key(&db, &created.id).await.unwrap();
        let touched = QueryBuilder::find_active_access_key(&db, "ak_mixedcase")
            .await
            .unwrap()
            .unwrap();
        assert!(touched.last_used_at.is_some());

        assert!(QueryBuilder::revoke_access_key(&db, "ak_mixedcase").await.unwrap());
        assert!(!QueryBuilder::revoke_access_key(&db, "ak_mixedcase").await.unwrap());
        assert!(
            QueryBuilder::find_active_access_key(&db, "ak_mixedcase")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_regular_user_requires_tenant() {
        let db = setup_test_db().await;
        let result = QueryBuilder::create_user(
            &db,
            &UserCreate {
                user_id: UserId::new("orphan"),
                tenant_id: None,
                first_name: None,
                last_name: None,
                email: "orphan@example.com".to_string(),
                role: "editor".to_string(),
                is_super_admin: false,
            },
        )
        .await;
        assert!(result.is_err());
    }
}
