//! Theme-tenant binding for theme-scoped routes.

use tracing::debug;

use crate::auth::context::{BoundTenant, ResolutionContext, ThemeScope};
use crate::auth::directory::TenantDirectory;
use crate::auth::error::ResolutionError;

/// Checks that the resolved caller may act on a theme and picks the active
/// tenant among the tenants bound to it.
#[derive(Clone)]
pub struct ThemeBindingResolver {
    directory: TenantDirectory,
}

impl ThemeBindingResolver {
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }

    /// Bind `ctx` to the theme with this slug.
    ///
    /// A tenant-bound user must belong to a bound tenant, and the scope is
    /// narrowed to that tenant. Anyone else (no user, or a super admin) sees
    /// every bound tenant; the active one is the tenant already resolved if
    /// it is bound, otherwise the most recently created bound tenant.
    ///
    /// A theme with no bound tenants is `ThemeNotFound` only for callers
    /// without a tenant restriction. A tenant-bound user gets
    /// `TenantThemeMismatch` either way.
    pub async fn bind(
        &self,
        ctx: &mut ResolutionContext,
        theme_slug: &str,
    ) -> Result<ThemeScope, ResolutionError> {
        let bound = self
            .directory
            .tenants_for_theme(theme_slug)
            .await
            .map_err(|e| ResolutionError::from_store(&e))?;

        let restricted_to = match ctx.user() {
            Some(user) if !user.is_super_admin => Some(
                user.tenant_id
                    .clone()
                    .ok_or(ResolutionError::NoTenantAssociated)?,
            ),
            _ => None,
        };

        let (active, tenants) = match restricted_to {
            // Unknown and unbound themes look the same as a foreign theme
            Some(user_tenant) => {
                let tenant = bound
                    .iter()
                    .find(|t| t.tenant_id == user_tenant)
                    .ok_or(ResolutionError::TenantThemeMismatch)?;
                (tenant, vec![BoundTenant::from(tenant)])
            }
            None => {
                let newest = bound.first().ok_or(ResolutionError::ThemeNotFound)?;
                let tenant = bound
                    .iter()
                    .find(|t| &t.tenant_id == ctx.tenant_id())
                    .unwrap_or(newest);
                (tenant, bound.iter().map(BoundTenant::from).collect())
            }
        };

        let active_tenant_id = active.tenant_id.clone();
        debug!(
            theme = theme_slug,
            tenant_id = %active_tenant_id,
            bound = tenants.len(),
            "bound request to theme"
        );
        ctx.set_tenant(active_tenant_id.clone());

        Ok(ThemeScope {
            theme_slug: theme_slug.to_string(),
            active_tenant_id,
            tenants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::{ResolutionSource, UserSummary};
    use crate::db::{
        DatabaseConfig, Db, QueryBuilder, TenantCreate, ThemeCreate, create_connection,
        ensure_schema,
    };
    use crate::types::{TenantId, ThemeId, ThemeSlug, UserId};

    /// Theme "storefront" bound to tenant-a then tenant-b; tenant-c unbound.
    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();

        QueryBuilder::create_theme(
            &db,
            &ThemeCreate {
                theme_id: ThemeId::new("theme-1"),
                slug: ThemeSlug::new("storefront"),
                name: "Storefront".to_string(),
            },
        )
        .await
        .unwrap();

        for (tenant, theme) in [
            ("tenant-a", Some("theme-1")),
            ("tenant-b", Some("theme-1")),
            ("tenant-c", None),
        ] {
            QueryBuilder::create_tenant(
                &db,
                &TenantCreate {
                    tenant_id: TenantId::new(tenant),
                    name: tenant.to_uppercase(),
                    slug: tenant.to_string(),
                    theme_id: theme.map(ThemeId::new),
                },
            )
            .await
            .unwrap();
            // Distinct creation times for ordering
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        db
    }

    fn user(tenant: Option<&str>, super_admin: bool) -> UserSummary {
        UserSummary {
            id: UserId::new("user-1"),
            first_name: None,
            last_name: None,
            email: "user@example.com".to_string(),
            role: "editor".to_string(),
            tenant_id: tenant.map(TenantId::new),
            is_super_admin: super_admin,
        }
    }

    fn ctx(tenant: &str) -> ResolutionContext {
        ResolutionContext::new(TenantId::new(tenant), ResolutionSource::UserAccessKey)
    }

    fn ctx_for_member(tenant: &str) -> ResolutionContext {
        ctx(tenant).with_user(user(Some(tenant), false))
    }

    #[tokio::test]
    async fn test_member_of_bound_tenant_is_narrowed() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx = ctx("tenant-a").with_user(user(Some("tenant-a"), false));
        let scope = binder.bind(&mut ctx, "storefront").await.unwrap();

        assert_eq!(scope.tenants.len(), 1);
        assert_eq!(scope.tenants[0].id.as_str(), "tenant-a");
        assert_eq!(scope.active_tenant_id.as_str(), "tenant-a");
        assert_eq!(ctx.tenant_id().as_str(), "tenant-a");
    }

    #[tokio::test]
    async fn test_member_of_unbound_tenant_is_rejected() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx = ctx("tenant-c").with_user(user(Some("tenant-c"), false));
        let err = binder.bind(&mut ctx, "storefront").await.unwrap_err();
        assert_eq!(err, ResolutionError::TenantThemeMismatch);
        assert_eq!(ctx.tenant_id().as_str(), "tenant-c");
    }

    #[tokio::test]
    async fn test_regular_user_without_tenant() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx = ctx("tenant-a").with_user(user(None, false));
        let err = binder.bind(&mut ctx, "storefront").await.unwrap_err();
        assert_eq!(err, ResolutionError::NoTenantAssociated);
    }

    #[tokio::test]
    async fn test_super_admin_sees_all_bound_tenants() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx = ctx("tenant-c").with_user(user(None, true));
        let scope = binder.bind(&mut ctx, "storefront").await.unwrap();

        let ids: Vec<&str> = scope.tenants.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tenant-b", "tenant-a"]);
        // Resolved tenant not bound: newest bound tenant becomes active
        assert_eq!(scope.active_tenant_id.as_str(), "tenant-b");
        assert_eq!(ctx.tenant_id().as_str(), "tenant-b");
    }

    #[tokio::test]
    async fn test_anonymous_keeps_resolved_tenant_when_bound() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx =
            ResolutionContext::new(TenantId::new("tenant-a"), ResolutionSource::TenantApiKey);
        let scope = binder.bind(&mut ctx, "storefront").await.unwrap();

        assert_eq!(scope.tenants.len(), 2);
        assert_eq!(scope.active_tenant_id.as_str(), "tenant-a");
    }

    #[tokio::test]
    async fn test_unknown_theme() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx =
            ResolutionContext::new(TenantId::new("tenant-a"), ResolutionSource::TenantApiKey);
        let err = binder.bind(&mut ctx, "no-such-theme").await.unwrap_err();
        assert_eq!(err, ResolutionError::ThemeNotFound);
    }

    #[tokio::test]
    async fn test_regular_user_on_unknown_theme_is_mismatch() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx = ctx("tenant-c").with_user(user(Some("tenant-c"), false));
        let err = binder.bind(&mut ctx, "no-such-theme").await.unwrap_err();
        assert_eq!(err, ResolutionError::TenantThemeMismatch);

        // Same answer as an existing theme the user is not bound to
        let mut ctx = ctx_for_member("tenant-c");
        let err = binder.bind(&mut ctx, "storefront").await.unwrap_err();
        assert_eq!(err, ResolutionError::TenantThemeMismatch);
    }

    #[tokio::test]
    async fn test_super_admin_on_unknown_theme() {
        let db = setup_test_db().await;
        let binder = ThemeBindingResolver::new(TenantDirectory::new(db));

        let mut ctx = ctx("tenant-a").with_user(user(None, true));
        let err = binder.bind(&mut ctx, "no-such-theme").await.unwrap_err();
        assert_eq!(err, ResolutionError::ThemeNotFound);
    }
}
