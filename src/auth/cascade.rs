//! Credential cascade.
//!
//! Strategies run in a fixed order and the first one that produces a context
//! wins:
//!
//! 1. tenant API key
//! 2. user access key (same key string, different namespace)
//! 3. tenant id from `X-Tenant-Id` / `tenantId`, only when no key was sent
//!
//! After a tenant is selected without a user, a session token on the same
//! request may attach the user it names.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::auth::access_key::AccessKeyValidator;
use crate::auth::context::{ResolutionContext, ResolutionSource, UserSummary};
use crate::auth::credentials::Credentials;
use crate::auth::directory::TenantDirectory;
use crate::auth::error::ResolutionError;
use crate::auth::session::SessionVerifier;
use crate::auth::tenant_key::TenantKeyValidator;
use crate::readiness::{ReadinessGate, StoreStatus};

/// One step of the cascade.
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy looks at the request at all.
    fn applies(&self, credentials: &Credentials) -> bool;

    /// `Ok(None)` hands the request to the next strategy. An error ends the
    /// cascade.
    async fn resolve(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<ResolutionContext>, ResolutionError>;
}

/// Treats the API key as a tenant key.
pub struct TenantApiKeyStrategy {
    validator: Arc<dyn TenantKeyValidator>,
}

impl TenantApiKeyStrategy {
    pub fn new(validator: Arc<dyn TenantKeyValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl ResolverStrategy for TenantApiKeyStrategy {
    fn name(&self) -> &'static str {
        "tenant_api_key"
    }

    fn applies(&self, credentials: &Credentials) -> bool {
        credentials.api_key.is_some()
    }

    async fn resolve(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<ResolutionContext>, ResolutionError> {
        let Some(key) = credentials.api_key.as_deref() else {
            return Ok(None);
        };

        match self.validator.validate(key).await {
            Ok(Some(tenant_id)) => Ok(Some(ResolutionContext::new(
                tenant_id,
                ResolutionSource::TenantApiKey,
            ))),
            Ok(None) => Ok(None),
            // The key may still be a user access key
            Err(e) => {
                warn!("tenant key validation failed, trying access keys: {:#}", e);
                Ok(None)
            }
        }
    }
}

/// Treats the API key as a user access key.
pub struct UserAccessKeyStrategy {
    validator: AccessKeyValidator,
}

impl UserAccessKeyStrategy {
    pub fn new(validator: AccessKeyValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl ResolverStrategy for UserAccessKeyStrategy {
    fn name(&self) -> &'static str {
        "user_access_key"
    }

    fn applies(&self, credentials: &Credentials) -> bool {
        credentials.api_key.is_some()
    }

    async fn resolve(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<ResolutionContext>, ResolutionError> {
        let Some(key) = credentials.api_key.as_deref() else {
            return Ok(None);
        };
        self.validator.validate(key, credentials).await.map(Some)
    }
}

/// Selects a tenant from an explicit id when no key was sent.
pub struct TenantIdFallbackStrategy {
    directory: TenantDirectory,
}

impl TenantIdFallbackStrategy {
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ResolverStrategy for TenantIdFallbackStrategy {
    fn name(&self) -> &'static str {
        "tenant_id_fallback"
    }

    fn applies(&self, credentials: &Credentials) -> bool {
        credentials.api_key.is_none() && credentials.fallback_tenant_id().is_some()
    }

    async fn resolve(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<ResolutionContext>, ResolutionError> {
        let Some(candidate) = credentials.fallback_tenant_id() else {
            return Ok(None);
        };

        let tenant = self
            .directory
            .find_tenant(candidate)
            .await
            .map_err(|e| ResolutionError::from_store(&e))?
            .ok_or(ResolutionError::TenantNotFound)?;

        Ok(Some(ResolutionContext::new(
            tenant.tenant_id,
            ResolutionSource::TenantIdFallback,
        )))
    }
}

/// Runs the readiness check, the strategy cascade and session enrichment.
pub struct TenantResolver {
    gate: ReadinessGate,
    strategies: Vec<Box<dyn ResolverStrategy>>,
    directory: TenantDirectory,
    sessions: Option<Arc<dyn SessionVerifier>>,
}

impl TenantResolver {
    /// Resolver with the standard strategy order.
    pub fn new(
        gate: ReadinessGate,
        directory: TenantDirectory,
        tenant_keys: Arc<dyn TenantKeyValidator>,
    ) -> Self {
        let access_keys = AccessKeyValidator::new(directory.db().clone());
        let strategies: Vec<Box<dyn ResolverStrategy>> = vec![
            Box::new(TenantApiKeyStrategy::new(tenant_keys)),
            Box::new(UserAccessKeyStrategy::new(access_keys)),
            Box::new(TenantIdFallbackStrategy::new(directory.clone())),
        ];

        Self {
            gate,
            strategies,
            directory,
            sessions: None,
        }
    }

    pub fn with_session_verifier(mut self, verifier: Arc<dyn SessionVerifier>) -> Self {
        self.sessions = Some(verifier);
        self
    }

    pub fn directory(&self) -> &TenantDirectory {
        &self.directory
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub async fn resolve(
        &self,
        credentials: &Credentials,
    ) -> Result<ResolutionContext, ResolutionError> {
        match self.gate.status() {
            StoreStatus::Ready => {}
            StoreStatus::Initializing => return Err(ResolutionError::StoreInitializing),
            StoreStatus::Failed(_) => return Err(ResolutionError::StoreUnavailable),
        }

        let mut resolved = None;
        for strategy in &self.strategies {
            if !strategy.applies(credentials) {
                continue;
            }
            if let Some(ctx) = strategy.resolve(credentials).await? {
                debug!(
                    strategy = strategy.name(),
                    tenant_id = %ctx.tenant_id(),
                    "tenant resolved"
                );
                resolved = Some(ctx);
                break;
            }
        }

        let mut ctx = resolved.ok_or(ResolutionError::MissingAuth)?;
        self.enrich(&mut ctx, credentials).await;
        Ok(ctx)
    }

    /// Attach the session token's user. Never fails the request and never
    /// changes the tenant.
    async fn enrich(&self, ctx: &mut ResolutionContext, credentials: &Credentials) {
        let allowed = ctx.source().is_some_and(|s| s.allows_session_enrichment());
        if !allowed || ctx.user().is_some() {
            return;
        }
        let (Some(token), Some(verifier)) = (credentials.session_token.as_deref(), &self.sessions)
        else {
            return;
        };

        let user_id = match verifier.verify(token).await {
            Ok(user_id) => user_id,
            Err(e) => {
                debug!("session token ignored: {}", e);
                return;
            }
        };

        match self.directory.find_user(&user_id).await {
            Ok(Some(user)) if user.is_active => {
                debug!(user_id = %user.user_id, "attached session user");
                ctx.attach_user(UserSummary::from(&user));
            }
            Ok(Some(_)) => debug!(user_id = %user_id, "session user is inactive"),
            Ok(None) => debug!(user_id = %user_id, "session user not found"),
            Err(e) => warn!(user_id = %user_id, "session user lookup failed: {:#}", e),
        }
    }
}
