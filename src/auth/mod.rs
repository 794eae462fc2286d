//! Tenant and identity resolution.
//!
//! Every request runs through the same pipeline before it reaches a handler:
//!
//! - **Readiness**: reject with 503 while the store is still starting
//! - **Cascade**: tenant API key, then user access key, then explicit tenant id
//! - **Enrichment**: a session token may attach a user to a tenant-only context
//! - **Theme binding**: theme-scoped routes check tenant ownership of the theme
//!
//! ## Credentials
//!
//! - `X-API-Key: <key>` or `Authorization: Bearer <key>`: tenant or access key
//! - `Authorization: Bearer <a.b.c>`: session token, only ever used for enrichment
//! - `X-Tenant-Id` header or `tenantId` query: explicit tenant, or a super admin override
//!
//! ## Usage
//!
//! ```ignore
//! let credentials = Credentials::from_request(&headers, uri.query());
//! let mut ctx = resolver.resolve(&credentials).await?;
//! let scope = themes.bind(&mut ctx, "storefront").await?;
//! ```

mod access_key;
mod cascade;
mod context;
mod credentials;
mod directory;
mod error;
pub mod jwks;
mod session;
mod tenant_key;
mod theme;

pub use access_key::{
    AccessKeyValidator, StoredUsageRecorder, UsageRecorder, normalize_access_key,
};
pub use cascade::{
    ResolverStrategy, TenantApiKeyStrategy, TenantIdFallbackStrategy, TenantResolver,
    UserAccessKeyStrategy,
};
pub use context::{BoundTenant, ResolutionContext, ResolutionSource, ThemeScope, UserSummary};
pub use credentials::{
    API_KEY_HEADER, CredentialCandidate, Credentials, TENANT_ID_HEADER, TENANT_ID_QUERY,
    classify_bearer,
};
pub use directory::TenantDirectory;
pub use error::{ErrorClass, ResolutionError};
pub use jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache, JwksCacheError};
pub use session::{
    HmacSessionVerifier, JwksSessionVerifier, SessionClaims, SessionConfig, SessionError,
    SessionVerifier,
};
pub use tenant_key::{
    ChainedTenantKeys, StaticTenantKeys, StoredTenantKeys, TenantKeyValidator,
    generate_tenant_api_key, hash_api_key,
};
pub use theme::ThemeBindingResolver;
