//! Credential extraction from request headers and query string.

use http::HeaderMap;
use http::header::AUTHORIZATION;

/// Header carrying an explicit API key (tenant key or user access key).
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying a tenant id candidate.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
/// Query parameter carrying a tenant id candidate.
pub const TENANT_ID_QUERY: &str = "tenantId";

/// Shape-based classification of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCandidate {
    /// Opaque string that may be a tenant API key or a user access key.
    ApiKeyCandidate(String),
    /// Three non-empty dot-separated parts: probably a signed session token.
    StructuredTokenCandidate(String),
    /// Empty or whitespace-only.
    Unknown,
}

/// Classify a bearer token by shape only. Nothing is verified here.
pub fn classify_bearer(token: &str) -> CredentialCandidate {
    let token = token.trim();
    if token.is_empty() {
        return CredentialCandidate::Unknown;
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() == 3 && parts.iter().all(|p| !p.is_empty()) {
        CredentialCandidate::StructuredTokenCandidate(token.to_string())
    } else {
        CredentialCandidate::ApiKeyCandidate(token.to_string())
    }
}

/// Every credential candidate found on a request, extracted independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Explicit API key header, else a bearer token that is not token-shaped.
    pub api_key: Option<String>,
    /// Bearer token shaped like a signed session token.
    pub session_token: Option<String>,
    /// `X-Tenant-Id` header value.
    pub tenant_id_header: Option<String>,
    /// `tenantId` query parameter value.
    pub tenant_id_query: Option<String>,
}

impl Credentials {
    /// Extract candidates from headers and the raw query string.
    ///
    /// `HeaderMap` lookups are case-insensitive, so `X-API-Key`, `x-api-key`
    /// and `X-Api-Key` are all the same header.
    pub fn from_request(headers: &HeaderMap, query: Option<&str>) -> Self {
        let explicit_key = header_value(headers, API_KEY_HEADER);

        let bearer = header_value(headers, AUTHORIZATION.as_str())
            .and_then(|v| strip_bearer(&v))
            .map(|token| classify_bearer(&token))
            .unwrap_or(CredentialCandidate::Unknown);

        let (bearer_key, session_token) = match bearer {
            CredentialCandidate::ApiKeyCandidate(key) => (Some(key), None),
            CredentialCandidate::StructuredTokenCandidate(token) => (None, Some(token)),
            CredentialCandidate::Unknown => (None, None),
        };

        Self {
            api_key: explicit_key.or(bearer_key),
            session_token,
            tenant_id_header: header_value(headers, TENANT_ID_HEADER),
            tenant_id_query: query.and_then(|q| query_value(q, TENANT_ID_QUERY)),
        }
    }

    /// Tenant id candidate for the fallback path: header first, then query.
    pub fn fallback_tenant_id(&self) -> Option<&str> {
        self.tenant_id_header
            .as_deref()
            .or(self.tenant_id_query.as_deref())
    }

    /// Tenant override for super admins: query first, then header.
    pub fn override_tenant_id(&self) -> Option<&str> {
        self.tenant_id_query
            .as_deref()
            .or(self.tenant_id_header.as_deref())
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn strip_bearer(value: &str) -> Option<String> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn query_value(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
