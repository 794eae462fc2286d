//! NewType wrappers for the identifiers that flow through tenant resolution.
//!
//! Tenant ids, user ids and theme slugs are all plain strings on the wire;
//! wrapping them keeps a theme slug from being passed where a tenant id is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Canonical tenant identifier (e.g., "tenant-1").
    ///
    /// This is the value handed to downstream handlers as `tenantId`. It comes
    /// from a directory lookup, a tenant key, or the key owner's record. The
    /// one exception is a super admin's override (`tenantId` / `X-Tenant-Id`),
    /// which is taken as given and not checked against the directory.
    TenantId
);

newtype_string!(
    /// Platform user identifier.
    ///
    /// Session tokens carry this as their `sub` claim and access keys point at
    /// it through `user_id`.
    UserId
);

newtype_string!(
    /// Theme identifier referenced by `tenant.theme_id`.
    ThemeId
);

newtype_string!(
    /// URL segment naming a theme on theme-scoped routes.
    ThemeSlug
);

newtype_string!(
    /// SHA-256 hash of a tenant API key.
    ///
    /// Tenant API keys are never stored in plain text; lookups hash the
    /// presented key and compare hashes.
    ApiKeyHash
);

newtype_string!(
    /// Display prefix of a tenant API key (e.g., "tn_abc12345").
    ///
    /// Safe to show in listings and logs. It cannot be used to authenticate.
    ApiKeyPrefix
);
