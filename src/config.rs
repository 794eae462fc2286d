use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::{Path, PathBuf},
};

use crate::auth::{ChainedTenantKeys, SessionConfig, StaticTenantKeys, StoredTenantKeys};
use crate::db::{DatabaseConfig, Db};
use crate::types::TenantId;

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Contents of `tenancy.json`.
#[derive(Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Fixed tenant keys, key -> tenant id
    #[serde(default, rename = "tenantKeys")]
    pub tenant_keys: BTreeMap<String, String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database: DatabaseConfig::default(),
            session: SessionConfig::default(),
            tenant_keys: BTreeMap::new(),
        }
    }
}

// Tenant keys are credentials; only their count is printed.
impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("bind", &self.bind)
            .field("database", &self.database)
            .field("session", &self.session)
            .field("tenant_keys", &format_args!("[{} redacted]", self.tenant_keys.len()))
            .finish()
    }
}

impl ResolverConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut value: Value = serde_json::from_str(raw)?;
        expand_value(&mut value, &|name| env::var(name).ok());
        Ok(serde_json::from_value(value)?)
    }

    /// Configured static keys first, then keys stored in the database.
    pub fn tenant_key_validator(&self, db: Db) -> ChainedTenantKeys {
        let static_keys = StaticTenantKeys::new(
            self.tenant_keys
                .iter()
                .map(|(key, tenant)| (key.clone(), TenantId::new(tenant.as_str()))),
        );

        let mut chain = ChainedTenantKeys::new();
        if !static_keys.is_empty() {
            chain = chain.with(static_keys);
        }
        chain.with(StoredTenantKeys::new(db))
    }
}

/// `TENANCY_CONFIG`, else `./tenancy.json` if present.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("TENANCY_CONFIG") {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from("tenancy.json");
    candidate.exists().then_some(candidate)
}

/// Load the config file, or defaults when there is none.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ResolverConfig> {
    match explicit.map(Path::to_path_buf).or_else(resolve_config_path) {
        Some(path) => ResolverConfig::from_path(&path),
        None => Ok(ResolverConfig::default()),
    }
}

fn expand_value(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => *s = expand_env_vars(s, lookup),
        Value::Array(items) => items.iter_mut().for_each(|v| expand_value(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_value(v, lookup)),
        _ => {}
    }
}

/// Replace `${NAME}` with its value. Unknown names are left as written.
fn expand_env_vars(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Some(val) = lookup(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
