use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{env, fmt};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "platform".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "tenancy".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = Surreal::<Any>::init();
    connect(&db, config).await?;
    Ok(db)
}

/// Connect an already-constructed client handle.
///
/// The server hands clones of an unconnected handle to request state before
/// the store is reachable, then connects it here from the startup task.
pub async fn connect(db: &Db, config: DatabaseConfig) -> Result<()> {
    db.connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(())
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Themes shared by one or more tenants
        "DEFINE TABLE IF NOT EXISTS theme SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS theme_id ON TABLE theme TYPE string;
         DEFINE FIELD IF NOT EXISTS slug ON TABLE theme TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE theme TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE theme TYPE datetime DEFAULT time::now();",

        // Tenants
        "DEFINE TABLE IF NOT EXISTS tenant SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS slug ON TABLE tenant TYPE string;
         DEFINE FIELD IF NOT EXISTS theme_id ON TABLE tenant TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE tenant TYPE datetime DEFAULT time::now();",

        // Platform users; tenant_id is empty only for super admins
        "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS first_name ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS last_name ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS role ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS is_super_admin ON TABLE user TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE user TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();",

        // User-scoped access keys
        "DEFINE TABLE IF NOT EXISTS access_key SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE access_key TYPE string;
         DEFINE FIELD IF NOT EXISTS secret ON TABLE access_key TYPE string;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE access_key TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS last_used_at ON TABLE access_key TYPE option<datetime>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE access_key TYPE datetime DEFAULT time::now();",

        // Tenant-scoped API keys, stored as hashes only
        "DEFINE TABLE IF NOT EXISTS tenant_api_key SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE tenant_api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS key_hash ON TABLE tenant_api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS key_prefix ON TABLE tenant_api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE tenant_api_key TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE tenant_api_key TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE tenant_api_key TYPE datetime DEFAULT time::now();",

        // Indexes
        "DEFINE INDEX IF NOT EXISTS tenant_tenant_id ON TABLE tenant COLUMNS tenant_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS tenant_theme_id ON TABLE tenant COLUMNS theme_id;
         DEFINE INDEX IF NOT EXISTS theme_slug ON TABLE theme COLUMNS slug UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_user_id ON TABLE user COLUMNS user_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS access_key_secret ON TABLE access_key COLUMNS secret UNIQUE;
         DEFINE INDEX IF NOT EXISTS access_key_user ON TABLE access_key COLUMNS user_id;
         DEFINE INDEX IF NOT EXISTS tenant_api_key_hash ON TABLE tenant_api_key COLUMNS key_hash UNIQUE;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
