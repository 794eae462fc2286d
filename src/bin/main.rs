use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use surrealdb::Surreal;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use tenant_resolver::auth::{generate_tenant_api_key, normalize_access_key};
use tenant_resolver::db::{QueryBuilder, TenantApiKeyCreate};
use tenant_resolver::types::TenantId;
use tenant_resolver::{
    DatabaseConfig, Db, ReadinessGate, build_state, create_connection, create_router,
    ensure_schema, initialize_store, load_config,
};

#[derive(Parser)]
#[command(name = "tenant-resolver")]
#[command(about = "Tenant and identity resolution service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to tenancy.json (defaults to $TENANCY_CONFIG or ./tenancy.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Bind address, e.g. 0.0.0.0:8080 (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
        /// Database url (overrides the config file)
        #[arg(long)]
        db_url: Option<String>,
        /// HS256 session secret (overrides the config file)
        #[arg(long, env = "TENANCY_SESSION_SECRET", hide_env_values = true)]
        session_secret: Option<String>,
        /// JWKS endpoint for RS256 session tokens (overrides the config file)
        #[arg(long, env = "TENANCY_JWKS_URL")]
        jwks_url: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Create a tenant API key
    CreateTenantKey {
        tenant_id: String,
        /// Human-readable name for this key
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Deactivate a tenant API key by its prefix
    RevokeTenantKey {
        /// The key prefix to revoke (e.g., "tn_abc12345")
        key_prefix: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Revoke a user access key
    RevokeAccessKey {
        key: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
}

async fn open(db_url: String) -> Result<Db> {
    let db_config = DatabaseConfig {
        url: db_url,
        ..Default::default()
    };
    info!("Using database url: {}", db_config.url);

    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tenant_resolver=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            db_url,
            session_secret,
            jwks_url,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(url) = db_url {
                config.database.url = url;
            }
            if session_secret.is_some() {
                config.session.secret = session_secret;
            }
            if jwks_url.is_some() {
                config.session.jwks_url = jwks_url;
            }

            // Bind before the store is up; the gate answers 503 meanwhile.
            let db: Db = Surreal::init();
            let (handle, gate) = ReadinessGate::new();
            let app = create_router(build_state(db.clone(), gate, &config));

            let listener = tokio::net::TcpListener::bind(&config.bind).await?;
            info!("Listening on http://{}", config.bind);

            let db_config = config.database.clone();
            tokio::spawn(async move {
                // Failure is logged and reflected in the gate
                let _ = initialize_store(&db, db_config, handle).await;
            });

            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            info!("Initializing database...");
            open(db_url).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateTenantKey {
            tenant_id,
            name,
            db_url,
        } => {
            let db = open(db_url).await?;
            let (full_key, prefix, key_hash) = generate_tenant_api_key();

            QueryBuilder::create_tenant_api_key(
                &db,
                &TenantApiKeyCreate {
                    tenant_id: TenantId::new(tenant_id.as_str()),
                    key_hash,
                    key_prefix: prefix.clone(),
                    name: name.clone(),
                },
            )
            .await?;

            println!("Tenant API key created successfully!");
            println!();
            println!("  Key:     {}", full_key);
            println!("  Prefix:  {}", prefix);
            println!("  Tenant:  {}", tenant_id);
            if let Some(n) = &name {
                println!("  Name:    {}", n);
            }
            println!();
            println!("IMPORTANT: Save this key now. It cannot be retrieved later.");
            println!("Use with: -H 'X-API-Key: {}'", full_key);
        }
        Commands::RevokeTenantKey { key_prefix, db_url } => {
            let db = open(db_url).await?;
            let revoked =
                QueryBuilder::deactivate_tenant_api_key_by_prefix(&db, &key_prefix).await?;

            if revoked {
                println!("Tenant API key '{}' has been revoked.", key_prefix);
            } else {
                println!("No tenant API key found with prefix '{}'.", key_prefix);
            }
        }
        Commands::RevokeAccessKey { key, db_url } => {
            let db = open(db_url).await?;
            let revoked = QueryBuilder::revoke_access_key(&db, &normalize_access_key(&key)).await?;

            if revoked {
                println!("Access key has been revoked.");
            } else {
                println!("No active access key matched.");
            }
        }
    }

    Ok(())
}
