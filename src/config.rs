use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Attempts allowed when beginning an object races other writers.
    pub retry_max_attempts: u32,
    /// Rows per listing query when a request does not choose; 0 uses the
    /// engine default.
    pub list_batch_size: i64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Versioned object metadata service")]
pub struct Args {
    /// Host to bind to (overrides METABASE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides METABASE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL, sqlite:// or postgres:// (overrides METABASE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Connection pool size (overrides METABASE_MAX_CONNECTIONS)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Begin-object attempts under contention (overrides METABASE_RETRY_MAX_ATTEMPTS)
    #[arg(long)]
    pub retry_max_attempts: Option<u32>,

    /// Default listing batch size (overrides METABASE_LIST_BATCH_SIZE)
    #[arg(long)]
    pub list_batch_size: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// Fill everything the arguments leave unset from the environment.
    pub fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("METABASE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("METABASE_PORT", 3000u16)?;
        let env_db = env::var("METABASE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/metabase.db".into());
        let env_connections = env_parse("METABASE_MAX_CONNECTIONS", 5u32)?;
        let env_attempts = env_parse("METABASE_RETRY_MAX_ATTEMPTS", 10u32)?;
        let env_batch = env_parse("METABASE_LIST_BATCH_SIZE", 0i64)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            max_connections: args.max_connections.unwrap_or(env_connections),
            retry_max_attempts: args.retry_max_attempts.unwrap_or(env_attempts),
            list_batch_size: args.list_batch_size.unwrap_or(env_batch),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
