use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Which `JokeRepository` backs the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamodb" => Ok(StoreBackend::DynamoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store '{}', expected 'dynamodb' or 'memory'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreBackend,
    pub jokes_table: String,
    pub joke_dates_table: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    // LocalStack without AWS keys in the environment gets static test credentials
    pub localstack_static_credentials: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let store = match lookup("JOKE_STORE") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidVar("JOKE_STORE".into(), e))?,
            None => StoreBackend::DynamoDb,
        };

        let jokes_table = non_empty(&lookup, "JOKES_TABLE", "jokes")?;
        let joke_dates_table = non_empty(&lookup, "JOKE_DATES_TABLE", "joke_dates")?;

        let aws_region = lookup("AWS_DEFAULT_REGION").unwrap_or_else(|| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = lookup("AWS_ENDPOINT_URL");
        let localstack_static_credentials =
            localstack_endpoint.is_some() && lookup("AWS_ACCESS_KEY_ID").is_none();

        Ok(Config {
            bind_address,
            store,
            jokes_table,
            joke_dates_table,
            aws_region,
            localstack_endpoint,
            localstack_static_credentials,
        })
    }
}

fn non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::MissingVar(key.to_string())),
        Some(value) => Ok(value),
        None => Ok(default.to_string()),
    }
}
