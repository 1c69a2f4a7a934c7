use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws_clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod memory_repository;
mod models;
mod repositories;
mod routes;
mod service;
mod startup;

use crate::aws_clients::{create_dynamodb_client, create_sdk_config};
use crate::config::{Config, StoreBackend};
use crate::domain::JokeRepository;
use crate::errors::AppError;
use crate::memory_repository::InMemoryJokeRepository;
use crate::repositories::DynamoDbJokeRepository;
use crate::service::JokeService;

/// AppState holds shared resources for the web server.
pub struct AppState {
    pub jokes: JokeService,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "joke_of_the_day=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = Config::load()?;
    tracing::info!(?config, "Configuration loaded");

    // --- Store Initialization ---
    let repo: Arc<dyn JokeRepository> = match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory joke store; data is lost on restart");
            Arc::new(InMemoryJokeRepository::new())
        }
        StoreBackend::DynamoDb => {
            tracing::info!("Initializing AWS DynamoDB client...");
            let sdk_config = create_sdk_config(&config).await;
            let db_client = create_dynamodb_client(&sdk_config);

            startup::init_resources(&db_client, &config.jokes_table, &config.joke_dates_table).await?;

            Arc::new(DynamoDbJokeRepository::new(
                db_client,
                config.jokes_table.clone(),
                config.joke_dates_table.clone(),
            ))
        }
    };

    // --- Application State ---
    let state = Arc::new(AppState {
        jokes: JokeService::new(repo),
    });
    let app = routes::create_router(state);

    // --- Server Startup ---
    tracing::info!("Server listening on http://{}", config.bind_address);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
