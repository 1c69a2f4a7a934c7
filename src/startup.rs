use crate::errors::AppError;
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    operation::create_table::CreateTableError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tracing;

const MAX_TABLE_SETUP_TIME: Duration = Duration::from_secs(30);

/// Creates a table with a single string hash key, once.
async fn create_table(client: &DynamoDbClient, table_name: &str, key: &str) -> Result<(), AppError> {
    let attribute = AttributeDefinition::builder()
        .attribute_name(key)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| AppError::InitError(format!("Failed to build attribute definition: {}", e)))?;
    let key_schema = KeySchemaElement::builder()
        .attribute_name(key)
        .key_type(KeyType::Hash)
        .build()
        .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?;

    let attempt = || async {
        let result = client
            .create_table()
            .table_name(table_name)
            .attribute_definitions(attribute.clone())
            .key_schema(key_schema.clone())
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) => classify_create_error(table_name, e),
        }
    };

    let policy = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(MAX_TABLE_SETUP_TIME))
        .build();

    match backoff::future::retry(policy, attempt).await {
        Ok(true) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Ok(false) => {
            tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// Ok(false): table already there. Service errors are final; anything else
// (endpoint not up yet, timeouts) is worth another attempt.
fn classify_create_error(
    table_name: &str,
    e: DynamoSdkError<CreateTableError>,
) -> Result<bool, backoff::Error<AppError>> {
    if let DynamoSdkError::ServiceError(service_err) = &e {
        if service_err.err().is_resource_in_use_exception() {
            return Ok(false);
        }
        let context = format!("Startup: Service error creating DynamoDB table '{}'", table_name);
        tracing::error!("{}: {:?}", context, service_err);
        return Err(backoff::Error::permanent(AppError::InitError(format!("{}: {}", context, e))));
    }

    let context = format!("Startup: SDK error creating DynamoDB table '{}'", table_name);
    tracing::warn!("{}, retrying: {}", context, e);
    Err(backoff::Error::transient(AppError::InitError(format!("{}: {}", context, e))))
}

/// Ensures the joke table and the date guard table exist.
pub async fn init_resources(
    db_client: &DynamoDbClient,
    jokes_table: &str,
    joke_dates_table: &str,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing DynamoDB tables...");
    create_table(db_client, jokes_table, "joke_id").await?;
    create_table(db_client, joke_dates_table, "joke_date").await?;
    tracing::info!("Startup: DynamoDB table initialization complete.");
    Ok(())
}
