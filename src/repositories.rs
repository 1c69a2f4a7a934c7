use crate::{
    domain::JokeRepository,
    errors::RepoError,
    models::{Joke, JokeId},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    operation::transact_write_items::TransactWriteItemsError,
    types::{AttributeValue, Delete, Put, TransactWriteItem},
    Client as DynamoDbClient,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{self, info};

const CONDITION_FAILED: &str = "ConditionalCheckFailed";

/// Jokes live in one table keyed by `joke_id`. A second table keyed by
/// `joke_date` holds one guard item per used date; every write touches both
/// in a single transaction, which makes the guard table a unique index.
#[derive(Debug, Clone)]
pub struct DynamoDbJokeRepository {
    client: DynamoDbClient,
    jokes_table: String,
    dates_table: String,
}

impl DynamoDbJokeRepository {
    pub fn new(client: DynamoDbClient, jokes_table: String, dates_table: String) -> Self {
        info!(%jokes_table, %dates_table, "Initializing DynamoDbJokeRepository");
        Self {
            client,
            jokes_table,
            dates_table,
        }
    }

    async fn get_date_guard(&self, date: NaiveDate) -> Result<Option<JokeId>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.dates_table)
            .key("joke_date", AttributeValue::S(date.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get date guard (date: {})", self.dates_table, date))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => {
                let owner = item
                    .get("joke_id")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|s| JokeId::parse(s).ok())
                    .ok_or_else(|| {
                        RepoError::DataCorruption(format!(
                            "Date guard for {} in table '{}' has no valid joke_id",
                            date, self.dates_table
                        ))
                    })?;
                Ok(Some(owner))
            }
            None => Ok(None),
        }
    }

    fn put_date_guard(&self, date: NaiveDate, id: JokeId) -> Result<TransactWriteItem, RepoError> {
        let put = Put::builder()
            .table_name(&self.dates_table)
            .item("joke_date", AttributeValue::S(date.to_string()))
            .item("joke_id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_not_exists(joke_date)")
            .build()?;
        Ok(TransactWriteItem::builder().put(put).build())
    }

    fn delete_date_guard(&self, date: NaiveDate, id: JokeId) -> Result<TransactWriteItem, RepoError> {
        let delete = Delete::builder()
            .table_name(&self.dates_table)
            .key("joke_date", AttributeValue::S(date.to_string()))
            .condition_expression("joke_id = :id")
            .expression_attribute_values(":id", AttributeValue::S(id.to_string()))
            .build()?;
        Ok(TransactWriteItem::builder().delete(delete).build())
    }
}

#[async_trait]
impl JokeRepository for DynamoDbJokeRepository {
    /// Writes the joke and claims its date in one transaction.
    async fn insert(&self, joke: &Joke) -> Result<Joke, RepoError> {
        let id = JokeId::generate();
        let stored = joke.with_id(id);

        let put_joke = Put::builder()
            .table_name(&self.jokes_table)
            .set_item(Some(joke_to_item(id, &stored)))
            .condition_expression("attribute_not_exists(joke_id)")
            .build()?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put_joke).build())
            .transact_items(self.put_date_guard(stored.date, id)?)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(joke_id = %id, joke_date = %stored.date, table_name = %self.jokes_table, "DynamoDB: Inserted joke");
                Ok(stored)
            }
            Err(e) => match cancellation_of(&e, Some(1)) {
                Cancellation::DateTaken => Err(RepoError::DateConflict(stored.date)),
                _ => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to insert joke (id: {})",
                    self.jokes_table, id
                )))),
            },
        }
    }

    async fn find_by_id(&self, id: JokeId) -> Result<Option<Joke>, RepoError> {
        let id_str = id.to_string();
        let resp = self
            .client
            .get_item()
            .table_name(&self.jokes_table)
            .key("joke_id", AttributeValue::S(id_str.clone()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get joke (id: {})", self.jokes_table, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_joke(&item) {
                Some(joke) => Ok(Some(joke)),
                None => {
                    tracing::error!(joke_id = %id_str, table_name = %self.jokes_table, "DynamoDB: Retrieved item but failed to parse into Joke");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse joke data retrieved from DynamoDB table '{}' for id {}",
                        self.jokes_table, id_str
                    )))
                }
            },
            None => Ok(None),
        }
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<Joke>, RepoError> {
        match self.get_date_guard(date).await? {
            Some(owner) => {
                let joke = self.find_by_id(owner).await?;
                if joke.is_none() {
                    // Deleted between the two reads
                    tracing::debug!(joke_id = %owner, joke_date = %date, "DynamoDB: Date guard pointed at a joke that is gone");
                }
                Ok(joke)
            }
            None => Ok(None),
        }
    }

    async fn exists_by_date(&self, date: NaiveDate) -> Result<bool, RepoError> {
        Ok(self.get_date_guard(date).await?.is_some())
    }

    /// Full replace. A date change moves the guard item in the same
    /// transaction; the joke put is conditioned on the date we read so a
    /// concurrent move or delete cancels it. A cancelled write is re-read:
    /// a joke that is gone is `NotFound`, one that moved is
    /// `ConcurrentModification`.
    async fn save(&self, id: JokeId, joke: &Joke) -> Result<Joke, RepoError> {
        let current = self.find_by_id(id).await?.ok_or(RepoError::NotFound(id))?;
        let stored = joke.with_id(id);

        let put_joke = Put::builder()
            .table_name(&self.jokes_table)
            .set_item(Some(joke_to_item(id, &stored)))
            .condition_expression("joke_date = :current_date")
            .expression_attribute_values(":current_date", AttributeValue::S(current.date.to_string()))
            .build()?;

        let mut request = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put_joke).build());
        let mut guard_put = None;
        if current.date != stored.date {
            request = request
                .transact_items(self.delete_date_guard(current.date, id)?)
                .transact_items(self.put_date_guard(stored.date, id)?);
            guard_put = Some(2);
        }

        match request.send().await {
            Ok(_) => {
                tracing::debug!(joke_id = %id, joke_date = %stored.date, table_name = %self.jokes_table, "DynamoDB: Saved joke");
                Ok(stored)
            }
            Err(e) => match cancellation_of(&e, guard_put) {
                Cancellation::DateTaken => Err(RepoError::DateConflict(stored.date)),
                Cancellation::TargetChanged => match self.find_by_id(id).await? {
                    Some(_) => Err(RepoError::ConcurrentModification(id)),
                    None => Err(RepoError::NotFound(id)),
                },
                Cancellation::Unexplained => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to save joke (id: {})",
                    self.jokes_table, id
                )))),
            },
        }
    }

    /// Removes the joke and releases its date. Unknown ids succeed, including
    /// one deleted by a concurrent request after we read it.
    async fn delete_by_id(&self, id: JokeId) -> Result<(), RepoError> {
        let Some(current) = self.find_by_id(id).await? else {
            tracing::debug!(joke_id = %id, table_name = %self.jokes_table, "DynamoDB: Nothing to delete");
            return Ok(());
        };

        let delete_joke = Delete::builder()
            .table_name(&self.jokes_table)
            .key("joke_id", AttributeValue::S(id.to_string()))
            .condition_expression("joke_date = :current_date")
            .expression_attribute_values(":current_date", AttributeValue::S(current.date.to_string()))
            .build()?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().delete(delete_joke).build())
            .transact_items(self.delete_date_guard(current.date, id)?)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(joke_id = %id, table_name = %self.jokes_table, "DynamoDB: Deleted joke and released date");
                Ok(())
            }
            Err(e) => match cancellation_of(&e, None) {
                Cancellation::TargetChanged => match self.find_by_id(id).await? {
                    Some(_) => Err(RepoError::ConcurrentModification(id)),
                    None => {
                        tracing::debug!(joke_id = %id, table_name = %self.jokes_table, "DynamoDB: Joke already deleted by another request");
                        Ok(())
                    }
                },
                _ => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to delete joke (id: {})",
                    self.jokes_table, id
                )))),
            },
        }
    }
}

/// Why a conditional write transaction was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cancellation {
    /// The guard item for the new date already exists.
    DateTaken,
    /// A condition on the state read before the write failed: the joke was
    /// moved or deleted in between.
    TargetChanged,
    /// Not cancelled by one of our conditions.
    Unexplained,
}

fn cancellation_of(err: &SdkError<TransactWriteItemsError>, guard_put: Option<usize>) -> Cancellation {
    err.as_service_error()
        .map_or(Cancellation::Unexplained, |service_err| classify_cancellation(service_err, guard_put))
}

// `guard_put` is the position of the new date's guard put, if the
// transaction claims a date. Every other item is conditioned on what was read.
fn classify_cancellation(err: &TransactWriteItemsError, guard_put: Option<usize>) -> Cancellation {
    let failed = failed_conditions(err);
    if failed.is_empty() {
        Cancellation::Unexplained
    } else if guard_put.is_some_and(|index| failed.contains(&index)) {
        Cancellation::DateTaken
    } else {
        Cancellation::TargetChanged
    }
}

// Positions of the transaction items whose condition check failed.
fn failed_conditions(err: &TransactWriteItemsError) -> Vec<usize> {
    match err {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => cancelled
            .cancellation_reasons()
            .iter()
            .enumerate()
            .filter(|(_, reason)| reason.code() == Some(CONDITION_FAILED))
            .map(|(index, _)| index)
            .collect(),
        _ => Vec::new(),
    }
}

fn joke_to_item(id: JokeId, joke: &Joke) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        ("joke_id".to_string(), AttributeValue::S(id.to_string())),
        ("joke".to_string(), AttributeValue::S(joke.text.clone())),
        ("joke_date".to_string(), AttributeValue::S(joke.date.to_string())),
    ]);
    if let Some(description) = &joke.description {
        item.insert("description".to_string(), AttributeValue::S(description.clone()));
    }
    item
}

fn item_to_joke(item: &HashMap<String, AttributeValue>) -> Option<Joke> {
    let id = item
        .get("joke_id")?
        .as_s()
        .ok()
        .and_then(|s| JokeId::parse(s).ok())?;
    let text = item.get("joke")?.as_s().ok()?.to_string();
    let date = item
        .get("joke_date")?
        .as_s()
        .ok()
        .and_then(|s| s.parse::<NaiveDate>().ok())?;
    let description = item
        .get("description")
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string());

    Some(Joke {
        id: Some(id),
        text,
        date,
        description,
    })
}
