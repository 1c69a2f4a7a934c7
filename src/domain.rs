use crate::errors::RepoError;
use crate::models::{Joke, JokeId};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Trait defining the record store behind the joke resolver.
///
/// Implementations own the date uniqueness constraint: a write that would
/// leave two jokes on one date fails with `RepoError::DateConflict`.
#[async_trait]
pub trait JokeRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Stores a new joke under a freshly minted id and returns it with the id set.
    /// Any id already on `joke` is ignored.
    async fn insert(&self, joke: &Joke) -> Result<Joke, RepoError>;

    /// Returns Ok(None) if no joke has this id.
    async fn find_by_id(&self, id: JokeId) -> Result<Option<Joke>, RepoError>;

    /// Returns Ok(None) if no joke is stored for this date.
    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<Joke>, RepoError>;

    async fn exists_by_date(&self, date: NaiveDate) -> Result<bool, RepoError>;

    /// Replaces every field of the joke stored under `id`.
    /// Fails with `RepoError::NotFound` if `id` is no longer stored.
    async fn save(&self, id: JokeId, joke: &Joke) -> Result<Joke, RepoError>;

    /// Deleting an unknown id succeeds.
    async fn delete_by_id(&self, id: JokeId) -> Result<(), RepoError>;
}
