use crate::{
    domain::JokeRepository,
    errors::RepoError,
    models::{Joke, JokeId},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    jokes: HashMap<JokeId, Joke>,
    // Unique index: date -> owning joke
    by_date: HashMap<NaiveDate, JokeId>,
}

/// Process-local joke store. Jokes and the date index share one lock, so the
/// uniqueness check and the write it guards are atomic.
#[derive(Debug, Default)]
pub struct InMemoryJokeRepository {
    tables: RwLock<Tables>,
}

impl InMemoryJokeRepository {
    pub fn new() -> Self {
        tracing::info!("Initializing InMemoryJokeRepository");
        Self::default()
    }
}

#[async_trait]
impl JokeRepository for InMemoryJokeRepository {
    async fn insert(&self, joke: &Joke) -> Result<Joke, RepoError> {
        let mut tables = self.tables.write().await;
        if tables.by_date.contains_key(&joke.date) {
            return Err(RepoError::DateConflict(joke.date));
        }

        let id = JokeId::generate();
        let stored = joke.with_id(id);
        tables.by_date.insert(stored.date, id);
        tables.jokes.insert(id, stored.clone());
        tracing::debug!(joke_id = %id, joke_date = %stored.date, "Memory: Inserted joke");
        Ok(stored)
    }

    async fn find_by_id(&self, id: JokeId) -> Result<Option<Joke>, RepoError> {
        Ok(self.tables.read().await.jokes.get(&id).cloned())
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<Joke>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_date
            .get(&date)
            .and_then(|id| tables.jokes.get(id))
            .cloned())
    }

    async fn exists_by_date(&self, date: NaiveDate) -> Result<bool, RepoError> {
        Ok(self.tables.read().await.by_date.contains_key(&date))
    }

    async fn save(&self, id: JokeId, joke: &Joke) -> Result<Joke, RepoError> {
        let mut tables = self.tables.write().await;
        let old_date = tables
            .jokes
            .get(&id)
            .map(|existing| existing.date)
            .ok_or(RepoError::NotFound(id))?;

        if old_date != joke.date {
            if matches!(tables.by_date.get(&joke.date), Some(owner) if *owner != id) {
                return Err(RepoError::DateConflict(joke.date));
            }
            tables.by_date.remove(&old_date);
            tables.by_date.insert(joke.date, id);
        }

        let stored = joke.with_id(id);
        tables.jokes.insert(id, stored.clone());
        tracing::debug!(joke_id = %id, joke_date = %stored.date, "Memory: Saved joke");
        Ok(stored)
    }

    async fn delete_by_id(&self, id: JokeId) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        if let Some(removed) = tables.jokes.remove(&id) {
            tables.by_date.remove(&removed.date);
            tracing::debug!(joke_id = %id, "Memory: Deleted joke");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_indexes_date() {
        let repo = InMemoryJokeRepository::new();
        let stored = repo.insert(&Joke::new("X", date(2025, 2, 24))).await.unwrap();

        let id = stored.id.expect("insert should assign an id");
        assert!(repo.exists_by_date(date(2025, 2, 24)).await.unwrap());
        assert_eq!(repo.find_by_date(date(2025, 2, 24)).await.unwrap().unwrap().id, Some(id));
        assert_eq!(repo.find_by_id(id).await.unwrap().unwrap().text, "X");
    }

    #[tokio::test]
    async fn insert_ignores_caller_supplied_id() {
        let repo = InMemoryJokeRepository::new();
        let supplied = JokeId::generate();
        let stored = repo
            .insert(&Joke::new("X", date(2025, 2, 24)).with_id(supplied))
            .await
            .unwrap();

        assert_ne!(stored.id, Some(supplied));
        assert!(repo.find_by_id(supplied).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_on_taken_date_is_rejected() {
        let repo = InMemoryJokeRepository::new();
        repo.insert(&Joke::new("X", date(2025, 2, 24))).await.unwrap();

        let err = repo.insert(&Joke::new("Y", date(2025, 2, 24))).await.unwrap_err();
        assert!(matches!(err, RepoError::DateConflict(d) if d == date(2025, 2, 24)));
    }

    #[tokio::test]
    async fn save_moves_date_index() {
        let repo = InMemoryJokeRepository::new();
        let stored = repo.insert(&Joke::new("X", date(2025, 1, 1))).await.unwrap();
        let id = stored.id.unwrap();

        repo.save(id, &Joke::new("X", date(2025, 1, 2))).await.unwrap();

        assert!(!repo.exists_by_date(date(2025, 1, 1)).await.unwrap());
        assert_eq!(repo.find_by_date(date(2025, 1, 2)).await.unwrap().unwrap().id, Some(id));
    }

    #[tokio::test]
    async fn save_onto_other_jokes_date_is_rejected() {
        let repo = InMemoryJokeRepository::new();
        let a = repo.insert(&Joke::new("A", date(2025, 1, 1))).await.unwrap();
        repo.insert(&Joke::new("B", date(2025, 1, 2))).await.unwrap();
        let a_id = a.id.unwrap();

        let err = repo.save(a_id, &Joke::new("A", date(2025, 1, 2))).await.unwrap_err();

        assert!(matches!(err, RepoError::DateConflict(_)));
        assert_eq!(repo.find_by_id(a_id).await.unwrap().unwrap().date, date(2025, 1, 1));
    }

    #[tokio::test]
    async fn save_unknown_id_is_not_found() {
        let repo = InMemoryJokeRepository::new();
        let id = JokeId::generate();
        let err = repo.save(id, &Joke::new("X", date(2025, 1, 1))).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn delete_frees_date_and_is_idempotent() {
        let repo = InMemoryJokeRepository::new();
        let stored = repo.insert(&Joke::new("X", date(2025, 2, 24))).await.unwrap();
        let id = stored.id.unwrap();

        repo.delete_by_id(id).await.unwrap();
        repo.delete_by_id(id).await.unwrap();

        assert!(repo.find_by_id(id).await.unwrap().is_none());
        assert!(!repo.exists_by_date(date(2025, 2, 24)).await.unwrap());
    }
}
