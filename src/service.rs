use crate::{
    domain::JokeRepository,
    errors::{JokeError, RepoError},
    models::{Joke, JokeId, JokeLookup},
};
use chrono::NaiveDate;
use std::sync::Arc;

/// Decides whether a candidate joke is inserted, updated or rejected, keeping
/// at most one joke per date.
///
/// Every existence check is a store query. The store's own uniqueness
/// constraint is the final word: a write-time `DateConflict` surfaces as
/// `JokeError::Conflict`, the same as a failed pre-check.
#[derive(Clone)]
pub struct JokeService {
    repo: Arc<dyn JokeRepository>,
}

impl JokeService {
    pub fn new(repo: Arc<dyn JokeRepository>) -> Self {
        Self { repo }
    }

    /// Stores a new joke. Any id on the candidate is ignored.
    pub async fn insert_joke(&self, candidate: Joke) -> Result<Joke, JokeError> {
        if self.repo.exists_by_date(candidate.date).await? {
            tracing::warn!(joke_date = %candidate.date, "Rejecting insert: date already used");
            return Err(JokeError::date_taken(candidate.date));
        }

        let stored = self.repo.insert(&candidate).await?;
        tracing::info!(joke_id = ?stored.id, joke_date = %stored.date, "Joke inserted");
        Ok(stored)
    }

    /// Replaces an existing joke. Unknown ids are rejected, never inserted.
    pub async fn update_joke(&self, candidate: Joke) -> Result<Joke, JokeError> {
        let id = candidate
            .id
            .ok_or_else(|| JokeError::InvalidInput("Cannot update a joke without an id.".to_string()))?;

        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(JokeError::NotFound(JokeLookup::Id(id)))?;

        // Only a date change can collide. The unchanged date is still held by
        // this very joke in the store, so checking it would reject no-ops.
        if existing.date != candidate.date {
            if let Some(holder) = self.repo.find_by_date(candidate.date).await? {
                if holder.id != Some(id) {
                    tracing::warn!(joke_id = %id, joke_date = %candidate.date, holder_id = ?holder.id, "Rejecting update: date held by another joke");
                    return Err(JokeError::date_taken_by_other(candidate.date));
                }
            }
        }

        let stored = self.repo.save(id, &candidate).await.map_err(|e| match e {
            RepoError::DateConflict(date) => JokeError::date_taken_by_other(date),
            other => JokeError::from(other),
        })?;
        tracing::info!(joke_id = %id, joke_date = %stored.date, "Joke updated");
        Ok(stored)
    }

    /// Updates the joke if its id is stored, otherwise inserts it as new.
    pub async fn upsert_joke(&self, mut candidate: Joke) -> Result<Joke, JokeError> {
        if let Some(id) = candidate.id {
            if self.repo.find_by_id(id).await?.is_some() {
                return self.update_joke(candidate).await;
            }
            tracing::debug!(joke_id = %id, "Upsert target not stored, inserting instead");
        }
        candidate.id = None;
        self.insert_joke(candidate).await
    }

    /// An absent id matches nothing.
    pub async fn find_by_id(&self, id: Option<JokeId>) -> Result<Option<Joke>, JokeError> {
        match id {
            Some(id) => Ok(self.repo.find_by_id(id).await?),
            None => Ok(None),
        }
    }

    /// An absent date matches nothing.
    pub async fn find_by_date(&self, date: Option<NaiveDate>) -> Result<Option<Joke>, JokeError> {
        match date {
            Some(date) => Ok(self.repo.find_by_date(date).await?),
            None => Ok(None),
        }
    }

    /// Looks up by id if given, else by date, else by `today`. Exactly one
    /// store lookup is made.
    pub async fn find_default(
        &self,
        id: Option<JokeId>,
        date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Joke, JokeError> {
        let lookup = match (id, date) {
            (Some(id), _) => JokeLookup::Id(id),
            (None, Some(date)) => JokeLookup::Date(date),
            (None, None) => JokeLookup::Date(today),
        };
        tracing::debug!(%lookup, "Resolving joke lookup");

        let found = match lookup {
            JokeLookup::Id(id) => self.find_by_id(Some(id)).await?,
            JokeLookup::Date(date) => self.find_by_date(Some(date)).await?,
        };
        found.ok_or(JokeError::NotFound(lookup))
    }

    /// Deleting an absent or unknown id is a no-op.
    pub async fn delete_joke(&self, id: Option<JokeId>) -> Result<(), JokeError> {
        if let Some(id) = id {
            self.repo.delete_by_id(id).await?;
            tracing::info!(joke_id = %id, "Joke deleted (if it existed)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_repository::InMemoryJokeRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service() -> JokeService {
        JokeService::new(Arc::new(InMemoryJokeRepository::new()))
    }

    /// Counts calls into an inner store. `stale_pre_checks` makes the date
    /// queries answer "free" to open the window between check and write;
    /// `moved_before_save` makes every save lose to a concurrent move.
    #[derive(Default)]
    struct RecordingRepository {
        inner: InMemoryJokeRepository,
        stale_pre_checks: bool,
        moved_before_save: bool,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl JokeRepository for RecordingRepository {
        async fn insert(&self, joke: &Joke) -> Result<Joke, RepoError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(joke).await
        }

        async fn find_by_id(&self, id: JokeId) -> Result<Option<Joke>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }

        async fn find_by_date(&self, date: NaiveDate) -> Result<Option<Joke>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.stale_pre_checks {
                return Ok(None);
            }
            self.inner.find_by_date(date).await
        }

        async fn exists_by_date(&self, date: NaiveDate) -> Result<bool, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.stale_pre_checks {
                return Ok(false);
            }
            self.inner.exists_by_date(date).await
        }

        async fn save(&self, id: JokeId, joke: &Joke) -> Result<Joke, RepoError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.moved_before_save {
                return Err(RepoError::ConcurrentModification(id));
            }
            self.inner.save(id, joke).await
        }

        async fn delete_by_id(&self, id: JokeId) -> Result<(), RepoError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_by_id(id).await
        }
    }

    #[tokio::test]
    async fn insert_returns_stored_joke_with_id() {
        let service = service();
        let candidate = Joke::new("X", date(2025, 2, 24));

        let stored = service.insert_joke(candidate.clone()).await.unwrap();

        assert!(stored.id.is_some());
        assert!(stored.same_content(&candidate));
    }

    #[tokio::test]
    async fn second_insert_on_same_date_conflicts_and_leaves_store_unchanged() {
        let service = service();
        let first = service.insert_joke(Joke::new("X", date(2025, 2, 24))).await.unwrap();

        let err = service.insert_joke(Joke::new("Y", date(2025, 2, 24))).await.unwrap_err();

        assert!(matches!(err, JokeError::Conflict(_)));
        let held = service.find_by_date(Some(date(2025, 2, 24))).await.unwrap().unwrap();
        assert_eq!(held.id, first.id);
        assert_eq!(held.text, "X");
    }

    #[tokio::test]
    async fn update_moves_joke_to_free_date() {
        let service = service();
        let stored = service.insert_joke(Joke::new("X", date(2025, 1, 1))).await.unwrap();

        let mut moved = stored.clone();
        moved.date = date(2025, 1, 2);
        let updated = service.update_joke(moved).await.unwrap();

        assert_eq!(updated.id, stored.id);
        let found = service.find_by_date(Some(date(2025, 1, 2))).await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert!(service.find_by_date(Some(date(2025, 1, 1))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_keeping_date_never_conflicts() {
        let service = service();
        let stored = service.insert_joke(Joke::new("X", date(2025, 1, 1))).await.unwrap();

        let mut edited = stored.clone();
        edited.text = "X, but funnier".to_string();
        edited.description = Some("now with a punchline".to_string());
        let updated = service.update_joke(edited).await.unwrap();

        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.text, "X, but funnier");
        assert_eq!(updated.description.as_deref(), Some("now with a punchline"));
    }

    #[tokio::test]
    async fn update_onto_other_jokes_date_conflicts() {
        let service = service();
        let a = service.insert_joke(Joke::new("A", date(2025, 1, 1))).await.unwrap();
        service.insert_joke(Joke::new("B", date(2025, 1, 2))).await.unwrap();

        let mut moved = a.clone();
        moved.date = date(2025, 1, 2);
        let err = service.update_joke(moved).await.unwrap_err();

        assert!(matches!(err, JokeError::Conflict(ref msg) if msg.starts_with("Another Joke")));
        let still = service.find_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(still.date, date(2025, 1, 1));
    }

    #[tokio::test]
    async fn update_without_id_is_invalid() {
        let service = service();
        let err = service.update_joke(Joke::new("X", date(2025, 1, 1))).await.unwrap_err();
        assert!(matches!(err, JokeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found_without_writing() {
        let repo = Arc::new(RecordingRepository::default());
        let service = JokeService::new(repo.clone());
        let missing = JokeId::generate();

        let err = service
            .update_joke(Joke::new("X", date(2025, 1, 1)).with_id(missing))
            .await
            .unwrap_err();

        assert!(matches!(err, JokeError::NotFound(JokeLookup::Id(id)) if id == missing));
        assert_eq!(repo.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_time_conflict_on_insert_is_reported_as_conflict() {
        let repo = Arc::new(RecordingRepository {
            stale_pre_checks: true,
            ..Default::default()
        });
        let service = JokeService::new(repo.clone());
        service.insert_joke(Joke::new("X", date(2025, 2, 24))).await.unwrap();

        let err = service.insert_joke(Joke::new("Y", date(2025, 2, 24))).await.unwrap_err();

        assert!(matches!(err, JokeError::Conflict(_)));
        assert_eq!(repo.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn write_time_conflict_on_update_is_reported_as_conflict() {
        let repo = Arc::new(RecordingRepository {
            stale_pre_checks: true,
            ..Default::default()
        });
        let service = JokeService::new(repo.clone());
        let a = service.insert_joke(Joke::new("A", date(2025, 1, 1))).await.unwrap();
        service.insert_joke(Joke::new("B", date(2025, 1, 2))).await.unwrap();

        let mut moved = a.clone();
        moved.date = date(2025, 1, 2);
        let err = service.update_joke(moved).await.unwrap_err();

        assert!(matches!(err, JokeError::Conflict(_)));
        assert_eq!(repo.inner.find_by_id(a.id.unwrap()).await.unwrap().unwrap().date, date(2025, 1, 1));
    }

    #[tokio::test]
    async fn concurrent_move_during_update_is_its_own_conflict() {
        let repo = Arc::new(RecordingRepository {
            moved_before_save: true,
            ..Default::default()
        });
        let service = JokeService::new(repo.clone());
        let stored = service.insert_joke(Joke::new("A", date(2025, 1, 1))).await.unwrap();

        let mut moved = stored.clone();
        moved.date = date(2025, 1, 3);
        let err = service.update_joke(moved).await.unwrap_err();

        assert!(matches!(err, JokeError::Conflict(ref msg) if msg.contains("changed by another request")));
    }

    #[tokio::test]
    async fn upsert_inserts_when_id_is_unknown() {
        let service = service();
        let stale = JokeId::generate();

        let stored = service
            .upsert_joke(Joke::new("X", date(2025, 3, 1)).with_id(stale))
            .await
            .unwrap();

        assert!(stored.id.is_some());
        assert_ne!(stored.id, Some(stale));
    }

    #[tokio::test]
    async fn upsert_updates_when_id_is_stored() {
        let service = service();
        let stored = service.insert_joke(Joke::new("X", date(2025, 3, 1))).await.unwrap();

        let mut edited = stored.clone();
        edited.text = "Y".to_string();
        let updated = service.upsert_joke(edited).await.unwrap();

        assert_eq!(updated.id, stored.id);
        assert_eq!(service.find_by_id(stored.id).await.unwrap().unwrap().text, "Y");
    }

    #[tokio::test]
    async fn upsert_without_id_still_respects_date_uniqueness() {
        let service = service();
        service.insert_joke(Joke::new("X", date(2025, 3, 1))).await.unwrap();

        let err = service.upsert_joke(Joke::new("Y", date(2025, 3, 1))).await.unwrap_err();
        assert!(matches!(err, JokeError::Conflict(_)));
    }

    #[tokio::test]
    async fn absent_keys_match_nothing() {
        let service = service();
        assert!(service.find_by_id(None).await.unwrap().is_none());
        assert!(service.find_by_date(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_default_prefers_id_then_date_then_today() {
        let repo = Arc::new(RecordingRepository::default());
        let service = JokeService::new(repo.clone());
        let today = date(2025, 5, 5);
        let by_id = service.insert_joke(Joke::new("by id", date(2025, 5, 1))).await.unwrap();
        service.insert_joke(Joke::new("by date", date(2025, 5, 2))).await.unwrap();
        service.insert_joke(Joke::new("today", today)).await.unwrap();
        let reads_before = repo.reads.load(Ordering::SeqCst);

        let found = service.find_default(by_id.id, Some(date(2025, 5, 2)), today).await.unwrap();
        assert_eq!(found.text, "by id");
        assert_eq!(repo.reads.load(Ordering::SeqCst), reads_before + 1);

        let found = service.find_default(None, Some(date(2025, 5, 2)), today).await.unwrap();
        assert_eq!(found.text, "by date");

        let found = service.find_default(None, None, today).await.unwrap();
        assert_eq!(found.text, "today");
    }

    #[tokio::test]
    async fn find_default_reports_the_key_it_missed() {
        let service = service();
        let today = date(2025, 5, 5);

        let err = service.find_default(None, None, today).await.unwrap_err();
        assert!(matches!(err, JokeError::NotFound(JokeLookup::Date(d)) if d == today));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_ignores_absent_id() {
        let repo = Arc::new(RecordingRepository::default());
        let service = JokeService::new(repo.clone());
        let stored = service.insert_joke(Joke::new("X", date(2025, 2, 24))).await.unwrap();

        service.delete_joke(stored.id).await.unwrap();
        service.delete_joke(stored.id).await.unwrap();
        assert!(service.find_by_id(stored.id).await.unwrap().is_none());

        let writes = repo.writes.load(Ordering::SeqCst);
        service.delete_joke(None).await.unwrap();
        assert_eq!(repo.writes.load(Ordering::SeqCst), writes);
    }

    #[tokio::test]
    async fn successful_writes_never_share_a_date() {
        let service = service();
        let days = [date(2025, 6, 1), date(2025, 6, 2), date(2025, 6, 3)];
        let mut ids = Vec::new();
        for (i, day) in days.iter().enumerate() {
            ids.push(service.insert_joke(Joke::new(format!("joke {i}"), *day)).await.unwrap().id);
        }
        // Shuffle dates around; some moves collide and must be refused.
        let moves = [(0, 1), (2, 0), (1, 2), (0, 2), (2, 1)];
        for (who, target) in moves {
            let mut candidate = service.find_by_id(ids[who]).await.unwrap().unwrap();
            candidate.date = days[target];
            let _ = service.update_joke(candidate).await;
        }

        let mut seen = std::collections::HashSet::new();
        for id in &ids {
            let joke = service.find_by_id(*id).await.unwrap().unwrap();
            assert!(seen.insert(joke.date), "date {} held twice", joke.date);
        }
    }
}
