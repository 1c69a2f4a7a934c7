use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::AppError;

/// Opaque identifier of a stored joke.
///
/// Only a `JokeRepository` mints new ids; everything else just carries
/// the ones it was handed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JokeId(Uuid);

impl JokeId {
    /// Mints a fresh id. Called by store implementations on insert.
    pub fn generate() -> Self {
        JokeId(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw).map(JokeId)
    }
}

impl fmt::Display for JokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A joke of the day. At most one stored joke exists per `date`.
#[derive(Serialize, Debug, Clone)]
pub struct Joke {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JokeId>,
    #[serde(rename = "joke")]
    pub text: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Joke {
    /// Returns a copy carrying `id`, as a store does after persisting.
    pub fn with_id(&self, id: JokeId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }
}

#[cfg(test)]
impl Joke {
    pub fn new(text: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: None,
            text: text.into(),
            date,
            description: None,
        }
    }

    /// Content equality: text and date only, id and description ignored.
    pub fn same_content(&self, other: &Joke) -> bool {
        self.text == other.text && self.date == other.date
    }
}

/// The key a failed lookup was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JokeLookup {
    Id(JokeId),
    Date(NaiveDate),
}

impl fmt::Display for JokeLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JokeLookup::Id(id) => write!(f, "id: {}", id),
            JokeLookup::Date(date) => write!(f, "date: {}", date),
        }
    }
}

/// Wire shape of an add/update/upsert body, before validation.
#[derive(Deserialize, Debug, Default)]
pub struct JokeRequest {
    pub id: Option<JokeId>,
    pub joke: Option<String>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl JokeRequest {
    /// Checks required fields and turns the body into a candidate `Joke`.
    pub fn into_candidate(self) -> Result<Joke, AppError> {
        let text = self
            .joke
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AppError::InvalidInput("Joke is required.".to_string()))?;
        let date = self
            .date
            .ok_or_else(|| AppError::InvalidInput("Date is required.".to_string()))?;

        Ok(Joke {
            id: self.id,
            text,
            date,
            description: self.description,
        })
    }
}

/// Query string of `GET /joke`.
#[derive(Deserialize, Debug, Default)]
pub struct JokeQuery {
    pub id: Option<JokeId>,
    pub date: Option<NaiveDate>,
}
