use crate::{
    errors::AppError,
    models::{Joke, JokeId, JokeQuery, JokeRequest},
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Local;
use std::sync::Arc;
use tracing;

/// Handler for GET /joke. Precedence: id, then date, then today.
pub async fn get_joke(
    State(state): State<Arc<AppState>>,
    query: Result<Query<JokeQuery>, QueryRejection>,
) -> Result<Json<Joke>, AppError> {
    let Query(query) = query?;
    let today = Local::now().date_naive();
    tracing::debug!(id = ?query.id, date = ?query.date, %today, "Fetching joke via handler");
    let joke = state.jokes.find_default(query.id, query.date, today).await?;
    Ok(Json(joke))
}

pub async fn add_joke(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JokeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let mut candidate = request.into_candidate()?;
    candidate.id = None;
    let joke = state.jokes.insert_joke(candidate).await?;

    tracing::info!(joke_id = ?joke.id, "Joke created successfully via handler");
    Ok((StatusCode::CREATED, Json(joke)))
}

pub async fn update_joke(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JokeRequest>, JsonRejection>,
) -> Result<Json<Joke>, AppError> {
    let Json(request) = payload?;
    let candidate = request.into_candidate()?;
    let joke = state.jokes.update_joke(candidate).await?;
    Ok(Json(joke))
}

pub async fn upsert_joke(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JokeRequest>, JsonRejection>,
) -> Result<Json<Joke>, AppError> {
    let Json(request) = payload?;
    let candidate = request.into_candidate()?;
    let joke = state.jokes.upsert_joke(candidate).await?;
    Ok(Json(joke))
}

/// Deletes a joke if present. Unknown ids still answer 204.
pub async fn delete_joke(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<StatusCode, AppError> {
    let joke_id = JokeId::parse(&id_str)?;
    tracing::debug!(%joke_id, "Deleting joke via handler");

    state.jokes.delete_joke(Some(joke_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
