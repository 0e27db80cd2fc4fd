//! HTTP surface: the command endpoint, profile CRUD, and introspection.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::dispatch::{DispatchResponse, Dispatcher};
use crate::profile::{ProfileStore, UserPreference};

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub profiles: Arc<dyn ProfileStore>,
}

type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/command", post(handle_command))
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/profiles", get(list_profiles).post(create_profile))
        .route(
            "/profiles/:user_id",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    text: String,
    #[serde(default)]
    user_id: Option<String>,
}

async fn handle_command(
    State(state): State<SharedState>,
    Json(request): Json<CommandRequest>,
) -> Json<DispatchResponse> {
    // A missing or failing profile lookup never blocks the command.
    let preference = match &request.user_id {
        Some(user_id) => match state.profiles.get(user_id).await {
            Ok(preference) => preference,
            Err(err) => {
                warn!(user_id, error = %err, "profile lookup failed, dispatching without preference");
                None
            }
        },
        None => None,
    };

    let response = state
        .dispatcher
        .dispatch(&request.text, preference.as_ref())
        .await;
    Json(response)
}

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tools_count": state.dispatcher.catalog().list().len(),
    }))
}

async fn list_tools(State(state): State<SharedState>) -> Json<Value> {
    let tools: Vec<&str> = state
        .dispatcher
        .catalog()
        .list()
        .iter()
        .map(|descriptor| descriptor.name)
        .collect();
    Json(json!({ "tools": tools }))
}

// ── Profiles CRUD ───────────────────────────────────────────────────────

async fn list_profiles(
    State(state): State<SharedState>,
) -> Result<Json<Vec<UserPreference>>, AppError> {
    let profiles = state
        .profiles
        .list()
        .await
        .map_err(|e| AppError::Store(e.to_string()))?;
    Ok(Json(profiles))
}

async fn get_profile(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreference>, AppError> {
    state
        .profiles
        .get(&user_id)
        .await
        .map_err(|e| AppError::Store(e.to_string()))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("profile `{user_id}` not found")))
}

async fn create_profile(
    State(state): State<SharedState>,
    Json(preference): Json<UserPreference>,
) -> Result<Json<UserPreference>, AppError> {
    let created = state
        .profiles
        .create(&preference)
        .await
        .map_err(|e| AppError::Store(e.to_string()))?;
    if created {
        Ok(Json(preference))
    } else {
        Err(AppError::Conflict(format!(
            "profile `{}` already exists",
            preference.user_id
        )))
    }
}

async fn update_profile(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Json(mut preference): Json<UserPreference>,
) -> Result<Json<UserPreference>, AppError> {
    preference.user_id = user_id.clone();
    let updated = state
        .profiles
        .update(&preference)
        .await
        .map_err(|e| AppError::Store(e.to_string()))?;
    if updated {
        Ok(Json(preference))
    } else {
        Err(AppError::NotFound(format!("profile `{user_id}` not found")))
    }
}

async fn delete_profile(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .profiles
        .delete(&user_id)
        .await
        .map_err(|e| AppError::Store(e.to_string()))?;
    if deleted {
        Ok(Json(json!({ "message": format!("profile `{user_id}` deleted") })))
    } else {
        Err(AppError::NotFound(format!("profile `{user_id}` not found")))
    }
}

// ── Error handling ──────────────────────────────────────────────────────

enum AppError {
    NotFound(String),
    Conflict(String),
    Store(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Store(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
