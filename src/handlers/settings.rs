//! Settings and email-template administration (spec §2 "Settings &
//! Template Store", §6).

use crate::error::AppResult;
use crate::settings::{self, EmailTemplate};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

pub async fn list_settings(State(state): State<AppState>) -> AppResult<Json<Vec<(String, String)>>> {
    Ok(Json(settings::list_settings(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: String,
}

pub async fn set_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetSettingRequest>,
) -> AppResult<StatusCode> {
    settings::set_setting(&state.db, &key, &body.value).await?;
    Ok(StatusCode::OK)
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<EmailTemplate>> {
    Ok(Json(settings::get_template(&state.db, &name).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetTemplateRequest {
    pub subject: String,
    pub body: String,
}

pub async fn set_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SetTemplateRequest>,
) -> AppResult<StatusCode> {
    settings::set_template(&state.db, &name, &body.subject, &body.body).await?;
    Ok(StatusCode::OK)
}
