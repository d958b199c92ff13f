use super::{blocking, ApiError, ApiResult};
use crate::model::{Patient, PatientStatus};
use crate::orchestrator::Console;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct PatientQuery {
    status: Option<String>,
}

/// Intake body. Missing fields deserialize as empty and fail validation by name.
#[derive(Debug, Deserialize)]
pub(super) struct NewPatient {
    #[serde(default)]
    name: String,
    #[serde(default)]
    dob: String,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusChange {
    status: String,
}

pub(super) fn parse_status(raw: &str) -> ApiResult<PatientStatus> {
    raw.parse::<PatientStatus>().map_err(ApiError::bad_request)
}

pub(super) async fn list_patients(
    State(console): State<Console>,
    Query(q): Query<PatientQuery>,
) -> ApiResult<Json<Vec<Patient>>> {
    let filter = q.status.as_deref().map(parse_status).transpose()?;
    Ok(Json(console.patients.list(filter)))
}

pub(super) async fn create_patient(
    State(console): State<Console>,
    Json(body): Json<NewPatient>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let store = console.patients.clone();
    let patient = blocking(move || Ok(store.add(&body.name, &body.dob, body.notes)?)).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub(super) async fn get_patient(
    State(console): State<Console>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(console.patients.get(id)?))
}

pub(super) async fn transition_patient(
    State(console): State<Console>,
    Path(id): Path<u64>,
    Json(body): Json<StatusChange>,
) -> ApiResult<Json<Patient>> {
    let to = parse_status(&body.status)?;
    let store = console.patients.clone();
    let patient = blocking(move || Ok(store.transition(id, to)?)).await?;
    Ok(Json(patient))
}
