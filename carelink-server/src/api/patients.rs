use super::{hash_password, write, ApiResult, NewAccount};
use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use carelink_core::{CoreError, PatientId, PatientProfile};
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
struct PatientRequest {
    user: NewAccount,
    #[serde(flatten)]
    profile: PatientProfile,
}

#[derive(Deserialize)]
struct PatientEdit {
    id: PatientId,
    #[serde(flatten)]
    profile: PatientProfile,
}

pub async fn register(call: &Call<'_>) -> ApiResult {
    let request: PatientRequest = call.json()?;
    let PatientRequest { user, profile } = request;
    let hash = hash_password(user.password).await?;
    let patient = write(call, move |store| store.create_patient(&user.email, hash, profile)).await?;
    ok_json(&patient)
}

pub fn list(call: &Call<'_>) -> ApiResult {
    ok_json(&call.state.store.list_patients()?)
}

pub fn get(call: &Call<'_>, id: PatientId) -> ApiResult {
    let patient = call
        .state
        .store
        .patient(id)?
        .ok_or(CoreError::NotFound { entity: "Patient", id: id.get() })?;
    ok_json(&patient)
}

pub async fn me(call: &Call<'_>) -> ApiResult {
    let actor = call.actor().await?;
    let patient = match actor.patient_id() {
        Some(id) => call.state.store.patient(id)?,
        None => None,
    };
    ok_json(&patient.ok_or_else(|| ApiError::not_found("Current user is not a patient"))?)
}

/// Replace the editable profile fields of a patient.
pub async fn edit(call: &Call<'_>) -> ApiResult {
    let PatientEdit { id, profile } = call.json()?;
    let patient = write(call, move |store| store.update_patient(id, profile)).await?;
    info!(patient_id = %patient.id, "patient profile updated");
    ok_json(&patient)
}
