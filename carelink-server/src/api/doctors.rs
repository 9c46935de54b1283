use super::{hash_password, write, ApiResult, NewAccount};
use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use carelink_core::DoctorProfile;
use serde::Deserialize;

#[derive(Deserialize)]
struct DoctorRequest {
    user: NewAccount,
    #[serde(flatten)]
    profile: DoctorProfile,
}

pub async fn create(call: &Call<'_>) -> ApiResult {
    let request: DoctorRequest = call.json()?;
    let DoctorRequest { user, profile } = request;
    let hash = hash_password(user.password).await?;
    let doctor = write(call, move |store| store.create_doctor(&user.email, hash, profile)).await?;
    ok_json(&doctor)
}

pub fn list(call: &Call<'_>) -> ApiResult {
    ok_json(&call.state.store.list_doctors()?)
}

pub async fn me(call: &Call<'_>) -> ApiResult {
    let actor = call.actor().await?;
    let doctor = match actor.doctor_id() {
        Some(id) => call.state.store.doctor(id)?,
        None => None,
    };
    ok_json(&doctor.ok_or_else(|| ApiError::not_found("Current user is not a doctor"))?)
}
