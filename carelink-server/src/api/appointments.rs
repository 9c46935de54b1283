use super::{message, write, ApiResult};
use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use carelink_core::auth::Action;
use carelink_core::{AppointmentId, AppointmentStatus, CoreError, PatientId};
use carelink_engine::NewAppointment;
use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRequest {
    patient_id: PatientId,
    appointment_date: NaiveDateTime,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentEdit {
    id: AppointmentId,
    appointment_date: NaiveDateTime,
    appointment_status: AppointmentStatus,
    #[serde(default)]
    description: String,
}

/// The acting doctor becomes the appointment's doctor.
pub async fn schedule(call: &Call<'_>) -> ApiResult {
    let request: ScheduleRequest = call.json()?;
    let actor = call.actor().await?;
    let doctor_id = actor
        .doctor_id()
        .ok_or_else(|| ApiError::not_found("Doctor profile not found"))?;

    let new = NewAppointment {
        doctor_id,
        patient_id: request.patient_id,
        appointment_date: request.appointment_date,
        description: request.description,
    };
    let appointment = write(call, move |store| store.insert_appointment(new)).await?;
    ok_json(&appointment)
}

pub async fn list(call: &Call<'_>) -> ApiResult {
    let actor = call.actor().await?;
    let all = call.state.store.list_appointments()?;
    ok_json(&call.state.policy.visible_appointments(&actor, all))
}

pub async fn edit(call: &Call<'_>) -> ApiResult {
    let edit: AppointmentEdit = call.json()?;
    let mut appointment = call
        .state
        .store
        .appointment(edit.id)?
        .ok_or(CoreError::NotFound { entity: "Appointment", id: edit.id.get() })?;

    let actor = call.actor().await?;
    call.state.policy.check(&actor, &appointment, Action::Edit)?;

    appointment.appointment_date = edit.appointment_date;
    appointment.appointment_status = edit.appointment_status;
    appointment.description = edit.description;
    let appointment = write(call, move |store| {
        store.update_appointment(&appointment).map(|()| appointment)
    })
    .await?;
    ok_json(&appointment)
}

pub async fn delete(call: &Call<'_>, id: AppointmentId) -> ApiResult {
    let appointment = call
        .state
        .store
        .appointment(id)?
        .ok_or(CoreError::NotFound { entity: "Appointment", id: id.get() })?;

    let actor = call.actor().await?;
    call.state.policy.check(&actor, &appointment, Action::Delete)?;
    write(call, move |store| store.delete_appointment(id)).await?;
    info!(appointment_id = %id, "appointment deleted");

    if actor.principal().is_admin() {
        message("Appointment deleted by Admin")
    } else {
        message("Appointment deleted by Doctor")
    }
}
