use super::{now, write, ApiResult};
use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use carelink_core::auth::Action;
use carelink_core::{CoreError, PatientId, PrescriptionId};
use carelink_engine::NewPrescription;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddRequest {
    patient_id: PatientId,
    medication_list: BTreeSet<String>,
    #[serde(default)]
    dosage_instructions: String,
    #[serde(default)]
    valid_until: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrescriptionEdit {
    id: PrescriptionId,
    medication_list: BTreeSet<String>,
    #[serde(default)]
    dosage_instructions: String,
    prescribed_date: NaiveDateTime,
    #[serde(default)]
    valid_until: Option<NaiveDateTime>,
}

/// Prescribed by the acting doctor, dated now.
pub async fn add(call: &Call<'_>) -> ApiResult {
    let request: AddRequest = call.json()?;
    let actor = call.actor().await?;
    let doctor_id = actor
        .doctor_id()
        .ok_or_else(|| ApiError::not_found("Doctor profile not found"))?;

    let new = NewPrescription {
        doctor_id,
        patient_id: request.patient_id,
        medication_list: request.medication_list,
        dosage_instructions: request.dosage_instructions,
        prescribed_date: now(),
        valid_until: request.valid_until,
    };
    let prescription = write(call, move |store| store.insert_prescription(new)).await?;
    ok_json(&prescription)
}

pub async fn list(call: &Call<'_>) -> ApiResult {
    let actor = call.actor().await?;
    let all = call.state.store.list_prescriptions()?;
    ok_json(&call.state.policy.visible_prescriptions(&actor, all))
}

pub async fn edit(call: &Call<'_>) -> ApiResult {
    let edit: PrescriptionEdit = call.json()?;
    let mut prescription = call
        .state
        .store
        .prescription(edit.id)?
        .ok_or(CoreError::NotFound { entity: "Prescription", id: edit.id.get() })?;

    let actor = call.actor().await?;
    call.state.policy.check(&actor, &prescription, Action::Edit)?;

    prescription.medication_list = edit.medication_list;
    prescription.dosage_instructions = edit.dosage_instructions;
    prescription.prescribed_date = edit.prescribed_date;
    prescription.valid_until = edit.valid_until;
    let prescription = write(call, move |store| {
        store.update_prescription(&prescription).map(|()| prescription)
    })
    .await?;
    ok_json(&prescription)
}
