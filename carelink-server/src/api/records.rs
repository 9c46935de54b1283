use super::{now, write, ApiResult};
use crate::error::ApiError;
use crate::handlers::{attachment_response, ok_json, Call};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use carelink_core::auth::Action;
use carelink_core::{CoreError, DoctorId, MedicalRecordId, PatientId};
use carelink_engine::NewMedicalRecord;
use serde::Deserialize;
use tracing::error;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    doctor_id: DoctorId,
    patient_id: PatientId,
    #[serde(default)]
    diagnosis: String,
    #[serde(default)]
    notes: String,
    file_name: String,
    /// Base64 (standard alphabet)
    document: String,
}

pub async fn upload(call: &Call<'_>) -> ApiResult {
    let request: UploadRequest = call.json()?;
    let document = STANDARD
        .decode(request.document.as_bytes())
        .map_err(|_| ApiError::bad_request("Document is not valid base64"))?;

    if call.state.store.doctor(request.doctor_id)?.is_none() {
        return Err(CoreError::NotFound {
            entity: "Doctor",
            id: request.doctor_id.get(),
        }
        .into());
    }

    let new = NewMedicalRecord {
        doctor_id: request.doctor_id,
        patient_id: request.patient_id,
        diagnosis: request.diagnosis,
        notes: request.notes,
        file_name: request.file_name,
        created_at: now(),
    };
    let record = write(call, move |store| store.insert_record(new, &document)).await?;
    ok_json(&record)
}

pub async fn list(call: &Call<'_>) -> ApiResult {
    let actor = call.actor().await?;
    let all = call.state.store.list_records()?;
    ok_json(&call.state.policy.visible_records(&actor, all))
}

/// The stored document of one record, as an attachment.
pub async fn file(call: &Call<'_>, id: MedicalRecordId) -> ApiResult {
    let store = &call.state.store;
    let record = store.record(id)?.ok_or(CoreError::NotFound {
        entity: "Medical Record",
        id: id.get(),
    })?;

    let actor = call.actor().await?;
    call.state.policy.check(&actor, &record, Action::Read)?;

    let Some(document) = store.document(id)? else {
        error!(record_id = %id, "document missing for medical record");
        return Err(ApiError::internal());
    };
    Ok(attachment_response(&record.medical_documents, document))
}
