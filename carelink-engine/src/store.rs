//! Clinic store: every entity kind, plus the identity directories
//!
//! Writes are serialized by a single lock so id allocation and unique-email
//! checks see a consistent view. Each mutation commits as one fjall batch.

use crate::{storage_error, Index, StorageEngine, Table};
use async_trait::async_trait;
use carelink_core::auth::{
    DirectoryError, Principal, PrincipalDirectory, ProfileDirectory, ProfileLink, RoleName, RoleSet,
};
use carelink_core::*;
use chrono::NaiveDateTime;
use fjall::PartitionHandle;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Fields of an appointment before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    pub appointment_date: NaiveDateTime,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrescription {
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    pub medication_list: BTreeSet<String>,
    pub dosage_instructions: String,
    pub prescribed_date: NaiveDateTime,
    pub valid_until: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedicalRecord {
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    pub diagnosis: String,
    pub notes: String,
    pub file_name: String,
    pub created_at: NaiveDateTime,
}

pub struct ClinicStore {
    engine: StorageEngine,
    users: Table<User>,
    users_by_email: Index,
    doctors: Table<Doctor>,
    doctors_by_user: Index,
    patients: Table<Patient>,
    patients_by_user: Index,
    appointments: Table<Appointment>,
    prescriptions: Table<Prescription>,
    records: Table<MedicalRecord>,
    documents: PartitionHandle,
    write_lock: Mutex<()>,
}

impl ClinicStore {
    pub fn open(engine: StorageEngine) -> Result<Self> {
        Ok(ClinicStore {
            users: Table::open(&engine, "users")?,
            users_by_email: Index::open(&engine, "users_by_email")?,
            doctors: Table::open(&engine, "doctors")?,
            doctors_by_user: Index::open(&engine, "doctors_by_user")?,
            patients: Table::open(&engine, "patients")?,
            patients_by_user: Index::open(&engine, "patients_by_user")?,
            appointments: Table::open(&engine, "appointments")?,
            prescriptions: Table::open(&engine, "prescriptions")?,
            records: Table::open(&engine, "medical_records")?,
            documents: engine.partition("documents")?,
            write_lock: Mutex::new(()),
            engine,
        })
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- users ---

    pub fn create_user(&self, email: &str, password_hash: String, roles: RoleSet) -> Result<User> {
        let _guard = self.writer();
        let mut batch = self.engine.batch();
        let user = self.stage_user(&mut batch, email, password_hash, roles)?;
        self.engine.commit(batch)?;
        info!(user_id = %user.id, roles = ?user.roles, "user created");
        Ok(user)
    }

    fn stage_user(
        &self,
        batch: &mut fjall::Batch,
        email: &str,
        password_hash: String,
        roles: RoleSet,
    ) -> Result<User> {
        let email = normalize_email(email)?;
        if self.users_by_email.lookup(&email)?.is_some() {
            return Err(CoreError::EmailTaken(email));
        }

        let id = self.users.next_id()?;
        let user = User {
            id: UserId(id),
            email,
            password_hash,
            roles,
        };
        self.users.stage_put(batch, id, &user)?;
        self.users.stage_seq(batch, id);
        self.users_by_email.stage_put(batch, &user.email, id);
        Ok(user)
    }

    pub fn user(&self, id: UserId) -> Result<Option<User>> {
        self.users.get(id.get())
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_ascii_lowercase();
        match self.users_by_email.lookup(&email)? {
            Some(id) => self.users.get(id),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.users.scan()
    }

    /// Remove the login account. Clinical profiles stay, but can no longer
    /// be reached through a principal.
    pub fn delete_user(&self, id: UserId) -> Result<()> {
        let _guard = self.writer();
        let user = self.users.require("User", id.get())?;

        let mut batch = self.engine.batch();
        self.users.stage_remove(&mut batch, id.get());
        self.users_by_email.stage_remove(&mut batch, &user.email);
        self.doctors_by_user.stage_remove(&mut batch, &id.to_string());
        self.patients_by_user.stage_remove(&mut batch, &id.to_string());
        self.engine.commit(batch)?;

        info!(user_id = %id, "user deleted");
        Ok(())
    }

    // --- doctors & patients ---

    /// Create a doctor profile together with its DOCTOR login account.
    pub fn create_doctor(&self, email: &str, password_hash: String, profile: DoctorProfile) -> Result<Doctor> {
        let _guard = self.writer();
        let mut batch = self.engine.batch();
        let user = self.stage_user(&mut batch, email, password_hash, RoleSet::of(&[RoleName::Doctor]))?;

        let id = self.doctors.next_id()?;
        let doctor = Doctor {
            id: DoctorId(id),
            user_id: user.id,
            profile,
        };
        self.doctors.stage_put(&mut batch, id, &doctor)?;
        self.doctors.stage_seq(&mut batch, id);
        self.doctors_by_user.stage_put(&mut batch, &user.id.to_string(), id);
        self.engine.commit(batch)?;

        info!(doctor_id = %doctor.id, user_id = %user.id, "doctor registered");
        Ok(doctor)
    }

    /// Create a patient profile together with its PATIENT login account.
    pub fn create_patient(&self, email: &str, password_hash: String, profile: PatientProfile) -> Result<Patient> {
        let _guard = self.writer();
        let mut batch = self.engine.batch();
        let user = self.stage_user(&mut batch, email, password_hash, RoleSet::of(&[RoleName::Patient]))?;

        let id = self.patients.next_id()?;
        let patient = Patient {
            id: PatientId(id),
            user_id: user.id,
            profile,
        };
        self.patients.stage_put(&mut batch, id, &patient)?;
        self.patients.stage_seq(&mut batch, id);
        self.patients_by_user.stage_put(&mut batch, &user.id.to_string(), id);
        self.engine.commit(batch)?;

        info!(patient_id = %patient.id, user_id = %user.id, "patient registered");
        Ok(patient)
    }

    pub fn doctor(&self, id: DoctorId) -> Result<Option<Doctor>> {
        self.doctors.get(id.get())
    }

    pub fn patient(&self, id: PatientId) -> Result<Option<Patient>> {
        self.patients.get(id.get())
    }

    pub fn doctor_by_user(&self, user_id: UserId) -> Result<Option<Doctor>> {
        match self.doctors_by_user.lookup(&user_id.to_string())? {
            Some(id) => self.doctors.get(id),
            None => Ok(None),
        }
    }

    pub fn patient_by_user(&self, user_id: UserId) -> Result<Option<Patient>> {
        match self.patients_by_user.lookup(&user_id.to_string())? {
            Some(id) => self.patients.get(id),
            None => Ok(None),
        }
    }

    pub fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.doctors.scan()
    }

    pub fn list_patients(&self) -> Result<Vec<Patient>> {
        self.patients.scan()
    }

    pub fn update_patient(&self, id: PatientId, profile: PatientProfile) -> Result<Patient> {
        let _guard = self.writer();
        let mut patient = self.patients.require("Patient", id.get())?;
        patient.profile = profile;

        let mut batch = self.engine.batch();
        self.patients.stage_put(&mut batch, id.get(), &patient)?;
        self.engine.commit(batch)?;
        Ok(patient)
    }

    // --- appointments ---

    pub fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment> {
        let _guard = self.writer();
        self.patients.require("Patient", new.patient_id.get())?;

        let id = self.appointments.next_id()?;
        let appointment = Appointment {
            id: AppointmentId(id),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            appointment_date: new.appointment_date,
            appointment_status: AppointmentStatus::Scheduled,
            description: new.description,
        };

        let mut batch = self.engine.batch();
        self.appointments.stage_put(&mut batch, id, &appointment)?;
        self.appointments.stage_seq(&mut batch, id);
        self.engine.commit(batch)?;

        debug!(appointment_id = id, doctor_id = %appointment.doctor_id, "appointment scheduled");
        Ok(appointment)
    }

    pub fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        self.appointments.get(id.get())
    }

    /// Overwrite an existing appointment.
    pub fn update_appointment(&self, appointment: &Appointment) -> Result<()> {
        let _guard = self.writer();
        let id = appointment.id.get();
        if !self.appointments.contains(id)? {
            return Err(CoreError::NotFound { entity: "Appointment", id });
        }

        let mut batch = self.engine.batch();
        self.appointments.stage_put(&mut batch, id, appointment)?;
        self.engine.commit(batch)
    }

    pub fn delete_appointment(&self, id: AppointmentId) -> Result<()> {
        let _guard = self.writer();
        if !self.appointments.contains(id.get())? {
            return Err(CoreError::NotFound {
                entity: "Appointment",
                id: id.get(),
            });
        }

        let mut batch = self.engine.batch();
        self.appointments.stage_remove(&mut batch, id.get());
        self.engine.commit(batch)
    }

    pub fn list_appointments(&self) -> Result<Vec<Appointment>> {
        self.appointments.scan()
    }

    // --- prescriptions ---

    pub fn insert_prescription(&self, new: NewPrescription) -> Result<Prescription> {
        let _guard = self.writer();
        self.patients.require("Patient", new.patient_id.get())?;

        let id = self.prescriptions.next_id()?;
        let prescription = Prescription {
            id: PrescriptionId(id),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            medication_list: new.medication_list,
            dosage_instructions: new.dosage_instructions,
            prescribed_date: new.prescribed_date,
            valid_until: new.valid_until,
        };

        let mut batch = self.engine.batch();
        self.prescriptions.stage_put(&mut batch, id, &prescription)?;
        self.prescriptions.stage_seq(&mut batch, id);
        self.engine.commit(batch)?;
        Ok(prescription)
    }

    pub fn prescription(&self, id: PrescriptionId) -> Result<Option<Prescription>> {
        self.prescriptions.get(id.get())
    }

    pub fn update_prescription(&self, prescription: &Prescription) -> Result<()> {
        let _guard = self.writer();
        let id = prescription.id.get();
        if !self.prescriptions.contains(id)? {
            return Err(CoreError::NotFound { entity: "Prescription", id });
        }

        let mut batch = self.engine.batch();
        self.prescriptions.stage_put(&mut batch, id, prescription)?;
        self.engine.commit(batch)
    }

    pub fn list_prescriptions(&self) -> Result<Vec<Prescription>> {
        self.prescriptions.scan()
    }

    // --- medical records ---

    /// Store record metadata and its document in one batch. The stored
    /// document name is `{created_at millis}_{file_name}`.
    pub fn insert_record(&self, new: NewMedicalRecord, document: &[u8]) -> Result<MedicalRecord> {
        let file_name = sanitize_file_name(&new.file_name)?;
        let _guard = self.writer();
        self.patients.require("Patient", new.patient_id.get())?;

        let id = self.records.next_id()?;
        let record = MedicalRecord {
            id: MedicalRecordId(id),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            diagnosis: new.diagnosis,
            notes: new.notes,
            medical_documents: format!(
                "{}_{}",
                new.created_at.and_utc().timestamp_millis(),
                file_name
            ),
            created_at: new.created_at,
            updated_at: new.created_at,
        };

        let mut batch = self.engine.batch();
        self.records.stage_put(&mut batch, id, &record)?;
        self.records.stage_seq(&mut batch, id);
        batch.insert(&self.documents, document_key(record.id), document.to_vec());
        self.engine.commit(batch)?;

        info!(record_id = id, bytes = document.len(), "medical record stored");
        Ok(record)
    }

    pub fn record(&self, id: MedicalRecordId) -> Result<Option<MedicalRecord>> {
        self.records.get(id.get())
    }

    pub fn list_records(&self) -> Result<Vec<MedicalRecord>> {
        self.records.scan()
    }

    /// Document bytes of a record
    pub fn document(&self, id: MedicalRecordId) -> Result<Option<Vec<u8>>> {
        self.documents
            .get(document_key(id))
            .map(|raw| raw.map(|bytes| bytes.to_vec()))
            .map_err(storage_error)
    }

    fn profile_link(&self, principal: &Principal) -> Result<ProfileLink> {
        let Some(user) = self.user_by_email(principal.subject_id())? else {
            return Ok(ProfileLink::default());
        };
        Ok(ProfileLink {
            doctor_id: self.doctor_by_user(user.id)?.map(|d| d.id),
            patient_id: self.patient_by_user(user.id)?.map(|p| p.id),
        })
    }
}

#[async_trait]
impl PrincipalDirectory for ClinicStore {
    async fn resolve(&self, subject: &str) -> std::result::Result<Option<Principal>, DirectoryError> {
        self.user_by_email(subject)
            .map(|user| user.map(|u| u.principal()))
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ProfileDirectory for ClinicStore {
    async fn link(&self, principal: &Principal) -> std::result::Result<ProfileLink, DirectoryError> {
        self.profile_link(principal)
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(CoreError::InvalidInput(format!("invalid email: '{}'", email))),
    }
}

fn sanitize_file_name(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(CoreError::InvalidInput("document file name is empty".to_string()));
    }
    Ok(base.to_string())
}

fn document_key(id: MedicalRecordId) -> String {
    format!("doc:{:020}", id.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> (ClinicStore, tempfile::TempDir) {
        let (engine, temp) = StorageEngine::temp().unwrap();
        (ClinicStore::open(engine).unwrap(), temp)
    }

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn patient_profile(name: &str) -> PatientProfile {
        PatientProfile {
            name: name.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
            gender: "F".into(),
            blood_type: "O+".into(),
            contact: "555-0100".into(),
        }
    }

    fn doctor_profile(name: &str) -> DoctorProfile {
        DoctorProfile {
            name: name.to_string(),
            specialization: "Cardiology".into(),
            contact: "555-0199".into(),
        }
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let (store, _temp) = store();
        store
            .create_user("Admin@Clinic.test", "h".into(), RoleSet::of(&[RoleName::Admin]))
            .unwrap();
        let err = store
            .create_user("admin@clinic.test", "h".into(), RoleSet::of(&[RoleName::Admin]))
            .unwrap_err();
        assert!(matches!(err, CoreError::EmailTaken(_)));
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn invalid_email_is_rejected() {
        let (store, _temp) = store();
        for email in ["", "no-at-sign", "@clinic.test", "a@"] {
            assert!(matches!(
                store.create_user(email, "h".into(), RoleSet::empty()),
                Err(CoreError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn failed_patient_registration_leaves_nothing_behind() {
        let (store, _temp) = store();
        store.create_patient("p@clinic.test", "h".into(), patient_profile("P")).unwrap();
        assert!(store
            .create_patient("p@clinic.test", "h".into(), patient_profile("Q"))
            .is_err());
        assert_eq!(store.list_patients().unwrap().len(), 1);
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn directories_resolve_principal_and_profile_link() {
        let (store, _temp) = store();
        let doctor = store
            .create_doctor("doc@clinic.test", "h".into(), doctor_profile("House"))
            .unwrap();

        let principal = store.resolve("doc@clinic.test").await.unwrap().unwrap();
        assert!(principal.has_role(RoleName::Doctor));

        let link = store.link(&principal).await.unwrap();
        assert_eq!(link.doctor_id, Some(doctor.id));
        assert_eq!(link.patient_id, None);

        assert!(store.resolve("ghost@clinic.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_user_no_longer_resolves() {
        let (store, _temp) = store();
        let patient = store.create_patient("p@clinic.test", "h".into(), patient_profile("P")).unwrap();
        store.delete_user(patient.user_id).unwrap();

        assert!(store.resolve("p@clinic.test").await.unwrap().is_none());
        assert!(store.patient(patient.id).unwrap().is_some());
        assert!(matches!(
            store.delete_user(patient.user_id),
            Err(CoreError::NotFound { entity: "User", .. })
        ));
    }

    #[test]
    fn appointment_lifecycle() {
        let (store, _temp) = store();
        let doctor = store.create_doctor("d@clinic.test", "h".into(), doctor_profile("D")).unwrap();
        let patient = store.create_patient("p@clinic.test", "h".into(), patient_profile("P")).unwrap();

        let mut appt = store
            .insert_appointment(NewAppointment {
                doctor_id: doctor.id,
                patient_id: patient.id,
                appointment_date: at(3),
                description: "follow-up".into(),
            })
            .unwrap();
        assert_eq!(appt.appointment_status, AppointmentStatus::Scheduled);

        appt.appointment_status = AppointmentStatus::Completed;
        store.update_appointment(&appt).unwrap();
        assert_eq!(store.appointment(appt.id).unwrap(), Some(appt.clone()));

        store.delete_appointment(appt.id).unwrap();
        assert!(store.list_appointments().unwrap().is_empty());
        assert!(matches!(
            store.delete_appointment(appt.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn appointment_for_unknown_patient_is_not_found() {
        let (store, _temp) = store();
        let err = store
            .insert_appointment(NewAppointment {
                doctor_id: DoctorId(1),
                patient_id: PatientId(77),
                appointment_date: at(1),
                description: String::new(),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Patient not found with ID: 77");
    }

    #[test]
    fn record_document_is_stored_alongside() {
        let (store, _temp) = store();
        let patient = store.create_patient("p@clinic.test", "h".into(), patient_profile("P")).unwrap();

        let record = store
            .insert_record(
                NewMedicalRecord {
                    doctor_id: DoctorId(1),
                    patient_id: patient.id,
                    diagnosis: "fracture".into(),
                    notes: "left wrist".into(),
                    file_name: "../../xray.png".into(),
                    created_at: at(10),
                },
                b"\x89PNG...",
            )
            .unwrap();

        let millis = at(10).and_utc().timestamp_millis();
        assert_eq!(record.medical_documents, format!("{millis}_xray.png"));
        assert_eq!(store.document(record.id).unwrap().unwrap(), b"\x89PNG...");
        assert_eq!(store.list_records().unwrap(), vec![record]);
    }

    #[test]
    fn prescription_update_requires_existing_row() {
        let (store, _temp) = store();
        let patient = store.create_patient("p@clinic.test", "h".into(), patient_profile("P")).unwrap();
        let mut rx = store
            .insert_prescription(NewPrescription {
                doctor_id: DoctorId(2),
                patient_id: patient.id,
                medication_list: BTreeSet::from(["ibuprofen".to_string()]),
                dosage_instructions: "as needed".into(),
                prescribed_date: at(2),
                valid_until: Some(at(20)),
            })
            .unwrap();

        rx.dosage_instructions = "every 8 hours".into();
        store.update_prescription(&rx).unwrap();
        assert_eq!(
            store.prescription(rx.id).unwrap().unwrap().dosage_instructions,
            "every 8 hours"
        );

        rx.id = PrescriptionId(999);
        assert!(store.update_prescription(&rx).is_err());
    }
}
