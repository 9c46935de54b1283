//! Core data types for carelink

use crate::auth::{Principal, RoleSet};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::CoreError;

            fn from_str(s: &str) -> crate::Result<Self> {
                s.parse::<u64>().map($name).map_err(|_| {
                    crate::CoreError::InvalidInput(format!(
                        "invalid {}: '{}'",
                        stringify!($name),
                        s
                    ))
                })
            }
        }
    };
}

id_type!(
    /// Login account identifier
    UserId
);
id_type!(
    /// Doctor profile identifier
    DoctorId
);
id_type!(
    /// Patient profile identifier
    PatientId
);
id_type!(AppointmentId);
id_type!(PrescriptionId);
id_type!(MedicalRecordId);

/// Login account. The email is the principal's subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub roles: RoleSet,
}

impl User {
    /// The identity this account authenticates as.
    pub fn principal(&self) -> Principal {
        Principal::new(self.email.clone(), self.roles)
    }
}

/// Account view safe to return over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub roles: RoleSet,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id,
            email: user.email.clone(),
            roles: user.roles,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub name: String,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: DoctorId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub profile: DoctorProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub blood_type: String,
    #[serde(default)]
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub profile: PatientProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    pub appointment_date: NaiveDateTime,
    pub appointment_status: AppointmentStatus,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: PrescriptionId,
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    pub medication_list: BTreeSet<String>,
    #[serde(default)]
    pub dosage_instructions: String,
    pub prescribed_date: NaiveDateTime,
    #[serde(default)]
    pub valid_until: Option<NaiveDateTime>,
}

/// Medical record metadata. The document bytes live in blob storage under
/// the record's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: MedicalRecordId,
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub notes: String,
    pub medical_documents: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
