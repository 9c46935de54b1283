//! Resource ownership checks
//!
//! One predicate, parameterized by resource kind and action, answers whether
//! an [`Actor`] may act on a loaded resource. Handlers call it after the role
//! gate has passed and the resource has been fetched.
//!
//! A principal holding several roles is granted the union of what each role
//! allows.

use crate::auth::{Actor, RoleName};
use crate::{Appointment, AuthError, DoctorId, MedicalRecord, PatientId, Prescription};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Appointment,
    Prescription,
    MedicalRecord,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Appointment => "appointment",
            ResourceKind::Prescription => "prescription",
            ResourceKind::MedicalRecord => "medical_record",
        }
    }

    /// Wire message for a refused `action` on this kind of resource.
    pub fn violation_message(&self, action: Action) -> &'static str {
        match (self, action) {
            (ResourceKind::Appointment, Action::Read) => {
                "You are not authorized to view this appointment"
            }
            (ResourceKind::Appointment, Action::Edit) => {
                "Access denied: Cannot edit appointment of another doctor"
            }
            (ResourceKind::Appointment, Action::Delete) => {
                "You can delete only your own appointments"
            }
            (ResourceKind::Prescription, Action::Read) => {
                "You are not authorized to view this prescription"
            }
            (ResourceKind::Prescription, Action::Edit) => {
                "You are not authorized to edit this prescription"
            }
            (ResourceKind::Prescription, Action::Delete) => {
                "You are not authorized to delete this prescription"
            }
            (ResourceKind::MedicalRecord, Action::Read) => {
                "You are not authorized to access this record."
            }
            (ResourceKind::MedicalRecord, Action::Edit | Action::Delete) => {
                "You are not authorized to modify this record."
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Read,
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

/// Owner ids of a loaded resource, as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedResourceRef {
    pub kind: ResourceKind,
    pub owner_doctor_id: Option<DoctorId>,
    pub owner_patient_id: Option<PatientId>,
}

/// Entities that carry owner ids.
pub trait Owned {
    fn owned_ref(&self) -> OwnedResourceRef;
}

impl Owned for Appointment {
    fn owned_ref(&self) -> OwnedResourceRef {
        OwnedResourceRef {
            kind: ResourceKind::Appointment,
            owner_doctor_id: Some(self.doctor_id),
            owner_patient_id: Some(self.patient_id),
        }
    }
}

impl Owned for Prescription {
    fn owned_ref(&self) -> OwnedResourceRef {
        OwnedResourceRef {
            kind: ResourceKind::Prescription,
            owner_doctor_id: Some(self.doctor_id),
            owner_patient_id: Some(self.patient_id),
        }
    }
}

impl Owned for MedicalRecord {
    fn owned_ref(&self) -> OwnedResourceRef {
        OwnedResourceRef {
            kind: ResourceKind::MedicalRecord,
            owner_doctor_id: Some(self.doctor_id),
            owner_patient_id: Some(self.patient_id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipPolicy;

impl OwnershipPolicy {
    pub fn new() -> Self {
        OwnershipPolicy
    }

    /// The single ownership predicate.
    pub fn permits(&self, actor: &Actor, resource: &OwnedResourceRef, action: Action) -> bool {
        if actor.has_role(RoleName::Admin) {
            return true;
        }

        let doctor_owns = same_owner(actor.doctor_id(), resource.owner_doctor_id);
        let patient_owns = same_owner(actor.patient_id(), resource.owner_patient_id);

        let as_doctor = actor.has_role(RoleName::Doctor)
            && match (resource.kind, action) {
                (ResourceKind::MedicalRecord, Action::Read) => true,
                _ => doctor_owns,
            };
        let as_patient = actor.has_role(RoleName::Patient) && action == Action::Read && patient_owns;

        as_doctor || as_patient
    }

    /// [`permits`](Self::permits), or the resource-specific violation.
    pub fn check<R: Owned + ?Sized>(
        &self,
        actor: &Actor,
        resource: &R,
        action: Action,
    ) -> Result<(), AuthError> {
        let owned = resource.owned_ref();
        if self.permits(actor, &owned, action) {
            return Ok(());
        }

        warn!(
            denial = "ownership",
            subject = actor.principal().subject_id(),
            resource = owned.kind.as_str(),
            action = action.as_str(),
            "ownership check failed"
        );
        Err(AuthError::ownership(owned.kind, action))
    }

    pub fn can_access_appointment(&self, actor: &Actor, appointment: &Appointment, action: Action) -> bool {
        self.permits(actor, &appointment.owned_ref(), action)
    }

    pub fn can_access_prescription(
        &self,
        actor: &Actor,
        prescription: &Prescription,
        action: Action,
    ) -> bool {
        self.permits(actor, &prescription.owned_ref(), action)
    }

    pub fn can_access_medical_record(&self, actor: &Actor, record: &MedicalRecord, action: Action) -> bool {
        self.permits(actor, &record.owned_ref(), action)
    }

    /// Keep only the items `actor` may read.
    pub fn filter_visible<R: Owned>(&self, actor: &Actor, items: Vec<R>) -> Vec<R> {
        items
            .into_iter()
            .filter(|item| self.permits(actor, &item.owned_ref(), Action::Read))
            .collect()
    }

    pub fn visible_appointments(&self, actor: &Actor, items: Vec<Appointment>) -> Vec<Appointment> {
        self.filter_visible(actor, items)
    }

    pub fn visible_prescriptions(&self, actor: &Actor, items: Vec<Prescription>) -> Vec<Prescription> {
        self.filter_visible(actor, items)
    }

    pub fn visible_records(&self, actor: &Actor, items: Vec<MedicalRecord>) -> Vec<MedicalRecord> {
        self.filter_visible(actor, items)
    }
}

/// An unlinked actor owns nothing.
fn same_owner<T: PartialEq>(actor: Option<T>, owner: Option<T>) -> bool {
    matches!((actor, owner), (Some(a), Some(o)) if a == o)
}
