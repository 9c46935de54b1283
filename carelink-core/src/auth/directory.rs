//! Collaborator seams for identity lookups
//!
//! The user store sits behind these traits. Lookups may be slow or fail,
//! and failures surface as [`DirectoryError`] without any retry.

use crate::auth::Principal;
use crate::{DoctorId, PatientId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory lookup failed: {0}")]
    Unavailable(String),
}

/// Resolves a token subject to a full principal.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn resolve(&self, subject: &str) -> Result<Option<Principal>, DirectoryError>;
}

/// Clinical profile ids linked to a login identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileLink {
    pub doctor_id: Option<DoctorId>,
    pub patient_id: Option<PatientId>,
}

/// Links a principal to its doctor and patient profile ids.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn link(&self, principal: &Principal) -> Result<ProfileLink, DirectoryError>;
}

#[async_trait]
impl<T: PrincipalDirectory + ?Sized> PrincipalDirectory for Arc<T> {
    async fn resolve(&self, subject: &str) -> Result<Option<Principal>, DirectoryError> {
        (**self).resolve(subject).await
    }
}

#[async_trait]
impl<T: ProfileDirectory + ?Sized> ProfileDirectory for Arc<T> {
    async fn link(&self, principal: &Principal) -> Result<ProfileLink, DirectoryError> {
        (**self).link(principal).await
    }
}
