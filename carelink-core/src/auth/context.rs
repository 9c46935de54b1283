//! Request-scoped identity

use crate::auth::{Principal, ProfileDirectory, ProfileLink, RoleName};
use crate::{AuthError, DoctorId, PatientId};
use tracing::debug;

/// Holder of the resolved principal for exactly one request.
///
/// Created empty at request entry and populated at most once, by
/// [`AuthenticationGate`](crate::auth::AuthenticationGate) after the bearer
/// token verified in this request. It is deliberately not `Clone`; pass it by
/// reference to whatever needs identity.
#[derive(Debug, Default)]
pub struct SecurityContext {
    principal: Option<Principal>,
}

impl SecurityContext {
    pub fn new() -> Self {
        SecurityContext { principal: None }
    }

    /// Context already carrying `principal`, bypassing token checks.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_principal(principal: Principal) -> Self {
        SecurityContext {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// The principal, or [`AuthError::Unauthenticated`].
    pub fn require(&self) -> Result<&Principal, AuthError> {
        self.principal.as_ref().ok_or(AuthError::Unauthenticated)
    }

    /// Populate the context. Returns false and leaves the existing principal
    /// untouched if one is already set.
    pub(crate) fn establish(&mut self, principal: Principal) -> bool {
        if self.principal.is_some() {
            return false;
        }
        self.principal = Some(principal);
        true
    }
}

/// A principal together with its clinical profile ids: the subject of every
/// ownership decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    principal: Principal,
    link: ProfileLink,
}

impl Actor {
    pub fn new(principal: Principal, link: ProfileLink) -> Self {
        Actor { principal, link }
    }

    /// Resolve the actor for this request with a single directory lookup.
    pub async fn resolve<D>(ctx: &SecurityContext, directory: &D) -> Result<Actor, AuthError>
    where
        D: ProfileDirectory + ?Sized,
    {
        let principal = ctx.require()?;
        let link = directory.link(principal).await?;
        debug!(
            subject = principal.subject_id(),
            doctor_id = ?link.doctor_id,
            patient_id = ?link.patient_id,
            "resolved clinical profile"
        );
        Ok(Actor::new(principal.clone(), link))
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.principal.has_role(role)
    }

    pub fn doctor_id(&self) -> Option<DoctorId> {
        self.link.doctor_id
    }

    pub fn patient_id(&self) -> Option<PatientId> {
        self.link.patient_id
    }
}
