//! Per-request authentication
//!
//! The gate never rejects a request for lacking credentials; that is the
//! role matcher's call. It rejects only a token that was presented and
//! failed, or whose subject no longer resolves.

use crate::auth::{PrincipalDirectory, SecurityContext, TokenCodec};
use crate::AuthError;
use std::sync::Arc;
use tracing::{debug, warn};

const BEARER_PREFIX: &str = "Bearer ";

/// What the gate did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No bearer credential; the context stays anonymous.
    Anonymous,
    /// The context already carried a principal and was left as is.
    AlreadyAuthenticated,
    /// A token verified and its principal was established.
    Authenticated,
}

pub struct AuthenticationGate<D> {
    codec: Arc<TokenCodec>,
    directory: D,
}

impl<D: PrincipalDirectory> AuthenticationGate<D> {
    pub fn new(codec: Arc<TokenCodec>, directory: D) -> Self {
        AuthenticationGate { codec, directory }
    }

    /// Populate `ctx` from the request's `Authorization` header value.
    ///
    /// The context is written only after the directory lookup has completed,
    /// so dropping this future part-way leaves it untouched.
    pub async fn authenticate(
        &self,
        ctx: &mut SecurityContext,
        authorization: Option<&str>,
    ) -> Result<GateOutcome, AuthError> {
        if ctx.is_authenticated() {
            return Ok(GateOutcome::AlreadyAuthenticated);
        }

        let Some(token) = authorization.and_then(bearer_token) else {
            debug!("no bearer credential, continuing anonymously");
            return Ok(GateOutcome::Anonymous);
        };

        let claims = self.codec.verify(token).map_err(|e| {
            let err = AuthError::from(e);
            warn!(denial = err.denial_kind(), "token rejected");
            err
        })?;

        let principal = match self.directory.resolve(&claims.sub).await {
            Ok(Some(principal)) if principal.subject_id() == claims.sub => principal,
            Ok(_) => {
                warn!(subject = %claims.sub, "token subject has no principal");
                return Err(AuthError::PrincipalNotFound);
            }
            Err(e) => {
                warn!(subject = %claims.sub, error = %e, "principal lookup failed");
                return Err(e.into());
            }
        };

        debug!(subject = principal.subject_id(), roles = ?principal.roles(), "authenticated");
        ctx.establish(principal);
        Ok(GateOutcome::Authenticated)
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Principal, RoleName, RoleSet, SigningKey};
    use crate::clock::ManualClock;
    use crate::test_utils::{FailingDirectory, InMemoryDirectory, PendingDirectory, TEST_KEY};
    use std::time::Duration;

    fn codec(clock: Arc<ManualClock>) -> Arc<TokenCodec> {
        Arc::new(TokenCodec::with_clock(
            SigningKey::from_bytes(TEST_KEY).unwrap(),
            Duration::from_secs(60),
            clock,
        ))
    }

    fn admin() -> Principal {
        Principal::new("admin@clinic.test", RoleSet::of(&[RoleName::Admin]))
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("bearer abc"), None);
        assert_eq!(bearer_token("Bearerabc"), None);
    }

    #[tokio::test]
    async fn missing_or_foreign_scheme_stays_anonymous() {
        let clock = Arc::new(ManualClock::new(1_000));
        let gate = AuthenticationGate::new(codec(clock), InMemoryDirectory::new());

        for header in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer ")] {
            let mut ctx = SecurityContext::new();
            assert_eq!(gate.authenticate(&mut ctx, header).await, Ok(GateOutcome::Anonymous));
            assert!(!ctx.is_authenticated());
        }
    }

    #[tokio::test]
    async fn valid_token_establishes_principal() {
        let clock = Arc::new(ManualClock::new(1_000));
        let codec = codec(clock);
        let directory = InMemoryDirectory::new();
        directory.insert(admin(), Default::default());
        let gate = AuthenticationGate::new(codec.clone(), directory);

        let header = format!("Bearer {}", codec.generate(&admin()).unwrap());
        let mut ctx = SecurityContext::new();
        let outcome = gate.authenticate(&mut ctx, Some(&header)).await;

        assert_eq!(outcome, Ok(GateOutcome::Authenticated));
        assert_eq!(ctx.principal(), Some(&admin()));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let clock = Arc::new(ManualClock::new(1_000));
        let codec = codec(clock.clone());
        let directory = InMemoryDirectory::new();
        directory.insert(admin(), Default::default());
        let gate = AuthenticationGate::new(codec.clone(), directory);

        let header = format!("Bearer {}", codec.generate(&admin()).unwrap());
        clock.advance(61);

        let mut ctx = SecurityContext::new();
        assert_eq!(gate.authenticate(&mut ctx, Some(&header)).await, Err(AuthError::TokenExpired));
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let clock = Arc::new(ManualClock::new(1_000));
        let gate = AuthenticationGate::new(codec(clock), InMemoryDirectory::new());

        let mut ctx = SecurityContext::new();
        let outcome = gate.authenticate(&mut ctx, Some("Bearer not-a-token")).await;
        assert_eq!(outcome, Err(AuthError::TokenMalformed));
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected() {
        let clock = Arc::new(ManualClock::new(1_000));
        let codec = codec(clock);
        let gate = AuthenticationGate::new(codec.clone(), InMemoryDirectory::new());

        let header = format!("Bearer {}", codec.generate(&admin()).unwrap());
        let mut ctx = SecurityContext::new();
        assert_eq!(
            gate.authenticate(&mut ctx, Some(&header)).await,
            Err(AuthError::PrincipalNotFound)
        );
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn directory_failure_is_distinct_and_not_retried() {
        let clock = Arc::new(ManualClock::new(1_000));
        let codec = codec(clock);
        let directory = Arc::new(FailingDirectory::default());
        let gate = AuthenticationGate::new(codec.clone(), directory.clone());

        let header = format!("Bearer {}", codec.generate(&admin()).unwrap());
        let mut ctx = SecurityContext::new();
        let outcome = gate.authenticate(&mut ctx, Some(&header)).await;

        assert!(matches!(outcome, Err(AuthError::DirectoryUnavailable(_))));
        assert_eq!(directory.calls(), 1);
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn second_pass_keeps_existing_principal() {
        let clock = Arc::new(ManualClock::new(1_000));
        let codec = codec(clock);
        let patient = Principal::new("pat@clinic.test", RoleSet::of(&[RoleName::Patient]));
        let directory = InMemoryDirectory::new();
        directory.insert(admin(), Default::default());
        directory.insert(patient.clone(), Default::default());
        let gate = AuthenticationGate::new(codec.clone(), directory);

        let mut ctx = SecurityContext::new();
        let first = format!("Bearer {}", codec.generate(&admin()).unwrap());
        gate.authenticate(&mut ctx, Some(&first)).await.unwrap();

        let second = format!("Bearer {}", codec.generate(&patient).unwrap());
        let outcome = gate.authenticate(&mut ctx, Some(&second)).await;
        assert_eq!(outcome, Ok(GateOutcome::AlreadyAuthenticated));
        assert_eq!(ctx.principal(), Some(&admin()));
    }

    #[tokio::test]
    async fn cancelled_lookup_leaves_context_untouched() {
        let clock = Arc::new(ManualClock::new(1_000));
        let codec = codec(clock);
        let gate = AuthenticationGate::new(codec.clone(), PendingDirectory);

        let header = format!("Bearer {}", codec.generate(&admin()).unwrap());
        let mut ctx = SecurityContext::new();
        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            gate.authenticate(&mut ctx, Some(&header)),
        )
        .await;

        assert!(timed_out.is_err());
        assert!(!ctx.is_authenticated());
    }
}
