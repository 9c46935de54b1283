//! Error types for carelink

use crate::auth::{Action, DirectoryError, ResourceKind, TokenError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Email already in use: {0}")]
    EmailTaken(String),

    #[error("{entity} not found with ID: {id}")]
    NotFound { entity: &'static str, id: u64 },

    #[error("Invalid signing key: {0}")]
    InvalidSigningKey(String),

    #[error("Invalid route pattern: {0}")]
    InvalidRoutePattern(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Terminal outcomes of the authentication and authorization pipeline.
///
/// None of these are retried. The server turns them into responses using
/// [`AuthError::status`] and [`AuthError::public_message`] and nothing else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,

    #[error("token malformed")]
    TokenMalformed,

    #[error("token signature invalid")]
    TokenSignatureInvalid,

    #[error("principal not found")]
    PrincipalNotFound,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("role forbidden")]
    RoleForbidden,

    #[error("{message}")]
    OwnershipViolation {
        kind: ResourceKind,
        action: Action,
        message: &'static str,
    },

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

impl AuthError {
    /// Build the ownership violation for a resource kind and action.
    pub fn ownership(kind: ResourceKind, action: Action) -> Self {
        AuthError::OwnershipViolation {
            kind,
            action,
            message: kind.violation_message(action),
        }
    }

    /// HTTP status code for this outcome.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenSignatureInvalid
            | AuthError::PrincipalNotFound
            | AuthError::Unauthenticated => 401,
            AuthError::RoleForbidden | AuthError::OwnershipViolation { .. } => 403,
            AuthError::ResourceNotFound(_) => 404,
            AuthError::DirectoryUnavailable(_) => 503,
        }
    }

    /// The message that may be put on the wire.
    ///
    /// Malformed tokens, bad signatures and unknown principals share one
    /// message, and directory failures never echo their cause.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::TokenExpired => "token expired".to_string(),
            AuthError::TokenMalformed
            | AuthError::TokenSignatureInvalid
            | AuthError::PrincipalNotFound => "invalid token".to_string(),
            AuthError::Unauthenticated => "not authenticated".to_string(),
            AuthError::RoleForbidden => "forbidden".to_string(),
            AuthError::OwnershipViolation { message, .. } => (*message).to_string(),
            AuthError::ResourceNotFound(message) => message.clone(),
            AuthError::DirectoryUnavailable(_) => "identity directory unavailable".to_string(),
        }
    }

    /// Internal classification used as a structured log field.
    pub fn denial_kind(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "expired",
            AuthError::TokenMalformed => "malformed",
            AuthError::TokenSignatureInvalid => "bad_signature",
            AuthError::PrincipalNotFound => "principal_not_found",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::RoleForbidden => "role",
            AuthError::OwnershipViolation { .. } => "ownership",
            AuthError::ResourceNotFound(_) => "not_found",
            AuthError::DirectoryUnavailable(_) => "directory",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::BadSignature => AuthError::TokenSignatureInvalid,
            TokenError::Expired => AuthError::TokenExpired,
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::DirectoryUnavailable(err.to_string())
    }
}
