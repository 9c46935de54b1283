use super::ApiResult;
use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use carelink_core::auth::verify_credentials;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const INVALID_CREDENTIALS: &str = "invalid credentials";

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Exchange email and password for a session token.
pub async fn login(call: &Call<'_>) -> ApiResult {
    let request: LoginRequest = call.json()?;
    let user = call.state.store.user_by_email(&request.email)?;

    let hash = user.as_ref().map(|u| u.password_hash.clone());
    let matches = tokio::task::spawn_blocking(move || {
        verify_credentials(hash.as_deref(), &request.password)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "password verification task failed");
        ApiError::internal()
    })?;

    let Some(user) = user else {
        warn!(denial = "credentials", "login for unknown account");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS));
    };
    if !matches {
        warn!(denial = "credentials", user_id = %user.id, "login with wrong password");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS));
    }

    let token = call.state.codec.generate(&user.principal())?;
    info!(user_id = %user.id, "login succeeded");
    ok_json(&json!({ "token": token }))
}
