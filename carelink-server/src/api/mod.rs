//! Route handlers, one module per resource

pub mod appointments;
pub mod auth;
pub mod doctors;
pub mod patients;
pub mod prescriptions;
pub mod records;
pub mod users;

use crate::error::ApiError;
use crate::handlers::{ok_json, Call};
use bytes::Bytes;
use carelink_engine::ClinicStore;
use chrono::NaiveDateTime;
use http_body_util::Full;
use hyper::Response;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type ApiResult = Result<Response<Full<Bytes>>, ApiError>;

/// Credentials for a new login account.
#[derive(Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct Message<'a> {
    message: &'a str,
}

pub fn health() -> ApiResult {
    ok_json(&json!({ "status": "UP" }))
}

pub(crate) fn message(text: &str) -> ApiResult {
    ok_json(&Message { message: text })
}

pub(crate) fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Run a store write on the blocking pool. Every commit waits for fsync.
pub(crate) async fn write<T, F>(call: &Call<'_>, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&ClinicStore) -> carelink_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = call.state.store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "store write task failed");
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}

/// Argon2 runs off the runtime threads.
pub(crate) async fn hash_password(password: String) -> Result<String, ApiError> {
    if password.is_empty() {
        return Err(ApiError::bad_request("Password must not be empty"));
    }
    tokio::task::spawn_blocking(move || carelink_core::auth::hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing task failed");
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}
