//! Request pipeline: authenticate, gate the route, then dispatch
//!
//! The role gate runs before the body is read or the store is touched.
//! Ownership checks happen inside the resource handlers, after the target
//! has been loaded.

use crate::api;
use crate::error::ApiError;
use bytes::Bytes;
use carelink_core::auth::{
    Actor, AuthenticationGate, OwnershipPolicy, RoleRouteMatcher, SecurityContext, TokenCodec,
};
use carelink_engine::ClinicStore;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Largest accepted request body. Documents travel base64-encoded in JSON.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared, read-only per-process state.
pub struct AppState {
    pub store: Arc<ClinicStore>,
    pub codec: Arc<TokenCodec>,
    pub gate: AuthenticationGate<Arc<ClinicStore>>,
    pub routes: RoleRouteMatcher,
    pub policy: OwnershipPolicy,
}

impl AppState {
    pub fn new(store: Arc<ClinicStore>, codec: Arc<TokenCodec>) -> carelink_core::Result<Self> {
        Ok(AppState {
            gate: AuthenticationGate::new(codec.clone(), store.clone()),
            routes: RoleRouteMatcher::clinic_default()?,
            policy: OwnershipPolicy::new(),
            store,
            codec,
        })
    }
}

/// What a route handler gets to see of its request.
pub struct Call<'a> {
    pub state: &'a AppState,
    pub ctx: &'a SecurityContext,
    pub query: Option<&'a str>,
    pub body: Bytes,
}

impl Call<'_> {
    /// Principal plus clinical profile ids, looked up once.
    pub async fn actor(&self) -> Result<Actor, ApiError> {
        Ok(Actor::resolve(self.ctx, self.state.store.as_ref()).await?)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            debug!(error = %e, "request body rejected");
            ApiError::bad_request("Malformed request body")
        })
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// Run one request through the full pipeline. Never fails: every outcome
/// becomes a response.
pub async fn handle<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<BoxError>,
{
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    debug!(%method, path = %path, "handling request");

    let response = match run(state, &parts, body).await {
        Ok(response) => response,
        Err(err) => {
            if err.status().is_server_error() {
                warn!(%method, path = %path, status = err.status().as_u16(), "request failed");
            }
            err.into_response(&path)
        }
    };

    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

async fn run<B>(
    state: &AppState,
    parts: &hyper::http::request::Parts,
    body: B,
) -> Result<Response<Full<Bytes>>, ApiError>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<BoxError>,
{
    let path = parts.uri.path();
    // A header value that is not visible ASCII carries no usable credential.
    let authorization = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let mut ctx = SecurityContext::new();
    state.gate.authenticate(&mut ctx, authorization).await?;
    state.routes.authorize(&ctx, parts.method.as_str(), path)?;

    let body = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            } else {
                ApiError::bad_request("Failed to read request body")
            }
        })?
        .to_bytes();

    let call = Call {
        state,
        ctx: &ctx,
        query: parts.uri.query(),
        body,
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    dispatch(&call, &parts.method, &segments).await
}

async fn dispatch(
    call: &Call<'_>,
    method: &Method,
    segments: &[&str],
) -> Result<Response<Full<Bytes>>, ApiError> {
    use api::{appointments, auth, doctors, patients, prescriptions, records, users};

    match (method, segments) {
        (&Method::GET, ["health"]) => api::health(),
        (&Method::POST, ["auth", "login"]) => auth::login(call).await,

        (&Method::GET, ["users", "getAllUsers"]) => users::list(call),
        (&Method::GET, ["users", "getUser", id]) => users::get(call, id.parse()?),
        (&Method::POST, ["users", "create"]) => users::create(call).await,
        (&Method::DELETE, ["users", "delete", id]) => users::delete(call, id.parse()?).await,

        (&Method::POST, ["doctors", "create"]) => doctors::create(call).await,
        (&Method::GET, ["doctors", "getAllDoctor"]) => doctors::list(call),
        (&Method::GET, ["doctors", "me"]) => doctors::me(call).await,

        (&Method::POST, ["patients", "register"]) => patients::register(call).await,
        (&Method::GET, ["patients", "getAllPatient"]) => patients::list(call),
        (&Method::GET, ["patients", "getPatientById", id]) => patients::get(call, id.parse()?),
        (&Method::GET, ["patients", "getMyDetails"]) => patients::me(call).await,
        (&Method::PUT, ["patients", "edit"]) => patients::edit(call).await,

        (&Method::POST, ["appointments", "scheduleAppointment"]) => appointments::schedule(call).await,
        (&Method::GET, ["appointments", "getAllAppointments"]) => appointments::list(call).await,
        (&Method::PUT, ["appointments", "editAppointment"]) => appointments::edit(call).await,
        (&Method::DELETE, ["appointments", "deleteAppointment", id]) => {
            appointments::delete(call, id.parse()?).await
        }

        (&Method::POST, ["prescription", "addPrescription"]) => prescriptions::add(call).await,
        (&Method::GET, ["prescription", "getAllPrescriptions"]) => prescriptions::list(call).await,
        (&Method::PUT, ["prescription", "edit"]) => prescriptions::edit(call).await,

        (&Method::POST, ["medicalRecord", "upload"]) => records::upload(call).await,
        (&Method::GET, ["medicalRecord", "getAllRecord"]) => records::list(call).await,
        (&Method::GET, ["medicalRecord", "getMedicalRecordFileById", id]) => {
            records::file(call, id.parse()?).await
        }

        _ => Err(ApiError::not_found("No handler for this path")),
    }
}

/// JSON response with `status`.
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Full<Bytes>>, ApiError> {
    let body = serde_json::to_vec(value).map_err(|e| {
        tracing::error!(error = %e, "response serialization failed");
        ApiError::internal()
    })?;
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

pub fn ok_json<T: Serialize + ?Sized>(value: &T) -> Result<Response<Full<Bytes>>, ApiError> {
    json_response(StatusCode::OK, value)
}

/// Binary download with an attachment file name.
pub fn attachment_response(file_name: &str, data: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(data)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_core::test_utils::test_codec;
    use carelink_engine::StorageEngine;
    use std::time::Duration;

    fn state() -> (AppState, tempfile::TempDir) {
        let (engine, temp) = StorageEngine::temp().unwrap();
        let store = Arc::new(ClinicStore::open(engine).unwrap());
        let (codec, _clock) = test_codec(Duration::from_secs(60), 1_000);
        (AppState::new(store, Arc::new(codec)).unwrap(), temp)
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let (state, _temp) = state();
        let request = Request::post("/auth/login")
            .body(Full::new(Bytes::from(vec![b'x'; MAX_BODY_BYTES + 1])))
            .unwrap();
        let response = handle(&state, request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn query_params_are_looked_up_by_name() {
        let (state, _temp) = state();
        let ctx = SecurityContext::new();
        let call = Call {
            state: &state,
            ctx: &ctx,
            query: Some("a=1&roleType=DOCTOR&flag"),
            body: Bytes::new(),
        };
        assert_eq!(call.query_param("roleType"), Some("DOCTOR"));
        assert_eq!(call.query_param("flag"), None);
        assert_eq!(call.query_param("missing"), None);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Sample {
        #[allow(dead_code)]
        count: u32,
    }

    #[tokio::test]
    async fn malformed_body_message_is_fixed() {
        let (state, _temp) = state();
        let ctx = SecurityContext::new();
        let call = Call {
            state: &state,
            ctx: &ctx,
            query: None,
            body: Bytes::from_static(br#"{"count": "seven"}"#),
        };
        let err = call.json::<Sample>().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Malformed request body");
    }

    #[test]
    fn attachment_sets_download_headers() {
        let response = attachment_response("17_scan.pdf", b"%PDF".to_vec());
        assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"17_scan.pdf\""
        );
    }
}
