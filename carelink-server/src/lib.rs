//! carelink HTTP server: request pipeline, route handlers and start-up

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::{BootstrapAdmin, ConfigError, LogFormat, ServerConfig};
pub use error::ApiError;
pub use handlers::{handle, AppState};
pub use server::CarelinkServer;

use carelink_core::auth::{hash_password, RoleName, RoleSet};
use carelink_engine::ClinicStore;
use tracing::info;

/// Create the ADMIN account if its email is not yet registered.
pub fn bootstrap_admin(store: &ClinicStore, admin: &BootstrapAdmin) -> carelink_core::Result<bool> {
    if store.user_by_email(&admin.email)?.is_some() {
        return Ok(false);
    }
    let hash = hash_password(&admin.password)?;
    let user = store.create_user(&admin.email, hash, RoleSet::of(&[RoleName::Admin]))?;
    info!(user_id = %user.id, "bootstrap admin created");
    Ok(true)
}
