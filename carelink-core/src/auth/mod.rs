//! Authentication and authorization for carelink
//!
//! This module implements the request security pipeline:
//! - HS256 session tokens with a single static key
//! - A per-request gate that establishes the principal
//! - Role-based route gating with most-specific-pattern matching
//! - Resource ownership checks shared by every resource kind

pub mod context;
pub mod directory;
pub mod gate;
pub mod ownership;
pub mod password;
pub mod principal;
pub mod routes;
pub mod timing;
pub mod token;


pub use context::*;
pub use directory::*;
pub use gate::*;
pub use ownership::*;
pub use password::*;
pub use principal::*;
pub use routes::*;
pub use timing::*;
pub use token::*;
