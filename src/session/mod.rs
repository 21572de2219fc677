//! Session state machine: creation, validation, refresh rotation, revocation.

pub mod models;
pub mod policy;
pub mod repo;
pub mod service;
pub mod token;

pub use models::{IssuedSession, SessionState, ValidatedSession};
pub use policy::{policy, Role, RolePolicy};
pub use service::SessionService;
