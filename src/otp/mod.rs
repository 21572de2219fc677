//! One-time credential issuance and verification.

pub mod code;
pub mod repo;
pub mod service;

pub use code::Purpose;
pub use service::OtpService;
