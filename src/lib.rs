//! Session and device trust engine: one-time codes, device binding,
//! refresh-token rotation, and a tamper-evident audit chain.

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod device;
pub mod errors;
pub mod otp;
pub mod profile;
pub mod session;
