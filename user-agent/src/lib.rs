// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

mod macros;

pub mod comms;
pub mod config;
pub mod fs;
pub mod service;

pub use fs::{FileSystem, SecurityRequest, StaticSecurity};
pub use service::Service;
