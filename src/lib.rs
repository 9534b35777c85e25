//! Library crate for netdiag-rs exposing reusable modules.
pub mod checks;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod render;
pub mod server;
pub mod types;
pub mod wire;
