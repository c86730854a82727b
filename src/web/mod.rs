//! Ops HTTP surface: health, job status, manual refresh triggers and logs

mod admin;
mod server;

pub use server::{start_web_server, AppState, WebServerConfig};
