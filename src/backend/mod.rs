//! Machine-translation backend: HTTP client and process supervision.

mod client;
mod manager;

pub use client::{BackendClient, ProbeStatus, DEFAULT_TIMEOUT};
pub use manager::{BackendLauncher, BackendManager, BackendState, BackendStatus, CommandLauncher};
