#![forbid(unsafe_code)]

pub mod boot;
pub mod config;
pub mod handoff;
pub mod http;
pub mod server;
pub mod telemetry;

pub use config::HostConfig;
pub use server::{HostServer, ServerState, router};
