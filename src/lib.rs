//! FlareProx - ephemeral Cloudflare Workers proxy endpoints
//!
//! Deploys short-lived reverse-proxy workers to rotate the apparent source IP of
//! outbound HTTP requests.
//!
//! ## Features
//!
//! - Batch worker deployment with module to legacy script format fallback
//! - workers.dev subdomain resolution, cached per client
//! - Listing, deletion and full cleanup by naming convention
//! - Concurrent egress IP probing with bounded retries
//! - Local worker emulator for trying the routing rules

pub mod cli;
pub mod cloudflare;
pub mod config;
pub mod error;
pub mod models;
pub mod probe;
pub mod proxy;
pub mod services;

pub use config::Config;
pub use error::{FlareProxError, Result};
pub use services::FlareProx;
