//! Local worker emulator
//!
//! This module provides:
//! - The worker routing rules (target resolution, query and header rewriting, CORS)
//! - A request handler that relays to the target like a deployed endpoint
//! - A hyper server with graceful shutdown

pub mod handler;
pub mod routing;
pub mod server;

pub use handler::WorkerHandler;
pub use server::WorkerEmulator;
