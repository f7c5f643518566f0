//! Application services

pub mod orchestrator;

pub use orchestrator::FlareProx;
