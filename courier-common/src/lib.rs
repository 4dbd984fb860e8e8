//! Shared plumbing for the courier workspace.

pub mod logging;

pub use tracing;
