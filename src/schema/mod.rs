//! Schema module - Configuration and reporting types for the neuroevolution engine.

mod config;
mod evolution;

pub use config::*;
pub use evolution::*;
