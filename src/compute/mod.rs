//! Compute module - Network evaluation, evolution and the environment contract.

mod environment;
mod network;

pub mod anomaly;
pub mod evolution;

pub use environment::*;
pub use network::*;
