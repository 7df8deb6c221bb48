pub mod collab;
pub mod config;
pub mod error;
pub mod gate;
pub mod manifest;
pub mod mention;
pub mod orchestrator;
pub mod reconciler;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DeployError, Result};
