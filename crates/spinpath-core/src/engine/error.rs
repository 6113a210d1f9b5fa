use thiserror::Error;

use super::config::ConfigError;
use crate::core::system::SystemError;

/// Failures surfaced by the engine layer.
///
/// Hamiltonian evaluation has no variant here on purpose: the capability is
/// infallible by contract and numerical non-finiteness propagates through
/// the force values themselves, never caught inside the iteration loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
