//! Stateless foundations: vector and manifold math, physical constants, the
//! spin-image and chain data model, and the injected Hamiltonian capability.

pub mod chain;
pub mod constants;
pub mod hamiltonian;
pub mod manifoldmath;
pub mod system;
pub mod vectormath;
