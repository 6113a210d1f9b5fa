//! # SpinPath Core Library
//!
//! A solver framework for atomistic spin systems: precessional dynamics,
//! transition-path relaxation, and saddle-point search on the product of
//! unit spheres, with the energy functional injected by the caller.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to keep
//! the numerical machinery separate from the data model and the user-facing
//! procedures.
//!
//! - **[`core`]: The Foundation.** Stateless vector and manifold math,
//!   physical constants, the spin-image and chain data model, and the
//!   [`core::hamiltonian::Hamiltonian`] capability boundary.
//!
//! - **[`engine`]: The Logic Core.** The stateful iteration machinery: the
//!   [`engine::method::Method`] abstraction with its termination rules, the
//!   interchangeable integration strategies of [`engine::solver`], and the
//!   configuration, output, and cancellation plumbing around them.
//!
//! - **[`workflows`]: The Public API.** High-level entry points that tie the
//!   engine and core together into complete procedures: single-image
//!   dynamics, minimum-energy-path relaxation, and saddle search.

pub mod core;
pub mod engine;
pub mod workflows;
