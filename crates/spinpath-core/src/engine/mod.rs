//! Stateful iteration machinery: method configurations, integration
//! strategies, the concrete methods, the iterate loop, and the output and
//! cancellation plumbing around it.

pub mod config;
pub mod error;
pub mod method;
pub mod output;
pub mod signal;
pub mod solver;
