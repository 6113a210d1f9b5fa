//! High-level entry points tying the engine and core together.
//!
//! Each workflow validates its configuration before any method exists,
//! builds the method and solver pair, and drives [`crate::engine::method::iterate`]
//! to completion:
//!
//! - [`dynamics`] - precessional relaxation or dynamics of a single image.
//! - [`path`] - nudged-elastic-band relaxation of a chain toward the
//!   minimum-energy path.
//! - [`saddle`] - minimum-mode saddle search over a chain collection.

pub mod dynamics;
pub mod path;
pub mod saddle;
