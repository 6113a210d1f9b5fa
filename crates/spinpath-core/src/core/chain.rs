//! Ordered chains of images for path-based methods.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

use super::manifoldmath;
use super::system::{SpinImage, SystemError};

/// Governs the force an image receives inside a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ImageKind {
    /// Spring-augmented tangential force plus the perpendicular gradient.
    Normal,
    /// Tangential gradient component inverted, no spring; converges onto a
    /// saddle point.
    Climbing,
    /// Plain negative gradient, no spring.
    Falling,
    /// Held fixed; receives zero force.
    Stationary,
}

/// Ordered sequence of images. Path methods require at least two.
#[derive(Debug, Clone)]
pub struct Chain {
    pub images: Vec<SpinImage>,
    kinds: Vec<ImageKind>,
    reaction_coordinates: Vec<f64>,
}

impl Chain {
    /// Builds a chain. Interior images start as `Normal`, endpoints as
    /// `Stationary`. All images must share the same site count.
    pub fn new(images: Vec<SpinImage>) -> Result<Self, SystemError> {
        if images.len() < 2 {
            return Err(SystemError::ChainTooShort(images.len()));
        }
        let nos = images[0].nos();
        for image in &images {
            if image.nos() != nos {
                return Err(SystemError::ImageSizeMismatch {
                    found: image.nos(),
                    expected: nos,
                });
            }
        }
        let noi = images.len();
        let mut kinds = vec![ImageKind::Normal; noi];
        kinds[0] = ImageKind::Stationary;
        kinds[noi - 1] = ImageKind::Stationary;
        let mut chain = Self {
            images,
            kinds,
            reaction_coordinates: vec![0.0; noi],
        };
        chain.update_reaction_coordinates();
        Ok(chain)
    }

    /// Number of images.
    pub fn noi(&self) -> usize {
        self.images.len()
    }

    /// Number of sites per image.
    pub fn nos(&self) -> usize {
        self.images[0].nos()
    }

    pub fn kind(&self, idx: usize) -> ImageKind {
        self.kinds[idx]
    }

    pub fn set_kind(&mut self, idx: usize, kind: ImageKind) {
        self.kinds[idx] = kind;
    }

    /// Cumulative geodesic distance of every image from image 0.
    pub fn reaction_coordinates(&self) -> &[f64] {
        &self.reaction_coordinates
    }

    /// Recomputes reaction coordinates from the current configurations.
    pub fn update_reaction_coordinates(&mut self) {
        self.reaction_coordinates[0] = 0.0;
        for idx in 1..self.noi() {
            let d = manifoldmath::dist_geodesic(
                &self.images[idx - 1].spins,
                &self.images[idx].spins,
            );
            self.reaction_coordinates[idx] = self.reaction_coordinates[idx - 1] + d;
        }
    }
}

/// Cross-cutting cancellation flag owned by a chain collection and observed
/// by every method working on its chains. Raising it vetoes further
/// iteration through `Method::iterations_allowed`.
#[derive(Debug, Clone, Default)]
pub struct HaltFlag(Arc<AtomicBool>);

impl HaltFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A set of chains sharing one halt flag.
#[derive(Debug, Default)]
pub struct ChainCollection {
    pub chains: Vec<Chain>,
    halt: HaltFlag,
}

impl ChainCollection {
    pub fn new(chains: Vec<Chain>) -> Self {
        Self {
            chains,
            halt: HaltFlag::default(),
        }
    }

    /// A clone of the shared flag, for methods that observe it.
    pub fn halt_flag(&self) -> HaltFlag {
        self.halt.clone()
    }
}
