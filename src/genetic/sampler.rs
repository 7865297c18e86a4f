//! Uniform sampling seam for the genetic engine
//!
//! Mutation and selection draw from an injected uniform source so tests can
//! script the exact sequence of draws and production keeps a CSPRNG.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::OsRng;
use rand::Rng;

/// A source of uniform draws over `[0, 1)`.
///
/// Implementations must be thread-safe; the engine is shared across tasks.
pub trait UniformSampler: Send + Sync {
    /// Draw the next value in `[0, 1)`.
    fn sample(&self) -> f64;
}

/// Production sampler backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSampler;

impl UniformSampler for OsSampler {
    fn sample(&self) -> f64 {
        let mut rng = OsRng;
        rng.gen::<f64>()
    }
}

/// Test sampler that replays a scripted sequence of draws, cycling when the
/// sequence is exhausted.
#[derive(Debug)]
pub struct SequenceSampler {
    draws: Vec<f64>,
    cursor: AtomicUsize,
}

impl SequenceSampler {
    /// Create a sampler over `draws`. An empty script always yields 0.0.
    pub fn new(draws: Vec<f64>) -> Self {
        Self {
            draws,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl UniformSampler for SequenceSampler {
    fn sample(&self) -> f64 {
        if self.draws.is_empty() {
            return 0.0;
        }
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.draws[position % self.draws.len()]
    }
}
