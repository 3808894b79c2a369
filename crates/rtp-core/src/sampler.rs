use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform draws in `[0, 1)` feeding the drift transitions. The
/// engine takes this as a seam so single steps replay exactly in tests.
pub trait DriftSampler: Send {
    fn next_unit(&mut self) -> f64;

    /// Uniform draw in `[min, max)`.
    fn next_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_unit() * (max - min)
    }
}

/// Production sampler over a seeded PRNG.
#[derive(Debug)]
pub struct StdSampler {
    rng: StdRng,
}

impl StdSampler {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DriftSampler for StdSampler {
    fn next_unit(&mut self) -> f64 {
        self.rng.random()
    }
}

/// Replays a fixed script of unit draws, cycling when exhausted. Used to pin
/// individual transition branches in tests.
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    script: Vec<f64>,
    cursor: usize,
}

impl ScriptedSampler {
    pub fn new(script: Vec<f64>) -> Self {
        Self { script, cursor: 0 }
    }
}

impl DriftSampler for ScriptedSampler {
    fn next_unit(&mut self) -> f64 {
        if self.script.is_empty() {
            return 0.0;
        }
        let draw = self.script[self.cursor % self.script.len()];
        self.cursor += 1;
        draw
    }
}
