//! Deterministic drift state engine: per-key biased random walks advanced by
//! elapsed wall-clock steps, with injectable clock and randomness.

pub mod clock;
pub mod engine;
pub mod sampler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::RtpEngine;
pub use sampler::{DriftSampler, ScriptedSampler, StdSampler};
