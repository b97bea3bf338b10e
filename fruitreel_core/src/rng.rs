use crate::error::{SlotError, SlotResult};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

// Every draw in the engine goes through a RandomSource so callers decide where
// randomness comes from: an OS-seeded stream in the server, a seeded stream in
// simulations, a scripted list in tests.

pub trait RandomSource {
    /// Uniform value in [0, 1).
    fn next_unit(&mut self) -> f64;
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn next_unit(&mut self) -> f64 {
        (**self).next_unit()
    }
}

/// Adapts any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl<R: RngCore> RandomSource for RngSource<R> {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

impl RngSource<ChaCha8Rng> {
    pub fn from_entropy() -> Self {
        RngSource(ChaCha8Rng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        RngSource(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Independent stream `stream` of the generator seeded with `seed`.
    pub fn seeded_stream(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        RngSource(rng)
    }
}

/// Replays a fixed list of unit values, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    pos: usize,
}

impl ScriptedSource {
    pub fn new(values: Vec<f64>) -> SlotResult<Self> {
        if values.is_empty() {
            return Err(SlotError::argument("scripted source needs at least one value"));
        }
        if let Some(bad) = values.iter().find(|v| !(0.0..1.0).contains(*v)) {
            return Err(SlotError::argument(format!(
                "scripted value {bad} lies outside [0, 1)"
            )));
        }
        Ok(Self { values, pos: 0 })
    }
}

impl RandomSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        let v = self.values[self.pos];
        self.pos = (self.pos + 1) % self.values.len();
        v
    }
}
