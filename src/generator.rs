//! Random ASCII text generation.
//!
//! Each connection task owns its own `TextGenerator`, so no entropy state is
//! shared between tasks.

use crate::protocol::LengthMode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Characters drawn for generated text.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Produces random word-like strings and item lengths.
#[derive(Debug)]
pub struct TextGenerator {
    rng: StdRng,
}

impl TextGenerator {
    /// Create a generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic generator.
    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a string of exactly `length` ASCII letters.
    pub fn generate(&mut self, length: usize) -> String {
        (0..length)
            .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Draw an item length for a request's `(origin, bound)`.
    pub fn next_length(&mut self, origin: u32, bound: u32, mode: LengthMode) -> u32 {
        match mode {
            LengthMode::Uniform if bound > origin => self.rng.gen_range(origin..bound),
            LengthMode::Uniform => origin,
            LengthMode::Legacy if bound > 0 => self.rng.gen_range(0..bound),
            LengthMode::Legacy => 0,
        }
    }
}
