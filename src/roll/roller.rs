use crate::common::{NonZeroUInt, UInt};
use rand::Rng;

/// A source of uniformly random die faces.
pub trait Roller {
    /// Returns a value in `1..=faces`.
    fn roll(&mut self, faces: NonZeroUInt) -> UInt;
}

impl<R: Rng> Roller for R {
    fn roll(&mut self, faces: NonZeroUInt) -> UInt {
        self.gen_range(1..=faces.get())
    }
}

#[cfg(test)]
pub(crate) use step::StepRoller;
