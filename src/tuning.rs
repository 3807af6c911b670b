// Tones
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Mapping pitches to frequencies.
//!
//! A [`PitchMapping`] assigns a frequency to every [`Pitch`]. The default mapping is 12-tone
//! equal temperament with `A4` tuned to 440 Hz, but any [`Scale`], including ones loaded from
//! Scala-style scale files, can be used instead.
//!
//! # Examples
//!
//! ```
//! use tones::{pitch::Pitch, tuning::{PitchMapping, Scale}};
//!
//! let mapping = PitchMapping::default();
//! assert_eq!(mapping.frequency(Pitch::A4), 440.0);
//!
//! let just = Scale::parse("just fifths\n2\n3/2\n2/1\n")?;
//! let mapping = PitchMapping::from_scale(just, Pitch::A4, 440.0)?;
//! assert!((mapping.frequency(Pitch::new(58)) - 660.0).abs() < 1e-9);
//! # Ok::<(), tones::tuning::Error>(())
//! ```

use crate::pitch::Pitch;
use std::io;
use thiserror::Error;

mod scala;

pub use scala::Scale;

/// A specialized [`Result`] type for tuning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when building scales and pitch mappings.
#[derive(Debug, Error)]
pub enum Error {
    #[error("reading scale file: {0}")]
    Io(#[from] io::Error),
    #[error("scale file is missing its description line")]
    MissingDescription,
    #[error("scale file is missing its note count line")]
    MissingCount,
    #[error("invalid note count {0:?}")]
    InvalidCount(String),
    #[error("invalid interval {text:?} on line {line}")]
    InvalidInterval { line: usize, text: String },
    #[error("scale file declares {expected} intervals but contains {found}")]
    WrongIntervalCount { expected: usize, found: usize },
    #[error("a scale needs at least one degree")]
    EmptyScale,
    #[error("the period of a scale must be positive, got {0} cents")]
    InvalidPeriod(f64),
    #[error("base frequency must be positive and finite, got {0}")]
    InvalidFrequency(f64),
}

/// A total function from pitches to frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchMapping {
    scale: Scale,
    base_pitch: Pitch,
    base_frequency: f64,
}

impl PitchMapping {
    /// Creates a mapping where `base_pitch` sounds at `base_frequency` and every other pitch is
    /// found by walking the degrees of `scale`, one degree per semitone index.
    pub fn from_scale(scale: Scale, base_pitch: Pitch, base_frequency: f64) -> Result<PitchMapping> {
        if !(base_frequency.is_finite() && base_frequency > 0.0) {
            return Err(Error::InvalidFrequency(base_frequency));
        }
        Ok(PitchMapping {
            scale,
            base_pitch,
            base_frequency,
        })
    }

    /// Returns the frequency of a pitch in hertz.
    pub fn frequency(&self, pitch: Pitch) -> f64 {
        let steps = (pitch - self.base_pitch).as_semitones();
        self.base_frequency * 2f64.powf(self.scale.cents(steps) / 1200.0)
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn base_pitch(&self) -> Pitch {
        self.base_pitch
    }

    pub fn base_frequency(&self) -> f64 {
        self.base_frequency
    }
}

/// Default concert tuning, where A4 corresponds to 440 Hz.
impl Default for PitchMapping {
    fn default() -> PitchMapping {
        PitchMapping {
            scale: Scale::equal_temperament(12),
            base_pitch: Pitch::A4,
            base_frequency: 440.0,
        }
    }
}
