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

//! Pitches and the intervals between them.
//!
//! A [`Pitch`] is an index on a chromatic keyboard where `C0` is `0`, so `C4` is `48` and `A4` is
//! `57`. Pitches know nothing about frequencies, that is the job of a
//! [`PitchMapping`](crate::tuning::PitchMapping).
//!
//! # Examples
//!
//! ```
//! use tones::pitch::{Interval, Pitch};
//!
//! let a4: Pitch = "A4".parse()?;
//! assert_eq!(a4, Pitch::A4);
//! assert_eq!(a4 + Interval::OCTAVE, "A5".parse()?);
//! assert_eq!("Eb3".parse::<Pitch>()?, "D#3".parse()?);
//! # Ok::<(), tones::pitch::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, Neg, Sub},
    str::FromStr,
};
use thiserror::Error;

/// A specialized [`Result`] type for pitch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when a pitch name cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid pitch name {0:?}")]
    InvalidName(String),
}

/// A semitone index on a chromatic keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pitch(i32);

impl Pitch {
    /// Middle C.
    pub const C4: Pitch = Pitch(48);
    /// Concert A.
    pub const A4: Pitch = Pitch(57);

    pub const fn new(index: i32) -> Pitch {
        Pitch(index)
    }

    pub fn index(self) -> i32 {
        self.0
    }

    /// Builds a pitch from standard notation.
    ///
    /// Returns `None` for pitches below `C0`.
    ///
    /// ```
    /// use tones::pitch::{Accidental, Letter, Pitch};
    ///
    /// assert_eq!(Pitch::named(Letter::C, Accidental::Natural, 4), Some(Pitch::C4));
    /// assert_eq!(Pitch::named(Letter::C, Accidental::Flat, 0), None);
    /// ```
    pub fn named(letter: Letter, accidental: Accidental, octave: i32) -> Option<Pitch> {
        let index = octave * 12 + letter.offset() + accidental.offset();
        if index < 0 {
            None
        } else {
            Some(Pitch(index))
        }
    }

    pub fn octave(self) -> i32 {
        self.0.div_euclid(12)
    }

    /// Scans one pitch name from the front of `input`.
    ///
    /// Returns the pitch and the number of bytes consumed. The name must start with an uppercase
    /// letter so that a following `b` is always read as a flat.
    pub(crate) fn scan(input: &str) -> Option<(Pitch, usize)> {
        let bytes = input.as_bytes();
        let letter = Letter::from_char(*bytes.first()? as char)?;
        let mut pos = 1;

        let rest = &input[pos..];
        let (accidental, len) = if rest.starts_with("##") {
            (Accidental::DoubleSharp, 2)
        } else if rest.starts_with("bb") {
            (Accidental::DoubleFlat, 2)
        } else if rest.starts_with('#') || rest.starts_with('s') {
            (Accidental::Sharp, 1)
        } else if rest.starts_with('x') {
            (Accidental::DoubleSharp, 1)
        } else if rest.starts_with('b') {
            (Accidental::Flat, 1)
        } else {
            (Accidental::Natural, 0)
        };
        pos += len;

        let digits = input[pos..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let octave = if digits == 0 {
            4
        } else if digits > 2 {
            return None;
        } else {
            input[pos..pos + digits].parse().ok()?
        };
        pos += digits;

        Pitch::named(letter, accidental, octave).map(|pitch| (pitch, pos))
    }
}

impl FromStr for Pitch {
    type Err = Error;

    fn from_str(name: &str) -> Result<Pitch> {
        match Pitch::scan(name) {
            Some((pitch, len)) if len == name.len() => Ok(pitch),
            _ => Err(Error::InvalidName(name.to_owned())),
        }
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        write!(f, "{}{}", NAMES[self.0.rem_euclid(12) as usize], self.octave())
    }
}

impl Add<Interval> for Pitch {
    type Output = Pitch;

    fn add(self, interval: Interval) -> Pitch {
        Pitch(self.0 + interval.0)
    }
}

impl Sub<Interval> for Pitch {
    type Output = Pitch;

    fn sub(self, interval: Interval) -> Pitch {
        Pitch(self.0 - interval.0)
    }
}

impl Sub for Pitch {
    type Output = Interval;

    fn sub(self, other: Pitch) -> Interval {
        Interval(self.0 - other.0)
    }
}

/// The letter of a note in standard notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    fn from_char(ch: char) -> Option<Letter> {
        Some(match ch {
            'C' => Letter::C,
            'D' => Letter::D,
            'E' => Letter::E,
            'F' => Letter::F,
            'G' => Letter::G,
            'A' => Letter::A,
            'B' => Letter::B,
            _ => return None,
        })
    }

    fn offset(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }
}

/// A sharp or flat applied to a [`Letter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accidental {
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

impl Accidental {
    fn offset(self) -> i32 {
        match self {
            Accidental::DoubleFlat => -2,
            Accidental::Flat => -1,
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::DoubleSharp => 2,
        }
    }
}

/// A signed distance between two pitches, in semitones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Interval(i32);

impl Interval {
    pub const UNISON: Interval = Interval(0);
    pub const OCTAVE: Interval = Interval(12);

    pub const fn semitones(semitones: i32) -> Interval {
        Interval(semitones)
    }

    pub fn as_semitones(self) -> i32 {
        self.0
    }

    /// The size of the interval in cents under equal temperament.
    pub fn cents(self) -> f64 {
        f64::from(self.0) * 100.0
    }

    /// The frequency ratio of the interval under equal temperament.
    ///
    /// ```
    /// use tones::pitch::Interval;
    ///
    /// assert_eq!(Interval::OCTAVE.ratio(), 2.0);
    /// assert_eq!((-Interval::OCTAVE).ratio(), 0.5);
    /// ```
    pub fn ratio(self) -> f64 {
        2f64.powf(f64::from(self.0) / 12.0)
    }
}

impl Add for Interval {
    type Output = Interval;

    fn add(self, other: Interval) -> Interval {
        Interval(self.0 + other.0)
    }
}

impl Neg for Interval {
    type Output = Interval;

    fn neg(self) -> Interval {
        Interval(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!(Ok(Pitch::new(0)), "C0".parse());
        assert_eq!(Ok(Pitch::C4), "C".parse());
        assert_eq!(Ok(Pitch::new(49)), "C#4".parse());
        assert_eq!(Ok(Pitch::new(49)), "Cs4".parse());
        assert_eq!(Ok(Pitch::new(49)), "Db4".parse());
        assert_eq!(Ok(Pitch::new(46)), "Cbb4".parse());
        assert_eq!(Ok(Pitch::new(50)), "Cx4".parse());
        assert_eq!(Ok(Pitch::new(50)), "C##4".parse());
        assert_eq!(Ok(Pitch::new(70)), "Bb5".parse());
        assert_eq!(Ok(Pitch::new(120)), "C10".parse());
    }

    #[test]
    fn reject_bad_names() {
        for name in &["", "H4", "c4", "C4x", "Cb0", "Cq"] {
            assert_eq!(
                Err(Error::InvalidName(name.to_string())),
                name.parse::<Pitch>()
            );
        }
    }

    #[test]
    fn scan_stops_at_next_name() {
        assert_eq!(Some((Pitch::new(38), 2)), Pitch::scan("D3G3"));
        assert_eq!(Some((Pitch::new(27), 3)), Pitch::scan("Eb2{d:e}"));
        assert_eq!(None, Pitch::scan("R"));
    }

    #[test]
    fn display_round_trips_through_sharps() {
        for index in 0..96 {
            let pitch = Pitch::new(index);
            assert_eq!(Ok(pitch), pitch.to_string().parse());
        }
    }

    #[test]
    fn intervals() {
        let c4 = Pitch::C4;
        let g4: Pitch = "G4".parse().unwrap();
        assert_eq!(Interval::semitones(7), g4 - c4);
        assert_eq!(700.0, (g4 - c4).cents());
        assert!(((g4 - c4).ratio() - 1.498_307).abs() < 1e-6);
        assert_eq!(c4, g4 - Interval::semitones(7));
    }
}
