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

//! Timed pitch events.
//!
//! A [`Note`] is a pitch sounding over a span of time with a velocity and a stereo position.
//! Notes are usually measured in beats, where one beat is a whole note, and are collected into a
//! [`NoteGroup`] which keeps them free of same-pitch overlaps.
//!
//! # Examples
//!
//! ```
//! use tones::{note::{Note, NoteGroup}, pitch::Pitch};
//!
//! let group = NoteGroup::new(vec![
//!     Note::new(Pitch::C4, 0.0, 1.0)?,
//!     Note::new(Pitch::C4, 0.5, 1.0)?,
//! ]);
//!
//! // The default strategy trims the first note so it ends where the second begins.
//! assert_eq!(group.notes()[0].end(), 0.5);
//! assert_eq!(group.notes()[1].start(), 0.5);
//! # Ok::<(), tones::note::Error>(())
//! ```

use crate::pitch::{Interval, Pitch};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use thiserror::Error;

mod group;
mod union;

pub use group::{NoteGroup, ScheduleWindow};
pub use union::{Coincident, Overlap, UnionStrategy};

/// Overlaps shorter than this many beats are rounding noise, not conflicts.
pub(crate) const EPSILON: f64 = 1e-9;

/// A specialized [`Result`] type for note operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when a note would be given an invalid value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("note start must be finite and not negative, got {0}")]
    InvalidStart(f64),
    #[error("note duration must be finite and positive, got {0}")]
    InvalidDuration(f64),
    #[error("note velocity must be finite and positive, got {0}")]
    InvalidVelocity(f64),
    #[error("note pan must be within [-1, 1], got {0}")]
    InvalidPan(f64),
    #[error("amplification factor must be finite and positive, got {0}")]
    InvalidFactor(f64),
}

/// A pitch sounding for a span of time.
///
/// The end of a note is always derived from its start and duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNote")]
pub struct Note {
    pitch: Pitch,
    start: f64,
    duration: f64,
    vel: f64,
    pan: f64,
}

impl Note {
    /// Creates a note with a velocity of `1.0` and a centered pan.
    pub fn new(pitch: Pitch, start: f64, duration: f64) -> Result<Note> {
        check_start(start)?;
        check_duration(duration)?;
        Ok(Note {
            pitch,
            start,
            duration,
            vel: 1.0,
            pan: 0.0,
        })
    }

    /// Sets the velocity, an amplitude scalar.
    pub fn with_vel(mut self, vel: f64) -> Result<Note> {
        check_vel(vel)?;
        self.vel = vel;
        Ok(self)
    }

    /// Sets the stereo position, from `-1.0` (left) to `1.0` (right).
    pub fn with_pan(mut self, pan: f64) -> Result<Note> {
        check_pan(pan)?;
        self.pan = pan;
        Ok(self)
    }

    /// Builds a note whose times are on an absolute clock, where the start may be negative.
    pub(crate) fn absolute(note: &Note, start: f64, duration: f64) -> Note {
        Note {
            start,
            duration,
            ..*note
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn vel(&self) -> f64 {
        self.vel
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    /// Moves the note in time.
    pub fn translate(&mut self, offset: f64) -> Result<()> {
        let start = self.start + offset;
        check_start(start)?;
        self.start = start;
        Ok(())
    }

    pub fn transpose(&mut self, interval: Interval) {
        self.pitch = self.pitch + interval;
    }

    /// Scales the velocity by `factor`.
    pub fn amplify(&mut self, factor: f64) -> Result<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::InvalidFactor(factor));
        }
        let vel = self.vel * factor;
        check_vel(vel)?;
        self.vel = vel;
        Ok(())
    }

    /// Returns whether both notes share a pitch and sound at the same time.
    ///
    /// Notes that only touch, one ending where the other starts, do not conflict.
    pub fn conflicts_with(&self, other: &Note) -> bool {
        self.pitch == other.pitch
            && self.start < other.end() - EPSILON
            && other.start < self.end() - EPSILON
    }

    pub(crate) fn set_end(&mut self, end: f64) {
        self.duration = end - self.start;
    }

    pub(crate) fn set_vel_unchecked(&mut self, vel: f64) {
        self.vel = vel;
    }

    pub(crate) fn set_pan_unchecked(&mut self, pan: f64) {
        self.pan = pan;
    }
}

#[derive(Deserialize)]
struct RawNote {
    pitch: Pitch,
    start: f64,
    duration: f64,
    vel: f64,
    pan: f64,
}

impl TryFrom<RawNote> for Note {
    type Error = Error;

    fn try_from(raw: RawNote) -> Result<Note> {
        Note::new(raw.pitch, raw.start, raw.duration)?
            .with_vel(raw.vel)?
            .with_pan(raw.pan)
    }
}

pub(crate) fn check_start(start: f64) -> Result<()> {
    if start.is_finite() && start >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidStart(start))
    }
}

pub(crate) fn check_duration(duration: f64) -> Result<()> {
    if duration.is_finite() && duration > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidDuration(duration))
    }
}

pub(crate) fn check_vel(vel: f64) -> Result<()> {
    if vel.is_finite() && vel > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidVelocity(vel))
    }
}

pub(crate) fn check_pan(pan: f64) -> Result<()> {
    if (-1.0..=1.0).contains(&pan) {
        Ok(())
    } else {
        Err(Error::InvalidPan(pan))
    }
}
