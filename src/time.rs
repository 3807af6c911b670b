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

//! Converting musical time to absolute time.
//!
//! Notes are positioned in beats, where by default one beat is a whole note. A [`TimeContext`]
//! pins those beats to an absolute clock measured in seconds, such as the clock of a
//! [`Scheduler`](crate::scheduler::Scheduler).
//!
//! # Examples
//!
//! ```
//! use tones::time::TimeContext;
//!
//! // 120 quarter notes per minute, starting two seconds into the clock.
//! let context = TimeContext::new(120.0, 2.0)?;
//! assert_eq!(context.beat_to_absolute(0.0), 2.0);
//! assert_eq!(context.beat_to_absolute(0.25), 2.5);
//! assert_eq!(context.absolute_to_beat(2.5), 0.25);
//! # Ok::<(), tones::time::Error>(())
//! ```

use crate::note::Note;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A specialized [`Result`] type for time conversions.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when building a [`TimeContext`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("tempo must be finite and positive, got {0} bpm")]
    InvalidBpm(f64),
    #[error("beat meaning must be finite and positive, got {0}")]
    InvalidBeatMeaning(f64),
    #[error("time offset must be finite, got {0}")]
    InvalidOffset(f64),
}

/// A tempo anchored to a point on an absolute clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeContext {
    bpm: f64,
    offset: f64,
    beat_meaning: f64,
}

impl Default for TimeContext {
    /// Returns a context of 120 BPM starting at zero.
    fn default() -> TimeContext {
        TimeContext {
            bpm: 120.0,
            offset: 0.0,
            beat_meaning: 4.0,
        }
    }
}

impl TimeContext {
    /// Creates a context where beat zero happens at `offset` seconds.
    ///
    /// `bpm` counts the beats named by the beat meaning, which is a quarter note by default.
    pub fn new(bpm: f64, offset: f64) -> Result<TimeContext> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(Error::InvalidBpm(bpm));
        }
        if !offset.is_finite() {
            return Err(Error::InvalidOffset(offset));
        }
        Ok(TimeContext {
            bpm,
            offset,
            ..TimeContext::default()
        })
    }

    /// Sets how many tempo beats make up one beat of note time.
    ///
    /// Note durations are measured in whole notes, so the default of `4.0` makes the tempo count
    /// quarter notes. Use `1.0` to have the tempo count whole notes.
    pub fn beat_meaning(mut self, beat_meaning: f64) -> Result<TimeContext> {
        if !(beat_meaning.is_finite() && beat_meaning > 0.0) {
            return Err(Error::InvalidBeatMeaning(beat_meaning));
        }
        self.beat_meaning = beat_meaning;
        Ok(self)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// The length of one beat of note time in seconds.
    pub fn beat_length(&self) -> f64 {
        self.beat_meaning * 60.0 / self.bpm
    }

    /// Same as [`TimeContext::beat_length`], as a [`Duration`].
    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(self.beat_length())
    }

    pub fn beat_to_absolute(&self, beat: f64) -> f64 {
        beat / self.bpm * self.beat_meaning * 60.0 + self.offset
    }

    pub fn absolute_to_beat(&self, time: f64) -> f64 {
        (time - self.offset) / (self.beat_meaning * 60.0) * self.bpm
    }

    /// Converts a note from beats to seconds on the absolute clock.
    ///
    /// The returned note keeps its pitch, velocity and pan. Its start may be negative when the
    /// context has a negative offset.
    pub fn note_to_absolute(&self, note: &Note) -> Note {
        let start = self.beat_to_absolute(note.start());
        let end = self.beat_to_absolute(note.end());
        Note::absolute(note, start, end - start)
    }
}
