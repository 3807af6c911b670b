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

//! Turn a compact note notation into timed, enveloped playback.
//!
//! # Introduction
//!
//! Tones takes melodies written as short strings, like `"C4{d:q}E4G4{d:h}"`, and plays them. On
//! the way from text to sound it passes through a few stages, each of which can be used on its
//! own:
//!
//!  * [`notation`](crate::notation) - A parser for the note notation. It turns text into a
//!    [`NoteGroup`](note::NoteGroup).
//!
//!  * [`note`](crate::note) - Notes measured in beats, and groups of notes that resolve
//!    same-pitch overlaps with a configurable [`UnionStrategy`](note::UnionStrategy).
//!
//!  * [`pitch`](crate::pitch) and [`tuning`](crate::tuning) - Semitone pitches and the mappings
//!    that turn them into frequencies, including tunings loaded from Scala scale files.
//!
//!  * [`time`](crate::time) - A [`TimeContext`](time::TimeContext) that converts beats into
//!    seconds for a tempo.
//!
//!  * [`envelope`](crate::envelope) - Piecewise curves that shape the gain of each note.
//!
//!  * [`scheduler`](crate::scheduler) - A look-ahead [`Scheduler`](scheduler::Scheduler) that
//!    prepares playables shortly before they start, using any
//!    [`ToneGenerator`](scheduler::ToneGenerator).
//!
//!  * [`driver`](crate::driver) - A real-time [`Driver`](driver::Driver) that plays a
//!    [`Playback`](driver::Playback) ahead of wall clock time.
//!
//!  * [`osc`](crate::osc) - A tone generator that plays notes as synth nodes on a
//!    [SuperCollider](https://supercollider.github.io/) server using OSC bundles.
//!
//! # Examples
//!
//! This example schedules a short melody on a scheduler with a manual clock and collects the
//! frequencies of the playables it creates.
//!
//! ```
//! use tones::{
//!     envelope::{ControlParameter, Envelope},
//!     notation,
//!     note::ScheduleWindow,
//!     scheduler::{ManualClock, Playable, PlayableParams, Scheduler, ToneGenerator},
//!     time::TimeContext,
//! };
//!
//! struct Silent;
//!
//! impl ControlParameter for Silent {
//!     fn set_value_at_time(&mut self, _value: f64, _time: f64) {}
//!     fn linear_ramp_to_value_at_time(&mut self, _value: f64, _time: f64) {}
//! }
//!
//! impl Playable for Silent {
//!     fn gain(&mut self) -> &mut dyn ControlParameter {
//!         self
//!     }
//!     fn release(&mut self, _time: f64, _envelope: &Envelope) {}
//!     fn destroy(&mut self) {}
//! }
//!
//! #[derive(Default)]
//! struct Frequencies(Vec<f64>);
//!
//! impl ToneGenerator for Frequencies {
//!     type Playable = Silent;
//!     type Error = std::io::Error;
//!
//!     fn create_playable(&mut self, params: PlayableParams) -> std::io::Result<Silent> {
//!         self.0.push(params.frequency.round());
//!         Ok(Silent)
//!     }
//! }
//!
//! let group = notation::parse("A4{d:s}A5")?;
//! let mut scheduler = Scheduler::new(Frequencies::default(), ManualClock::new());
//! group.schedule(&mut scheduler, &TimeContext::default(), ScheduleWindow::all())?;
//!
//! // The second note starts an eighth of a second in, close enough to prepare right away.
//! assert_eq!(vec![440.0, 880.0], scheduler.generator().0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! To hear the notes, play them through an [`ScToneGenerator`](osc::ScToneGenerator) with a
//! [`Driver`](driver::Driver) as shown in the documentation of the [`driver`] module.

pub mod driver;
pub mod envelope;
pub mod notation;
pub mod note;
pub mod osc;
pub mod pitch;
pub mod scheduler;
pub mod time;
pub mod tuning;
