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

//! A look-ahead scheduler for playing notes.
//!
//! A [`Scheduler`] turns notes on an absolute clock into playables created by a
//! [`ToneGenerator`]. Playables are created shortly before they are needed: notes that start
//! further ahead than twice the lead time are parked on a timer and only prepared once they come
//! within one lead time of starting. Every playable gets the attack envelope applied to its gain
//! and its release arranged for the end of the note.
//!
//! The scheduler never sleeps or spawns threads. All pending work is kept as timers that fire,
//! in time order, whenever [`Scheduler::advance`] is called. Time comes from a [`Clock`]: use a
//! [`SystemClock`] to follow wall time, or a [`ManualClock`] to drive the scheduler from
//! somewhere else, such as the logical time of a [`Driver`](crate::driver::Driver) or a test.
//!
//! # Per-pitch state
//!
//! Each pitch has at most one _active_ note, the one currently sounding, and a list of _future_
//! notes whose playables exist but have not started yet. When a future note starts it is
//! promoted to active and a previous active note that is still sounding is released early. A
//! periodic sweep forgets active notes that have ended.
//!
//! # Examples
//!
//! ```
//! use tones::{
//!     envelope::{ControlParameter, Envelope},
//!     note::Note,
//!     pitch::Pitch,
//!     scheduler::{ManualClock, Playable, PlayableParams, Scheduler, ToneGenerator},
//! };
//! use std::time::Duration;
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
//! struct SilentGenerator;
//!
//! impl ToneGenerator for SilentGenerator {
//!     type Playable = Silent;
//!     type Error = std::io::Error;
//!
//!     fn create_playable(&mut self, _params: PlayableParams) -> std::io::Result<Silent> {
//!         Ok(Silent)
//!     }
//! }
//!
//! let clock = ManualClock::new();
//! let mut scheduler = Scheduler::new(SilentGenerator, clock.clone())
//!     .lead_time(Duration::from_millis(100));
//!
//! // Too far ahead to prepare now, so the note waits on a timer.
//! let handle = scheduler.schedule(&Note::new(Pitch::A4, 5.0, 1.0)?, None)?.unwrap();
//! assert!(scheduler.is_deferred(handle.id()));
//!
//! clock.set(4.9);
//! scheduler.advance()?;
//! assert!(scheduler.is_future(handle.id()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::{
    envelope::{ControlParameter, Envelope, HorizontalTransform},
    note::{self, Note},
    pitch::Pitch,
    tuning::PitchMapping,
};
use std::{
    cell::Cell,
    collections::{BTreeMap, HashMap},
    error, fmt,
    rc::Rc,
    time::{Duration, Instant},
};
use thiserror::Error;

mod state;
mod timers;

use state::{Entry, PitchState};
use timers::{Action, TimerKey, Timers};

/// A specialized [`Result`] type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Scheduler`] operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tone generator failed to create a playable")]
    ToneGenerator(#[source] Box<dyn error::Error + Send + Sync>),
    #[error("invalid note")]
    InvalidNote(#[from] note::Error),
}

/// What a [`ToneGenerator`] needs to know to create a playable.
///
/// Times are on the scheduler's clock. `end` is infinite for pitches started with
/// [`Scheduler::play_pitch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayableParams {
    pub frequency: f64,
    pub start: f64,
    pub end: f64,
    pub vel: f64,
    pub pan: f64,
}

/// A sound that has been prepared to play.
pub trait Playable {
    /// The control that attack envelopes are applied to.
    fn gain(&mut self) -> &mut dyn ControlParameter;

    /// Starts the release at `time`, following `envelope` from the current level.
    ///
    /// May be called again with an earlier time to cut a note short.
    fn release(&mut self, time: f64, envelope: &Envelope);

    /// Stops the sound immediately and frees its resources.
    fn destroy(&mut self);
}

/// Creates playables.
pub trait ToneGenerator {
    type Playable: Playable;
    type Error: error::Error + Send + Sync + 'static;

    fn create_playable(
        &mut self,
        params: PlayableParams,
    ) -> std::result::Result<Self::Playable, Self::Error>;
}

/// A monotonic source of time in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a clock handed to a [`Scheduler`] can still be moved from
/// outside.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<f64>>);

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn set(&self, time: f64) {
        self.0.set(time);
    }

    pub fn advance_by(&self, seconds: f64) {
        self.0.set(self.0.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.0.get()
    }
}

/// Seconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock(Instant);

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock(Instant::now())
    }
}

impl Default for SystemClock {
    fn default() -> SystemClock {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

/// Identifies a scheduled note across deferral, promotion and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to a scheduled note.
///
/// Returned by [`Scheduler::schedule`] and [`Scheduler::play_pitch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    id: NoteId,
}

impl Handle {
    pub fn id(&self) -> NoteId {
        self.id
    }

    /// Cancels the note. Returns `false` if the note was already gone.
    pub fn cancel<G, C>(self, scheduler: &mut Scheduler<G, C>) -> bool
    where
        G: ToneGenerator,
        C: Clock,
    {
        scheduler.cancel(self.id)
    }
}

/// A look-ahead note scheduler.
///
/// _See [the module level documentation](self) for more._
pub struct Scheduler<G: ToneGenerator, C> {
    generator: G,
    clock: C,
    lead_time: f64,
    sweep_interval: f64,
    pitch_mapping: PitchMapping,
    attack: Envelope,
    release: Envelope,
    resolution: f64,
    pitches: BTreeMap<Pitch, PitchState<G::Playable>>,
    timers: Timers,
    note_timers: HashMap<NoteId, TimerKey>,
    sweep_pending: bool,
    next_id: u64,
}

impl<G, C> fmt::Debug for Scheduler<G, C>
where
    G: ToneGenerator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("lead_time", &self.lead_time)
            .field("sweep_interval", &self.sweep_interval)
            .field("pitches", &self.pitches.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl<G, C> Scheduler<G, C>
where
    G: ToneGenerator,
    C: Clock,
{
    /// Creates a scheduler with a 100 millisecond lead time and a sweep every second.
    pub fn new(generator: G, clock: C) -> Scheduler<G, C> {
        Scheduler {
            generator,
            clock,
            lead_time: 0.1,
            sweep_interval: 1.0,
            pitch_mapping: PitchMapping::default(),
            attack: Envelope::polyline(&[(0.0, 0.0), (0.01, 1.0), (0.1, 0.8)]),
            release: Envelope::polyline(&[(0.0, 1.0), (0.1, 0.0)]),
            resolution: 10.0,
            pitches: BTreeMap::new(),
            timers: Timers::default(),
            note_timers: HashMap::new(),
            sweep_pending: false,
            next_id: 0,
        }
    }

    /// Sets how far ahead of their start playables are created.
    ///
    /// Notes starting more than twice this far ahead are deferred until they are one lead time
    /// away. Defaults to 100 milliseconds.
    pub fn lead_time(mut self, lead_time: Duration) -> Self {
        self.lead_time = lead_time.as_secs_f64();
        self
    }

    /// Sets how often finished notes are forgotten. Defaults to 1 second.
    pub fn sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval.as_secs_f64();
        self
    }

    /// Sets the mapping used to find the frequency of each pitch.
    pub fn pitch_mapping(mut self, pitch_mapping: PitchMapping) -> Self {
        self.pitch_mapping = pitch_mapping;
        self
    }

    /// Sets the envelope applied to the gain of every playable when it starts.
    ///
    /// The envelope is scaled by the velocity of the note. Its last value is the level that
    /// notes sustain at.
    pub fn attack_envelope(mut self, attack: Envelope) -> Self {
        self.attack = attack;
        self
    }

    /// Sets the envelope used when a note is released, with `1.0` meaning the sustain level.
    pub fn release_envelope(mut self, release: Envelope) -> Self {
        self.release = release;
        self
    }

    /// Sets how many points per radian of curvature envelopes are approximated with.
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut G {
        &mut self.generator
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Schedules a note whose times are on the scheduler's clock.
    ///
    /// Returns `None` without doing anything if the note has already ended. Passing an `id`
    /// reuses the identity of an earlier note, which is how deferred notes keep their handle.
    /// Whatever the scheduler still holds for that id is cancelled first, so an id never has
    /// more than one note behind it.
    pub fn schedule(&mut self, note: &Note, id: Option<NoteId>) -> Result<Option<Handle>> {
        let now = self.clock.now();
        let id = match id {
            Some(id) => {
                if self.forget(id) {
                    log::debug!("replacing note {}", id);
                }
                id
            }
            None => self.next_id(),
        };

        if note.end() < now {
            log::debug!("note {} ended at {} before {}, skipping", id, note.end(), now);
            return Ok(None);
        }

        if note.start() > now + 2.0 * self.lead_time {
            let due = note.start() - self.lead_time;
            log::debug!("deferring note {} until {}", id, due);
            let key = self.timers.push(due, Action::Reschedule { id, note: *note });
            self.note_timers.insert(id, key);
            return Ok(Some(Handle { id }));
        }

        self.prepare(
            id,
            note.pitch(),
            note.start(),
            note.end(),
            note.vel(),
            note.pan(),
        )?;
        Ok(Some(Handle { id }))
    }

    /// Starts playing `pitch` now until [`Scheduler::release_pitch`] is called.
    pub fn play_pitch(&mut self, pitch: Pitch, vel: f64) -> Result<Handle> {
        note::check_vel(vel)?;
        let id = self.next_id();
        let now = self.clock.now();
        self.prepare(id, pitch, now, f64::INFINITY, vel, 0.0)?;
        Ok(Handle { id })
    }

    /// Releases the active note of `pitch` now. Returns `false` if nothing was sounding.
    pub fn release_pitch(&mut self, pitch: Pitch) -> bool {
        let now = self.clock.now();
        let sustain = self.sustain_level();
        match self
            .pitches
            .get_mut(&pitch)
            .and_then(|state| state.active.as_mut())
        {
            Some(entry) if entry.end > now => {
                log::debug!("releasing note {} of pitch {}", entry.id, pitch);
                entry.end = now;
                let release = self.release.scale_y(entry_level(sustain, entry));
                entry.playable.release(now, &release);
                true
            }
            _ => false,
        }
    }

    /// Cancels a note in any state, destroying its playable if it has one.
    ///
    /// Unknown ids are ignored. Returns whether anything was cancelled.
    pub fn cancel(&mut self, id: NoteId) -> bool {
        let cancelled = self.forget(id);
        if cancelled {
            log::debug!("cancelled note {}", id);
        } else {
            log::debug!("note {} is unknown, nothing to cancel", id);
        }
        cancelled
    }

    /// Drops the timer and playables of a note. Returns whether there was anything to drop.
    fn forget(&mut self, id: NoteId) -> bool {
        let mut cancelled = false;
        if let Some(key) = self.note_timers.remove(&id) {
            self.timers.remove(key);
            cancelled = true;
        }

        let mut emptied = None;
        for (pitch, state) in self.pitches.iter_mut() {
            if !state.has(id) {
                continue;
            }
            let entry = state.take_future(id).or_else(|| state.take_active(id));
            if let Some(mut entry) = entry {
                entry.playable.destroy();
                cancelled = true;
            }
            if state.is_empty() {
                emptied = Some(*pitch);
            }
            break;
        }
        if let Some(pitch) = emptied {
            self.pitches.remove(&pitch);
        }
        cancelled
    }

    /// Cancels every note, destroying all playables immediately.
    pub fn cancel_all(&mut self) {
        log::debug!("cancelling all notes");
        self.timers.clear_notes();
        self.note_timers.clear();
        for (_, state) in std::mem::take(&mut self.pitches) {
            for mut entry in state.active.into_iter().chain(state.future) {
                entry.playable.destroy();
            }
        }
    }

    /// Releases every sounding note now.
    ///
    /// Notes that have not started yet are left alone and still play when their time comes.
    pub fn release_all(&mut self) {
        log::debug!("releasing all sounding notes");
        let now = self.clock.now();
        let sustain = self.sustain_level();
        for state in self.pitches.values_mut() {
            if let Some(entry) = state.active.as_mut() {
                if entry.end > now {
                    entry.end = now;
                    let release = self.release.scale_y(entry_level(sustain, entry));
                    entry.playable.release(now, &release);
                }
            }
        }
    }

    /// Fires every timer that is due, in time order.
    ///
    /// Only timers queued before the call fire. Anything the fired timers queue for the same
    /// instant waits for the next call. Deferred notes that fail to schedule stop the walk and
    /// return the error. Timers after the failing one stay queued.
    pub fn advance(&mut self) -> Result<()> {
        let now = self.clock.now();
        let horizon = self.timers.horizon();
        while let Some((key, action)) = self.timers.pop_due(now, horizon) {
            log::trace!("firing {:?} due at {}", action, key.time());
            match action {
                Action::Reschedule { id, note } => {
                    self.note_timers.remove(&id);
                    self.schedule(&note, Some(id))?;
                }
                Action::Promote { id, pitch } => {
                    self.note_timers.remove(&id);
                    self.promote(pitch, id);
                }
                Action::Sweep => {
                    self.sweep_pending = false;
                    self.sweep();
                }
            }
        }
        Ok(())
    }

    /// Returns whether the note is waiting on a timer before its playable is created.
    pub fn is_deferred(&self, id: NoteId) -> bool {
        self.note_timers.contains_key(&id) && !self.pitches.values().any(|state| state.has(id))
    }

    /// Returns whether the note has a playable that has not started yet.
    pub fn is_future(&self, id: NoteId) -> bool {
        self.pitches.values().any(|state| state.is_future(id))
    }

    /// Returns whether the note is the one sounding for its pitch.
    pub fn is_active(&self, id: NoteId) -> bool {
        self.pitches.values().any(|state| state.is_active(id))
    }

    /// Returns whether nothing is scheduled, waiting or playing.
    pub fn is_idle(&self) -> bool {
        self.pitches.is_empty() && self.timers.note_timers() == 0
    }

    /// Returns the number of pending timers, including the sweep.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn next_id(&mut self) -> NoteId {
        let id = NoteId(self.next_id);
        self.next_id += 1;
        id
    }

    fn sustain_level(&self) -> f64 {
        self.attack.value_at(self.attack.max_x())
    }

    /// Creates the playable for a note and queues its promotion.
    fn prepare(
        &mut self,
        id: NoteId,
        pitch: Pitch,
        start: f64,
        end: f64,
        vel: f64,
        pan: f64,
    ) -> Result<()> {
        let now = self.clock.now();
        let start = start.max(now);
        let params = PlayableParams {
            frequency: self.pitch_mapping.frequency(pitch),
            start,
            end,
            vel,
            pan,
        };
        let mut playable = self
            .generator
            .create_playable(params)
            .map_err(|err| Error::ToneGenerator(Box::new(err)))?;

        self.attack
            .scale_y(vel)
            .apply(playable.gain(), HorizontalTransform::shift(start), self.resolution);
        if end.is_finite() {
            let release = self.release.scale_y(vel * self.sustain_level());
            playable.release(end, &release);
        }
        log::debug!(
            "prepared note {} at {:.1} Hz from {} to {}",
            id,
            params.frequency,
            start,
            end
        );

        self.pitches
            .entry(pitch)
            .or_default()
            .future
            .push(Entry {
                id,
                playable,
                start,
                end,
                vel,
            });
        if start <= now {
            self.promote(pitch, id);
        } else {
            let key = self.timers.push(start, Action::Promote { id, pitch });
            self.note_timers.insert(id, key);
        }
        self.ensure_sweep(now);
        Ok(())
    }

    /// Moves a future note into the active slot, releasing whatever was sounding there.
    fn promote(&mut self, pitch: Pitch, id: NoteId) {
        let now = self.clock.now();
        let sustain = self.sustain_level();
        let state = match self.pitches.get_mut(&pitch) {
            Some(state) => state,
            None => return,
        };
        let entry = match state.take_future(id) {
            Some(entry) => entry,
            None => return,
        };
        if let Some(mut previous) = state.active.take() {
            if previous.end > now {
                log::warn!(
                    "note {} of pitch {} still sounding, releasing it for note {}",
                    previous.id,
                    pitch,
                    id
                );
                let release = self.release.scale_y(entry_level(sustain, &previous));
                previous.playable.release(now, &release);
            }
        }
        log::debug!("note {} started at {}", id, entry.start);
        state.active = Some(entry);
    }

    /// Forgets active notes that have ended.
    fn sweep(&mut self) {
        let now = self.clock.now();
        let mut expired = 0;
        for state in self.pitches.values_mut() {
            if state.expire(now).is_some() {
                expired += 1;
            }
        }
        self.pitches.retain(|_, state| !state.is_empty());
        log::trace!("sweep cleared {} notes", expired);
        if !self.is_idle() {
            self.ensure_sweep(now);
        }
    }

    fn ensure_sweep(&mut self, now: f64) {
        if !self.sweep_pending {
            self.timers.push(now + self.sweep_interval, Action::Sweep);
            self.sweep_pending = true;
        }
    }
}

fn entry_level<P>(sustain: f64, entry: &Entry<P>) -> f64 {
    sustain * entry.vel
}
