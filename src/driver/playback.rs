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

//! Play note groups in real time.

use crate::{
    note::{NoteGroup, ScheduleWindow},
    scheduler::{self, ManualClock, Scheduler, ToneGenerator},
    time::TimeContext,
};

/// A [`NoteGroup`] being played through a [`Scheduler`].
///
/// Each call to [`Playback::schedule_until`] hands the scheduler the notes that start before the
/// given time and were not handed over before, then fires the scheduler's due timers. The
/// scheduler's clock is moved from outside, usually by a [`Driver`](super::Driver), so a
/// playback can also be stepped through by hand.
///
/// # Examples
///
/// ```
/// use tones::{
///     driver::Playback,
///     envelope::{ControlParameter, Envelope},
///     notation,
///     scheduler::{ManualClock, Playable, PlayableParams, Scheduler, ToneGenerator},
/// };
///
/// struct Silent;
///
/// impl ControlParameter for Silent {
///     fn set_value_at_time(&mut self, _value: f64, _time: f64) {}
///     fn linear_ramp_to_value_at_time(&mut self, _value: f64, _time: f64) {}
/// }
///
/// impl Playable for Silent {
///     fn gain(&mut self) -> &mut dyn ControlParameter {
///         self
///     }
///     fn release(&mut self, _time: f64, _envelope: &Envelope) {}
///     fn destroy(&mut self) {}
/// }
///
/// #[derive(Default)]
/// struct Starts(Vec<f64>);
///
/// impl ToneGenerator for Starts {
///     type Playable = Silent;
///     type Error = std::io::Error;
///
///     fn create_playable(&mut self, params: PlayableParams) -> std::io::Result<Silent> {
///         self.0.push(params.start);
///         Ok(Silent)
///     }
/// }
///
/// let clock = ManualClock::new();
/// let scheduler = Scheduler::new(Starts::default(), clock.clone());
/// let mut playback = Playback::new(scheduler, notation::parse("C4{d:q}D4")?);
///
/// playback.schedule_until(0.1)?;
/// clock.set(0.45);
/// playback.schedule_until(0.55)?;
/// assert_eq!(vec![0.0, 0.5], playback.scheduler().generator().0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Playback<G: ToneGenerator> {
    scheduler: Scheduler<G, ManualClock>,
    group: NoteGroup,
    context: TimeContext,
    cursor: Option<f64>,
}

impl<G: ToneGenerator> Playback<G> {
    /// Creates a playback at 120 BPM.
    pub fn new(scheduler: Scheduler<G, ManualClock>, group: NoteGroup) -> Playback<G> {
        Playback {
            scheduler,
            group,
            context: TimeContext::default(),
            cursor: None,
        }
    }

    /// Sets the context used to convert beats to seconds.
    pub fn time_context(mut self, context: TimeContext) -> Self {
        self.context = context;
        self
    }

    pub fn scheduler(&self) -> &Scheduler<G, ManualClock> {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> Scheduler<G, ManualClock> {
        self.scheduler
    }

    /// Returns the number of notes in the group.
    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    /// Schedules the notes starting before `until` seconds, then fires due timers.
    ///
    /// Notes covered by an earlier call are skipped.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error after cancelling every note.
    pub fn schedule_until(&mut self, until: f64) -> scheduler::Result<()> {
        let window = ScheduleWindow {
            min_time: self.cursor,
            max_time: Some(until),
        };
        let result = self
            .group
            .schedule(&mut self.scheduler, &self.context, window)
            .and_then(|_| self.scheduler.advance());
        if let Err(err) = result {
            log::error!("stopping playback: {}", err);
            self.scheduler.cancel_all();
            return Err(err);
        }
        self.cursor = Some(until);
        Ok(())
    }

    /// Returns whether every note has been scheduled and the scheduler has nothing left to do.
    pub fn is_finished(&self) -> bool {
        let end = match self.group.end() {
            Some(end) => self.context.beat_to_absolute(end),
            None => return true,
        };
        self.cursor.map_or(false, |cursor| cursor >= end) && self.scheduler.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        envelope::{ControlParameter, Envelope},
        note::Note,
        pitch::Pitch,
        scheduler::{Playable, PlayableParams},
    };
    use std::{io, time::Duration};

    #[derive(Default)]
    struct Counter {
        created: Vec<PlayableParams>,
        fail: bool,
    }

    struct Voice;

    impl ControlParameter for Voice {
        fn set_value_at_time(&mut self, _value: f64, _time: f64) {}
        fn linear_ramp_to_value_at_time(&mut self, _value: f64, _time: f64) {}
    }

    impl Playable for Voice {
        fn gain(&mut self) -> &mut dyn ControlParameter {
            self
        }
        fn release(&mut self, _time: f64, _envelope: &Envelope) {}
        fn destroy(&mut self) {}
    }

    impl ToneGenerator for Counter {
        type Playable = Voice;
        type Error = io::Error;

        fn create_playable(&mut self, params: PlayableParams) -> io::Result<Voice> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "offline"));
            }
            self.created.push(params);
            Ok(Voice)
        }
    }

    fn group() -> NoteGroup {
        NoteGroup::new(vec![
            Note::new(Pitch::C4, 0.0, 0.25).unwrap(),
            Note::new(Pitch::new(52), 0.25, 0.25).unwrap(),
            Note::new(Pitch::new(55), 1.0, 0.25).unwrap(),
        ])
    }

    fn tick(playback: &mut Playback<Counter>, now: f64, length: f64) {
        playback.scheduler().clock().set(now);
        playback.schedule_until(now + length).unwrap();
    }

    fn created(playback: &Playback<Counter>) -> &[PlayableParams] {
        &playback.scheduler().generator().created
    }

    #[test]
    fn schedules_notes_window_by_window() {
        let scheduler = Scheduler::new(Counter::default(), ManualClock::new());
        let mut playback = Playback::new(scheduler, group());

        // At 120 BPM a whole note lasts two seconds, so the notes start at 0, 0.5 and 2.
        tick(&mut playback, 0.0, 0.1);
        assert_eq!(1, created(&playback).len());

        tick(&mut playback, 0.4, 0.1);
        assert_eq!(1, created(&playback).len());
        tick(&mut playback, 0.5, 0.1);
        assert_eq!(2, created(&playback).len());
        assert_eq!(0.5, created(&playback)[1].start);

        tick(&mut playback, 1.95, 0.1);
        assert_eq!(3, created(&playback).len());
        assert_eq!(2.0, created(&playback)[2].start);
        assert_eq!(2.5, created(&playback)[2].end);
    }

    #[test]
    fn finishes_once_idle() {
        let scheduler = Scheduler::new(Counter::default(), ManualClock::new())
            .sweep_interval(Duration::from_millis(500));
        let mut playback = Playback::new(scheduler, group());

        tick(&mut playback, 0.0, 0.05);
        tick(&mut playback, 1.5, 0.05);
        assert!(playback.scheduler().is_idle());
        assert!(!playback.is_finished());

        tick(&mut playback, 2.0, 0.05);
        assert!(!playback.scheduler().is_idle());
        assert!(!playback.is_finished());

        tick(&mut playback, 3.5, 0.05);
        assert!(playback.is_finished());
    }

    #[test]
    fn generator_failure_cancels_everything() {
        let generator = Counter {
            fail: true,
            ..Counter::default()
        };
        let mut playback = Playback::new(Scheduler::new(generator, ManualClock::new()), group());
        assert!(matches!(
            playback.schedule_until(0.05),
            Err(scheduler::Error::ToneGenerator(_))
        ));
        assert!(playback.scheduler().is_idle());
    }

    #[test]
    fn empty_group_is_finished() {
        let scheduler = Scheduler::new(Counter::default(), ManualClock::new());
        let playback = Playback::new(scheduler, NoteGroup::default());
        assert!(playback.is_empty());
        assert!(playback.is_finished());
    }
}
