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

//! Real-time playback of note groups.
//!
//! A [`Driver`] plays a [`Playback`] against the wall clock. Every tick it moves the
//! [`ManualClock`](crate::scheduler::ManualClock) of the playback's scheduler to the current
//! playback time, schedules the notes that start before the next tick and fires the scheduler's
//! due timers. Between ticks the driver sleeps. It stops when every note has played, when the
//! scheduler fails, or when [`Handle::stop`] is called from another thread.
//!
//! # Examples
//!
//! ```no_run
//! use tones::{
//!     driver::{Driver, Playback},
//!     notation,
//!     osc::{ScToneGenerator, UdpTransport},
//!     scheduler::{ManualClock, Scheduler},
//!     time::TimeContext,
//! };
//! use std::time::{Duration, SystemTime};
//!
//! let epoch = SystemTime::now() + Duration::from_millis(200);
//! let generator = ScToneGenerator::new(UdpTransport::connect("127.0.0.1:57110")?, epoch);
//! let scheduler = Scheduler::new(generator, ManualClock::new());
//! let group = notation::parse("C4{d:q}E4G4{d:h}")?;
//!
//! let playback = Playback::new(scheduler, group).time_context(TimeContext::new(90.0, 0.0)?);
//! Driver::new().epoch(epoch).run(playback)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Playback Time
//!
//! The driver keeps a _logical time_ that starts `ahead_by` in front of the wall clock and
//! advances by exactly one tick per tick, however long the tick took to run. The scheduler's
//! clock reads the logical time as seconds past the _epoch_. Tone generators that timestamp
//! their output, such as [`ScToneGenerator`](crate::osc::ScToneGenerator), must count from the
//! same epoch. Because the logical time runs ahead, timestamped messages reach the synthesis
//! server before they are due.
//!
//! A tick that runs so long that the wall clock catches up with the logical time ends the run
//! with [`Error::FellBehind`].

use crate::scheduler::{self, ToneGenerator};
use std::{
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::{Duration, SystemTime, SystemTimeError},
};
use thiserror::Error;

mod playback;
mod timeline;

pub use playback::Playback;

use timeline::Timeline;

/// A specialized [`Result`] type for driver errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Driver::run`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("playback fell behind the wall clock")]
    FellBehind(#[source] SystemTimeError),
    #[error("sleeper thread stopped unexpectedly")]
    SleeperStopped,
    #[error("playback failed")]
    Playback(#[from] scheduler::Error),
}

/// Stops a running [`Driver`] from another thread.
///
/// Returned by [`Driver::handle`].
#[derive(Debug, Clone)]
pub struct Handle {
    sender: Sender<Message>,
}

impl Handle {
    /// Stops the driver that created this handle before its next tick.
    ///
    /// Stopping a driver that has not started running yet keeps it from playing anything.
    pub fn stop(self) {
        let _ = self.sender.send(Message::Stop);
    }
}

/// Plays a [`Playback`] in real time.
#[derive(Debug)]
pub struct Driver {
    ahead_by: Duration,
    tick: Duration,
    epoch: Option<SystemTime>,
    receiver: Receiver<Message>,
    sender: Sender<Message>,
}

impl Default for Driver {
    fn default() -> Driver {
        let (sender, receiver) = mpsc::channel();
        Driver {
            ahead_by: Duration::from_millis(100),
            tick: Duration::from_millis(50),
            epoch: None,
            receiver,
            sender,
        }
    }
}

impl Driver {
    /// Creates a driver that runs 100 milliseconds ahead and ticks every 50 milliseconds.
    pub fn new() -> Driver {
        Driver::default()
    }

    /// Sets how far the logical time runs ahead of the wall clock.
    pub fn ahead_by(mut self, ahead_by: Duration) -> Self {
        self.ahead_by = ahead_by;
        self
    }

    /// Sets how often the driver wakes up to schedule notes.
    ///
    /// Should not exceed the scheduler's lead time, otherwise notes may be prepared after they
    /// were meant to start.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sets the wall clock time at which the scheduler's clock reads zero.
    ///
    /// Defaults to the logical time of the first tick, so that beat zero plays as soon as
    /// possible.
    pub fn epoch(mut self, epoch: SystemTime) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn handle(&self) -> Handle {
        Handle {
            sender: self.sender.clone(),
        }
    }

    /// Plays `playback` until it finishes or is stopped, then hands it back.
    ///
    /// Blocks the calling thread. See [`Driver::handle`] for stopping the run from elsewhere.
    /// A stopped playback keeps whatever notes it had already scheduled.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler fails, in which case every note is cancelled, or if a tick takes
    /// so long that the playback falls behind.
    pub fn run<G: ToneGenerator>(self, mut playback: Playback<G>) -> Result<Playback<G>> {
        let naps = spawn_sleeper(self.sender.clone());
        // Queued behind a stop that arrived before the run.
        let _ = self.sender.send(Message::Wake);

        let mut timeline = Timeline::start(self.epoch, self.ahead_by);
        log::debug!(
            "playing {} notes, {:?} ahead of the wall clock",
            playback.len(),
            self.ahead_by
        );

        while let Ok(Message::Wake) = self.receiver.recv() {
            let now = timeline.seconds();
            playback.scheduler().clock().set(now);
            playback.schedule_until(now + self.tick.as_secs_f64())?;
            if playback.is_finished() {
                log::debug!("playback finished {} seconds past the epoch", now);
                return Ok(playback);
            }

            timeline.step(self.tick);
            let nap = timeline.wait().map_err(Error::FellBehind)?;
            naps.send(nap).map_err(|_| Error::SleeperStopped)?;
        }

        log::debug!("playback stopped at {} seconds", timeline.seconds());
        Ok(playback)
    }
}

#[derive(Debug)]
enum Message {
    Wake,
    Stop,
}

/// Sleeps through every nap it is sent, waking the driver after each one.
fn spawn_sleeper(wake: Sender<Message>) -> Sender<Duration> {
    let (naps, requests) = mpsc::channel::<Duration>();
    thread::spawn(move || {
        for nap in requests {
            thread::sleep(nap);
            if wake.send(Message::Wake).is_err() {
                break;
            }
        }
    });
    naps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        envelope::{ControlParameter, Envelope},
        note::{Note, NoteGroup},
        pitch::Pitch,
        scheduler::{ManualClock, Playable, PlayableParams, Scheduler},
    };
    use std::io;

    #[derive(Default)]
    struct Voices {
        created: Vec<PlayableParams>,
        slow: Option<Duration>,
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

    impl ToneGenerator for Voices {
        type Playable = Voice;
        type Error = io::Error;

        fn create_playable(&mut self, params: PlayableParams) -> io::Result<Voice> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "server gone"));
            }
            if let Some(slow) = self.slow {
                thread::sleep(slow);
            }
            self.created.push(params);
            Ok(Voice)
        }
    }

    fn playback(voices: Voices, notes: Vec<Note>) -> Playback<Voices> {
        let scheduler = Scheduler::new(voices, ManualClock::new())
            .sweep_interval(Duration::from_millis(50));
        Playback::new(scheduler, NoteGroup::new(notes))
    }

    fn starts(playback: &Playback<Voices>) -> Vec<f64> {
        let created = &playback.scheduler().generator().created;
        created.iter().map(|params| params.start).collect()
    }

    #[test]
    fn plays_a_group_to_the_end() {
        // A twentieth of a whole note lasts a tenth of a second at 120 BPM.
        let notes = vec![
            Note::new(Pitch::C4, 0.0, 0.05).unwrap(),
            Note::new(Pitch::new(52), 0.05, 0.05).unwrap(),
        ];
        let playback = Driver::new()
            .tick(Duration::from_millis(20))
            .run(playback(Voices::default(), notes))
            .unwrap();

        let starts = starts(&playback);
        assert_eq!(2, starts.len());
        assert_eq!(0.0, starts[0]);
        assert!((starts[1] - 0.1).abs() < 1e-9, "second note at {}", starts[1]);
        assert!(playback.is_finished());
        assert!(playback.scheduler().is_idle());
    }

    #[test]
    fn stop_from_another_thread() {
        let driver = Driver::new();
        let handle = driver.handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.stop();
        });

        let notes = vec![Note::new(Pitch::C4, 0.0, 4.0).unwrap()];
        let playback = driver.run(playback(Voices::default(), notes)).unwrap();
        stopper.join().unwrap();

        assert_eq!(1, starts(&playback).len());
        assert!(!playback.is_finished());
    }

    #[test]
    fn stop_before_run() {
        let driver = Driver::new();
        driver.handle().stop();

        let notes = vec![Note::new(Pitch::C4, 0.0, 1.0).unwrap()];
        let playback = driver.run(playback(Voices::default(), notes)).unwrap();
        assert!(starts(&playback).is_empty());
    }

    #[test]
    fn scheduler_failure_is_returned() {
        let voices = Voices {
            fail: true,
            ..Voices::default()
        };
        let notes = vec![Note::new(Pitch::C4, 0.0, 1.0).unwrap()];
        let result = Driver::new().run(playback(voices, notes));
        assert!(matches!(
            result,
            Err(Error::Playback(scheduler::Error::ToneGenerator(_)))
        ));
    }

    #[test]
    fn slow_ticks_fall_behind() {
        let voices = Voices {
            slow: Some(Duration::from_millis(30)),
            ..Voices::default()
        };
        let notes = vec![Note::new(Pitch::C4, 0.0, 1.0).unwrap()];
        let result = Driver::new()
            .ahead_by(Duration::from_millis(0))
            .tick(Duration::from_millis(20))
            .run(playback(voices, notes));
        assert!(matches!(result, Err(Error::FellBehind(_))));
    }
}
