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

use super::NoteId;
use crate::{note::Note, pitch::Pitch};
use std::{cmp::Ordering, collections::BTreeMap};

/// Work the scheduler has promised to do at a later time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    /// Schedule a note that was too far in the future to prepare.
    Reschedule { id: NoteId, note: Note },
    /// Move a prepared note from the future list to the active slot of its pitch.
    Promote { id: NoteId, pitch: Pitch },
    /// Drop active notes that have finished.
    Sweep,
}

/// Orders timers by due time, then by the order they were added in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimerKey {
    time: f64,
    seq: u64,
}

impl TimerKey {
    pub(crate) fn time(&self) -> f64 {
        self.time
    }
}

impl PartialEq for TimerKey {
    fn eq(&self, other: &TimerKey) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimerKey {}

impl PartialOrd for TimerKey {
    fn partial_cmp(&self, other: &TimerKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerKey {
    fn cmp(&self, other: &TimerKey) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Timers {
    queue: BTreeMap<TimerKey, Action>,
    seq: u64,
}

impl Timers {
    pub(crate) fn push(&mut self, time: f64, action: Action) -> TimerKey {
        let key = TimerKey {
            time,
            seq: self.seq,
        };
        self.seq += 1;
        self.queue.insert(key, action);
        key
    }

    pub(crate) fn remove(&mut self, key: TimerKey) -> Option<Action> {
        self.queue.remove(&key)
    }

    /// Marks the timers pushed so far. Pass it to [`Timers::pop_due`] to leave later timers
    /// queued.
    pub(crate) fn horizon(&self) -> u64 {
        self.seq
    }

    /// Removes and returns the earliest timer due at or before `now` that was pushed before
    /// `horizon`.
    pub(crate) fn pop_due(&mut self, now: f64, horizon: u64) -> Option<(TimerKey, Action)> {
        let key = *self.queue.keys().next()?;
        if key.time > now || key.seq >= horizon {
            return None;
        }
        self.queue.remove(&key).map(|action| (key, action))
    }

    /// Drops every timer except the sweep.
    pub(crate) fn clear_notes(&mut self) {
        self.queue.retain(|_, action| *action == Action::Sweep);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns how many timers are waiting on notes.
    pub(crate) fn note_timers(&self) -> usize {
        self.queue
            .values()
            .filter(|action| **action != Action::Sweep)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_in_time_order() {
        let mut timers = Timers::default();
        timers.push(2.0, Action::Sweep);
        let first = timers.push(1.0, Action::Sweep);
        let promote = Action::Promote {
            id: NoteId(7),
            pitch: Pitch::C4,
        };
        timers.push(1.0, promote.clone());

        let horizon = timers.horizon();
        assert_eq!(None, timers.pop_due(0.5, horizon).map(|(_, action)| action));
        let (key, _) = timers.pop_due(1.0, horizon).unwrap();
        assert_eq!(first, key);
        assert_eq!(Some(promote), timers.pop_due(1.0, horizon).map(|(_, action)| action));
        assert_eq!(None, timers.pop_due(1.5, horizon).map(|(_, action)| action));
        assert_eq!(1, timers.len());
    }

    #[test]
    fn later_timers_wait_for_the_next_horizon() {
        let mut timers = Timers::default();
        timers.push(1.0, Action::Sweep);
        let horizon = timers.horizon();
        timers.push(1.0, Action::Sweep);

        assert!(timers.pop_due(1.0, horizon).is_some());
        assert!(timers.pop_due(1.0, horizon).is_none());
        assert!(timers.pop_due(1.0, timers.horizon()).is_some());
        assert_eq!(0, timers.len());
    }

    #[test]
    fn clear_keeps_the_sweep() {
        let mut timers = Timers::default();
        timers.push(3.0, Action::Sweep);
        let key = timers.push(
            1.0,
            Action::Promote {
                id: NoteId(1),
                pitch: Pitch::A4,
            },
        );
        timers.push(
            2.0,
            Action::Promote {
                id: NoteId(2),
                pitch: Pitch::A4,
            },
        );

        assert!(timers.remove(key).is_some());
        assert!(timers.remove(key).is_none());
        assert_eq!(1, timers.note_timers());
        timers.clear_notes();
        assert_eq!(1, timers.len());
        assert_eq!(0, timers.note_timers());
    }
}
