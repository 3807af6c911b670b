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

use super::{check_start, Error, Note, Result, UnionStrategy, EPSILON};
use crate::{
    pitch::Interval,
    scheduler::{self, Clock, Handle, Scheduler, ToneGenerator},
    time::TimeContext,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, iter::FromIterator, slice};

/// An ordered collection of notes with no same-pitch overlaps.
///
/// Notes are kept sorted by start time. Every mutation re-sorts the notes and resolves any new
/// conflicts with the group's [`UnionStrategy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawGroup")]
pub struct NoteGroup {
    notes: Vec<Note>,
    strategy: UnionStrategy,
}

#[derive(Deserialize)]
struct RawGroup {
    notes: Vec<Note>,
    #[serde(default)]
    strategy: UnionStrategy,
}

impl From<RawGroup> for NoteGroup {
    fn from(raw: RawGroup) -> NoteGroup {
        NoteGroup::with_strategy(raw.notes, raw.strategy)
    }
}

impl NoteGroup {
    /// Creates a group using the default strategy: trim overlaps and sum coincident notes.
    pub fn new(notes: Vec<Note>) -> NoteGroup {
        NoteGroup::with_strategy(notes, UnionStrategy::default())
    }

    pub fn with_strategy(notes: Vec<Note>, strategy: UnionStrategy) -> NoteGroup {
        NoteGroup {
            notes: fix(notes, &strategy),
            strategy,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn iter(&self) -> slice::Iter<'_, Note> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn strategy(&self) -> UnionStrategy {
        self.strategy
    }

    /// The earliest start of any note.
    pub fn start(&self) -> Option<f64> {
        self.notes.first().map(Note::start)
    }

    /// The latest end of any note.
    pub fn end(&self) -> Option<f64> {
        self.notes
            .iter()
            .map(Note::end)
            .fold(None, |latest: Option<f64>, end| {
                Some(latest.map_or(end, |latest| latest.max(end)))
            })
    }

    pub fn add(&mut self, note: Note) {
        self.add_all(Some(note));
    }

    pub fn add_all(&mut self, notes: impl IntoIterator<Item = Note>) {
        self.notes.extend(notes);
        self.refix();
    }

    /// Removes and returns the note at `index` in start order.
    pub fn remove(&mut self, index: usize) -> Option<Note> {
        if index >= self.notes.len() {
            return None;
        }
        let note = self.notes.remove(index);
        self.refix();
        Some(note)
    }

    pub fn retain(&mut self, f: impl FnMut(&Note) -> bool) {
        self.notes.retain(f);
    }

    /// Moves every note by `offset` beats. Fails without moving anything if a note would start
    /// before zero.
    pub fn translate(&mut self, offset: f64) -> Result<()> {
        if let Some(start) = self.start() {
            check_start(start + offset)?;
        }
        for note in &mut self.notes {
            note.translate(offset)?;
        }
        Ok(())
    }

    pub fn transpose(&mut self, interval: Interval) {
        for note in &mut self.notes {
            note.transpose(interval);
        }
    }

    /// Scales the velocity of every note. Fails without changing anything on a bad factor.
    pub fn amplify(&mut self, factor: f64) -> Result<()> {
        let mut notes = self.notes.clone();
        for note in &mut notes {
            note.amplify(factor)?;
        }
        self.notes = notes;
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a group, validating every note and resolving conflicts.
    ///
    /// Notes with invalid values are reported as data errors carrying the [`Error`] message.
    pub fn from_json(json: &str) -> serde_json::Result<NoteGroup> {
        serde_json::from_str(json)
    }

    /// Schedules every note whose start falls inside `window`.
    ///
    /// The window is given in absolute time and converted to beats with `context`. Notes are
    /// converted to absolute time before being handed to the scheduler. Stale notes are skipped
    /// by the scheduler, so the returned handles may be fewer than the notes in the window.
    pub fn schedule<G, C>(
        &self,
        scheduler: &mut Scheduler<G, C>,
        context: &TimeContext,
        window: ScheduleWindow,
    ) -> scheduler::Result<Vec<Handle>>
    where
        G: ToneGenerator,
        C: Clock,
    {
        let min_beat = window.min_time.map(|time| context.absolute_to_beat(time));
        let max_beat = window.max_time.map(|time| context.absolute_to_beat(time));

        let mut handles = Vec::new();
        for note in &self.notes {
            let after_min = min_beat.map_or(true, |min| note.start() >= min);
            let before_max = max_beat.map_or(true, |max| note.start() < max);
            if after_min && before_max {
                if let Some(handle) = scheduler.schedule(&context.note_to_absolute(note), None)? {
                    handles.push(handle);
                }
            }
        }
        log::debug!(
            "scheduled {} of {} notes in {:?}",
            handles.len(),
            self.notes.len(),
            window
        );
        Ok(handles)
    }

    fn refix(&mut self) {
        let notes = std::mem::take(&mut self.notes);
        self.notes = fix(notes, &self.strategy);
    }
}

impl FromIterator<Note> for NoteGroup {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> NoteGroup {
        NoteGroup::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a NoteGroup {
    type Item = &'a Note;
    type IntoIter = slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

/// A range of absolute times, used to pick which notes of a group to schedule.
///
/// The lower bound is inclusive and the upper bound exclusive, so adjacent windows never
/// schedule a note twice. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleWindow {
    pub min_time: Option<f64>,
    pub max_time: Option<f64>,
}

impl ScheduleWindow {
    /// A window that includes every note.
    pub fn all() -> ScheduleWindow {
        ScheduleWindow::default()
    }

    pub fn between(min_time: f64, max_time: f64) -> ScheduleWindow {
        ScheduleWindow {
            min_time: Some(min_time),
            max_time: Some(max_time),
        }
    }
}

/// Resolves conflicts until no two notes of the same pitch overlap.
///
/// Scans every pair in start order and replaces the first conflicting pair with the result of
/// `strategy`, then starts over. The result is sorted by start time, then pitch.
pub fn fix(mut notes: Vec<Note>, strategy: &UnionStrategy) -> Vec<Note> {
    sort(&mut notes);
    let mut passes = 0;
    'scan: loop {
        for i in 0..notes.len() {
            for j in i + 1..notes.len() {
                if notes[i].conflicts_with(&notes[j]) {
                    let second = notes.remove(j);
                    let mut first = notes.remove(i);
                    if (second.start() - first.start()).abs() <= EPSILON {
                        first = Note::absolute(&first, second.start(), first.duration());
                    }
                    notes.extend(strategy.resolve(first, second));
                    sort(&mut notes);
                    passes += 1;
                    continue 'scan;
                }
            }
        }
        if passes > 0 {
            log::trace!("resolved {} conflicts, {} notes remain", passes, notes.len());
        }
        return notes;
    }
}

fn sort(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        a.start()
            .partial_cmp(&b.start())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.pitch().cmp(&b.pitch()))
    });
}
