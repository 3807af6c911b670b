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

/// A prepared playable and the span it sounds for.
#[derive(Debug)]
pub(crate) struct Entry<P> {
    pub(crate) id: NoteId,
    pub(crate) playable: P,
    pub(crate) start: f64,
    pub(crate) end: f64,
    pub(crate) vel: f64,
}

/// Playback state of a single pitch.
///
/// At most one entry is active. Entries wait in `future` from the moment their playable is
/// created until their start time.
#[derive(Debug)]
pub(crate) struct PitchState<P> {
    pub(crate) active: Option<Entry<P>>,
    pub(crate) future: Vec<Entry<P>>,
}

impl<P> Default for PitchState<P> {
    fn default() -> PitchState<P> {
        PitchState {
            active: None,
            future: Vec::new(),
        }
    }
}

impl<P> PitchState<P> {
    pub(crate) fn is_empty(&self) -> bool {
        self.active.is_none() && self.future.is_empty()
    }

    pub(crate) fn take_future(&mut self, id: NoteId) -> Option<Entry<P>> {
        let index = self.future.iter().position(|entry| entry.id == id)?;
        Some(self.future.remove(index))
    }

    pub(crate) fn take_active(&mut self, id: NoteId) -> Option<Entry<P>> {
        match &self.active {
            Some(entry) if entry.id == id => self.active.take(),
            _ => None,
        }
    }

    pub(crate) fn has(&self, id: NoteId) -> bool {
        self.is_active(id) || self.is_future(id)
    }

    pub(crate) fn is_active(&self, id: NoteId) -> bool {
        self.active.as_ref().map_or(false, |entry| entry.id == id)
    }

    pub(crate) fn is_future(&self, id: NoteId) -> bool {
        self.future.iter().any(|entry| entry.id == id)
    }

    /// Drops the active entry if it ended at or before `now`.
    pub(crate) fn expire(&mut self, now: f64) -> Option<Entry<P>> {
        match &self.active {
            Some(entry) if entry.end <= now => self.active.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, start: f64, end: f64) -> Entry<()> {
        Entry {
            id: NoteId(id),
            playable: (),
            start,
            end,
            vel: 1.0,
        }
    }

    #[test]
    fn take_entries_by_id() {
        let mut state = PitchState::default();
        state.future.push(entry(1, 0.0, 1.0));
        state.future.push(entry(2, 1.0, 2.0));
        state.active = Some(entry(0, 0.0, 0.5));

        assert!(state.has(NoteId(2)));
        assert_eq!(Some(NoteId(2)), state.take_future(NoteId(2)).map(|e| e.id));
        assert!(!state.has(NoteId(2)));
        assert!(state.take_active(NoteId(1)).is_none());
        assert_eq!(Some(NoteId(0)), state.take_active(NoteId(0)).map(|e| e.id));
        assert!(!state.is_empty());
    }

    #[test]
    fn expire_finished_notes() {
        let mut state = PitchState::default();
        state.active = Some(entry(0, 0.0, 1.0));
        assert!(state.expire(0.5).is_none());
        assert!(state.expire(1.0).is_some());
        assert!(state.is_empty());
    }
}
