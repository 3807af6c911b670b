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

use super::{Note, EPSILON};
use serde::{Deserialize, Serialize};

/// How to resolve two same-pitch notes that overlap.
///
/// `UnionStrategy` combines an [`Overlap`] policy, used when one note starts strictly before the
/// other, with a [`Coincident`] policy, used when both notes start at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnionStrategy {
    pub overlap: Overlap,
    pub coincident: Coincident,
}

/// Resolution of two notes where the first starts strictly before the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Overlap {
    /// Replace both with one note spanning both, with the larger velocity.
    Merge,
    /// Cut the first note so it ends where the second begins.
    Trim,
    /// Drop both notes.
    Remove,
    /// Keep only the first note.
    First,
    /// Keep only the second note.
    Second,
}

impl Default for Overlap {
    /// Returns `Overlap::Trim`.
    fn default() -> Overlap {
        Overlap::Trim
    }
}

/// Resolution of two notes with identical start times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Coincident {
    /// Keep one note with the summed velocity and the later end.
    Sum,
    /// Drop both notes.
    Remove,
    /// Keep the longer note.
    Longer,
    /// Keep the shorter note.
    Shorter,
    /// Keep one note with the largest duration, velocity and pan of the two.
    MaxProperties,
}

impl Default for Coincident {
    /// Returns `Coincident::Sum`.
    fn default() -> Coincident {
        Coincident::Sum
    }
}

impl UnionStrategy {
    pub fn new(overlap: Overlap, coincident: Coincident) -> UnionStrategy {
        UnionStrategy {
            overlap,
            coincident,
        }
    }

    /// Resolves a conflicting pair into zero, one or two notes.
    ///
    /// The notes must share a pitch and `first` must not start after `second`. Starts closer
    /// than a billionth of a beat count as coincident.
    pub fn resolve(&self, first: Note, second: Note) -> Vec<Note> {
        debug_assert!(first.start() <= second.start() + EPSILON);
        if (second.start() - first.start()).abs() <= EPSILON {
            self.resolve_coincident(first, second)
        } else {
            self.resolve_overlap(first, second)
        }
    }

    fn resolve_overlap(&self, mut first: Note, second: Note) -> Vec<Note> {
        match self.overlap {
            Overlap::Merge => {
                first.set_end(first.end().max(second.end()));
                first.set_vel_unchecked(first.vel().max(second.vel()));
                vec![first]
            }
            Overlap::Trim => {
                first.set_end(second.start());
                vec![first, second]
            }
            Overlap::Remove => vec![],
            Overlap::First => vec![first],
            Overlap::Second => vec![second],
        }
    }

    fn resolve_coincident(&self, mut first: Note, second: Note) -> Vec<Note> {
        match self.coincident {
            Coincident::Sum => {
                first.set_end(first.end().max(second.end()));
                first.set_vel_unchecked(first.vel() + second.vel());
                vec![first]
            }
            Coincident::Remove => vec![],
            Coincident::Longer => {
                if second.duration() > first.duration() {
                    vec![second]
                } else {
                    vec![first]
                }
            }
            Coincident::Shorter => {
                if second.duration() < first.duration() {
                    vec![second]
                } else {
                    vec![first]
                }
            }
            Coincident::MaxProperties => {
                first.set_end(first.end().max(second.end()));
                first.set_vel_unchecked(first.vel().max(second.vel()));
                first.set_pan_unchecked(first.pan().max(second.pan()));
                vec![first]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::Pitch;

    fn note(start: f64, duration: f64, vel: f64) -> Note {
        Note::new(Pitch::C4, start, duration)
            .and_then(|note| note.with_vel(vel))
            .unwrap()
    }

    fn strategy(overlap: Overlap) -> UnionStrategy {
        UnionStrategy::new(overlap, Coincident::Sum)
    }

    #[test]
    fn overlap_policies() {
        let a = note(0.0, 2.0, 0.5);
        let b = note(1.0, 2.0, 0.8);

        assert_eq!(vec![note(0.0, 3.0, 0.8)], strategy(Overlap::Merge).resolve(a, b));
        assert_eq!(vec![note(0.0, 1.0, 0.5), b], strategy(Overlap::Trim).resolve(a, b));
        assert!(strategy(Overlap::Remove).resolve(a, b).is_empty());
        assert_eq!(vec![a], strategy(Overlap::First).resolve(a, b));
        assert_eq!(vec![b], strategy(Overlap::Second).resolve(a, b));
    }

    #[test]
    fn coincident_policies() {
        let a = note(1.0, 1.0, 0.5).with_pan(-0.5).unwrap();
        let b = note(1.0, 2.0, 0.25).with_pan(0.5).unwrap();
        let with = |coincident| UnionStrategy::new(Overlap::Trim, coincident).resolve(a, b);

        assert_eq!(vec![note(1.0, 2.0, 0.75).with_pan(-0.5).unwrap()], with(Coincident::Sum));
        assert!(with(Coincident::Remove).is_empty());
        assert_eq!(vec![b], with(Coincident::Longer));
        assert_eq!(vec![a], with(Coincident::Shorter));
        assert_eq!(
            vec![note(1.0, 2.0, 0.5).with_pan(0.5).unwrap()],
            with(Coincident::MaxProperties)
        );
    }

    #[test]
    fn nearly_equal_starts_are_coincident() {
        let a = note(1.0, 1.0, 0.5);
        let b = note(1.0 + 1e-12, 1.0, 0.25);
        let resolved = UnionStrategy::new(Overlap::Second, Coincident::Sum).resolve(a, b);
        assert_eq!(1, resolved.len());
        assert_eq!(1.0, resolved[0].start());
        assert_eq!(0.75, resolved[0].vel());
    }

    #[test]
    fn default_is_trim_and_sum() {
        assert_eq!(
            UnionStrategy::new(Overlap::Trim, Coincident::Sum),
            UnionStrategy::default()
        );
    }
}
