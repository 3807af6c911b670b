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

//! A compact text format for writing melodies.
//!
//! Notation is a run of pitch names and rests. Each item starts where the previous one ended and
//! inherits its duration, velocity and pan, so properties only need to be written when they
//! change.
//!
//! * Pitch names are an uppercase letter from `A` to `G`, an optional accidental (`#` or `s` for
//!   sharp, `b` for flat, `##` or `x` for double sharp, `bb` for double flat) and an optional
//!   octave, which defaults to `4`. Names can be written back to back, as in `D3G3`.
//! * `R` is a rest. Rests take up time but do not sound. A rest with a negative duration steps
//!   backwards, which lets later notes overlap earlier ones.
//! * `{key: expression, ...}` changes the properties of the item right before it. After a group
//!   this is the last item of the group.
//! * `(...)` groups items without changing anything else.
//! * `[...]` groups items that start where the group is placed, but with the default duration,
//!   velocity and pan instead of the inherited ones.
//! * `!` starts a comment that runs to the end of the line. Whitespace is ignored.
//!
//! Durations are measured in whole notes and default to a quarter note. Expressions may use
//! numbers, `+ - * /`, parentheses, note length names like `quarter` or `q`, and the current
//! `dur`, `vel` and `pan` of the item being changed.
//!
//! | key | effect |
//! |-----|--------|
//! | `d`, `dur` | set the duration |
//! | `s`, `start` | set the start |
//! | `e`, `end` | set the end, keeping the start |
//! | `v`, `vel` | set the velocity |
//! | `dv` | add to the velocity |
//! | `dd` | add to the duration |
//! | `p`, `pan` | set the pan |
//!
//! # Examples
//!
//! ```
//! use tones::{notation, pitch::Pitch};
//!
//! let group = notation::parse("
//!     ! a rising figure, the last note held
//!     (C4 E4 G4){d: h, v: 0.5}
//! ")?;
//!
//! let notes = group.notes();
//! assert_eq!(notes.len(), 3);
//! assert_eq!(notes[2].pitch(), "G4".parse::<Pitch>()?);
//! assert_eq!(notes[2].start(), 0.5);
//! assert_eq!(notes[2].duration(), 0.5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::{
    note::{self, Note, NoteGroup},
    pitch::Pitch,
};
use std::str::FromStr;
use thiserror::Error;

mod expr;
mod lexer;

use expr::ExprError;
use lexer::{Token, TokenKind};

/// A specialized [`Result`] type for parsing notation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when notation cannot be parsed.
///
/// Offsets are byte offsets into the notation after comments and whitespace have been removed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unknown character {found:?} at offset {offset}")]
    UnknownCharacter { offset: usize, found: char },
    #[error("invalid pitch name {name:?} at offset {offset}")]
    InvalidPitch { offset: usize, name: String },
    #[error("{open:?} at offset {offset} is never closed")]
    Unclosed { offset: usize, open: char },
    #[error("unexpected {found:?} at offset {offset}")]
    UnexpectedClose { offset: usize, found: char },
    #[error("expected {expected:?} but found {found:?} at offset {offset}")]
    Mismatched {
        offset: usize,
        expected: char,
        found: char,
    },
    #[error("properties at offset {offset} do not follow a note or rest")]
    DanglingProperties { offset: usize },
    #[error("unknown property {key:?} at offset {offset}")]
    UnknownProperty { offset: usize, key: String },
    #[error("malformed expression at offset {offset}: {message}")]
    MalformedExpression { offset: usize, message: String },
    #[error("unknown variable {name:?} at offset {offset}")]
    UnknownVariable { offset: usize, name: String },
    #[error("invalid note at offset {offset}")]
    InvalidValue {
        offset: usize,
        #[source]
        source: note::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bracket {
    Paren,
    Square,
}

impl Bracket {
    fn open(self) -> char {
        match self {
            Bracket::Paren => '(',
            Bracket::Square => '[',
        }
    }

    fn close(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
        }
    }
}

/// A property that can be changed in a `{...}` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Duration,
    Start,
    End,
    Velocity,
    VelocityOffset,
    DurationOffset,
    Pan,
}

impl FromStr for Property {
    type Err = ();

    fn from_str(key: &str) -> std::result::Result<Property, ()> {
        Ok(match key {
            "d" | "dur" => Property::Duration,
            "s" | "start" => Property::Start,
            "e" | "end" => Property::End,
            "v" | "vel" => Property::Velocity,
            "dv" => Property::VelocityOffset,
            "dd" => Property::DurationOffset,
            "p" | "pan" => Property::Pan,
            _ => return Err(()),
        })
    }
}

/// Whether an item sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Note(Pitch),
    Rest,
}

/// A note or rest as written, before rests are dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub start: f64,
    pub duration: f64,
    pub vel: f64,
    pub pan: f64,
    /// How many brackets enclose the item.
    pub depth: usize,
    /// Where the item was written, in stripped notation.
    pub offset: usize,
}

impl Item {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn is_rest(&self) -> bool {
        self.kind == ItemKind::Rest
    }

    /// Converts a sounding item into a validated note.
    pub fn to_note(&self) -> Option<note::Result<Note>> {
        match self.kind {
            ItemKind::Note(pitch) => Some(
                Note::new(pitch, self.start, self.duration)
                    .and_then(|note| note.with_vel(self.vel))
                    .and_then(|note| note.with_pan(self.pan)),
            ),
            ItemKind::Rest => None,
        }
    }

    fn set(&mut self, property: Property, value: f64) {
        match property {
            Property::Duration => self.duration = value,
            Property::Start => self.start = value,
            Property::End => self.duration = value - self.start,
            Property::Velocity => self.vel = value,
            Property::VelocityOffset => self.vel += value,
            Property::DurationOffset => self.duration += value,
            Property::Pan => self.pan = value,
        }
    }

    fn variable(&self, name: &str) -> Option<f64> {
        match name {
            "dur" => Some(self.duration),
            "vel" => Some(self.vel),
            "pan" => Some(self.pan),
            _ => expr::duration_constant(name),
        }
    }
}

/// The running state threaded from one item to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Context {
    next_start: f64,
    duration: f64,
    vel: f64,
    pan: f64,
}

impl Context {
    fn starting_at(next_start: f64) -> Context {
        Context {
            next_start,
            duration: 0.25,
            vel: 1.0,
            pan: 0.0,
        }
    }

    fn emit(&self, kind: ItemKind, depth: usize, offset: usize) -> Item {
        Item {
            kind,
            start: self.next_start,
            duration: self.duration,
            vel: self.vel,
            pan: self.pan,
            depth,
            offset,
        }
    }

    /// The context following `item`. Durations that are not positive are never inherited.
    fn after(&self, item: &Item) -> Context {
        Context {
            next_start: item.end(),
            duration: if item.duration > 0.0 {
                item.duration
            } else {
                self.duration
            },
            vel: item.vel,
            pan: item.pan,
        }
    }
}

/// Parses notation into a conflict free group of notes. Rests are dropped.
pub fn parse(text: &str) -> Result<NoteGroup> {
    let items = parse_items(text)?;
    let mut notes = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(note) = item.to_note() {
            notes.push(note.map_err(|source| Error::InvalidValue {
                offset: item.offset,
                source,
            })?);
        }
    }
    let group = NoteGroup::new(notes);
    log::debug!(
        "parsed {} items into {} notes",
        items.len(),
        group.len()
    );
    Ok(group)
}

/// Parses notation into every note and rest it contains, in the order they are written.
///
/// Sounding items are validated as notes. Rests are only checked for a start before zero.
pub fn parse_items(text: &str) -> Result<Vec<Item>> {
    let text = lexer::strip(text);
    let tokens = lexer::tokenize(&text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let (items, _) = parser.region(0, Context::starting_at(0.0), None)?;

    for item in &items {
        match item.to_note() {
            Some(Err(source)) => {
                return Err(Error::InvalidValue {
                    offset: item.offset,
                    source,
                });
            }
            None if item.start < 0.0 => {
                return Err(Error::InvalidValue {
                    offset: item.offset,
                    source: note::Error::InvalidStart(item.start),
                });
            }
            _ => {}
        }
    }
    Ok(items)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Parses items up to the bracket closing `open`, or to the end of input.
    fn region(
        &mut self,
        depth: usize,
        mut context: Context,
        open: Option<(Bracket, usize)>,
    ) -> Result<(Vec<Item>, Context)> {
        let mut items: Vec<Item> = Vec::new();
        while let Some(token) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            match token.kind {
                TokenKind::Pitch(pitch) => {
                    let item = context.emit(ItemKind::Note(pitch), depth, token.offset);
                    context = context.after(&item);
                    items.push(item);
                }
                TokenKind::Rest => {
                    let item = context.emit(ItemKind::Rest, depth, token.offset);
                    context = context.after(&item);
                    items.push(item);
                }
                TokenKind::Open(bracket) => {
                    let inner = match bracket {
                        Bracket::Paren => context,
                        Bracket::Square => Context::starting_at(context.next_start),
                    };
                    let (group, after) =
                        self.region(depth + 1, inner, Some((bracket, token.offset)))?;
                    items.extend(group);
                    context = after;
                }
                TokenKind::Close(bracket) => {
                    return match open {
                        Some((expected, _)) if expected == bracket => Ok((items, context)),
                        Some((expected, _)) => Err(Error::Mismatched {
                            offset: token.offset,
                            expected: expected.close(),
                            found: bracket.close(),
                        }),
                        None => Err(Error::UnexpectedClose {
                            offset: token.offset,
                            found: bracket.close(),
                        }),
                    };
                }
                TokenKind::Properties(body) => {
                    let target = items
                        .last_mut()
                        .ok_or(Error::DanglingProperties {
                            offset: token.offset,
                        })?;
                    apply_properties(target, body, token.offset + 1)?;
                    if target.is_rest() && target.duration <= 0.0 {
                        log::warn!(
                            "rest at offset {} has a duration of {}, stepping backwards",
                            target.offset,
                            target.duration
                        );
                    }
                    context = context.after(target);
                }
            }
        }

        match open {
            Some((bracket, offset)) => Err(Error::Unclosed {
                offset,
                open: bracket.open(),
            }),
            None => Ok((items, context)),
        }
    }
}

/// Applies comma separated `key:expression` assignments in order. `offset` is where `body`
/// starts.
fn apply_properties(item: &mut Item, body: &str, offset: usize) -> Result<()> {
    let mut start = 0;
    for assignment in body.split(',') {
        let assignment_offset = offset + start;
        start += assignment.len() + 1;
        if assignment.is_empty() {
            continue;
        }

        let colon = assignment
            .find(':')
            .ok_or_else(|| Error::MalformedExpression {
                offset: assignment_offset,
                message: "expected `key:value`".to_owned(),
            })?;
        let key = &assignment[..colon];
        let property = key.parse::<Property>().map_err(|_| Error::UnknownProperty {
            offset: assignment_offset,
            key: key.to_owned(),
        })?;

        let value_offset = assignment_offset + colon + 1;
        let snapshot = *item;
        let value = expr::evaluate(&assignment[colon + 1..], |name| snapshot.variable(name))
            .map_err(|err| expression_error(err, value_offset))?;
        item.set(property, value);
    }
    Ok(())
}

fn expression_error(err: ExprError, offset: usize) -> Error {
    let offset = offset + err.position();
    match err {
        ExprError::UnknownVariable { name, .. } => Error::UnknownVariable { offset, name },
        ExprError::Malformed { message, .. } => Error::MalformedExpression {
            offset,
            message: message.to_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitch(name: &str) -> Pitch {
        name.parse().unwrap()
    }

    #[test]
    fn single_note_with_duration() {
        let group = parse("C4{d:1}").unwrap();
        assert_eq!(vec![Note::new(Pitch::C4, 0.0, 1.0).unwrap()], group.notes());
    }

    #[test]
    fn groups_continue_the_running_note() {
        let group = parse("(C4D4)E4").unwrap();
        let notes = group.notes();
        assert_eq!(3, notes.len());
        assert_eq!(notes[1].end(), notes[2].start());
        assert_eq!(0.5, notes[2].start());
        assert_eq!(0.25, notes[2].duration());
    }

    #[test]
    fn defaults() {
        let items = parse_items("C").unwrap();
        assert_eq!(
            vec![Item {
                kind: ItemKind::Note(Pitch::C4),
                start: 0.0,
                duration: 0.25,
                vel: 1.0,
                pan: 0.0,
                depth: 0,
                offset: 0,
            }],
            items
        );
    }

    #[test]
    fn properties_are_inherited() {
        let group = parse("C4{d:e,v:0.5,p:-0.5}D4E4{dv:0.25,dd:e}F4").unwrap();
        let notes = group.notes();
        assert_eq!(0.125, notes[1].duration());
        assert_eq!(0.5, notes[1].vel());
        assert_eq!(-0.5, notes[1].pan());
        assert_eq!(0.25, notes[2].start());
        assert_eq!(0.25, notes[2].duration());
        assert_eq!(0.75, notes[2].vel());
        assert_eq!(0.5, notes[3].start());
        assert_eq!(0.25, notes[3].duration());
    }

    #[test]
    fn square_brackets_reset_properties() {
        let items = parse_items("C4{d:h,v:0.5}[D4E4]F4").unwrap();
        assert_eq!(0.5, items[1].start);
        assert_eq!(0.25, items[1].duration);
        assert_eq!(1.0, items[1].vel);
        assert_eq!(1, items[1].depth);
        assert_eq!(0.75, items[2].start);
        assert_eq!(1.0, items[3].start);
        assert_eq!(0.25, items[3].duration);
        assert_eq!(0, items[3].depth);
    }

    #[test]
    fn properties_after_a_group_change_its_last_item() {
        let items = parse_items("(G2{d:e,v:0.5}D3G3){d:1.3*e}R{d:-0.3*e}A2").unwrap();
        assert_eq!(5, items.len());
        assert_eq!(pitch("G3"), match items[2].kind {
            ItemKind::Note(pitch) => pitch,
            ItemKind::Rest => panic!("expected a note"),
        });
        assert_eq!(1.3 * 0.125, items[2].duration);

        let rest = items[3];
        assert!(rest.is_rest());
        assert_eq!(items[2].end(), rest.start);
        assert_eq!(-0.3 * 0.125, rest.duration);

        let last = items[4];
        assert_eq!(rest.end(), last.start);
        assert!(last.start < items[2].end());
        assert_eq!(items[2].duration, last.duration);
        assert_eq!(0.5, last.vel);

        let group = parse("(G2{d:e,v:0.5}D3G3){d:1.3*e}R{d:-0.3*e}A2").unwrap();
        assert_eq!(4, group.len());
    }

    #[test]
    fn set_start_and_end() {
        let items = parse_items("C4{s:1,e:1.5}D4{e:end+e}").unwrap_err();
        assert_eq!(
            Error::UnknownVariable {
                offset: 18,
                name: "end".to_owned()
            },
            items
        );

        let items = parse_items("C4{s:1,e:1.5}D4{e:2*dur+1.5}").unwrap();
        assert_eq!(1.0, items[0].start);
        assert_eq!(0.5, items[0].duration);
        assert_eq!(1.5, items[1].start);
        assert_eq!(1.0, items[1].duration);
    }

    #[test]
    fn comments_and_whitespace() {
        let group = parse("C4 ! first\n  D4{ d : q * 2 } ! second\n").unwrap();
        assert_eq!(2, group.len());
        assert_eq!(0.5, group.notes()[1].duration());
    }

    #[test]
    fn delimiter_errors() {
        assert_eq!(
            Err(Error::Unclosed {
                offset: 0,
                open: '('
            }),
            parse_items("(C4")
        );
        assert_eq!(
            Err(Error::UnexpectedClose {
                offset: 2,
                found: ']'
            }),
            parse_items("C4]")
        );
        assert_eq!(
            Err(Error::Mismatched {
                offset: 3,
                expected: ')',
                found: ']'
            }),
            parse_items("(C4]")
        );
    }

    #[test]
    fn property_errors() {
        assert_eq!(
            Err(Error::DanglingProperties { offset: 0 }),
            parse_items("{d:1}C4")
        );
        assert_eq!(
            Err(Error::UnknownProperty {
                offset: 3,
                key: "x".to_owned()
            }),
            parse_items("C4{x:1}")
        );
        assert!(matches!(
            parse_items("C4{d1}"),
            Err(Error::MalformedExpression { offset: 3, .. })
        ));
        assert!(matches!(
            parse_items("C4{d:(1}"),
            Err(Error::MalformedExpression { offset: 7, .. })
        ));
    }

    #[test]
    fn value_errors() {
        assert_eq!(
            Err(Error::InvalidValue {
                offset: 0,
                source: note::Error::InvalidDuration(0.0)
            }),
            parse_items("C4{d:0}")
        );
        assert_eq!(
            Err(Error::InvalidValue {
                offset: 0,
                source: note::Error::InvalidPan(2.0)
            }),
            parse_items("C4{p:2}")
        );
        assert_eq!(
            Err(Error::InvalidValue {
                offset: 0,
                source: note::Error::InvalidVelocity(-1.0)
            }),
            parse_items("C4{v:-1}")
        );
        assert_eq!(
            Err(Error::InvalidValue {
                offset: 9,
                source: note::Error::InvalidStart(-0.25)
            }),
            parse_items("C4R{d:-h}D4")
        );
    }

    #[test]
    fn no_partial_results() {
        assert!(parse("C4D4E4H4").is_err());
        assert!(parse("C4D4{d:0}E4").is_err());
    }
}
