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

//! Arithmetic in property blocks.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ExprError {
    #[error("unknown variable {name:?}")]
    UnknownVariable { position: usize, name: String },
    #[error("{message}")]
    Malformed {
        position: usize,
        message: &'static str,
    },
}

impl ExprError {
    pub(crate) fn position(&self) -> usize {
        match *self {
            ExprError::UnknownVariable { position, .. } | ExprError::Malformed { position, .. } => {
                position
            }
        }
    }
}

/// Note lengths in whole notes, with their long and short names.
const DURATIONS: &[(&str, &str, f64)] = &[
    ("whole", "w", 1.0),
    ("half", "h", 1.0 / 2.0),
    ("quarter", "q", 1.0 / 4.0),
    ("eighth", "e", 1.0 / 8.0),
    ("sixteenth", "s", 1.0 / 16.0),
    ("thirtysecond", "tt", 1.0 / 32.0),
    ("sixtyfourth", "sf", 1.0 / 64.0),
    ("onetwentyeighth", "ote", 1.0 / 128.0),
    ("twofiftysixth", "tfs", 1.0 / 256.0),
    ("fivetwelfth", "ftt", 1.0 / 512.0),
];

/// Looks up one of the named note lengths.
pub(crate) fn duration_constant(name: &str) -> Option<f64> {
    DURATIONS
        .iter()
        .find(|(long, short, _)| *long == name || *short == name)
        .map(|(_, _, value)| *value)
}

/// Evaluates an infix expression of numbers and variables.
///
/// Supports `+ - * /`, unary minus and parentheses. Variables are resolved with `lookup`.
pub(crate) fn evaluate(
    text: &str,
    lookup: impl Fn(&str) -> Option<f64>,
) -> Result<f64, ExprError> {
    let mut evaluator = Evaluator {
        text,
        pos: 0,
        lookup: &lookup,
    };
    let value = evaluator.sum()?;
    if evaluator.pos < text.len() {
        return Err(evaluator.malformed("unexpected character"));
    }
    Ok(value)
}

struct Evaluator<'a> {
    text: &'a str,
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<f64>,
}

impl<'a> Evaluator<'a> {
    fn sum(&mut self) -> Result<f64, ExprError> {
        let mut value = self.product()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    value += self.product()?;
                }
                Some('-') => {
                    self.pos += 1;
                    value -= self.product()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn product(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some('/') => {
                    self.pos += 1;
                    value /= self.unary()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek() != Some(')') {
                    return Err(self.malformed("expected `)`"));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.number(),
            Some(ch) if ch.is_ascii_alphabetic() => self.variable(),
            Some(_) => Err(self.malformed("unexpected character")),
            None => Err(self.malformed("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        let len = self.text[start..]
            .bytes()
            .take_while(|b| b.is_ascii_digit() || *b == b'.')
            .count();
        self.pos += len;
        self.text[start..self.pos].parse().map_err(|_| ExprError::Malformed {
            position: start,
            message: "invalid number",
        })
    }

    fn variable(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        let len = self.text[start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        self.pos += len;
        let name = &self.text[start..self.pos];
        (self.lookup)(name).ok_or_else(|| ExprError::UnknownVariable {
            position: start,
            name: name.to_owned(),
        })
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn malformed(&self, message: &'static str) -> ExprError {
        ExprError::Malformed {
            position: self.pos,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Result<f64, ExprError> {
        evaluate(text, duration_constant)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(Ok(7.0), eval("1+2*3"));
        assert_eq!(Ok(9.0), eval("(1+2)*3"));
        assert_eq!(Ok(-0.5), eval("-1/2"));
        assert_eq!(Ok(1.0), eval("--1"));
        assert_eq!(Ok(0.5), eval(".25*2"));
        assert_eq!(Ok(1.0), eval("4-2-1"));
        assert_eq!(Ok(2.0), eval("8/2/2"));
    }

    #[test]
    fn duration_names() {
        assert_eq!(Ok(0.125), eval("e"));
        assert_eq!(Ok(0.125), eval("eighth"));
        assert_eq!(Ok(1.3 * 0.125), eval("1.3*e"));
        assert_eq!(Ok(-0.5), eval("-h"));
        assert_eq!(Ok(1.0 / 512.0), eval("ftt"));
        assert_eq!(Some(0.0625), duration_constant("s"));
    }

    #[test]
    fn errors() {
        assert_eq!(
            Err(ExprError::UnknownVariable {
                position: 2,
                name: "x".to_owned()
            }),
            eval("1+x")
        );
        assert_eq!(2, eval("1+").unwrap_err().position());
        assert_eq!(1, eval("1)").unwrap_err().position());
        assert!(eval("(1").is_err());
        assert!(eval("1..2").is_err());
        assert!(eval("").is_err());
        assert!(eval("2$").is_err());
    }
}
