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

use super::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fs, path::Path};

/// A repeating set of scale degrees, measured in cents above the root.
///
/// The last degree is the period of the scale: walking past it starts the next repetition. For
/// ordinary scales the period is an octave, 1200 cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScale")]
pub struct Scale {
    description: String,
    degrees: Vec<f64>,
}

#[derive(Deserialize)]
struct RawScale {
    description: String,
    degrees: Vec<f64>,
}

impl TryFrom<RawScale> for Scale {
    type Error = Error;

    fn try_from(raw: RawScale) -> Result<Scale> {
        Scale::new(raw.description, raw.degrees)
    }
}

impl Scale {
    /// Creates a scale from its degrees in cents, the last being the period.
    pub fn new(description: impl Into<String>, degrees: Vec<f64>) -> Result<Scale> {
        let period = *degrees.last().ok_or(Error::EmptyScale)?;
        if !(period.is_finite() && period > 0.0) {
            return Err(Error::InvalidPeriod(period));
        }
        Ok(Scale {
            description: description.into(),
            degrees,
        })
    }

    /// Divides the octave into `divisions` equal steps.
    ///
    /// # Panics
    ///
    /// Panics if `divisions` is zero.
    pub fn equal_temperament(divisions: u32) -> Scale {
        assert!(divisions > 0, "equal temperament needs at least one division");
        let step = 1200.0 / f64::from(divisions);
        Scale {
            description: format!("{}-tone equal temperament", divisions),
            degrees: (1..=divisions).map(|i| step * f64::from(i)).collect(),
        }
    }

    /// Parses a scale file.
    ///
    /// The first line is a free-form description, the second line holds the number of intervals
    /// and exactly that many interval lines follow. An interval is written in cents when it
    /// contains a decimal point (`701.955`), as a ratio when it contains a slash (`3/2`), and as
    /// whole cents otherwise. Lines starting with `!` are comments.
    pub fn parse(text: &str) -> Result<Scale> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(number, line)| (number + 1, line.trim()))
            .filter(|(_, line)| !line.starts_with('!'));

        let (_, description) = lines.next().ok_or(Error::MissingDescription)?;
        let (_, count) = lines.next().ok_or(Error::MissingCount)?;
        let expected = count
            .split_whitespace()
            .next()
            .and_then(|count| count.parse::<usize>().ok())
            .ok_or_else(|| Error::InvalidCount(count.to_owned()))?;

        let degrees = lines
            .filter(|(_, line)| !line.is_empty())
            .map(|(number, line)| parse_interval(number, line))
            .collect::<Result<Vec<_>>>()?;

        if degrees.len() != expected {
            return Err(Error::WrongIntervalCount {
                expected,
                found: degrees.len(),
            });
        }
        log::debug!("parsed scale {:?} with {} degrees", description, expected);
        Scale::new(description, degrees)
    }

    /// Reads and parses a scale file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Scale> {
        let text = fs::read_to_string(path)?;
        Scale::parse(&text)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the degrees in cents, including the period as the last element.
    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }

    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    pub fn period(&self) -> f64 {
        self.degrees[self.degrees.len() - 1]
    }

    /// Returns the distance in cents from the root to the degree `steps` away, which may be
    /// negative or lie beyond the period.
    pub fn cents(&self, steps: i32) -> f64 {
        let len = self.degrees.len() as i32;
        let periods = steps.div_euclid(len);
        let degree = steps.rem_euclid(len);
        let within = if degree == 0 {
            0.0
        } else {
            self.degrees[degree as usize - 1]
        };
        f64::from(periods) * self.period() + within
    }
}

fn parse_interval(line: usize, text: &str) -> Result<f64> {
    let invalid = || Error::InvalidInterval {
        line,
        text: text.to_owned(),
    };
    let token = text.split_whitespace().next().ok_or_else(invalid)?;

    let cents = if token.contains('.') {
        token.parse::<f64>().map_err(|_| invalid())?
    } else if let Some(slash) = token.find('/') {
        let numerator = token[..slash].parse::<u64>().map_err(|_| invalid())?;
        let denominator = token[slash + 1..].parse::<u64>().map_err(|_| invalid())?;
        if numerator == 0 || denominator == 0 {
            return Err(invalid());
        }
        1200.0 * (numerator as f64 / denominator as f64).log2()
    } else {
        f64::from(token.parse::<i32>().map_err(|_| invalid())?)
    };

    if cents.is_finite() {
        Ok(cents)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEANTONE: &str = "! meanone.scl
!
Quarter-comma meantone, partial
 4
!
 193.157
 3/2
 5/4   major third
 2/1
";

    #[test]
    fn parse_scala_file() {
        let scale = Scale::parse(MEANTONE).unwrap();
        assert_eq!("Quarter-comma meantone, partial", scale.description());
        assert_eq!(4, scale.len());
        assert_eq!(193.157, scale.degrees()[0]);
        assert!((scale.degrees()[1] - 701.955).abs() < 1e-3);
        assert!((scale.degrees()[2] - 386.314).abs() < 1e-3);
        assert!((scale.period() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn bare_integers_are_cents() {
        let scale = Scale::parse("pentatonic\n5\n200\n400\n700\n900\n1200\n").unwrap();
        assert_eq!(vec![200.0, 400.0, 700.0, 900.0, 1200.0], scale.degrees());
        assert_eq!(0.0, scale.cents(0));
        assert_eq!(700.0, scale.cents(3));
        assert_eq!(1400.0, scale.cents(6));
        assert_eq!(-500.0, scale.cents(-2));
    }

    #[test]
    fn reject_malformed_files() {
        assert!(matches!(Scale::parse(""), Err(Error::MissingDescription)));
        assert!(matches!(Scale::parse("desc"), Err(Error::MissingCount)));
        assert!(matches!(
            Scale::parse("desc\nmany\n"),
            Err(Error::InvalidCount(_))
        ));
        assert!(matches!(
            Scale::parse("desc\n2\n100.0\n"),
            Err(Error::WrongIntervalCount {
                expected: 2,
                found: 1
            })
        ));
        assert!(matches!(
            Scale::parse("desc\n1\n100.0\n1200.0\n"),
            Err(Error::WrongIntervalCount {
                expected: 1,
                found: 2
            })
        ));
        assert!(matches!(
            Scale::parse("desc\n1\nthree halves\n"),
            Err(Error::InvalidInterval { line: 3, .. })
        ));
        assert!(matches!(
            Scale::parse("desc\n1\n3/0\n"),
            Err(Error::InvalidInterval { line: 3, .. })
        ));
        assert!(matches!(Scale::parse("desc\n0\n"), Err(Error::EmptyScale)));
        assert!(matches!(
            Scale::parse("desc\n1\n-100.0\n"),
            Err(Error::InvalidPeriod(_))
        ));
    }

    #[test]
    fn deserialize_checks_degrees() {
        let scale: Scale =
            serde_json::from_str(r#"{"description":"fifths","degrees":[701.955,1200.0]}"#)
                .unwrap();
        assert_eq!(2, scale.len());

        let empty = serde_json::from_str::<Scale>(r#"{"description":"x","degrees":[]}"#);
        assert!(empty.is_err());
        let backwards = serde_json::from_str::<Scale>(r#"{"description":"x","degrees":[-5.0]}"#);
        assert!(backwards.is_err());
    }

    #[test]
    fn equal_temperament() {
        let scale = Scale::equal_temperament(12);
        assert_eq!(12, scale.len());
        assert_eq!(100.0, scale.cents(1));
        assert_eq!(1200.0, scale.period());
        assert_eq!(-100.0, scale.cents(-1));
    }
}
