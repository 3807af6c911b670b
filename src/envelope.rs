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

//! Piecewise parameter curves.
//!
//! An [`Envelope`] is a sequence of [`EnvelopeSegment`]s covering a contiguous range of x values.
//! Envelopes are mainly used to shape the gain of a sound over time: the scheduler applies an
//! attack envelope when a note starts and a release envelope when it ends.
//!
//! Envelopes reach the outside world through [`Envelope::apply`], which turns the curve into a
//! series of instantaneous sets and linear ramps on a [`ControlParameter`]. Curved segments are
//! approximated with as few ramps as the requested fidelity allows.
//!
//! # Examples
//!
//! ```
//! use tones::envelope::{ControlEvent, Envelope, HorizontalTransform};
//!
//! let attack = Envelope::attack_decay(0.01, 0.1, 0.5)?;
//! assert_eq!(attack.value_at(0.01), 1.0);
//! assert_eq!(attack.value_at(10.0), 0.5);
//!
//! let mut gain: Vec<ControlEvent> = Vec::new();
//! attack.apply(&mut gain, HorizontalTransform::shift(2.0), 10.0);
//! assert_eq!(gain[0], ControlEvent::Set { value: 0.0, time: 2.0 });
//! # Ok::<(), tones::envelope::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use thiserror::Error;

mod segment;

pub use segment::{EnvelopeSegment, Point, Shape};

/// A specialized [`Result`] type for envelope construction.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when building segments and envelopes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("an envelope needs at least one segment")]
    Empty,
    #[error("segment starting at x = {at} intersects a segment ending at x = {previous_end}")]
    Intersecting { at: f64, previous_end: f64 },
    #[error("control points must not move backwards, got x = {from} then x = {to}")]
    NonMonotonic { from: f64, to: f64 },
    #[error("intermediate value {mid_y} must lie strictly between {from} and {to}")]
    InvalidIntermediate { mid_y: f64, from: f64, to: f64 },
    #[error("invalid control point ({0}, {1})")]
    InvalidPoint(f64, f64),
}

/// A value that changes over time and accepts automation.
///
/// This is the only way an [`Envelope`] touches the outside world. Times are absolute, in the
/// same units as the transform passed to [`Envelope::apply`].
pub trait ControlParameter {
    /// Jumps to `value` at `time`.
    fn set_value_at_time(&mut self, value: f64, time: f64);

    /// Ramps linearly from the previous event to `value`, arriving at `time`.
    fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64);
}

/// A single automation event, as recorded by the [`ControlParameter`] impl for `Vec`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlEvent {
    Set { value: f64, time: f64 },
    Ramp { value: f64, time: f64 },
}

impl ControlEvent {
    pub fn time(&self) -> f64 {
        match *self {
            ControlEvent::Set { time, .. } | ControlEvent::Ramp { time, .. } => time,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            ControlEvent::Set { value, .. } | ControlEvent::Ramp { value, .. } => value,
        }
    }
}

impl ControlParameter for Vec<ControlEvent> {
    fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.push(ControlEvent::Set { value, time });
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.push(ControlEvent::Ramp { value, time });
    }
}

/// Maps envelope x values onto a time axis: `time = shift + x * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalTransform {
    pub shift: f64,
    pub scale: f64,
}

impl Default for HorizontalTransform {
    fn default() -> HorizontalTransform {
        HorizontalTransform {
            shift: 0.0,
            scale: 1.0,
        }
    }
}

impl HorizontalTransform {
    /// Starts the envelope at `shift` without stretching it.
    pub fn shift(shift: f64) -> HorizontalTransform {
        HorizontalTransform {
            shift,
            ..HorizontalTransform::default()
        }
    }

    pub fn scale(mut self, scale: f64) -> HorizontalTransform {
        self.scale = scale;
        self
    }

    fn time(&self, x: f64) -> f64 {
        self.shift + x * self.scale
    }
}

/// A contiguous sequence of segments.
///
/// Construction sorts the segments by x and links any gap between consecutive segments with a
/// linear segment, so the curve is defined everywhere between [`Envelope::min_x`] and
/// [`Envelope::max_x`]. Outside that range values are clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    segments: Vec<EnvelopeSegment>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    segments: Vec<EnvelopeSegment>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = Error;

    fn try_from(raw: RawEnvelope) -> Result<Envelope> {
        Envelope::new(raw.segments)
    }
}

impl Envelope {
    pub fn new(mut segments: Vec<EnvelopeSegment>) -> Result<Envelope> {
        if segments.is_empty() {
            return Err(Error::Empty);
        }
        segments.sort_by(|a, b| {
            a.start()
                .x
                .total_cmp(&b.start().x)
                .then(a.end().x.total_cmp(&b.end().x))
        });

        let mut linked: Vec<EnvelopeSegment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(previous) = linked.last() {
                let previous_end = previous.end();
                if segment.start().x < previous_end.x {
                    return Err(Error::Intersecting {
                        at: segment.start().x,
                        previous_end: previous_end.x,
                    });
                }
                if segment.start() != previous_end {
                    linked.push(EnvelopeSegment::linear(previous_end, segment.start())?);
                }
            }
            linked.push(segment);
        }
        Ok(Envelope { segments: linked })
    }

    /// Rises linearly from silence to full scale over `attack`, then falls to `sustain` over
    /// `decay`.
    pub fn attack_decay(attack: f64, decay: f64, sustain: f64) -> Result<Envelope> {
        let peak = Point::new(attack, 1.0);
        Envelope::new(vec![
            EnvelopeSegment::linear(Point::new(0.0, 0.0), peak)?,
            EnvelopeSegment::linear(peak, Point::new(attack + decay, sustain))?,
        ])
    }

    /// Falls linearly from full scale to silence over `length`.
    pub fn release(length: f64) -> Result<Envelope> {
        Envelope::new(vec![EnvelopeSegment::linear(
            Point::new(0.0, 1.0),
            Point::new(length, 0.0),
        )?])
    }

    /// Joins constant points with linear segments. The points must be valid and in order.
    pub(crate) fn polyline(points: &[(f64, f64)]) -> Envelope {
        Envelope {
            segments: points
                .windows(2)
                .map(|pair| {
                    EnvelopeSegment::linear_unchecked(
                        Point::new(pair[0].0, pair[0].1),
                        Point::new(pair[1].0, pair[1].1),
                    )
                })
                .collect(),
        }
    }

    pub fn segments(&self) -> &[EnvelopeSegment] {
        &self.segments
    }

    pub fn min_x(&self) -> f64 {
        self.segments[0].start().x
    }

    pub fn max_x(&self) -> f64 {
        self.segments[self.segments.len() - 1].end().x
    }

    /// Returns the width of the envelope along the x axis.
    pub fn length(&self) -> f64 {
        self.max_x() - self.min_x()
    }

    /// Returns a copy of the envelope with every y value multiplied by `factor`.
    pub fn scale_y(&self, factor: f64) -> Envelope {
        Envelope {
            segments: self
                .segments
                .iter()
                .map(|segment| segment.scale_y(factor))
                .collect(),
        }
    }

    /// Returns the value of the curve at `x`, clamping `x` to the extent of the envelope.
    ///
    /// Where a jump puts two values at the same x, the value after the jump wins.
    pub fn value_at(&self, x: f64) -> f64 {
        let x = x.max(self.min_x()).min(self.max_x());
        let index = self
            .segments
            .iter()
            .rposition(|segment| segment.start().x <= x)
            .unwrap_or(0);
        self.segments[index].value_at(x)
    }

    /// Returns `count` values evenly spaced across the whole envelope.
    pub fn sample(&self, count: usize) -> Vec<f64> {
        self.sample_range(count, self.min_x(), self.max_x())
    }

    /// Returns `count` values evenly spaced from `low` to `high`, both included.
    pub fn sample_range(&self, count: usize, low: f64, high: f64) -> Vec<f64> {
        match count {
            0 => Vec::new(),
            1 => vec![self.value_at(low)],
            _ => {
                let step = (high - low) / (count - 1) as f64;
                (0..count)
                    .map(|i| self.value_at(low + step * i as f64))
                    .collect()
            }
        }
    }

    /// Samples each segment in proportion to its width.
    ///
    /// About `resolution` points are spread over the whole envelope, with every segment
    /// receiving at least `min_segment_samples` of them and never fewer than its two end points.
    /// Points shared by neighbouring segments appear once.
    pub fn smart_sample(&self, resolution: usize, min_segment_samples: usize) -> Vec<Point> {
        let length = self.length();
        let mut points: Vec<Point> = Vec::new();
        for segment in &self.segments {
            let share = if length > 0.0 {
                (resolution as f64 * segment.width() / length).round() as usize
            } else {
                0
            };
            let count = share.max(min_segment_samples).max(2);
            let step = segment.width() / (count - 1) as f64;
            for i in 0..count {
                let x = if i == count - 1 {
                    segment.end().x
                } else {
                    segment.start().x + step * i as f64
                };
                let point = if i == 0 {
                    segment.start()
                } else if i == count - 1 {
                    segment.end()
                } else {
                    Point::new(x, segment.value_at(x))
                };
                push_distinct(&mut points, point);
            }
        }
        points
    }

    /// Approximates the envelope with as few points as `fidelity` allows.
    ///
    /// Linear segments contribute their end points. Curved segments are subdivided where their
    /// tangent turns, spending `fidelity` points per radian of turn.
    pub fn segment_approximation(&self, fidelity: f64) -> Vec<Point> {
        let mut points: Vec<Point> = Vec::new();
        for segment in &self.segments {
            for point in segment.approximate(fidelity) {
                push_distinct(&mut points, point);
            }
        }
        points
    }

    /// Writes the envelope onto `control`, with x values mapped to time by `transform`.
    ///
    /// The first point is set directly. Each following point is reached by a linear ramp, or set
    /// instantly when it shares a time with the point before it.
    pub fn apply(
        &self,
        control: &mut dyn ControlParameter,
        transform: HorizontalTransform,
        fidelity: f64,
    ) {
        let points = self.segment_approximation(fidelity);
        let mut previous: Option<f64> = None;
        for point in points {
            let time = transform.time(point.x);
            match previous {
                Some(previous) if time > previous => {
                    log::trace!("ramp to {} at {}", point.y, time);
                    control.linear_ramp_to_value_at_time(point.y, time);
                }
                _ => {
                    log::trace!("set {} at {}", point.y, time);
                    control.set_value_at_time(point.y, time);
                }
            }
            previous = Some(time);
        }
    }
}

fn push_distinct(points: &mut Vec<Point>, point: Point) {
    if points.last() != Some(&point) {
        points.push(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(x1: f64, y1: f64, x2: f64, y2: f64) -> EnvelopeSegment {
        EnvelopeSegment::linear(Point::new(x1, y1), Point::new(x2, y2)).unwrap()
    }

    #[test]
    fn construction_links_gaps() {
        let envelope =
            Envelope::new(vec![linear(2.0, 0.0, 3.0, 1.0), linear(0.0, 0.0, 1.0, 1.0)]).unwrap();

        assert_eq!(3, envelope.segments().len());
        assert_eq!(0.0, envelope.min_x());
        assert_eq!(3.0, envelope.max_x());
        for pair in envelope.segments().windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
        assert_eq!(0.5, envelope.value_at(1.5));
    }

    #[test]
    fn construction_errors() {
        assert_eq!(Err(Error::Empty), Envelope::new(vec![]));
        assert_eq!(
            Err(Error::Intersecting {
                at: 0.5,
                previous_end: 1.0
            }),
            Envelope::new(vec![linear(0.0, 0.0, 1.0, 1.0), linear(0.5, 0.0, 2.0, 1.0)])
        );
    }

    #[test]
    fn values_are_clamped() {
        let envelope = Envelope::attack_decay(1.0, 1.0, 0.5).unwrap();
        for &x in &[-5.0f64, -0.0, 0.5, 1.0, 1.5, 2.0, 7.0] {
            let clamped = x.max(envelope.min_x()).min(envelope.max_x());
            assert_eq!(envelope.value_at(clamped), envelope.value_at(x));
        }
        assert_eq!(0.0, envelope.value_at(-1.0));
        assert_eq!(0.75, envelope.value_at(1.5));
        assert_eq!(0.5, envelope.value_at(100.0));
    }

    #[test]
    fn jumps_take_the_later_value() {
        let envelope = Envelope::new(vec![
            linear(0.0, 0.0, 1.0, 0.0),
            linear(1.0, 1.0, 2.0, 1.0),
        ])
        .unwrap();
        assert_eq!(3, envelope.segments().len());
        assert_eq!(1.0, envelope.value_at(1.0));
        assert_eq!(0.0, envelope.value_at(0.99));
    }

    #[test]
    fn sampling() {
        let envelope = Envelope::release(1.0).unwrap();
        assert_eq!(vec![1.0, 0.75, 0.5, 0.25, 0.0], envelope.sample(5));
        assert_eq!(vec![1.0, 0.5], envelope.sample_range(2, -1.0, 0.5));
        assert_eq!(vec![1.0], envelope.sample(1));
        assert!(envelope.sample(0).is_empty());
    }

    #[test]
    fn smart_sampling_is_proportional() {
        let envelope = Envelope::attack_decay(1.0, 3.0, 0.0).unwrap();
        let points = envelope.smart_sample(9, 2);

        let attack = points.iter().filter(|point| point.x <= 1.0).count();
        let decay = points.iter().filter(|point| point.x > 1.0).count();
        assert_eq!(2, attack);
        assert_eq!(6, decay);
        assert_eq!(Point::new(0.0, 0.0), points[0]);
        assert_eq!(Point::new(4.0, 0.0), points[points.len() - 1]);
    }

    #[test]
    fn linear_approximation_is_exact() {
        let envelope = Envelope::attack_decay(0.5, 0.5, 0.25).unwrap();
        assert_eq!(
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.5, 1.0),
                Point::new(1.0, 0.25)
            ],
            envelope.segment_approximation(10.0)
        );
    }

    #[test]
    fn apply_sets_jumps_and_ramps_slopes() {
        let envelope = Envelope::new(vec![
            linear(0.0, 0.0, 1.0, 1.0),
            linear(1.0, 0.5, 2.0, 0.0),
        ])
        .unwrap();
        let mut control: Vec<ControlEvent> = Vec::new();
        envelope.apply(&mut control, HorizontalTransform::shift(10.0).scale(2.0), 10.0);

        assert_eq!(
            vec![
                ControlEvent::Set {
                    value: 0.0,
                    time: 10.0
                },
                ControlEvent::Ramp {
                    value: 1.0,
                    time: 12.0
                },
                ControlEvent::Set {
                    value: 0.5,
                    time: 12.0
                },
                ControlEvent::Ramp {
                    value: 0.0,
                    time: 14.0
                },
            ],
            control
        );
    }

    #[test]
    fn scaling() {
        let envelope = Envelope::new(vec![EnvelopeSegment::exponential(
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            0.25,
        )
        .unwrap()])
        .unwrap();
        let scaled = envelope.scale_y(2.0);
        assert!((scaled.value_at(0.5) - 0.5).abs() < 1e-9);
        assert_eq!(2.0, scaled.value_at(1.0));
    }

    #[test]
    fn polyline_matches_checked_construction() {
        assert_eq!(
            Envelope::attack_decay(0.5, 0.5, 0.25).unwrap(),
            Envelope::polyline(&[(0.0, 0.0), (0.5, 1.0), (1.0, 0.25)])
        );
    }

    #[test]
    fn serde_revalidates() {
        let envelope = Envelope::release(0.5).unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(envelope, serde_json::from_str(&json).unwrap());

        let backwards = json.replace("0.5", "-0.5");
        assert!(serde_json::from_str::<Envelope>(&backwards).is_err());
    }
}
