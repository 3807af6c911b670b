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
use std::convert::TryFrom;
use std::f64::consts::PI;

/// Segments never approximate with more points than this.
const MAX_POINTS: usize = 75;

/// A control point of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    fn scale_y(self, factor: f64) -> Point {
        Point::new(self.x, self.y * factor)
    }
}

/// The curve a segment follows between its control points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Linear,
    /// An exponential curve passing through `mid_y` halfway along the segment.
    Exponential { mid_y: f64 },
    /// A quadratic Bezier curve pulled towards `control`.
    Quadratic { control: Point },
}

/// A curve between two control points.
///
/// Segments are immutable and always run left to right: the end point never lies before the
/// start point on the x axis. A segment whose points share an x value is a jump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSegment")]
pub struct EnvelopeSegment {
    start: Point,
    end: Point,
    shape: Shape,
}

#[derive(Deserialize)]
struct RawSegment {
    start: Point,
    end: Point,
    shape: Shape,
}

impl TryFrom<RawSegment> for EnvelopeSegment {
    type Error = Error;

    fn try_from(raw: RawSegment) -> Result<EnvelopeSegment> {
        EnvelopeSegment::new(raw.start, raw.end, raw.shape)
    }
}

impl EnvelopeSegment {
    pub fn new(start: Point, end: Point, shape: Shape) -> Result<EnvelopeSegment> {
        check_point(start)?;
        check_point(end)?;
        if end.x < start.x {
            return Err(Error::NonMonotonic {
                from: start.x,
                to: end.x,
            });
        }
        match shape {
            Shape::Linear => {}
            Shape::Exponential { mid_y } => {
                let between =
                    (start.y < mid_y && mid_y < end.y) || (end.y < mid_y && mid_y < start.y);
                if !between {
                    return Err(Error::InvalidIntermediate {
                        mid_y,
                        from: start.y,
                        to: end.y,
                    });
                }
            }
            Shape::Quadratic { control } => {
                if !(control.x.is_finite() && control.y.is_finite()) {
                    return Err(Error::InvalidPoint(control.x, control.y));
                }
                if control.x < start.x || control.x > end.x {
                    return Err(Error::NonMonotonic {
                        from: start.x,
                        to: control.x,
                    });
                }
            }
        }
        Ok(EnvelopeSegment { start, end, shape })
    }

    /// Builds a linear segment from points already known to be valid.
    pub(crate) fn linear_unchecked(start: Point, end: Point) -> EnvelopeSegment {
        EnvelopeSegment {
            start,
            end,
            shape: Shape::Linear,
        }
    }

    pub fn linear(start: Point, end: Point) -> Result<EnvelopeSegment> {
        EnvelopeSegment::new(start, end, Shape::Linear)
    }

    pub fn exponential(start: Point, end: Point, mid_y: f64) -> Result<EnvelopeSegment> {
        EnvelopeSegment::new(start, end, Shape::Exponential { mid_y })
    }

    pub fn quadratic(start: Point, end: Point, control: Point) -> Result<EnvelopeSegment> {
        EnvelopeSegment::new(start, end, Shape::Quadratic { control })
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn width(&self) -> f64 {
        self.end.x - self.start.x
    }

    /// Returns the y value at `x`, clamped to the extent of the segment.
    pub fn value_at(&self, x: f64) -> f64 {
        let width = self.width();
        if width <= 0.0 {
            return self.end.y;
        }
        let t = ((x - self.start.x) / width).max(0.0).min(1.0);
        match self.shape {
            Shape::Linear => lerp(self.start.y, self.end.y, t),
            Shape::Exponential { mid_y } => self.exponential_at(mid_y, t),
            Shape::Quadratic { control } => {
                let t = self.bezier_parameter(control, x);
                bezier(self.start.y, control.y, self.end.y, t)
            }
        }
    }

    /// Approximates the segment with a polyline, including both end points.
    ///
    /// `fidelity` is the number of points spent per radian that the tangent of the curve turns.
    /// Linear segments and jumps only need their end points.
    pub(crate) fn approximate(&self, fidelity: f64) -> Vec<Point> {
        if self.width() <= 0.0 || (self.start.y == self.end.y && !self.is_quadratic()) {
            return vec![self.start, self.end];
        }
        match self.shape {
            Shape::Linear => vec![self.start, self.end],
            Shape::Exponential { mid_y } => self.approximate_exponential(mid_y, fidelity),
            Shape::Quadratic { control } => self.approximate_quadratic(control, fidelity),
        }
    }

    pub(crate) fn scale_y(&self, factor: f64) -> EnvelopeSegment {
        let shape = match self.shape {
            Shape::Linear => Shape::Linear,
            Shape::Exponential { mid_y } => Shape::Exponential {
                mid_y: mid_y * factor,
            },
            Shape::Quadratic { control } => Shape::Quadratic {
                control: control.scale_y(factor),
            },
        };
        EnvelopeSegment {
            start: self.start.scale_y(factor),
            end: self.end.scale_y(factor),
            shape,
        }
    }

    fn is_quadratic(&self) -> bool {
        matches!(self.shape, Shape::Quadratic { .. })
    }

    /// The base of the exponential, chosen so the curve passes through `mid_y` at `t = 0.5`.
    fn exponential_base(&self, mid_y: f64) -> Option<f64> {
        let rise = self.end.y - self.start.y;
        if rise == 0.0 {
            return None;
        }
        let fraction = (mid_y - self.start.y) / rise;
        let base = ((1.0 - fraction) / fraction).powi(2);
        if base.is_finite() && (base - 1.0).abs() > 1e-9 {
            Some(base)
        } else {
            None
        }
    }

    fn exponential_at(&self, mid_y: f64, t: f64) -> f64 {
        match self.exponential_base(mid_y) {
            Some(base) => {
                self.start.y + (self.end.y - self.start.y) * (base.powf(t) - 1.0) / (base - 1.0)
            }
            None => lerp(self.start.y, self.end.y, t),
        }
    }

    fn approximate_exponential(&self, mid_y: f64, fidelity: f64) -> Vec<Point> {
        let base = match self.exponential_base(mid_y) {
            Some(base) => base,
            None => return vec![self.start, self.end],
        };
        // The slope is k * base^t, so its angle moves monotonically from atan(k) to atan(k * base).
        let k = (self.end.y - self.start.y) * base.ln() / ((base - 1.0) * self.width());
        let first = k.atan();
        let last = (k * base).atan();
        let count = point_count(last - first, fidelity);

        (0..count)
            .map(|i| {
                let t = if i == 0 {
                    0.0
                } else if i == count - 1 {
                    1.0
                } else {
                    let angle = first + (last - first) * i as f64 / (count - 1) as f64;
                    ((angle.tan() / k).ln() / base.ln()).max(0.0).min(1.0)
                };
                Point::new(
                    lerp(self.start.x, self.end.x, t),
                    self.exponential_at(mid_y, t),
                )
            })
            .collect()
    }

    fn approximate_quadratic(&self, control: Point, fidelity: f64) -> Vec<Point> {
        let (dx0, dy0) = (control.x - self.start.x, control.y - self.start.y);
        let (dx1, dy1) = (self.end.x - control.x, self.end.y - control.y);
        let degenerate = (dx0 == 0.0 && dy0 == 0.0) || (dx1 == 0.0 && dy1 == 0.0);
        let turn = if degenerate {
            0.0
        } else {
            (dx0 * dy1 - dy0 * dx1).atan2(dx0 * dx1 + dy0 * dy1)
        };
        let count = point_count(turn, fidelity);

        (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                Point::new(
                    bezier(self.start.x, control.x, self.end.x, t),
                    bezier(self.start.y, control.y, self.end.y, t),
                )
            })
            .collect()
    }

    /// Finds the Bezier parameter where the curve reaches `x`.
    fn bezier_parameter(&self, control: Point, x: f64) -> f64 {
        let a = self.start.x - 2.0 * control.x + self.end.x;
        let b = 2.0 * (control.x - self.start.x);
        let c = self.start.x - x;

        let t = if a.abs() < 1e-12 {
            if b == 0.0 {
                0.0
            } else {
                -c / b
            }
        } else {
            let root = (b * b - 4.0 * a * c).max(0.0).sqrt();
            let plus = (-b + root) / (2.0 * a);
            let minus = (-b - root) / (2.0 * a);
            if (-1e-9..=1.0 + 1e-9).contains(&plus) {
                plus
            } else {
                minus
            }
        };
        t.max(0.0).min(1.0)
    }
}

fn check_point(point: Point) -> Result<()> {
    if point.x.is_finite() && point.y.is_finite() && point.x >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidPoint(point.x, point.y))
    }
}

fn point_count(turn: f64, fidelity: f64) -> usize {
    let turn = turn.abs().min(PI);
    let fidelity = if fidelity.is_finite() { fidelity.max(0.0) } else { 0.0 };
    let count = (turn * fidelity).ceil() as usize + 1;
    count.max(2).min(MAX_POINTS)
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

fn bezier(p0: f64, p1: f64, p2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    u * u * p0 + 2.0 * u * t * p1 + t * t * p2
}
