//! Piecewise-linear automation curves.

use serde::{Deserialize, Serialize};

/// One `(time, value)` pair of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub time: f64,
    pub value: f64,
}

impl Breakpoint {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Ordered breakpoints with linear interpolation between them.
///
/// Before the first breakpoint the curve holds the first value, after the
/// last it holds the last value. Times are seconds on the mix timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    points: Vec<Breakpoint>,
}

impl Envelope {
    /// Build from breakpoints; they are sorted by time.
    pub fn new(mut points: Vec<Breakpoint>) -> Self {
        points.retain(|point| point.time.is_finite() && point.value.is_finite());
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { points }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![Breakpoint::new(0.0, value)],
        }
    }

    /// Linear move from `from` at `start` to `to` at `end`.
    pub fn ramp(start: f64, end: f64, from: f64, to: f64) -> Self {
        Self::new(vec![Breakpoint::new(start, from), Breakpoint::new(end, to)])
    }

    pub fn points(&self) -> &[Breakpoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_constant(&self) -> bool {
        self.points
            .windows(2)
            .all(|pair| (pair[0].value - pair[1].value).abs() < 1e-12)
    }

    /// Value of the curve at `time`. An empty envelope reads as `0`.
    pub fn value_at(&self, time: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }

        let index = self.points.partition_point(|point| point.time <= time);
        let a = self.points[index - 1];
        let b = self.points[index];
        let span = b.time - a.time;
        if span <= f64::EPSILON {
            return b.value;
        }
        let t = (time - a.time) / span;
        a.value + (b.value - a.value) * t
    }

    /// Pointwise combination of two curves.
    ///
    /// The result is exact for `min`/`max`: besides every breakpoint of either
    /// curve it gets a breakpoint wherever the two curves cross.
    pub fn combine(&self, other: &Envelope, op: fn(f64, f64) -> f64) -> Envelope {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }

        let mut times: Vec<f64> = self
            .points
            .iter()
            .chain(other.points.iter())
            .map(|point| point.time)
            .collect();
        times.sort_by(|a, b| a.total_cmp(b));
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

        let mut crossings = Vec::new();
        for pair in times.windows(2) {
            let (t0, t1) = (pair[0], pair[1]);
            let d0 = self.value_at(t0) - other.value_at(t0);
            let d1 = self.value_at(t1) - other.value_at(t1);
            if d0 * d1 < 0.0 {
                crossings.push(t0 + (t1 - t0) * d0 / (d0 - d1));
            }
        }
        times.extend(crossings);
        times.sort_by(|a, b| a.total_cmp(b));

        let points = times
            .into_iter()
            .map(|time| Breakpoint::new(time, op(self.value_at(time), other.value_at(time))))
            .collect();
        Envelope::new(points).simplified()
    }

    /// Drop breakpoints that do not change the shape of the curve.
    fn simplified(self) -> Envelope {
        if self.points.len() <= 2 {
            return self;
        }
        let mut kept: Vec<Breakpoint> = Vec::with_capacity(self.points.len());
        for (index, point) in self.points.iter().enumerate() {
            let Some(next) = self.points.get(index + 1) else {
                kept.push(*point);
                break;
            };
            match kept.last() {
                Some(prev) if collinear(prev, point, next) => {}
                _ => kept.push(*point),
            }
        }
        Envelope { points: kept }
    }

    pub fn min_value(&self) -> Option<f64> {
        self.points.iter().map(|point| point.value).reduce(f64::min)
    }

    pub fn max_value(&self) -> Option<f64> {
        self.points.iter().map(|point| point.value).reduce(f64::max)
    }
}

fn collinear(a: &Breakpoint, b: &Breakpoint, c: &Breakpoint) -> bool {
    let span = c.time - a.time;
    if span.abs() < 1e-12 {
        return false;
    }
    let expected = a.value + (c.value - a.value) * (b.time - a.time) / span;
    (expected - b.value).abs() < 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_at_interpolates_and_holds_ends() {
        let env = Envelope::ramp(10.0, 20.0, 0.0, 1.0);
        assert_eq!(env.value_at(0.0), 0.0);
        assert_eq!(env.value_at(15.0), 0.5);
        assert_eq!(env.value_at(25.0), 1.0);
        assert_eq!(Envelope::default().value_at(3.0), 0.0);
    }

    #[test]
    fn min_of_fades_gets_crossing_point() {
        let fade_in = Envelope::ramp(0.0, 10.0, 0.0, 1.0);
        let fade_out = Envelope::ramp(4.0, 8.0, 1.0, 0.0);
        let gain = fade_in.combine(&fade_out, f64::min);
        // fade_in = t/10, fade_out = 1 - (t-4)/4 cross where t/10 = 2 - t/4
        let crossing = 40.0 / 7.0;
        assert!(gain
            .points()
            .iter()
            .any(|point| (point.time - crossing).abs() < 1e-9));
        assert!((gain.value_at(crossing) - crossing / 10.0).abs() < 1e-9);
        assert_eq!(gain.value_at(9.0), 0.0);
        assert!((gain.value_at(2.0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn max_combination_keeps_higher_lane() {
        let a = Envelope::ramp(0.0, 10.0, 20.0, 1200.0);
        let b = Envelope::constant(250.0);
        let combined = a.combine(&b, f64::max);
        assert_eq!(combined.value_at(0.0), 250.0);
        assert_eq!(combined.value_at(10.0), 1200.0);
    }

    #[test]
    fn simplify_removes_flat_interior_points() {
        let env = Envelope::new(vec![
            Breakpoint::new(0.0, 1.0),
            Breakpoint::new(5.0, 1.0),
            Breakpoint::new(10.0, 1.0),
            Breakpoint::new(12.0, 0.0),
        ])
        .simplified();
        assert_eq!(env.points().len(), 3);
        assert!(!env.is_constant());
    }
}
