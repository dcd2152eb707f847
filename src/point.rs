//! Row/column points and ranges shared by buffer space and screen space.
//!
//! Both coordinate systems use the same types; which space a value lives in
//! is determined by the API that produced it.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MarkerError;

/// A zero-based row/column location.
///
/// Columns count chars, not bytes. Points order row-major.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    /// Create a point at `row`, `column`.
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// The origin.
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<(usize, usize)> for Point {
    fn from((row, column): (usize, usize)) -> Self {
        Self::new(row, column)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

impl FromStr for Point {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || MarkerError::Parse(format!("expected ROW:COL, got {s:?}"));
        let (row, column) = s.trim().split_once(':').ok_or_else(parse_err)?;
        let row = row.trim().parse().map_err(|_| parse_err())?;
        let column = column.trim().parse().map_err(|_| parse_err())?;
        Ok(Self::new(row, column))
    }
}

/// An ordered pair of points with `start <= end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    /// Create a range spanning `a` and `b`, in whichever order they come.
    pub fn new(a: impl Into<Point>, b: impl Into<Point>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// An empty range at `point`.
    pub fn empty_at(point: impl Into<Point>) -> Self {
        let point = point.into();
        Self {
            start: point,
            end: point,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `point` lies in the range.
    ///
    /// With `exclusive`, the endpoints themselves are not considered inside.
    pub fn contains_point(&self, point: Point, exclusive: bool) -> bool {
        if exclusive {
            self.start < point && point < self.end
        } else {
            self.start <= point && point <= self.end
        }
    }

    /// Whether the two ranges share more than a boundary point.
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies strictly inside this range; shared endpoints do not count.
    pub fn surrounds(&self, other: &Self) -> bool {
        self.start < other.start && other.end < self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for Range {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('-') {
            Some((start, end)) => Ok(Self::new(start.parse::<Point>()?, end.parse::<Point>()?)),
            None => Ok(Self::empty_at(s.parse::<Point>()?)),
        }
    }
}
