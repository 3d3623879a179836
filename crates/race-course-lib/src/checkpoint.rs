//! Checkpoint storage module
//!
//! A [`CheckPoint`] is a single scored waypoint of a stage. Checkpoints are
//! plain immutable values; ordering between them is defined by their index.

use crate::{CourseError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Integer (easting, northing) pair on the Rijksdriehoek grid, in meters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridCoordinate {
    x: i64,
    y: i64,
}

impl GridCoordinate {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Easting in meters
    #[inline]
    pub fn x(&self) -> i64 {
        self.x
    }

    /// Northing in meters
    #[inline]
    pub fn y(&self) -> i64 {
        self.y
    }
}

impl From<(i64, i64)> for GridCoordinate {
    fn from((x, y): (i64, i64)) -> Self {
        Self::new(x, y)
    }
}

/// Formats as `"<x> <y>"`, the form used in per-stage CSV files
impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

impl FromStr for GridCoordinate {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            CourseError::InvariantViolation(format!(
                "grid coordinate '{s}' is not two space-separated integers"
            ))
        };

        let mut parts = s.split_whitespace();
        let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let x = x.parse().map_err(|_| invalid())?;
        let y = y.parse().map_err(|_| invalid())?;
        Ok(Self::new(x, y))
    }
}

/// A single scored waypoint within a stage
///
/// Two checkpoints compare by `index` only: `a < b` exactly when
/// `a.index() < b.index()`. Checkpoints that share an index but differ in any
/// other field are unordered (`partial_cmp` returns `None`), which keeps the
/// ordering consistent with equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CheckPoint {
    /// 1-based position within the stage
    index: u32,
    /// Points awarded for punching this checkpoint
    score: i64,
    /// Text shown to participants
    hint: String,
    /// Excluded from public course materials when set
    hidden: bool,
    /// Location on the RD grid
    coordinate: GridCoordinate,
}

impl CheckPoint {
    /// Create a new checkpoint
    ///
    /// # Returns
    /// The checkpoint, or an invariant violation if `index` is zero
    pub fn new(
        index: u32,
        score: i64,
        hint: impl Into<String>,
        hidden: bool,
        coordinate: impl Into<GridCoordinate>,
    ) -> Result<Self> {
        if index == 0 {
            return Err(CourseError::InvariantViolation(
                "checkpoint index must be 1 or greater".to_string(),
            ));
        }

        Ok(Self {
            index,
            score,
            hint: hint.into(),
            hidden,
            coordinate: coordinate.into(),
        })
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn score(&self) -> i64 {
        self.score
    }

    #[inline]
    pub fn hint(&self) -> &str {
        &self.hint
    }

    #[inline]
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    #[inline]
    pub fn coordinate(&self) -> GridCoordinate {
        self.coordinate
    }
}

impl PartialOrd for CheckPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.index.cmp(&other.index) {
            Ordering::Equal if self != other => None,
            ordering => Some(ordering),
        }
    }
}

/// Parse a score: any real number, truncated toward zero
pub(crate) fn parse_score(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(score) = raw.parse::<i64>() {
        return Some(score);
    }
    let score = raw.parse::<f64>().ok()?;
    // Range check keeps the cast from saturating silently
    (score.is_finite() && score.abs() < i64::MAX as f64).then(|| score.trunc() as i64)
}

/// Parse an integer visibility flag, nonzero meaning hidden
pub(crate) fn parse_hidden_flag(raw: &str) -> Option<bool> {
    raw.trim().parse::<i64>().ok().map(|flag| flag != 0)
}
