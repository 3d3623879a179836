//! Stage storage module
//!
//! A [`Stage`] is one leg of the race: an index, a discipline label and an
//! ordered sequence of at least two checkpoints. Stages come from a KML stage
//! group (see [`crate::extract_stages`]) or from a per-stage CSV file.
//!
//! # CSV layout
//!
//! ```text
//! cycling
//! 1,10,Under the bridge,155000 463000
//! 2,20,"Post, left side",155210 463480
//! ```
//!
//! The first row holds the kind, every following row one checkpoint as
//! `index, score, hint, "<x> <y>"` with an optional fifth `hidden` flag column.
//! The stage index comes from the last `_`-separated part of the file stem.

use crate::checkpoint::{parse_hidden_flag, parse_score};
use crate::{CheckPoint, CourseError, GridCoordinate, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Checkpoints of a stage in ascending index order
///
/// Only exposes what scorecard rendering needs: position lookup, iteration,
/// length and membership.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
pub struct Checkpoints(Vec<CheckPoint>);

impl Checkpoints {
    /// Get the checkpoint at a 0-based position
    #[inline]
    pub fn get(&self, position: usize) -> Option<&CheckPoint> {
        self.0.get(position)
    }

    /// Find the checkpoint carrying a given 1-based index
    pub fn by_index(&self, index: u32) -> Option<&CheckPoint> {
        self.0
            .binary_search_by_key(&index, CheckPoint::index)
            .ok()
            .map(|position| &self.0[position])
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, CheckPoint> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn contains(&self, checkpoint: &CheckPoint) -> bool {
        self.0.contains(checkpoint)
    }
}

impl<'a> IntoIterator for &'a Checkpoints {
    type Item = &'a CheckPoint;
    type IntoIter = std::slice::Iter<'a, CheckPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One leg of the race with its validated checkpoint sequence
///
/// Equality covers the index, kind and checkpoints only, not the CSV layout a
/// stage was read with.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Stage {
    /// Stage number, e.g. 4 for "Stage_4_cycling"
    index: u32,
    /// Discipline label, e.g. "cycling"
    kind: String,
    checkpoints: Checkpoints,
    /// Per row, whether the source CSV carried the `hidden` column
    #[cfg_attr(feature = "serde", serde(skip))]
    hidden_column: Option<Vec<bool>>,
}

impl Stage {
    /// Minimum number of checkpoints: one for each row of the scorecard
    pub const MIN_CHECKPOINTS: usize = 2;

    /// Create a new stage, validating its invariants
    ///
    /// # Returns
    /// The stage, or [`CourseError::InvariantViolation`] if the index is zero,
    /// the checkpoints are not in index order, or there are fewer than
    /// [`Stage::MIN_CHECKPOINTS`] of them.
    pub fn new(index: u32, kind: impl Into<String>, checkpoints: Vec<CheckPoint>) -> Result<Self> {
        if index == 0 {
            return Err(CourseError::InvariantViolation(
                "stage index must be 1 or greater".to_string(),
            ));
        }

        if !checkpoints.is_sorted_by_key(CheckPoint::index) {
            return Err(CourseError::InvariantViolation(format!(
                "checkpoints of stage {index} are not in index order"
            )));
        }

        if checkpoints.len() < Self::MIN_CHECKPOINTS {
            return Err(CourseError::InvariantViolation(format!(
                "stage {index} has {} checkpoint(s), at least {} required",
                checkpoints.len(),
                Self::MIN_CHECKPOINTS
            )));
        }

        Ok(Self {
            index,
            kind: kind.into(),
            checkpoints: Checkpoints(checkpoints),
            hidden_column: None,
        })
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[inline]
    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Number of checkpoints, always at least [`Stage::MIN_CHECKPOINTS`]
    #[inline]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Always false for a constructed stage
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, CheckPoint> {
        self.checkpoints.iter()
    }

    /// Sum of all checkpoint scores
    pub fn total_score(&self) -> i64 {
        self.checkpoints.iter().map(CheckPoint::score).sum()
    }

    /// Number of checkpoints flagged hidden
    pub fn hidden_count(&self) -> usize {
        self.checkpoints.iter().filter(|cp| cp.hidden()).count()
    }

    /// Read a stage from CSV data
    pub fn read_csv<R: Read>(index: u32, reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(reader);

        let group = format!("stage {index}");
        let mut records = reader.records();

        let kind = match records.next() {
            Some(record) => record?.get(0).unwrap_or_default().to_string(),
            None => {
                return Err(CourseError::InvariantViolation(format!(
                    "{group}: empty CSV, expected the stage kind on the first row"
                )));
            }
        };

        let mut checkpoints = Vec::new();
        let mut hidden_column = Vec::new();
        for (row, record) in records.enumerate() {
            let record = record?;
            // Row numbers are 1-based and the kind occupies row 1
            let feature = format!("row {}", row + 2);

            let field = |position: usize, key: &str| {
                record
                    .get(position)
                    .ok_or_else(|| CourseError::MissingAttribute {
                        group: group.clone(),
                        feature: feature.clone(),
                        key: key.to_string(),
                    })
            };
            let invalid = |key: &str, value: &str| CourseError::InvalidAttributeValue {
                group: group.clone(),
                feature: feature.clone(),
                key: key.to_string(),
                value: value.to_string(),
            };

            let raw_index = field(0, "index")?;
            let checkpoint_index = raw_index
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid("index", raw_index))?;

            let raw_score = field(1, "score")?;
            let score = parse_score(raw_score).ok_or_else(|| invalid("score", raw_score))?;

            let hint = field(2, "hint")?;

            let raw_coordinate = field(3, "coordinate")?;
            let coordinate = raw_coordinate
                .parse::<GridCoordinate>()
                .map_err(|_| invalid("coordinate", raw_coordinate))?;

            let hidden = match record.get(4) {
                Some(raw) => parse_hidden_flag(raw).ok_or_else(|| invalid("hidden", raw))?,
                None => false,
            };
            hidden_column.push(record.get(4).is_some());

            checkpoints.push(CheckPoint::new(
                checkpoint_index,
                score,
                hint,
                hidden,
                coordinate,
            )?);
        }

        let mut stage = Stage::new(index, kind, checkpoints)?;
        stage.hidden_column = Some(hidden_column);
        Ok(stage)
    }

    /// Write the stage as CSV data
    ///
    /// A stage read from CSV writes the `hidden` column on exactly the rows
    /// that had it. Any other stage writes it on every row when at least one
    /// checkpoint is hidden and leaves it out otherwise.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);

        writer.write_record([self.kind.as_str()])?;

        let any_hidden = self.hidden_count() > 0;
        for (position, checkpoint) in self.checkpoints.iter().enumerate() {
            let with_hidden = match &self.hidden_column {
                Some(rows) => rows.get(position).copied().unwrap_or(checkpoint.hidden()),
                None => any_hidden,
            };
            let mut row = vec![
                checkpoint.index().to_string(),
                checkpoint.score().to_string(),
                checkpoint.hint().to_string(),
                checkpoint.coordinate().to_string(),
            ];
            if with_hidden {
                row.push(u8::from(checkpoint.hidden()).to_string());
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load a stage from a CSV file such as `stage_5.csv`
    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let index = stage_index_from_stem(path).map_err(|e| e.in_file(path))?;

        let file = File::open(path).map_err(|e| CourseError::from(e).in_file(path))?;
        let stage = Stage::read_csv(index, BufReader::new(file)).map_err(|e| e.in_file(path))?;

        tracing::info!(
            "Loaded stage {} ({}) with {} checkpoints from {}",
            stage.index,
            stage.kind,
            stage.len(),
            path.display()
        );
        Ok(stage)
    }

    /// Write the stage to a CSV file
    pub fn to_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| CourseError::from(e).in_file(path))?;
        self.write_csv(BufWriter::new(file))
            .map_err(|e| e.in_file(path))
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.kind == other.kind && self.checkpoints == other.checkpoints
    }
}

impl Eq for Stage {}

impl PartialOrd for Stage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.index.cmp(&other.index) {
            Ordering::Equal if self != other => None,
            ordering => Some(ordering),
        }
    }
}

impl<'a> IntoIterator for &'a Stage {
    type Item = &'a CheckPoint;
    type IntoIter = std::slice::Iter<'a, CheckPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.checkpoints.iter()
    }
}

/// Write each stage to `<dir>/Stage_<index>.csv`, creating `dir` if needed
///
/// # Returns
/// The paths written, in the order the stages were given
pub fn write_csv_files<'a>(
    stages: impl IntoIterator<Item = &'a Stage>,
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| CourseError::from(e).in_file(dir))?;

    let mut written = Vec::new();
    for stage in stages {
        let path = dir.join(format!("Stage_{}.csv", stage.index));
        stage.to_csv_file(&path)?;
        tracing::info!("Wrote stage {} to {}", stage.index, path.display());
        written.push(path);
    }
    Ok(written)
}

/// Stage index from a file stem like `stage_5`
fn stage_index_from_stem(path: &Path) -> Result<u32> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();

    stem.rsplit('_')
        .next()
        .and_then(|part| part.parse::<u32>().ok())
        .filter(|&index| index > 0)
        .ok_or_else(|| CourseError::InvalidStageIndex {
            group: stem.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(index: u32) -> CheckPoint {
        CheckPoint::new(index, 1, "", false, (0, 0)).unwrap()
    }

    fn cps(indices: &[u32]) -> Vec<CheckPoint> {
        indices.iter().copied().map(cp).collect()
    }

    fn reference_stage() -> Stage {
        let cp1 = CheckPoint::new(1, 1, "Under the bridge", false, (23400, 23523)).unwrap();
        let cp2 = CheckPoint::new(2, 2, "Post", false, (23444, 23523)).unwrap();
        Stage::new(5, "Running", vec![cp1, cp2]).unwrap()
    }

    #[test]
    fn test_stage_creation() {
        let stage = Stage::new(4, "cycling", cps(&[1, 2, 3])).unwrap();
        assert_eq!(stage.index(), 4);
        assert_eq!(stage.kind(), "cycling");
        assert_eq!(stage.len(), 3);
        assert!(!stage.is_empty());
    }

    #[test]
    fn test_construction_succeeds_iff_sorted_and_long_enough() {
        let cases: &[&[u32]] = &[
            &[],
            &[1],
            &[1, 2],
            &[2, 1],
            &[1, 3, 7],
            &[1, 3, 2],
            &[1, 1],
            &[5, 4, 3, 2, 1],
        ];

        for &indices in cases {
            let points = cps(indices);
            let mut sorted = points.clone();
            sorted.sort_by_key(CheckPoint::index);
            let expected = points.len() >= 2 && sorted == points;

            let result = Stage::new(1, "kano", points);
            assert_eq!(result.is_ok(), expected, "indices {indices:?}");
            if let Err(err) = result {
                assert!(matches!(err, CourseError::InvariantViolation(_)));
            }
        }
    }

    #[test]
    fn test_zero_stage_index_rejected() {
        assert!(Stage::new(0, "cycling", cps(&[1, 2])).is_err());
    }

    #[test]
    fn test_checkpoints_wrapper() {
        let stage = Stage::new(1, "cycling", cps(&[1, 2, 4])).unwrap();
        let checkpoints = stage.checkpoints();

        assert_eq!(checkpoints.len(), 3);
        assert_eq!(checkpoints.get(2).map(CheckPoint::index), Some(4));
        assert!(checkpoints.get(3).is_none());
        assert_eq!(checkpoints.by_index(4).map(CheckPoint::index), Some(4));
        assert!(checkpoints.by_index(3).is_none());
        assert!(checkpoints.contains(&cp(2)));
        assert!(!checkpoints.contains(&cp(3)));

        let indices: Vec<u32> = checkpoints.iter().map(CheckPoint::index).collect();
        assert_eq!(indices, vec![1, 2, 4]);
        assert_eq!((&stage).into_iter().count(), 3);
    }

    #[test]
    fn test_stage_ordering() {
        let first = Stage::new(1, "cycling", cps(&[1, 2])).unwrap();
        let second = Stage::new(2, "cycling", cps(&[1, 2])).unwrap();
        assert!(first < second);
        assert!(second > first);
    }

    #[test]
    fn test_totals() {
        let a = CheckPoint::new(1, 10, "", false, (0, 0)).unwrap();
        let b = CheckPoint::new(2, 25, "", true, (0, 0)).unwrap();
        let stage = Stage::new(1, "kano", vec![a, b]).unwrap();
        assert_eq!(stage.total_score(), 35);
        assert_eq!(stage.hidden_count(), 1);
    }

    #[test]
    fn test_read_csv() {
        let data = "Running\n1,1,Under the bridge,23400 23523\n2,2,Post,23444 23523\n";
        let stage = Stage::read_csv(5, data.as_bytes()).unwrap();
        assert_eq!(stage, reference_stage());
    }

    #[test]
    fn test_csv_rows_roundtrip() {
        let data = "Running\n1,1,Under the bridge,23400 23523\n2,2,\"Post, left side\",23444 23523\n";
        let stage = Stage::read_csv(5, data.as_bytes()).unwrap();

        let mut out = Vec::new();
        stage.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), data);
    }

    #[test]
    fn test_csv_hidden_column() {
        let data = "kano\n1,5,Jetty,1 2,0\n2,5,Buoy,3 4,1\n";
        let stage = Stage::read_csv(2, data.as_bytes()).unwrap();
        assert!(!stage.checkpoints().get(0).unwrap().hidden());
        assert!(stage.checkpoints().get(1).unwrap().hidden());

        let mut out = Vec::new();
        stage.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), data);
    }

    #[test]
    fn test_csv_hidden_column_on_every_row_kept() {
        let data = "kano\n1,5,Jetty,1 2,0\n2,5,Buoy,3 4,0\n";
        let stage = Stage::read_csv(2, data.as_bytes()).unwrap();
        assert_eq!(stage.hidden_count(), 0);

        let mut out = Vec::new();
        stage.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), data);
    }

    #[test]
    fn test_csv_hidden_column_on_some_rows_kept() {
        let data = "kano\n1,5,Jetty,1 2\n2,5,Buoy,3 4,1\n";
        let stage = Stage::read_csv(2, data.as_bytes()).unwrap();
        assert!(stage.checkpoints().get(1).unwrap().hidden());

        let mut out = Vec::new();
        stage.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), data);
    }

    #[test]
    fn test_csv_layout_ignored_by_equality() {
        let with_column =
            Stage::read_csv(2, "kano\n1,5,Jetty,1 2,0\n2,5,Buoy,3 4,0\n".as_bytes()).unwrap();
        let without_column =
            Stage::read_csv(2, "kano\n1,5,Jetty,1 2\n2,5,Buoy,3 4\n".as_bytes()).unwrap();
        assert_eq!(with_column, without_column);

        // Stages built in code write the column only when something is hidden
        let built = Stage::new(2, "kano", with_column.iter().cloned().collect()).unwrap();
        let mut out = Vec::new();
        built.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "kano\n1,5,Jetty,1 2\n2,5,Buoy,3 4\n");
    }

    #[test]
    fn test_write_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let stages = vec![reference_stage(), Stage::new(2, "kano", cps(&[1, 2])).unwrap()];

        let written = write_csv_files(&stages, dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("out/Stage_5.csv"));
        assert!(written[1].ends_with("out/Stage_2.csv"));

        let reloaded: Vec<Stage> = written
            .iter()
            .map(|path| Stage::from_csv_file(path).unwrap())
            .collect();
        assert_eq!(reloaded, stages);
    }

    #[test]
    fn test_read_csv_errors() {
        let empty = Stage::read_csv(1, "".as_bytes());
        assert!(matches!(empty, Err(CourseError::InvariantViolation(_))));

        let missing = Stage::read_csv(1, "kano\n1,5,Jetty\n2,5,Buoy,3 4\n".as_bytes());
        match missing {
            Err(CourseError::MissingAttribute { feature, key, .. }) => {
                assert_eq!(feature, "row 2");
                assert_eq!(key, "coordinate");
            }
            other => panic!("expected missing attribute, got {other:?}"),
        }

        let invalid = Stage::read_csv(1, "kano\n1,five,Jetty,1 2\n2,5,Buoy,3 4\n".as_bytes());
        assert!(matches!(
            invalid,
            Err(CourseError::InvalidAttributeValue { ref key, .. }) if key == "score"
        ));

        let unsorted = Stage::read_csv(1, "kano\n2,5,Jetty,1 2\n1,5,Buoy,3 4\n".as_bytes());
        assert!(matches!(unsorted, Err(CourseError::InvariantViolation(_))));
    }

    #[test]
    fn test_csv_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage_5.csv");

        let stage = reference_stage();
        stage.to_csv_file(&path).unwrap();

        let loaded = Stage::from_csv_file(&path).unwrap();
        assert_eq!(loaded, stage);
    }

    #[test]
    fn test_csv_file_without_index_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.csv");
        std::fs::write(&path, "kano\n1,5,Jetty,1 2\n2,5,Buoy,3 4\n").unwrap();

        let err = Stage::from_csv_file(&path).unwrap_err();
        assert!(matches!(err.root(), CourseError::InvalidStageIndex { .. }));
    }
}
