//! Course - Top-level aggregate of team roster and stages
//!
//! This module provides the high-level API: build a [`Course`] from a team
//! list and a stage document (or per-stage CSV files), then hand its stages to
//! a [`ScorecardRenderer`].

use crate::{CourseError, Result, ScorecardRenderer, Stage, TeamRoster, extract, stage};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration for reading and transforming stage documents
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Separator of the three parts of a stage group name (`Stage_4_cycling`).
    /// Default: `_`
    pub group_delimiter: char,
    /// Appended to the file stem of a filtered document.
    /// Default: `hidden_removed`
    pub filtered_suffix: String,
    /// Reject stage documents whose extension is not `.kml`.
    /// Default: true
    pub require_kml_extension: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_delimiter: '_',
            filtered_suffix: "hidden_removed".to_string(),
            require_kml_extension: true,
        }
    }
}

/// An adventure race course: the participating teams and all stages
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Course {
    team_names: TeamRoster,
    /// Stages keyed by their index
    stages: BTreeMap<u32, Stage>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Course {
    /// Combine a roster and a set of stages
    ///
    /// # Returns
    /// The course, or an invariant violation if there are no stages or two
    /// stages share an index
    pub fn new(team_names: TeamRoster, stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(CourseError::InvariantViolation(
                "course has no stages".to_string(),
            ));
        }

        let mut by_index = BTreeMap::new();
        for stage in stages {
            let index = stage.index();
            if by_index.insert(index, stage).is_some() {
                return Err(CourseError::InvariantViolation(format!(
                    "stage index {index} appears more than once"
                )));
            }
        }

        Ok(Self {
            team_names,
            stages: by_index,
        })
    }

    /// Build a course from a team list and a KML stage document
    pub fn build(team_source: impl AsRef<Path>, stage_document: impl AsRef<Path>) -> Result<Self> {
        Self::build_with_config(team_source, stage_document, &Config::default())
    }

    /// Build a course from a team list and a KML stage document
    pub fn build_with_config(
        team_source: impl AsRef<Path>,
        stage_document: impl AsRef<Path>,
        config: &Config,
    ) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("course::build");

        let stage_document = stage_document.as_ref();
        let team_names = TeamRoster::read(team_source)?;
        let stages = extract::read_stages(stage_document, config)?;
        Self::new(team_names, stages).map_err(|e| e.in_file(stage_document))
    }

    /// Build a course from a team list and per-stage CSV files
    pub fn build_from_csv(
        team_source: impl AsRef<Path>,
        stage_files: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Result<Self> {
        let team_names = TeamRoster::read(team_source)?;
        let stages = stage_files
            .into_iter()
            .map(Stage::from_csv_file)
            .collect::<Result<Vec<_>>>()?;
        Self::new(team_names, stages)
    }

    #[inline]
    pub fn team_names(&self) -> &TeamRoster {
        &self.team_names
    }

    /// All stages keyed by index, in ascending index order
    #[inline]
    pub fn stages(&self) -> &BTreeMap<u32, Stage> {
        &self.stages
    }

    #[inline]
    pub fn stage(&self, index: u32) -> Option<&Stage> {
        self.stages.get(&index)
    }

    #[inline]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total number of checkpoints across all stages
    pub fn checkpoint_count(&self) -> usize {
        self.stages.values().map(Stage::len).sum()
    }

    /// Render one page per stage, in ascending stage order
    pub fn render_scorecards<R: ScorecardRenderer + ?Sized>(
        &self,
        renderer: &R,
    ) -> Result<Vec<(u32, String)>> {
        self.stages
            .iter()
            .map(|(&index, stage)| Ok((index, renderer.render(index, stage, &self.team_names)?)))
            .collect()
    }

    /// Render one page per stage and write each to `<dir>/Stage_<index>.<ext>`
    ///
    /// # Returns
    /// The paths written, in ascending stage order
    pub fn write_scorecards<R: ScorecardRenderer + ?Sized>(
        &self,
        renderer: &R,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CourseError::from(e).in_file(dir))?;

        let mut written = Vec::with_capacity(self.stages.len());
        for (index, page) in self.render_scorecards(renderer)? {
            let path = dir.join(format!("Stage_{index}.{}", renderer.file_extension()));
            std::fs::write(&path, page).map_err(|e| CourseError::from(e).in_file(&path))?;
            tracing::info!("Wrote scorecards for stage {index} to {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Write every stage to `<dir>/Stage_<index>.csv`
    pub fn export_csv(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        stage::write_csv_files(self.stages.values(), dir)
    }
}
