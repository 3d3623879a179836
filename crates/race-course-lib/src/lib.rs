//! Race Course Library - Core Data Structures for Adventure Race Courses
//!
//! This library turns a KML stage document and a team list into a validated,
//! immutable course model that downstream renderers turn into per-stage
//! scorecards. It also rewrites stage documents with hidden checkpoints removed.
//!
//! # Architecture
//!
//! - **[`KmlDocument`]**: Owned element tree of a KML file, read and written verbatim
//! - **[`CheckPoint`]**: A single scored waypoint in Rijksdriehoek grid coordinates
//! - **[`Stage`]**: Ordered, validated sequence of checkpoints for one leg of the race
//! - **[`TeamRoster`]**: Numbered list of participating teams
//! - **[`Course`]**: Top-level aggregate of roster and stages
//! - **[`strip_hidden`]**: Copy-and-filter transform of a stage document
//!
//! # Stage document convention
//!
//! Stage groups are the `<Folder>` children of the top-level `<Document>` whose
//! name splits into exactly three parts on the group delimiter, e.g.
//! `Stage_4_cycling`. Any other folder is left alone.

mod checkpoint;
mod course;
mod extract;
mod filter;
pub mod kml;
pub mod render;
mod roster;
mod stage;
pub mod utils;

// Public API exports
pub use checkpoint::{CheckPoint, GridCoordinate};
pub use course::{Config, Course};
pub use extract::{StageName, extract_stages, is_stage_group, read_stages};
pub use filter::{filtered_path, strip_hidden, strip_hidden_file};
pub use kml::KmlDocument;
pub use render::{ScorecardRenderer, TextScorecardRenderer};
pub use roster::TeamRoster;
pub use stage::{Checkpoints, Stage, write_csv_files};

use std::path::{Path, PathBuf};

/// Error types for course construction and document transforms
#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    #[error("group '{group}', feature {feature}: missing attribute '{key}'")]
    MissingAttribute {
        group: String,
        feature: String,
        key: String,
    },

    #[error("group '{group}', feature {feature}: invalid value '{value}' for attribute '{key}'")]
    InvalidAttributeValue {
        group: String,
        feature: String,
        key: String,
        value: String,
    },

    #[error("group '{group}': stage index must be a positive integer")]
    InvalidStageIndex { group: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unsupported document shape: {0}")]
    UnsupportedDocumentShape(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {}", path.display(), source)]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<CourseError>,
    },
}

impl CourseError {
    /// Attach the path of the input file the error originated from
    pub fn in_file(self, path: impl AsRef<Path>) -> Self {
        match self {
            // Keep the innermost path, it is the most specific one
            CourseError::InFile { .. } => self,
            other => CourseError::InFile {
                path: path.as_ref().to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, skipping any file context
    pub fn root(&self) -> &CourseError {
        match self {
            CourseError::InFile { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CourseError>;
