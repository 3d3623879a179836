//! Team roster loading
//!
//! The team list is a plain text file with one team name per line. Blank lines
//! are dropped and the remaining names are numbered in file order, so the third
//! team "Wolf Pack" becomes "3 Wolf Pack" on every scorecard.

use crate::{CourseError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Numbered display names of the participating teams, in file order
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
pub struct TeamRoster(Vec<String>);

impl TeamRoster {
    /// Number the given names, skipping blank ones
    ///
    /// # Returns
    /// The roster, or an invariant violation if no names remain
    pub fn from_lines<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = lines
            .into_iter()
            .filter_map(|line| {
                let name = line.as_ref().trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .enumerate()
            .map(|(i, name)| format!("{} {name}", i + 1))
            .collect();

        if names.is_empty() {
            return Err(CourseError::InvariantViolation(
                "team roster is empty".to_string(),
            ));
        }

        Ok(Self(names))
    }

    /// Parse newline-separated team names
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_lines(text.lines())
    }

    /// Read a team list file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let lines = {
            let file = File::open(path).map_err(|e| CourseError::from(e).in_file(path))?;
            BufReader::new(file)
                .lines()
                .collect::<std::io::Result<Vec<String>>>()
                .map_err(|e| CourseError::from(e).in_file(path))?
        };

        let roster = Self::from_lines(lines).map_err(|e| e.in_file(path))?;
        tracing::info!("Loaded {} team(s) from {}", roster.len(), path.display());
        Ok(roster)
    }

    /// Display name at a 0-based position
    #[inline]
    pub fn get(&self, position: usize) -> Option<&str> {
        self.0.get(position).map(String::as_str)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed roster
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.0
    }
}
