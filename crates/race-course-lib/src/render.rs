//! Scorecard rendering
//!
//! A renderer turns one stage and the team roster into a printable page with
//! a punch card per team. The course model hands out shared references only,
//! so renderers cannot change what they draw.

use crate::{CheckPoint, Result, Stage, TeamRoster};

/// Produces one printable scorecard page per stage
pub trait ScorecardRenderer {
    /// Render the page for one stage
    fn render(&self, stage_index: u32, stage: &Stage, teams: &TeamRoster) -> Result<String>;

    /// Extension of the files written for rendered pages, without the dot
    fn file_extension(&self) -> &str;
}

/// Plain-text scorecards
///
/// Every team gets a card with the checkpoints split over an upper and a
/// lower row of boxes. Each box shows the checkpoint number, its score and its
/// grid coordinate; hidden checkpoints keep their box but show `-` instead of
/// the coordinate.
#[derive(Clone, Debug)]
pub struct TextScorecardRenderer {
    /// List the hints of all checkpoints below each card.
    /// Default: true
    pub show_hints: bool,
}

impl Default for TextScorecardRenderer {
    fn default() -> Self {
        Self { show_hints: true }
    }
}

const PUNCH_HEIGHT: usize = 2;

fn cell_lines(checkpoint: &CheckPoint) -> [String; 3] {
    let coordinate = if checkpoint.hidden() {
        "-".to_string()
    } else {
        checkpoint.coordinate().to_string()
    };
    [
        format!("CP {}", checkpoint.index()),
        format!("{} pt", checkpoint.score()),
        coordinate,
    ]
}

fn border(cells: usize, width: usize) -> String {
    let mut line = String::from("+");
    for _ in 0..cells {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

/// One row of boxes, the label lines followed by empty punch space
fn render_row(lines: &mut Vec<String>, row: &[CheckPoint], width: usize) {
    let cells: Vec<[String; 3]> = row.iter().map(cell_lines).collect();

    lines.push(border(row.len(), width));
    for line in 0..3 {
        let text: String = cells
            .iter()
            .map(|cell| format!(" {:<width$} |", cell[line]))
            .collect();
        lines.push(format!("|{text}"));
    }
    for _ in 0..PUNCH_HEIGHT {
        lines.push(format!("|{}", format!(" {:width$} |", "").repeat(row.len())));
    }
    lines.push(border(row.len(), width));
}

impl TextScorecardRenderer {
    fn render_card(&self, lines: &mut Vec<String>, team: &str, stage: &Stage, width: usize) {
        let checkpoints: Vec<CheckPoint> = stage.iter().cloned().collect();
        // The upper row takes the extra checkpoint of an odd count
        let (upper, lower) = checkpoints.split_at(checkpoints.len().div_ceil(2));

        lines.push(team.to_string());
        render_row(lines, upper, width);
        render_row(lines, lower, width);

        if self.show_hints {
            for checkpoint in stage {
                lines.push(format!("  {}: {}", checkpoint.index(), checkpoint.hint()));
            }
        }
        lines.push(String::new());
    }
}

impl ScorecardRenderer for TextScorecardRenderer {
    fn render(&self, stage_index: u32, stage: &Stage, teams: &TeamRoster) -> Result<String> {
        let width = stage
            .iter()
            .flat_map(|checkpoint| cell_lines(checkpoint).map(|line| line.len()))
            .max()
            .unwrap_or_default();

        let title = format!("Stage {stage_index} - {}", stage.kind());
        let mut lines = vec![
            title.clone(),
            "=".repeat(title.len()),
            format!(
                "{} checkpoints, {} points",
                stage.len(),
                stage.total_score()
            ),
            String::new(),
        ];

        for team in teams.iter() {
            self.render_card(&mut lines, team, stage, width);
        }

        tracing::debug!(
            "Rendered stage {stage_index} scorecards for {} team(s)",
            teams.len()
        );
        Ok(lines.join("\n"))
    }

    fn file_extension(&self) -> &str {
        "txt"
    }
}
