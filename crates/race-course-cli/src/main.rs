use anyhow::{Context, Result, bail};
use clap::Parser;
use race_course_lib::{
    Config, Course, TextScorecardRenderer, read_stages, strip_hidden_file, write_csv_files,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod settings;

use settings::{Command, CourseInput, Settings};

/// Log to stderr so stdout stays clean for `--json` output.
/// `RUST_LOG` overrides the default `info` level.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .init();
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn load_course(input: &CourseInput, config: &Config) -> Result<Course> {
    let course = match input.stages.as_slice() {
        [] => bail!("no stage source given"),
        stages if stages.iter().all(|path| is_csv(path)) => {
            Course::build_from_csv(&input.teams, stages)
                .context("Failed to build course from CSV stages")?
        }
        [document] => Course::build_with_config(&input.teams, document, config)
            .context("Failed to build course")?,
        _ => bail!("expected a single stage document or only CSV stage files"),
    };

    tracing::info!(
        "Course has {} team(s), {} stage(s) and {} checkpoint(s)",
        course.team_names().len(),
        course.stage_count(),
        course.checkpoint_count()
    );
    Ok(course)
}

fn print_summary(course: &Course) {
    println!("{} team(s)", course.team_names().len());
    for team in course.team_names().iter() {
        println!("  {team}");
    }
    for (index, stage) in course.stages() {
        println!(
            "Stage {index} ({}): {} checkpoint(s), {} hidden, {} point(s)",
            stage.kind(),
            stage.len(),
            stage.hidden_count(),
            stage.total_score()
        );
    }
}

fn export_csv(document: &Path, out: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let stages = read_stages(document, config).context("Failed to read stages")?;
    write_csv_files(&stages, out)
        .with_context(|| format!("Failed to export stages to {}", out.display()))
}

fn run(settings: &Settings) -> Result<()> {
    let config = settings.config();

    match &settings.command {
        Command::Check { input, json } => {
            let course = load_course(input, &config)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&course)?);
            } else {
                print_summary(&course);
            }
        }
        Command::Scorecards {
            input,
            out,
            no_hints,
        } => {
            let course = load_course(input, &config)?;
            let renderer = TextScorecardRenderer {
                show_hints: !no_hints,
            };
            let pages = course
                .write_scorecards(&renderer, out)
                .context("Failed to write scorecards")?;
            for page in pages {
                println!("{}", page.display());
            }
        }
        Command::StripHidden { document } => {
            let output = strip_hidden_file(document, &config).with_context(|| {
                format!("Failed to strip hidden checkpoints from {}", document.display())
            })?;
            println!("{}", output.display());
        }
        Command::ExportCsv { stages, out } => {
            for path in export_csv(stages, out, &config)? {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let settings = Settings::parse();
    setup_logging();
    run(&settings)
}
