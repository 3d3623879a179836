use clap::{Args, Parser, Subcommand};
use race_course_lib::Config;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Race Course - Build adventure race courses, scorecards and public maps
pub struct Settings {
    /// Separator of the three parts of a stage group name (Stage_4_cycling)
    #[clap(long, global = true, default_value = "_")]
    pub delimiter: char,

    /// Appended to the file stem of a filtered stage document
    #[clap(long, global = true, default_value = "hidden_removed")]
    pub suffix: String,

    /// Accept stage documents that do not have a .kml extension
    #[clap(long, global = true, default_value = "false")]
    pub allow_any_extension: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the course and print a summary
    Check {
        #[clap(flatten)]
        input: CourseInput,

        /// Print the whole course as JSON instead of a summary
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Render one scorecard page per stage
    Scorecards {
        #[clap(flatten)]
        input: CourseInput,

        /// Directory the pages are written to
        #[clap(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Leave the checkpoint hints off the cards
        #[clap(long, default_value = "false")]
        no_hints: bool,
    },

    /// Write a copy of a stage document without hidden checkpoints
    StripHidden {
        /// Stage document to filter
        #[clap(value_name = "KML")]
        document: PathBuf,
    },

    /// Write every stage of a stage document to its own CSV file
    ExportCsv {
        /// Stage document to read
        #[clap(short, long, value_name = "KML")]
        stages: PathBuf,

        /// Directory the CSV files are written to
        #[clap(short, long, value_name = "DIR")]
        out: PathBuf,
    },
}

/// Inputs of a course build
#[derive(Args, Debug, Clone)]
pub struct CourseInput {
    /// Team list, one name per line
    #[clap(short, long, value_name = "FILE")]
    pub teams: PathBuf,

    /// A KML stage document, or one CSV file per stage
    #[clap(short, long, value_name = "FILE", num_args = 1.., required = true)]
    pub stages: Vec<PathBuf>,
}

impl Settings {
    /// Library configuration from the global flags
    pub fn config(&self) -> Config {
        Config {
            group_delimiter: self.delimiter,
            filtered_suffix: self.suffix.clone(),
            require_kml_extension: !self.allow_any_extension,
        }
    }
}
