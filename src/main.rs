extern crate log;
extern crate pretty_env_logger;

use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{arg, command, value_parser, Command};
use log::{error, info};
use rayon::prelude::*;

use omr_grader::answer_key::AnswerKey;
use omr_grader::config::EvaluateOptions;
use omr_grader::debug::{load_font, monospace_font};
use omr_grader::evaluate::{evaluate_sheet_file, OutputOptions};
use omr_grader::types::OptionLabel;

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let debug = matches.get_flag("debug");
    let sheet_paths = matches
        .get_many::<PathBuf>("sheets")
        .expect("at least one sheet path is required")
        .cloned()
        .collect::<Vec<PathBuf>>();

    let mut options = match matches.get_one::<PathBuf>("config") {
        Some(path) => match EvaluateOptions::from_json_file(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                exit(1);
            }
        },
        None => EvaluateOptions::default(),
    };
    if let Some(labels) = matches.get_one::<String>("options") {
        options.options = labels
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(OptionLabel::from)
            .collect();
    }
    if let Some(col_width) = matches.get_one::<u32>("col_width") {
        options.col_width_tolerance = *col_width;
    }
    if let Err(e) = options.validate() {
        eprintln!("Error: {}", e);
        exit(1);
    }

    let answer_key = match matches.get_one::<PathBuf>("key") {
        Some(path) => match AnswerKey::load(path) {
            Ok(key) => Some(key),
            Err(e) => {
                eprintln!("Error loading answer key: {}", e);
                exit(1);
            }
        },
        None => None,
    };

    let output_dir = matches
        .get_one::<PathBuf>("output_dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let outputs = OutputOptions {
        output_dir,
        font: Some(
            matches
                .get_one::<PathBuf>("font")
                .and_then(|path| load_font(path))
                .unwrap_or_else(monospace_font),
        ),
        debug,
    };

    let failures = sheet_paths
        .par_iter()
        .map(|path| grade_sheet(path, answer_key.as_ref(), &options, &outputs))
        .filter(|ok| !ok)
        .count();

    if failures > 0 {
        error!("{} of {} sheets failed", failures, sheet_paths.len());
        exit(1);
    }
}

fn grade_sheet(
    path: &Path,
    answer_key: Option<&AnswerKey>,
    options: &EvaluateOptions,
    outputs: &OutputOptions,
) -> bool {
    match evaluate_sheet_file(path, answer_key, options, outputs) {
        Ok(report) => {
            info!(
                "{}: {} of {} questions attempted",
                path.display(),
                report.attempted(),
                report.total_questions()
            );
            match answer_key {
                Some(key) => println!(
                    "{}: Total Score: {}/{}",
                    path.display(),
                    report.total_score,
                    key.len()
                ),
                None => println!(
                    "{}: {}",
                    path.display(),
                    serde_json::to_string(&report.extracted_answers)
                        .unwrap_or_else(|_| "{}".to_string())
                ),
            }
            true
        }
        Err(e) => {
            eprintln!("{}: Error: {}", path.display(), e);
            false
        }
    }
}

#[allow(clippy::cognitive_complexity)]
fn cli() -> Command {
    command!()
        .arg(
            arg!(-k --key <PATH> "Path to the answer key (.json, or <question>-<label> cells)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-c --config <PATH> "Path to a JSON file of evaluation options")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-o --output_dir <DIR> "Directory for annotated images and results")
                .long("output-dir")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(--options <LABELS> "Comma separated option labels, e.g. a,b,c,d"))
        .arg(
            arg!(--col_width <PIXELS> "Column width tolerance used to order bubbles")
                .long("col-width")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            arg!(--font <PATH> "TrueType font for annotation text instead of the bundled one")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(-d --debug "Write debug images of each stage"))
        .arg(
            arg!(sheets: <SHEET> "Paths to answer sheet images")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
}
