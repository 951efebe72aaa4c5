use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use logging_timer::time;
use rusttype::Font;

use crate::answer_key::AnswerKey;
use crate::config::EvaluateOptions;
use crate::debug::{
    annotated_image, draw_candidate_marks_debug_image_mut, draw_graded_marks_debug_image_mut,
    draw_option_groups_debug_image_mut, mask_to_rgb, monospace_font, ImageDebugWriter,
};
use crate::grid::{assemble_option_groups, OptionGroup};
use crate::marks::find_bubble_marks;
use crate::scoring::{score_option_groups, EvaluationReport};
use crate::sheet::{load_sheet_image, normalize_sheet, NormalizedSheet, SheetInput};
use crate::types::Mark;

#[derive(Debug)]
pub enum EvaluateError {
    /// The input cannot be treated as an image source at all: an empty
    /// buffer or a path naming a directory.
    InvalidInputKind(String),
    /// Bytes or a file were present but did not decode to pixels.
    ImageLoadFailure(String),
    InvalidConfig(String),
    OutputWriteFailure(PathBuf, String),
}

impl Display for EvaluateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluateError::InvalidInputKind(detail) => write!(f, "invalid input: {}", detail),
            EvaluateError::ImageLoadFailure(detail) => {
                write!(f, "image could not be loaded: {}", detail)
            }
            EvaluateError::InvalidConfig(detail) => write!(f, "invalid options: {}", detail),
            EvaluateError::OutputWriteFailure(path, detail) => {
                write!(f, "cannot write {}: {}", path.display(), detail)
            }
        }
    }
}

impl std::error::Error for EvaluateError {}

/// The report together with what it was computed from.
#[derive(Debug, Clone)]
pub struct EvaluatedSheet {
    pub sheet: NormalizedSheet,
    pub marks: Vec<Mark>,
    pub groups: Vec<OptionGroup>,
    pub report: EvaluationReport,
}

/// Reads a sheet and grades it, keeping the intermediate stages.
pub fn evaluate_with_artifacts(
    input: SheetInput,
    answer_key: Option<&AnswerKey>,
    options: &EvaluateOptions,
) -> Result<EvaluatedSheet, EvaluateError> {
    options.validate()?;

    let image = load_sheet_image(input)?;
    let sheet = normalize_sheet(&image, options.canonical_width, &options.threshold)?;
    let marks = find_bubble_marks(&sheet.geometry, &sheet.mask);
    let groups = assemble_option_groups(
        &marks,
        options.col_width_tolerance,
        options.option_count(),
    );
    if groups.is_empty() {
        info!("no bubbles detected");
    }
    let report = score_option_groups(
        &groups,
        &sheet.mask,
        &options.options,
        &options.fill_thresholds,
        answer_key,
    );

    Ok(EvaluatedSheet {
        sheet,
        marks,
        groups,
        report,
    })
}

#[time]
/// Reads the answers marked on a sheet and, given a key, scores them.
pub fn evaluate(
    input: SheetInput,
    answer_key: Option<&AnswerKey>,
    options: &EvaluateOptions,
) -> Result<EvaluationReport, EvaluateError> {
    evaluate_with_artifacts(input, answer_key, options).map(|evaluated| evaluated.report)
}

/// Where and how the file wrapper writes its artifacts.
pub struct OutputOptions {
    pub output_dir: PathBuf,
    /// Font for annotation labels; `None` draws boxes only.
    pub font: Option<Font<'static>>,
    pub debug: bool,
}

impl OutputOptions {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            font: Some(monospace_font()),
            debug: false,
        }
    }

    pub fn annotated_image_path(&self, sheet_path: &Path) -> PathBuf {
        self.output_path(sheet_path, "annotated.png")
    }

    pub fn results_path(&self, sheet_path: &Path) -> PathBuf {
        self.output_path(sheet_path, "results.json")
    }

    fn output_path(&self, sheet_path: &Path, suffix: &str) -> PathBuf {
        let stem = sheet_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("sheet");
        self.output_dir.join(format!("{}_{}", stem, suffix))
    }
}

fn output_error(path: &Path, e: impl Display) -> EvaluateError {
    EvaluateError::OutputWriteFailure(path.to_path_buf(), e.to_string())
}

fn write_results_json(path: &Path, report: &EvaluationReport) -> Result<(), EvaluateError> {
    let file = File::create(path).map_err(|e| output_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &report.questions)
        .map_err(|e| output_error(path, e))?;
    writer.flush().map_err(|e| output_error(path, e))
}

#[time]
/// Grades a sheet image on disk and writes `<stem>_annotated.png` and
/// `<stem>_results.json` into the output directory.
pub fn evaluate_sheet_file(
    sheet_path: &Path,
    answer_key: Option<&AnswerKey>,
    options: &EvaluateOptions,
    outputs: &OutputOptions,
) -> Result<EvaluationReport, EvaluateError> {
    let evaluated = evaluate_with_artifacts(
        SheetInput::Path(sheet_path.to_path_buf()),
        answer_key,
        options,
    )?;

    let debug_writer = if outputs.debug {
        ImageDebugWriter::new(sheet_path.to_path_buf(), outputs.output_dir.clone())
    } else {
        ImageDebugWriter::disabled()
    };
    if debug_writer.is_enabled() {
        let base = &evaluated.sheet.image;
        debug_writer.write("mask", &mask_to_rgb(&evaluated.sheet.mask), |_| {});
        debug_writer.write("marks", base, |canvas| {
            draw_candidate_marks_debug_image_mut(canvas, &evaluated.marks)
        });
        debug_writer.write("groups", base, |canvas| {
            draw_option_groups_debug_image_mut(canvas, &evaluated.groups, outputs.font.as_ref())
        });
        debug_writer.write("graded", base, |canvas| {
            draw_graded_marks_debug_image_mut(canvas, &evaluated.report)
        });
    }

    let image_path = outputs.annotated_image_path(sheet_path);
    annotated_image(&evaluated.sheet.image, &evaluated.report, outputs.font.as_ref())
        .save(&image_path)
        .map_err(|e| output_error(&image_path, e))?;
    debug!("wrote {}", image_path.display());

    let results_path = outputs.results_path(sheet_path);
    write_results_json(&results_path, &evaluated.report)?;
    debug!("wrote {}", results_path.display());

    Ok(evaluated.report)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageOutputFormat, RgbImage};

    use super::*;
    use crate::answer_key::AcceptedAnswers;
    use crate::fixtures::{bubble_center, render_sheet, SHEET_HEIGHT, SHEET_WIDTH};
    use crate::scoring::AnswerStatus;

    const ANSWERS: [Option<usize>; 14] = [
        Some(0),
        Some(1),
        Some(2),
        Some(3),
        None,
        Some(1),
        Some(1),
        Some(0),
        None,
        Some(3),
        Some(2),
        Some(0),
        None,
        Some(1),
    ];

    fn key_for(answers: &[Option<usize>]) -> AnswerKey {
        let labels = ["a", "b", "c", "d"];
        let mut key = AnswerKey::new();
        for (question, answer) in answers.iter().enumerate() {
            if let Some(option) = answer {
                key.insert(question as u32 + 1, AcceptedAnswers::single(labels[*option]));
            }
        }
        key
    }

    #[test]
    fn reads_every_question_of_a_sheet() {
        let sheet = render_sheet(&ANSWERS, 4);
        let evaluated =
            evaluate_with_artifacts(sheet.into(), None, &EvaluateOptions::default()).unwrap();
        assert_eq!(evaluated.marks.len(), ANSWERS.len() * 4);
        assert_eq!(evaluated.report.total_questions(), ANSWERS.len());

        let labels = ["a", "b", "c", "d"];
        for (question, answer) in ANSWERS.iter().enumerate() {
            let expected = answer.map_or("none", |option| labels[option]);
            assert_eq!(
                evaluated.report.extracted_answers.get(&(question as u32 + 1)).map(String::as_str),
                Some(expected),
                "question {}",
                question + 1
            );
        }
        assert_eq!(evaluated.report.total_score, 0);
    }

    #[test]
    fn filled_mark_locations_match_the_sheet() {
        let sheet = render_sheet(&ANSWERS, 4);
        let report = evaluate(sheet.into(), None, &EvaluateOptions::default()).unwrap();
        let second = &report.questions[1];
        let (cx, cy) = bubble_center(1, 1);
        let mark = second.filled_mark.unwrap();
        assert_eq!((mark.x as i32 + 12, mark.y as i32 + 12), (cx, cy));
    }

    #[test]
    fn scores_against_a_key() {
        let sheet = render_sheet(&ANSWERS, 4);
        let mut key = key_for(&ANSWERS);
        // make two answers wrong and accept either of two labels for another
        key.insert(1, AcceptedAnswers::single("b"));
        key.insert(2, AcceptedAnswers::single("c"));
        key.insert(3, AcceptedAnswers::any_of(["a", "c"]));

        let report = evaluate(sheet.into(), Some(&key), &EvaluateOptions::default()).unwrap();
        let attempted = ANSWERS.iter().filter(|a| a.is_some()).count() as u32;
        assert_eq!(report.total_score, attempted - 2);
        assert_eq!(report.questions[0].status, Some(AnswerStatus::Incorrect));
        assert_eq!(report.questions[2].status, Some(AnswerStatus::Correct));
        assert_eq!(report.questions[4].status, Some(AnswerStatus::NotAttempted));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let sheet = render_sheet(&ANSWERS, 4);
        let key = key_for(&ANSWERS);
        let options = EvaluateOptions::default();
        let first = evaluate(sheet.clone().into(), Some(&key), &options).unwrap();
        let second = evaluate(sheet.into(), Some(&key), &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn blank_sheet_gives_empty_report() {
        let blank = RgbImage::from_pixel(SHEET_WIDTH, SHEET_HEIGHT, image::Rgb([255, 255, 255]));
        let report = evaluate(
            blank.into(),
            Some(&key_for(&ANSWERS)),
            &EvaluateOptions::default(),
        )
        .unwrap();
        assert_eq!(report.total_score, 0);
        assert!(report.questions.is_empty());
    }

    #[test]
    fn accepts_encoded_bytes() {
        let sheet = render_sheet(&ANSWERS[..4], 4);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(sheet)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        let report = evaluate(
            SheetInput::Bytes(bytes),
            Some(&key_for(&ANSWERS[..4])),
            &EvaluateOptions::default(),
        )
        .unwrap();
        assert_eq!(report.total_score, 4);
    }

    #[test]
    fn rejects_garbage_and_bad_options() {
        let result = evaluate(
            SheetInput::Bytes(vec![1, 2, 3]),
            None,
            &EvaluateOptions::default(),
        );
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));

        let result = evaluate(SheetInput::Bytes(Vec::new()), None, &EvaluateOptions::default());
        assert!(matches!(result, Err(EvaluateError::InvalidInputKind(_))));

        let mut options = EvaluateOptions::default();
        options.col_width_tolerance = 0;
        let result = evaluate(render_sheet(&ANSWERS, 4).into(), None, &options);
        assert!(matches!(result, Err(EvaluateError::InvalidConfig(_))));
    }

    #[test]
    fn three_option_sheets_use_configured_labels() {
        let answers = [Some(2), Some(0), None];
        let sheet = render_sheet(&answers, 3);
        let options = EvaluateOptions {
            options: ["x", "y", "z"].iter().map(|l| (*l).into()).collect(),
            ..EvaluateOptions::default()
        };
        let report = evaluate(sheet.into(), None, &options).unwrap();
        let read = report.extracted_answers.values().cloned().collect::<Vec<String>>();
        assert_eq!(read, vec!["z", "x", "none"]);
    }

    #[test]
    fn file_wrapper_writes_image_and_results() {
        let dir = tempfile::tempdir().unwrap();
        let sheet_path = dir.path().join("student-42.png");
        render_sheet(&ANSWERS, 4).save(&sheet_path).unwrap();

        let mut outputs = OutputOptions::new(dir.path().to_path_buf());
        assert!(outputs.font.is_some());
        outputs.debug = true;
        let key = key_for(&ANSWERS);
        let report =
            evaluate_sheet_file(&sheet_path, Some(&key), &EvaluateOptions::default(), &outputs)
                .unwrap();
        assert_eq!(
            report.total_score,
            ANSWERS.iter().filter(|a| a.is_some()).count() as u32
        );

        let annotated = image::open(dir.path().join("student-42_annotated.png")).unwrap();
        assert_eq!((annotated.width(), annotated.height()), (SHEET_WIDTH, SHEET_HEIGHT));

        let json = std::fs::read_to_string(dir.path().join("student-42_results.json")).unwrap();
        let results: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(results.as_array().unwrap().len(), ANSWERS.len());
        assert_eq!(results[0]["marked"], "a");
        assert_eq!(results[0]["status"], "Correct");
        assert_eq!(results[4]["marked"], "none");
        assert_eq!(results[4]["status"], "Not Attempted");

        for label in ["mask", "marks", "groups", "graded"] {
            assert!(dir
                .path()
                .join(format!("student-42_debug_{}.png", label))
                .exists());
        }
    }

    #[test]
    fn file_wrapper_reports_unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let sheet_path = dir.path().join("sheet.png");
        render_sheet(&ANSWERS[..2], 4).save(&sheet_path).unwrap();

        let outputs = OutputOptions::new(dir.path().join("does-not-exist"));
        let result = evaluate_sheet_file(&sheet_path, None, &EvaluateOptions::default(), &outputs);
        assert!(matches!(result, Err(EvaluateError::OutputWriteFailure(_, _))));
    }
}
