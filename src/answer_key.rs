use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::types::OptionLabel;

/// Question numbers a stored answer key always covers.
pub const DEFAULT_QUESTION_RANGE: RangeInclusive<u32> = 1..=100;

/// The labels accepted as correct for one question. Usually a single label;
/// empty when the question has no official answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptedAnswers(BTreeSet<OptionLabel>);

impl AcceptedAnswers {
    pub fn single(label: &str) -> Self {
        Self::any_of([label])
    }

    pub fn any_of<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            labels
                .into_iter()
                .map(normalize_label)
                .filter(|label| !label.is_empty())
                .map(OptionLabel::new)
                .collect(),
        )
    }

    pub fn accepts(&self, label: &OptionLabel) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for AcceptedAnswers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels = self
            .0
            .iter()
            .map(OptionLabel::as_str)
            .collect::<Vec<&str>>();
        write!(f, "{}", labels.join(","))
    }
}

// A single label serializes as a string, several as a list.
impl Serialize for AcceptedAnswers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0.len() <= 1 {
            serializer.serialize_str(self.0.iter().next().map_or("", OptionLabel::as_str))
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AcceptedAnswers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawAnswers {
            Single(String),
            AnyOf(Vec<String>),
        }

        Ok(match RawAnswers::deserialize(deserializer)? {
            RawAnswers::Single(label) => AcceptedAnswers::single(&label),
            RawAnswers::AnyOf(labels) => {
                AcceptedAnswers::any_of(labels.iter().map(String::as_str))
            }
        })
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// The official answers of a test, by question number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey(BTreeMap<u32, AcceptedAnswers>);

#[derive(Debug)]
pub enum AnswerKeyError {
    Io(PathBuf, std::io::Error),
    Json(serde_json::Error),
    Workbook(PathBuf, String),
}

impl Display for AnswerKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerKeyError::Io(path, e) => {
                write!(f, "cannot read answer key {}: {}", path.display(), e)
            }
            AnswerKeyError::Json(e) => write!(f, "invalid answer key JSON: {}", e),
            AnswerKeyError::Workbook(path, e) => {
                write!(f, "cannot read answer key workbook {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for AnswerKeyError {}

impl From<serde_json::Error> for AnswerKeyError {
    fn from(e: serde_json::Error) -> Self {
        AnswerKeyError::Json(e)
    }
}

/// File extensions read as spreadsheet workbooks.
const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            extensions
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

/// Parses a spreadsheet cell such as `12-b`, `12:b`, `12.b` or `12 - B`.
/// Returns `None` for anything that does not start with a question number
/// followed by a label.
pub fn parse_answer_cell(cell: &str) -> Option<(u32, String)> {
    let cell = cell
        .replace([':', '.'], "-")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    let mut parts = cell.split('-');
    let question = parts.next()?.parse::<u32>().ok()?;
    let label = parts.next()?;
    Some((question, label.to_lowercase()))
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question: u32, answers: AcceptedAnswers) {
        self.0.insert(question, answers);
    }

    pub fn get(&self, question: u32) -> Option<&AcceptedAnswers> {
        self.0.get(&question)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &AcceptedAnswers)> {
        self.0.iter().map(|(question, answers)| (*question, answers))
    }

    /// Reads `{"1": "a", "2": ["b", "c"], "3": ""}`.
    pub fn from_json_str(json: &str) -> Result<Self, AnswerKeyError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds a key from spreadsheet cells in the `<question>-<label>` form.
    /// Cells that do not parse are skipped; a later cell for the same question
    /// replaces an earlier one.
    pub fn from_cells<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut key = AnswerKey::new();
        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match parse_answer_cell(cell) {
                Some((question, label)) => key.insert(question, AcceptedAnswers::single(&label)),
                None => debug!("skipping answer key cell {:?}", cell),
            }
        }
        key
    }

    /// Reads a spreadsheet exported as text; cells may be separated by
    /// newlines, commas, semicolons or tabs.
    pub fn from_delimited_text(text: &str) -> Self {
        Self::from_cells(text.split(['\n', '\r', ',', ';', '\t']))
    }

    /// Reads every non-empty cell of every sheet in a workbook, row by row,
    /// as a `<question>-<label>` cell.
    pub fn from_workbook(path: &Path) -> Result<Self, AnswerKeyError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| AnswerKeyError::Workbook(path.to_path_buf(), e.to_string()))?;

        let mut cells = Vec::new();
        for (name, range) in workbook.worksheets() {
            debug!("reading answer key sheet {:?} ({:?})", name, range.get_size());
            for row in range.rows() {
                for cell in row {
                    match cell {
                        Data::Empty | Data::Error(_) => {}
                        Data::String(text) => cells.push(text.clone()),
                        other => cells.push(other.to_string()),
                    }
                }
            }
        }

        Ok(Self::from_cells(cells.iter().map(String::as_str)))
    }

    /// Loads a key file: `.json` files are parsed as a JSON mapping,
    /// workbooks (`.xlsx`, `.xls`, `.ods`) cell by cell, anything else as
    /// delimited cell text. The result covers at least
    /// `DEFAULT_QUESTION_RANGE`.
    pub fn load(path: &Path) -> Result<Self, AnswerKeyError> {
        let key = if has_extension(path, &WORKBOOK_EXTENSIONS) {
            Self::from_workbook(path)?
        } else {
            let text = std::fs::read_to_string(path)
                .map_err(|e| AnswerKeyError::Io(path.to_path_buf(), e))?;
            if has_extension(path, &["json"]) {
                Self::from_json_str(&text)?
            } else {
                Self::from_delimited_text(&text)
            }
        };
        if key.is_empty() {
            warn!("answer key {} has no entries", path.display());
        }
        Ok(key.densify(DEFAULT_QUESTION_RANGE))
    }

    /// Adds an empty entry for every question in `range` that has none.
    /// Entries outside the range are kept.
    pub fn densify(mut self, range: RangeInclusive<u32>) -> Self {
        for question in range {
            self.0.entry(question).or_default();
        }
        self
    }
}
