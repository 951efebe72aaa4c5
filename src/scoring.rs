use std::collections::BTreeMap;
use std::fmt::Display;

use image::GrayImage;
use log::{debug, info};
use logging_timer::time;
use serde::{Serialize, Serializer};

use crate::answer_key::{AcceptedAnswers, AnswerKey};
use crate::config::FillThresholds;
use crate::grid::OptionGroup;
use crate::image_utils::count_ink_in_mark;
use crate::types::{Mark, OptionLabel, NO_ANSWER};

/// How a question was answered relative to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStatus {
    Correct,
    Incorrect,
    NotAttempted,
}

impl Display for AnswerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerStatus::Correct => write!(f, "Correct"),
            AnswerStatus::Incorrect => write!(f, "Incorrect"),
            AnswerStatus::NotAttempted => write!(f, "Not Attempted"),
        }
    }
}

impl Serialize for AnswerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The outcome of the fill test on one option group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillDecision {
    /// Position within the group of the bubble judged filled.
    pub filled_index: Option<usize>,
    pub max_fill: u32,
}

/// The result for a single question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question: u32,
    /// The filled option, or `None` when no bubble stood out.
    #[serde(serialize_with = "serialize_marked")]
    pub marked: Option<OptionLabel>,
    /// The accepted answers; absent when no key was supplied or the key has
    /// no entry for this question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<AcceptedAnswers>,
    /// Absent when no key was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AnswerStatus>,
    pub is_correct: bool,
    /// Where the filled bubble is on the normalized sheet.
    #[serde(skip)]
    pub filled_mark: Option<Mark>,
}

fn serialize_marked<S>(marked: &Option<OptionLabel>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(marked.as_ref().map_or(NO_ANSWER, OptionLabel::as_str))
}

impl QuestionResult {
    pub fn marked_label(&self) -> &str {
        self.marked.as_ref().map_or(NO_ANSWER, OptionLabel::as_str)
    }
}

/// Everything read from one sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub total_score: u32,
    pub questions: Vec<QuestionResult>,
    /// Question number to marked label, or `"none"`.
    pub extracted_answers: BTreeMap<u32, String>,
}

impl EvaluationReport {
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn attempted(&self) -> usize {
        self.questions.iter().filter(|q| q.marked.is_some()).count()
    }
}

/// Counts the ink pixels inside each bubble of a group.
pub fn measure_fill(mask: &GrayImage, group: &OptionGroup) -> Vec<u32> {
    group
        .marks()
        .iter()
        .map(|mark| count_ink_in_mark(mask, mark))
        .collect()
}

/// Decides which bubble of a group, if any, is filled. The darkest bubble
/// wins only if it clears the absolute floor and is darker than `dominance`
/// times the mean of the others. Ties for darkest go to the leftmost.
pub fn classify_fill(fills: &[u32], thresholds: &FillThresholds) -> FillDecision {
    let (max_index, max_fill) = match fills
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|(_, fill)| **fill)
    {
        Some((index, fill)) => (index, *fill),
        None => {
            return FillDecision {
                filled_index: None,
                max_fill: 0,
            }
        }
    };

    let others = fills
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != max_index)
        .map(|(_, fill)| *fill as f64)
        .collect::<Vec<f64>>();
    let avg_other_fill = if others.is_empty() {
        0.0
    } else {
        others.iter().sum::<f64>() / others.len() as f64
    };

    let is_filled =
        max_fill > thresholds.min_fill && max_fill as f64 > thresholds.dominance * avg_other_fill;

    FillDecision {
        filled_index: is_filled.then_some(max_index),
        max_fill,
    }
}

/// Compares a marked label against the key entry for its question.
pub fn grade_answer(marked: Option<&OptionLabel>, correct: Option<&AcceptedAnswers>) -> AnswerStatus {
    match (marked, correct) {
        (None, _) => AnswerStatus::NotAttempted,
        (Some(label), Some(correct)) if correct.accepts(label) => AnswerStatus::Correct,
        (Some(_), _) => AnswerStatus::Incorrect,
    }
}

/// Reads and grades one question.
pub fn score_option_group(
    question: u32,
    group: &OptionGroup,
    mask: &GrayImage,
    labels: &[OptionLabel],
    thresholds: &FillThresholds,
    answer_key: Option<&AnswerKey>,
) -> QuestionResult {
    let fills = measure_fill(mask, group);
    let decision = classify_fill(&fills, thresholds);
    let marked = decision
        .filled_index
        .and_then(|index| labels.get(index))
        .cloned();
    let filled_mark = decision
        .filled_index
        .and_then(|index| group.marks().get(index))
        .copied();
    debug!(
        "question {}: fills {:?} -> {}",
        question,
        fills,
        marked.as_ref().map_or(NO_ANSWER, OptionLabel::as_str)
    );

    let (correct, status) = match answer_key {
        Some(key) => {
            let correct = key.get(question).filter(|answers| !answers.is_empty()).cloned();
            let status = grade_answer(marked.as_ref(), correct.as_ref());
            (correct, Some(status))
        }
        None => (None, None),
    };

    QuestionResult {
        question,
        is_correct: status == Some(AnswerStatus::Correct),
        marked,
        correct,
        status,
        filled_mark,
    }
}

#[time]
/// Reads every option group in order, numbering questions from 1, and totals
/// the score against the key if there is one.
pub fn score_option_groups(
    groups: &[OptionGroup],
    mask: &GrayImage,
    labels: &[OptionLabel],
    thresholds: &FillThresholds,
    answer_key: Option<&AnswerKey>,
) -> EvaluationReport {
    let questions = groups
        .iter()
        .zip(1u32..)
        .map(|(group, question)| {
            score_option_group(question, group, mask, labels, thresholds, answer_key)
        })
        .collect::<Vec<QuestionResult>>();

    let total_score = questions.iter().filter(|q| q.is_correct).count() as u32;
    let extracted_answers = questions
        .iter()
        .map(|q| (q.question, q.marked_label().to_string()))
        .collect::<BTreeMap<u32, String>>();

    if let Some(key) = answer_key {
        info!("Total Score: {}/{}", total_score, key.len());
    }

    EvaluationReport {
        total_score,
        questions,
        extracted_answers,
    }
}
