//! Reads and grades multiple-choice bubble sheets from scanned or
//! photographed images.
//!
//! The pipeline runs in four stages, each in its own module:
//!
//! 1. [`sheet`] rescales the image and binarizes it into an ink mask.
//! 2. [`marks`] finds bubble-shaped regions in the mask.
//! 3. [`grid`] orders the bubbles column by column and groups them into
//!    questions.
//! 4. [`scoring`] decides which bubble of each question is filled and
//!    compares it against an [`answer_key::AnswerKey`].
//!
//! [`evaluate::evaluate`] runs all four.

pub mod answer_key;
pub mod config;
pub mod debug;
pub mod evaluate;
pub mod grid;
pub mod image_utils;
pub mod marks;
pub mod scoring;
pub mod sheet;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use answer_key::{AcceptedAnswers, AnswerKey};
pub use config::EvaluateOptions;
pub use evaluate::{evaluate, evaluate_sheet_file, EvaluateError, OutputOptions};
pub use scoring::{AnswerStatus, EvaluationReport, QuestionResult};
pub use sheet::SheetInput;
