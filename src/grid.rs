use log::debug;
use logging_timer::time;

use crate::types::Mark;

/// The bubbles of one question, ordered left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionGroup {
    marks: Vec<Mark>,
}

impl OptionGroup {
    pub fn new(mut marks: Vec<Mark>) -> Self {
        marks.sort_by_key(|mark| mark.x);
        Self { marks }
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// A group with fewer bubbles than the sheet has options. Only the last
    /// group of a sheet can be short.
    pub fn is_partial(&self, option_count: usize) -> bool {
        self.marks.len() < option_count
    }
}

/// Puts marks in reading order: column by column, where a column is every
/// mark whose `x` falls in the same `col_width_tolerance`-wide band, and top
/// to bottom within a column. The sort is stable so marks with equal keys
/// keep the order they were found in.
pub fn sort_marks_in_reading_order(marks: &mut [Mark], col_width_tolerance: u32) {
    marks.sort_by_key(|mark| (mark.x / col_width_tolerance, mark.y));
}

#[time]
/// Groups marks into questions of `option_count` bubbles each. If the number
/// of marks is not a multiple of `option_count` the last group is short.
pub fn assemble_option_groups(
    marks: &[Mark],
    col_width_tolerance: u32,
    option_count: usize,
) -> Vec<OptionGroup> {
    if option_count == 0 || col_width_tolerance == 0 {
        return vec![];
    }

    let mut ordered = marks.to_vec();
    sort_marks_in_reading_order(&mut ordered, col_width_tolerance);

    let groups = ordered
        .chunks(option_count)
        .map(|chunk| OptionGroup::new(chunk.to_vec()))
        .collect::<Vec<OptionGroup>>();

    if let Some(last) = groups.last() {
        if last.is_partial(option_count) {
            debug!(
                "last of {} option groups has only {} of {} bubbles",
                groups.len(),
                last.len(),
                option_count
            );
        }
    }

    groups
}
