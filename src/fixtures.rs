//! Synthetic answer sheets for tests.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

pub const SHEET_WIDTH: u32 = 1000;
pub const SHEET_HEIGHT: u32 = 1400;

const BUBBLE_RADIUS: i32 = 12;
const OPTION_SPACING: i32 = 50;
const ROW_SPACING: i32 = 60;
const COLUMN_SPACING: i32 = 500;
const QUESTIONS_PER_COLUMN: usize = 10;

const PAPER: Rgb<u8> = Rgb([250, 250, 245]);
const PENCIL: Rgb<u8> = Rgb([30, 30, 30]);

/// Center of the bubble for `option` of the zero-based `question`.
pub fn bubble_center(question: usize, option: usize) -> (i32, i32) {
    let column = (question / QUESTIONS_PER_COLUMN) as i32;
    let row = (question % QUESTIONS_PER_COLUMN) as i32;
    (
        100 + column * COLUMN_SPACING + option as i32 * OPTION_SPACING,
        150 + row * ROW_SPACING,
    )
}

/// Draws a sheet with one row of `option_count` bubbles per entry of
/// `answers`, filling the given option. Ten questions go in each column.
pub fn render_sheet(answers: &[Option<usize>], option_count: usize) -> RgbImage {
    let mut sheet = RgbImage::from_pixel(SHEET_WIDTH, SHEET_HEIGHT, PAPER);

    // a title rule that must not be mistaken for a bubble
    draw_line_segment_mut(&mut sheet, (80.0, 60.0), (900.0, 60.0), PENCIL);

    for (question, answer) in answers.iter().enumerate() {
        for option in 0..option_count {
            let center = bubble_center(question, option);
            if *answer == Some(option) {
                draw_filled_circle_mut(&mut sheet, center, BUBBLE_RADIUS, PENCIL);
            } else {
                draw_hollow_circle_mut(&mut sheet, center, BUBBLE_RADIUS, PENCIL);
            }
        }
    }

    sheet
}
