use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use log::{debug, warn};
use rusttype::{Font, Scale};

use crate::{
    grid::OptionGroup,
    image_utils::{GREEN, PINK, RAINBOW, RED, WHITE_RGB},
    scoring::EvaluationReport,
    types::Mark,
};

const ANNOTATION_FONT_SIZE: f32 = 16.0;

/// Creates a path for a debug image.
pub fn debug_image_path(base: &Path, output_dir: &Path, label: &str) -> PathBuf {
    output_dir.join(format!(
        "{}_debug_{}.png",
        base.file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("sheet"),
        label
    ))
}

/// The font annotation text is drawn with unless another one is given.
pub fn monospace_font() -> Font<'static> {
    Font::try_from_bytes(include_bytes!("../fonts/DejaVuSansMono.ttf")).expect("font is valid")
}

/// Loads a TrueType font for annotation text.
pub fn load_font(path: &Path) -> Option<Font<'static>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("cannot read font {}: {}", path.display(), e);
            return None;
        }
    };
    let font = Font::try_from_vec(bytes);
    if font.is_none() {
        warn!("{} is not a usable font", path.display());
    }
    font
}

/// Writes images of intermediate stages next to the output, if enabled.
pub struct ImageDebugWriter {
    input_path: PathBuf,
    output_dir: PathBuf,
    enabled: bool,
}

impl ImageDebugWriter {
    pub fn new(input_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input_path,
            output_dir,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Draws onto a copy of `base` and saves it. Failures are logged, never
    /// returned: debug output must not fail an evaluation.
    pub fn write(
        &self,
        label: &str,
        base: &RgbImage,
        draw: impl FnOnce(&mut RgbImage),
    ) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }

        let mut canvas = base.clone();
        draw(&mut canvas);

        let path = debug_image_path(&self.input_path, &self.output_dir, label);
        match canvas.save(&path) {
            Ok(()) => {
                debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("cannot write debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Converts an ink mask into a color image for display.
pub fn mask_to_rgb(mask: &GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(mask.clone()).into_rgb8()
}

/// Draws every candidate mark, cycling through colors so neighbours differ.
pub fn draw_candidate_marks_debug_image_mut(canvas: &mut RgbImage, marks: &[Mark]) {
    for (i, mark) in marks.iter().enumerate() {
        draw_filled_rect_mut(canvas, mark.rect(), RAINBOW[i % RAINBOW.len()]);
    }
}

/// Outlines each option group in its own color and numbers it.
pub fn draw_option_groups_debug_image_mut(
    canvas: &mut RgbImage,
    groups: &[OptionGroup],
    font: Option<&Font>,
) {
    let scale = Scale::uniform(ANNOTATION_FONT_SIZE);
    for (i, group) in groups.iter().enumerate() {
        let color = RAINBOW[i % RAINBOW.len()];
        for mark in group.marks() {
            draw_hollow_rect_mut(canvas, mark.rect(), color);
        }

        if let (Some(font), Some(first)) = (font, group.marks().first()) {
            let text = (i + 1).to_string();
            let (text_width, _) = text_size(scale, font, &text);
            draw_text_with_background_mut(
                canvas,
                &text,
                first.x as i32 - text_width - 5,
                first.y as i32,
                scale,
                font,
                PINK,
                WHITE_RGB,
            );
        }
    }
}

/// Marks each filled bubble on the sheet: a two pixel box around it and, if
/// a font is available, `<question>:<label>` just above it. Questions with
/// no filled bubble are left alone.
pub fn annotate_report_mut(canvas: &mut RgbImage, report: &EvaluationReport, font: Option<&Font>) {
    let scale = Scale::uniform(ANNOTATION_FONT_SIZE);
    for question in &report.questions {
        let mark = match question.filled_mark {
            Some(mark) => mark,
            None => continue,
        };

        draw_hollow_rect_mut(canvas, mark.rect(), RED);
        draw_hollow_rect_mut(
            canvas,
            Rect::at(mark.x as i32 - 1, mark.y as i32 - 1).of_size(mark.width + 2, mark.height + 2),
            RED,
        );

        if let Some(font) = font {
            let text = format!("{}:{}", question.question, question.marked_label());
            let (_, text_height) = text_size(scale, font, &text);
            draw_text_mut(
                canvas,
                RED,
                mark.x as i32,
                mark.y as i32 - 5 - text_height,
                scale,
                font,
                &text,
            );
        }
    }
}

/// Returns an annotated copy of the normalized sheet.
pub fn annotated_image(image: &RgbImage, report: &EvaluationReport, font: Option<&Font>) -> RgbImage {
    let mut canvas = image.clone();
    annotate_report_mut(&mut canvas, report, font);
    canvas
}

/// Draws a highlight around the bubble that was read for each question, in
/// green when it matched the key.
pub fn draw_graded_marks_debug_image_mut(canvas: &mut RgbImage, report: &EvaluationReport) {
    for question in &report.questions {
        if let Some(mark) = question.filled_mark {
            let color = if question.is_correct { GREEN } else { RED };
            draw_filled_rect_mut(canvas, mark.rect(), color);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_text_with_background_mut(
    canvas: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: Scale,
    font: &Font,
    text_color: Rgb<u8>,
    background_color: Rgb<u8>,
) {
    let (text_width, text_height) = text_size(scale, font, text);
    if text_width > 0 && text_height > 0 {
        draw_filled_rect_mut(
            canvas,
            Rect::at(x, y).of_size(text_width as u32, text_height as u32),
            background_color,
        );
    }
    draw_text_mut(canvas, text_color, x, y, scale, font, text);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::scoring::QuestionResult;
    use crate::types::OptionLabel;

    fn report_with(filled_mark: Option<Mark>) -> EvaluationReport {
        EvaluationReport {
            total_score: 0,
            questions: vec![QuestionResult {
                question: 1,
                marked: filled_mark.map(|_| OptionLabel::from("a")),
                correct: None,
                status: None,
                is_correct: false,
                filled_mark,
            }],
            extracted_answers: BTreeMap::new(),
        }
    }

    #[test]
    fn debug_paths_go_to_output_dir() {
        let path = debug_image_path(Path::new("/scans/sheet-7.jpg"), Path::new("/out"), "mask");
        assert_eq!(path, PathBuf::from("/out/sheet-7_debug_mask.png"));
    }

    #[test]
    fn annotation_boxes_filled_bubbles() {
        let image = RgbImage::from_pixel(100, 100, WHITE_RGB);
        let mark = Mark::new(40, 40, 20, 20);
        let annotated = annotated_image(&image, &report_with(Some(mark)), None);
        assert_eq!(*annotated.get_pixel(40, 40), RED);
        assert_eq!(*annotated.get_pixel(39, 39), RED);
        assert_eq!(*annotated.get_pixel(59, 50), RED);
        assert_eq!(*annotated.get_pixel(50, 50), WHITE_RGB);
        // annotation works on a copy
        assert_eq!(*image.get_pixel(40, 40), WHITE_RGB);
    }

    #[test]
    fn annotation_labels_filled_bubbles_with_bundled_font() {
        let image = RgbImage::from_pixel(100, 100, WHITE_RGB);
        let mark = Mark::new(40, 40, 20, 20);
        let font = monospace_font();
        let inked_above = |canvas: &RgbImage| {
            (0..36)
                .flat_map(|y| (0..100).map(move |x| (x, y)))
                .filter(|(x, y)| *canvas.get_pixel(*x, *y) != WHITE_RGB)
                .count()
        };

        let plain = annotated_image(&image, &report_with(Some(mark)), None);
        assert_eq!(inked_above(&plain), 0);

        let labelled = annotated_image(&image, &report_with(Some(mark)), Some(&font));
        assert!(inked_above(&labelled) > 0);
    }

    #[test]
    fn unanswered_questions_are_not_drawn() {
        let image = RgbImage::from_pixel(100, 100, WHITE_RGB);
        let annotated = annotated_image(&image, &report_with(None), None);
        assert_eq!(annotated, image);
    }

    #[test]
    fn disabled_writer_writes_nothing() {
        let writer = ImageDebugWriter::disabled();
        let mut called = false;
        let result = writer.write("mask", &RgbImage::new(4, 4), |_| called = true);
        assert!(result.is_none());
        assert!(!called);
    }

    #[test]
    fn writer_saves_png_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            ImageDebugWriter::new(PathBuf::from("scan.jpg"), dir.path().to_path_buf());
        let marks = [Mark::new(1, 1, 3, 3)];
        let path = writer
            .write("marks", &RgbImage::new(8, 8), |canvas| {
                draw_candidate_marks_debug_image_mut(canvas, &marks)
            })
            .unwrap();
        assert_eq!(path, dir.path().join("scan_debug_marks.png"));
        let saved = image::open(&path).unwrap().into_rgb8();
        assert_eq!(*saved.get_pixel(2, 2), RAINBOW[0]);
    }

    #[test]
    fn missing_font_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_font(&dir.path().join("missing.ttf")).is_none());
        let not_a_font = dir.path().join("font.ttf");
        std::fs::write(&not_a_font, b"nope").unwrap();
        assert!(load_font(&not_a_font).is_none());
    }
}
