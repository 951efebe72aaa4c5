use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use log::debug;
use logging_timer::time;

use crate::sheet::SheetGeometry;
use crate::types::Mark;

const MIN_ASPECT_RATIO: f32 = 0.9;
const MAX_ASPECT_RATIO: f32 = 1.1;

/// Gets the smallest box containing every point of a contour.
pub fn get_contour_bounding_mark(contour: &Contour<u32>) -> Option<Mark> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in &contour.points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Some(Mark::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

/// Determines whether a box has the size and shape of a bubble.
pub fn mark_could_be_bubble(geometry: &SheetGeometry, mark: &Mark) -> bool {
    let size_in_range =
        |size: u32| size > geometry.min_bubble_size && size < geometry.max_bubble_size;
    let aspect_ratio = mark.aspect_ratio();
    size_in_range(mark.width)
        && size_in_range(mark.height)
        && aspect_ratio > MIN_ASPECT_RATIO
        && aspect_ratio < MAX_ASPECT_RATIO
}

#[time]
/// Finds the bounding boxes of all outermost ink regions that are shaped like
/// a bubble. Marks are returned in the order the contour scan meets them.
pub fn find_bubble_marks(geometry: &SheetGeometry, mask: &GrayImage) -> Vec<Mark> {
    let contours = find_contours::<u32>(mask);
    let marks = contours
        .iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(get_contour_bounding_mark)
        .filter(|mark| mark_could_be_bubble(geometry, mark))
        .collect::<Vec<Mark>>();

    debug!(
        "found {} bubble marks among {} contours",
        marks.len(),
        contours.len()
    );
    marks
}
