use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use crate::models::Contour;

/// Outer borders of the foreground regions of a binary mask.
/// Regions nested inside a hole of another region are not reported.
pub fn find_external_contours(mask: &GrayImage) -> Vec<Contour> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    // Regions touching the frame edge only get an outer border when surrounded by background
    let mut padded = GrayImage::new(width + 2, height + 2);
    image::imageops::replace(&mut padded, mask, 1, 1);

    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| {
            let points = c
                .points
                .into_iter()
                .map(|p| Point::new((p.x - 1).clamp(0, max_x), (p.y - 1).clamp(0, max_y)))
                .collect();
            Contour::from_points(points)
        })
        .collect()
}

/// Keep contours whose enclosed area reaches `min_area`
pub fn filter_by_area(contours: Vec<Contour>, min_area: f32) -> Vec<Contour> {
    contours
        .into_iter()
        .filter(|c| c.area() >= min_area)
        .collect()
}
