//! Pointer overlay drawn into a snapshot so the decision backend can see
//! where the cursor currently is.
//!
//! The marker is an arrow-head pointing up-left with its tip at the cursor
//! hotspot: a dark outline around a bright red fill, opaque regardless of
//! the background.

/// Arrow height in pixels; row 0 is the tip.
const ARROW_ROWS: u32 = 18;

/// Painted column range (start, end) of one arrow row.
fn arrow_span(row: u32) -> (u32, u32) {
    // Widens by one column every row until the tail, then narrows.
    let width = if row < 12 { row + 1 } else { ARROW_ROWS - row + 6 };
    (0, width)
}

/// Draw the pointer marker with its tip at (x, y) in physical pixels.
/// Coordinates outside the canvas are clipped.
pub fn draw_pointer(canvas: &mut image::RgbaImage, x: i64, y: i64) {
    let (w, h) = canvas.dimensions();

    for row in 0..ARROW_ROWS {
        let (start, end) = arrow_span(row);
        for col in start..end {
            let edge = col == start || col + 1 == end || row + 1 == ARROW_ROWS;
            let colour = if edge { (20u8, 20u8, 20u8) } else { (255u8, 40u8, 40u8) };
            let px = x + col as i64;
            let py = y + row as i64;
            if px < 0 || py < 0 || px >= w as i64 || py >= h as i64 {
                continue;
            }
            canvas.put_pixel(px as u32, py as u32, image::Rgba([colour.0, colour.1, colour.2, 255]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_pixel_is_painted() {
        let mut canvas = image::RgbaImage::from_pixel(40, 40, image::Rgba([255, 255, 255, 255]));
        draw_pointer(&mut canvas, 10, 10);
        assert_ne!(canvas.get_pixel(10, 10).0, [255, 255, 255, 255]);
        // Above and left of the tip stays untouched.
        assert_eq!(canvas.get_pixel(9, 9).0, [255, 255, 255, 255]);
    }

    #[test]
    fn marker_is_opaque_over_any_background() {
        for bg in [[0u8, 0, 0, 255], [255, 255, 255, 255], [10, 200, 30, 0]] {
            let mut canvas = image::RgbaImage::from_pixel(40, 40, image::Rgba(bg));
            draw_pointer(&mut canvas, 0, 0);
            // Tip is outline, row 5 col 2 is fill.
            assert_eq!(canvas.get_pixel(0, 0).0, [20, 20, 20, 255]);
            assert_eq!(canvas.get_pixel(2, 5).0, [255, 40, 40, 255]);
        }
    }

    #[test]
    fn marker_near_edges_is_clipped() {
        let mut canvas = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        draw_pointer(&mut canvas, 6, 6);
        draw_pointer(&mut canvas, -5, -5);
        draw_pointer(&mut canvas, 100, 100);
        assert_ne!(canvas.get_pixel(6, 6).0, [0, 0, 0, 255]);
    }
}
