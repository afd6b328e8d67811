use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub scale_factor: f64,
    pub physical_width: u32,
    pub physical_height: u32,
    pub logical_width: u32,
    pub logical_height: u32,
}

impl ScreenshotMeta {
    /// Meta for an image with no DPI scaling (logical == physical).
    pub fn unscaled(width: u32, height: u32) -> Self {
        Self {
            scale_factor: 1.0,
            physical_width: width,
            physical_height: height,
            logical_width: width,
            logical_height: height,
        }
    }
}

/// Size of the coordinate space input events are issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDimensions {
    pub width: u32,
    pub height: u32,
}

/// One capture of the display. PNG-encoded, physical resolution.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub image_bytes: Vec<u8>,
    pub meta: ScreenshotMeta,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Snapshot {
    pub fn new(image_bytes: Vec<u8>, meta: ScreenshotMeta) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image_bytes,
            meta,
            captured_at: chrono::Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.meta.physical_width
    }

    pub fn height(&self) -> u32 {
        self.meta.physical_height
    }

    /// Dimensions the input driver addresses (logical points).
    pub fn input_dimensions(&self) -> ScreenDimensions {
        ScreenDimensions {
            width: self.meta.logical_width,
            height: self.meta.logical_height,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image_bytes)
    }
}

/// Axis-aligned box in pixel space: (x0, y0) top-left, (x1, y1) bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn area(&self) -> f64 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        BoundingBox {
            x0: self.x0.clamp(0.0, w),
            y0: self.y0.clamp(0.0, h),
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
        }
    }
}

/// Center of `bbox` as a fraction of the image size, each component in [0, 1].
pub fn normalized_center(bbox: &BoundingBox, width: u32, height: u32) -> (f64, f64) {
    let w = width.max(1) as f64;
    let h = height.max(1) as f64;
    let fx = (bbox.x0 + bbox.x1) / 2.0 / w;
    let fy = (bbox.y0 + bbox.y1) / 2.0 / h;
    (fx.clamp(0.0, 1.0), fy.clamp(0.0, 1.0))
}

/// Maps a fractional position onto absolute pixels of `dims`, never past the
/// last addressable row or column.
pub fn fraction_to_pixels(fx: f64, fy: f64, dims: ScreenDimensions) -> (i32, i32) {
    let max_x = dims.width.saturating_sub(1) as f64;
    let max_y = dims.height.saturating_sub(1) as f64;
    let x = (fx * dims.width as f64).round().clamp(0.0, max_x) as i32;
    let y = (fy * dims.height as f64).round().clamp(0.0, max_y) as i32;
    (x, y)
}

/// An OCR-derived on-screen text region that actions can target by label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionableElement {
    pub label: String,
    pub bbox: BoundingBox,
    /// Normalized center (fx, fy), both in [0, 1].
    pub center: (f64, f64),
}

impl ActionableElement {
    /// Builds an element from a pixel-space box. Returns `None` for zero-area boxes.
    pub fn from_region(label: &str, bbox: BoundingBox, width: u32, height: u32) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        let bbox = bbox.clamp_to(width, height);
        if bbox.area() <= 0.0 {
            return None;
        }
        Some(Self {
            label: label.to_string(),
            center: normalized_center(&bbox, width, height),
            bbox,
        })
    }
}

/// The addressable elements found on one snapshot. Rebuilt every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementIndex {
    elements: Vec<ActionableElement>,
}

impl ElementIndex {
    pub fn new(elements: Vec<ActionableElement>) -> Self {
        Self { elements }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[ActionableElement] {
        &self.elements
    }

    /// Case-insensitive exact match first, then the first element whose label contains `target`.
    pub fn resolve(&self, target: &str) -> Option<&ActionableElement> {
        let needle = target.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.elements
            .iter()
            .find(|e| e.label.to_lowercase() == needle)
            .or_else(|| {
                self.elements
                    .iter()
                    .find(|e| e.label.to_lowercase().contains(&needle))
            })
    }

    /// Text listing of the elements for the decision prompt.
    pub fn render(&self) -> String {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "{}. \"{}\" at ({:.3}, {:.3})",
                    i + 1,
                    e.label,
                    e.center.0,
                    e.center.1
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_mapping_round_trips_within_one_pixel() {
        for &(w, h) in &[(1920u32, 1080u32), (1366, 768), (2560, 1600), (7, 3)] {
            let dims = ScreenDimensions { width: w, height: h };
            for i in 0..=20 {
                for j in 0..=20 {
                    let (fx, fy) = (i as f64 / 20.0, j as f64 / 20.0);
                    let (px, py) = fraction_to_pixels(fx, fy, dims);
                    let bbox = BoundingBox::new(px as f64, py as f64, px as f64, py as f64);
                    let (rx, ry) = normalized_center(&bbox, w, h);
                    assert!((rx * w as f64 - fx * w as f64).abs() <= 1.0);
                    assert!((ry * h as f64 - fy * h as f64).abs() <= 1.0);
                }
            }
        }
    }

    #[test]
    fn far_edge_maps_to_last_pixel() {
        let dims = ScreenDimensions { width: 1920, height: 1080 };
        assert_eq!(fraction_to_pixels(1.0, 1.0, dims), (1919, 1079));
        assert_eq!(fraction_to_pixels(0.0, 0.0, dims), (0, 0));
        assert_eq!(fraction_to_pixels(0.5, 0.5, dims), (960, 540));
    }

    #[test]
    fn element_center_lies_inside_its_box() {
        let boxes = [
            BoundingBox::new(10.0, 20.0, 110.0, 45.0),
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            BoundingBox::new(1900.0, 1050.0, 1920.0, 1080.0),
            BoundingBox::new(300.5, 200.25, 301.0, 260.0),
        ];
        for bbox in boxes {
            let el = ActionableElement::from_region("x", bbox, 1920, 1080).unwrap();
            let cx = el.center.0 * 1920.0;
            let cy = el.center.1 * 1080.0;
            assert!(cx >= el.bbox.x0 && cx <= el.bbox.x1, "{cx} outside {:?}", el.bbox);
            assert!(cy >= el.bbox.y0 && cy <= el.bbox.y1, "{cy} outside {:?}", el.bbox);
        }
    }

    #[test]
    fn degenerate_and_blank_regions_are_dropped() {
        assert!(ActionableElement::from_region("a", BoundingBox::new(5.0, 5.0, 5.0, 30.0), 100, 100).is_none());
        assert!(ActionableElement::from_region("a", BoundingBox::new(5.0, 5.0, 30.0, 5.0), 100, 100).is_none());
        assert!(ActionableElement::from_region("  ", BoundingBox::new(0.0, 0.0, 10.0, 10.0), 100, 100).is_none());
        // Entirely off-image collapses to zero area after clamping.
        assert!(ActionableElement::from_region("a", BoundingBox::new(150.0, 10.0, 180.0, 20.0), 100, 100).is_none());
    }

    #[test]
    fn resolve_prefers_exact_match_over_substring() {
        let index = ElementIndex::new(vec![
            ActionableElement::from_region("Open Settings", BoundingBox::new(0.0, 0.0, 50.0, 10.0), 100, 100).unwrap(),
            ActionableElement::from_region("Settings", BoundingBox::new(0.0, 50.0, 50.0, 60.0), 100, 100).unwrap(),
        ]);
        assert_eq!(index.resolve("settings").unwrap().label, "Settings");
        assert_eq!(index.resolve("open").unwrap().label, "Open Settings");
        assert!(index.resolve("Cancel").is_none());
        assert!(index.resolve("").is_none());
    }

    #[test]
    fn render_lists_labels_with_centers() {
        let index = ElementIndex::new(vec![ActionableElement::from_region(
            "File",
            BoundingBox::new(0.0, 0.0, 20.0, 10.0),
            100,
            100,
        )
        .unwrap()]);
        assert_eq!(index.render(), "1. \"File\" at (0.100, 0.050)");
    }
}
