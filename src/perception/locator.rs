//! Element Locator: turns recognized text regions of a snapshot into an
//! `ElementIndex` of label-addressable targets.
use std::sync::Arc;

use crate::perception::ocr::{TextRecognizer, TextRegion};
use crate::perception::types::{ActionableElement, ElementIndex, Snapshot};

pub struct ElementLocator {
    recognizer: Arc<dyn TextRecognizer>,
    min_confidence: f32,
}

impl ElementLocator {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, min_confidence: f32) -> Self {
        Self {
            recognizer,
            min_confidence,
        }
    }

    /// Never fails: an unavailable engine or a blank screen yields an empty index.
    pub async fn locate(&self, snapshot: &Snapshot) -> ElementIndex {
        let recognizer = Arc::clone(&self.recognizer);
        let bytes = snapshot.image_bytes.clone();

        // Recognition is CPU-bound; keep it off the async workers.
        let regions = match tokio::task::spawn_blocking(move || recognizer.recognize(&bytes)).await {
            Ok(Ok(regions)) => regions,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "OCR failed, continuing with empty element index");
                return ElementIndex::empty();
            }
            Err(e) => {
                tracing::warn!(error = %e, "OCR task panicked, continuing with empty element index");
                return ElementIndex::empty();
            }
        };

        let index = build_index(&regions, snapshot.width(), snapshot.height(), self.min_confidence);
        tracing::debug!(
            regions = regions.len(),
            elements = index.len(),
            snapshot = %snapshot.id,
            "element index built"
        );
        index
    }
}

/// Convert pixel-space regions into elements, dropping low-confidence and
/// zero-area ones. Output is in reading order (top to bottom, left to right).
pub fn build_index(regions: &[TextRegion], width: u32, height: u32, min_confidence: f32) -> ElementIndex {
    let mut elements: Vec<ActionableElement> = regions
        .iter()
        .filter(|r| r.confidence >= min_confidence)
        .filter_map(|r| ActionableElement::from_region(&r.text, r.bbox, width, height))
        .collect();

    elements.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
    ElementIndex::new(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PilotError, PilotResult};
    use crate::perception::types::{BoundingBox, ScreenshotMeta};

    struct FixedRecognizer(Vec<TextRegion>);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, _png_bytes: &[u8]) -> PilotResult<Vec<TextRegion>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenRecognizer;

    impl TextRecognizer for BrokenRecognizer {
        fn recognize(&self, _png_bytes: &[u8]) -> PilotResult<Vec<TextRegion>> {
            Err(PilotError::Perception("engine missing".into()))
        }
    }

    fn region(text: &str, x0: f64, y0: f64, x1: f64, y1: f64, confidence: f32) -> TextRegion {
        TextRegion {
            text: text.into(),
            bbox: BoundingBox::new(x0, y0, x1, y1),
            confidence,
        }
    }

    fn snapshot(width: u32, height: u32) -> Snapshot {
        Snapshot::new(Vec::new(), ScreenshotMeta::unscaled(width, height))
    }

    #[tokio::test]
    async fn regions_become_normalized_elements() {
        let locator = ElementLocator::new(
            Arc::new(FixedRecognizer(vec![
                region("Save", 900.0, 500.0, 1000.0, 540.0, 0.9),
                region("File", 0.0, 0.0, 40.0, 20.0, 0.95),
                region("", 10.0, 10.0, 20.0, 20.0, 0.9),
                region("Flat", 10.0, 10.0, 10.0, 20.0, 0.9),
            ])),
            0.0,
        );
        let index = locator.locate(&snapshot(1000, 1000)).await;
        assert_eq!(index.len(), 2);
        let labels: Vec<_> = index.elements().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["File", "Save"]);
        let save = index.resolve("save").unwrap();
        assert_eq!(save.center, (0.95, 0.52));
        for el in index.elements() {
            assert!((0.0..=1.0).contains(&el.center.0));
            assert!((0.0..=1.0).contains(&el.center.1));
        }
    }

    #[tokio::test]
    async fn engine_failure_yields_empty_index() {
        let locator = ElementLocator::new(Arc::new(BrokenRecognizer), 0.0);
        assert!(locator.locate(&snapshot(100, 100)).await.is_empty());
    }

    #[test]
    fn low_confidence_regions_are_filtered() {
        let regions = vec![
            region("sure", 0.0, 0.0, 10.0, 10.0, 0.8),
            region("maybe", 0.0, 20.0, 10.0, 30.0, 0.2),
        ];
        let index = build_index(&regions, 100, 100, 0.5);
        assert_eq!(index.len(), 1);
        assert_eq!(index.elements()[0].label, "sure");
    }
}
