//! Text recognition behind a small trait so the locator can run against
//! Tesseract in production and canned regions in tests.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{PilotError, PilotResult};
use crate::perception::types::BoundingBox;

/// One recognized line of text in pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub text: String,
    pub bbox: BoundingBox,
    /// 0.0–1.0
    pub confidence: f32,
}

/// OCR engine abstraction. Implementations are blocking; the locator runs
/// them on a blocking thread.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, png_bytes: &[u8]) -> PilotResult<Vec<TextRegion>>;
}

/// Parse Tesseract TSV output (`get_tsv_text`) into line-level regions.
///
/// Word rows (level 5) are grouped by (page, block, paragraph, line); each
/// group becomes one region whose box is the union of its words and whose
/// confidence is the mean word confidence.
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<TextRegion> {
    // key → (words, bbox, confidence sum)
    let mut lines: BTreeMap<(u32, u32, u32, u32), (Vec<String>, BoundingBox, f32)> = BTreeMap::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11..].join("\t").trim().to_string();
        if text.is_empty() {
            continue;
        }
        let nums: Option<Vec<f64>> = cols[1..11].iter().map(|c| c.trim().parse::<f64>().ok()).collect();
        let Some(nums) = nums else {
            tracing::debug!(row = %row, "skipping malformed TSV row");
            continue;
        };
        let conf = nums[9];
        if conf < 0.0 {
            continue;
        }
        let key = (nums[0] as u32, nums[1] as u32, nums[2] as u32, nums[3] as u32);
        let (left, top, width, height) = (nums[5], nums[6], nums[7], nums[8]);
        let word_box = BoundingBox::new(left, top, left + width, top + height);

        let entry = lines
            .entry(key)
            .or_insert_with(|| (Vec::new(), word_box, 0.0));
        entry.0.push(text);
        entry.1 = entry.1.union(&word_box);
        entry.2 += conf as f32;
    }

    lines
        .into_values()
        .map(|(words, bbox, conf_sum)| TextRegion {
            confidence: (conf_sum / words.len() as f32 / 100.0).clamp(0.0, 1.0),
            text: words.join(" "),
            bbox,
        })
        .collect()
}

/// Tesseract-backed recognizer. Requires the `ocr` feature and a system
/// Tesseract installation with the configured language data.
#[cfg(feature = "ocr")]
pub struct TesseractRecognizer {
    language: String,
}

#[cfg(feature = "ocr")]
impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self { language: language.into() }
    }
}

#[cfg(feature = "ocr")]
impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, png_bytes: &[u8]) -> PilotResult<Vec<TextRegion>> {
        let mut tess = tesseract::Tesseract::new(None, Some(&self.language))
            .map_err(|e| PilotError::Perception(format!("Tesseract init failed: {e}")))?
            .set_image_from_mem(png_bytes)
            .map_err(|e| PilotError::Perception(format!("Failed to set image: {e}")))?
            .recognize()
            .map_err(|e| PilotError::Perception(format!("Recognition failed: {e}")))?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| PilotError::Perception(format!("TSV extraction failed: {e}")))?;
        Ok(parse_tesseract_tsv(&tsv))
    }
}

/// Stand-in used when the crate is built without an OCR engine.
pub struct UnavailableRecognizer;

impl TextRecognizer for UnavailableRecognizer {
    fn recognize(&self, _png_bytes: &[u8]) -> PilotResult<Vec<TextRegion>> {
        Err(PilotError::Perception(
            "no OCR engine compiled in (enable the `ocr` feature)".into(),
        ))
    }
}

/// The recognizer this build ships with.
pub fn default_recognizer(language: &str) -> Arc<dyn TextRecognizer> {
    #[cfg(feature = "ocr")]
    {
        Arc::new(TesseractRecognizer::new(language))
    }
    #[cfg(not(feature = "ocr"))]
    {
        tracing::debug!(language, "built without OCR support");
        Arc::new(UnavailableRecognizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn words_on_one_line_merge_into_a_region() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t1920\t1080\t-1\t\n\
             4\t1\t1\t1\t1\t0\t100\t40\t200\t20\t-1\t\n\
             5\t1\t1\t1\t1\t1\t100\t40\t80\t20\t96.0\tOpen\n\
             5\t1\t1\t1\t1\t2\t190\t42\t110\t18\t90.0\tSettings\n\
             5\t1\t2\t1\t1\t1\t500\t600\t60\t25\t80.5\tCancel\n"
        );
        let regions = parse_tesseract_tsv(&tsv);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "Open Settings");
        assert_eq!(regions[0].bbox, BoundingBox::new(100.0, 40.0, 300.0, 60.0));
        assert!((regions[0].confidence - 0.93).abs() < 1e-4);
        assert_eq!(regions[1].text, "Cancel");
    }

    #[test]
    fn blank_and_unconfident_words_are_skipped() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t10\t10\t5\t5\t-1\t \n\
             5\t1\t1\t1\t2\t1\t10\t30\t5\t5\t-1\tghost\n\
             5\t1\t1\t1\t3\t1\tx\t30\t5\t5\t50\tbroken\n"
        );
        assert!(parse_tesseract_tsv(&tsv).is_empty());
    }

    #[test]
    fn unavailable_recognizer_reports_an_error() {
        assert!(UnavailableRecognizer.recognize(&[]).is_err());
    }
}
