use async_trait::async_trait;

use crate::errors::{PilotError, PilotResult};
use crate::executor::input::pointer_location;
use crate::perception::pointer::draw_pointer;
use crate::perception::types::{ScreenshotMeta, Snapshot};

/// Source of display snapshots. Every call must reflect the display at call time.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    async fn capture(&self, include_pointer: bool) -> PilotResult<Snapshot>;
}

/// Captures the primary monitor through `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapCapturer;

impl XcapCapturer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScreenCapturer for XcapCapturer {
    async fn capture(&self, include_pointer: bool) -> PilotResult<Snapshot> {
        tokio::task::spawn_blocking(move || capture_primary(include_pointer))
            .await
            .map_err(|e| PilotError::Capture(format!("capture task join: {e}")))?
    }
}

fn capture_primary(include_pointer: bool) -> PilotResult<Snapshot> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| PilotError::Capture(format!("enumerate monitors: {e}")))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| PilotError::Capture("no display available".into()))?;

    let scale_factor = (monitor.scale_factor() as f64).max(1.0);
    let mut image = monitor
        .capture_image()
        .map_err(|e| PilotError::Capture(format!("capture primary monitor: {e}")))?;
    let (physical_width, physical_height) = image.dimensions();
    if physical_width == 0 || physical_height == 0 {
        return Err(PilotError::Capture("display returned an empty image".into()));
    }

    if include_pointer {
        match pointer_location() {
            Ok((x, y)) => {
                let px = (x as f64 * scale_factor).round() as i64;
                let py = (y as f64 * scale_factor).round() as i64;
                draw_pointer(&mut image, px, py);
            }
            Err(e) => tracing::warn!(error = %e, "pointer location unavailable, capturing without it"),
        }
    }

    let meta = ScreenshotMeta {
        scale_factor,
        physical_width,
        physical_height,
        logical_width: (physical_width as f64 / scale_factor).round() as u32,
        logical_height: (physical_height as f64 / scale_factor).round() as u32,
    };

    let mut image_bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut image_bytes), image::ImageFormat::Png)
        .map_err(|e| PilotError::Capture(format!("PNG encode: {e}")))?;

    tracing::debug!(
        phys = %format!("{physical_width}×{physical_height}"),
        scale = scale_factor,
        bytes = image_bytes.len(),
        include_pointer,
        "primary monitor captured"
    );

    Ok(Snapshot::new(image_bytes, meta))
}
