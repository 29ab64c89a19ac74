//! Motion detection against an adaptive background.
//!
//! Each frame goes through:
//! 1. Per-pixel classification against the [`BackgroundModel`]
//! 2. Morphological opening (drop specks) then closing (fill holes)
//! 3. 8-connected component extraction into [`Blob`]s

mod background;
mod components;
mod config;
mod morphology;

pub use background::BackgroundModel;
pub use components::find_blobs;
pub use config::DetectorConfig;
pub use morphology::ForegroundMask;

use stagecut_models::Blob;

use crate::error::MediaResult;
use crate::frame_source::Frame;

/// Detect moving blobs in `frame`, updating `model`.
///
/// Returns no blobs while the model is warming up.
pub fn detect(model: &mut BackgroundModel, frame: &Frame) -> MediaResult<Vec<Blob>> {
    let Some(raw) = model.apply(&frame.image)? else {
        return Ok(Vec::new());
    };

    let config = model.config();
    let cleaned = raw.open(config.morph_radius).close(config.morph_radius);
    let blobs = find_blobs(&cleaned, config.min_blob_area);

    if !blobs.is_empty() {
        tracing::trace!(
            frame = frame.index,
            raw_pixels = raw.count(),
            blobs = blobs.len(),
            "Foreground detected"
        );
    }

    Ok(blobs)
}
