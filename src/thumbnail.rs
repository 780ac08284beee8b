//! Blocking thumbnail fetch, run via `spawn_blocking` from the UI.

use std::time::Duration;

use eframe::egui::ColorImage;
use tracing::debug;

/// Fetch and decode the standard high-quality thumbnail for a video id.
/// Any network or decode failure is reported as `None`; a missing
/// thumbnail never affects the download itself.
pub fn fetch_thumbnail(video_id: &str) -> Option<ColorImage> {
    let url = format!("https://img.youtube.com/vi/{video_id}/hqdefault.jpg");
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .ok()?;
    let bytes = client.get(&url).send().ok()?.bytes().ok()?;
    let img = match image::load_from_memory(&bytes) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            debug!(video_id, error = %e, "thumbnail decode failed");
            return None;
        }
    };
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
