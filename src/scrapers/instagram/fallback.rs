//! Generic public-post media extractor, used when the GraphQL path fails.
//!
//! Shells out to yt-dlp in quiet, non-interactive mode and selects the
//! downloadable URLs from its JSON dump. The subprocess is awaited through
//! tokio, so extraction never stalls concurrent resolutions.

use std::cmp::Ordering;
use std::process::Stdio;

use log::info;
use serde_json::Value;
use tokio::process::Command;

use crate::models::instagram::MediaAsset;

use super::ScraperError;

pub async fn extract(shortcode: &str) -> Result<MediaAsset, ScraperError> {
    let post_url = format!("https://www.instagram.com/p/{}/", shortcode);
    info!("Running extractor fallback for {}", post_url);

    let output = Command::new("yt-dlp")
        .args(["--dump-single-json", "--no-warnings", "--quiet"])
        .arg(&post_url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| ScraperError::ExtractorError(format!("failed to run yt-dlp: {}", err)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScraperError::ExtractorError(format!(
            "yt-dlp exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let payload: Value = serde_json::from_slice(&output.stdout)
        .map_err(|err| ScraperError::ParsingError(format!("invalid yt-dlp JSON: {}", err)))?;

    select_media(shortcode, &payload)
}

/// Pick downloadable URLs from a yt-dlp JSON dump: an explicit single
/// `url`, else one URL per `entries` item, else the best `formats`
/// variant. A post is classified as video when any selected item carries
/// a non-"none" vcodec marker.
pub(crate) fn select_media(shortcode: &str, payload: &Value) -> Result<MediaAsset, ScraperError> {
    let mut media_urls = Vec::new();
    let mut is_video = false;

    if let Some(url) = payload.get("url").and_then(Value::as_str) {
        media_urls.push(url.to_string());
        is_video = has_video_codec(payload);
    } else if let Some(entries) = payload.get("entries").and_then(Value::as_array) {
        for entry in entries {
            if let Some(url) = entry.get("url").and_then(Value::as_str) {
                media_urls.push(url.to_string());
                is_video = is_video || has_video_codec(entry);
            }
        }
    } else if let Some(formats) = payload.get("formats").and_then(Value::as_array) {
        if let Some(best) = best_video_format(formats) {
            // best_video_format only returns formats with a url
            if let Some(url) = best.get("url").and_then(Value::as_str) {
                media_urls.push(url.to_string());
                is_video = true;
            }
        } else if let Some(url) = formats
            .iter()
            .find_map(|format| format.get("url").and_then(Value::as_str))
        {
            media_urls.push(url.to_string());
        }
    }

    if media_urls.is_empty() {
        return Err(ScraperError::ExtractorError(
            "no downloadable media in extractor output".to_string(),
        ));
    }

    Ok(MediaAsset {
        shortcode: shortcode.to_string(),
        media_urls,
        thumbnail_url: payload
            .get("thumbnail")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        is_video,
    })
}

fn has_video_codec(item: &Value) -> bool {
    item.get("vcodec")
        .and_then(Value::as_str)
        .map_or(false, |vcodec| vcodec != "none")
}

fn best_video_format(formats: &[Value]) -> Option<&Value> {
    formats
        .iter()
        .filter(|format| {
            has_video_codec(format) && format.get("url").and_then(Value::as_str).is_some()
        })
        .max_by(|a, b| {
            format_quality(a)
                .partial_cmp(&format_quality(b))
                .unwrap_or(Ordering::Equal)
        })
}

fn format_quality(format: &Value) -> f64 {
    format
        .get("quality")
        .and_then(Value::as_f64)
        .or_else(|| format.get("height").and_then(Value::as_f64))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_item_with_video_codec_is_a_video() {
        let payload = json!({
            "url": "https://cdn.example.com/clip.mp4",
            "vcodec": "h264",
            "thumbnail": "https://cdn.example.com/thumb.jpg"
        });

        let asset = select_media("SCone", &payload).unwrap();
        assert!(asset.is_video);
        assert_eq!(asset.media_urls, vec!["https://cdn.example.com/clip.mp4"]);
        assert_eq!(asset.thumbnail_url, "https://cdn.example.com/thumb.jpg");
    }

    #[test]
    fn single_item_without_codec_is_an_image() {
        let payload = json!({ "url": "https://cdn.example.com/pic.jpg", "vcodec": "none" });

        let asset = select_media("SCpic", &payload).unwrap();
        assert!(!asset.is_video);
    }

    #[test]
    fn multi_item_entries_accumulate() {
        let payload = json!({
            "entries": [
                { "url": "https://cdn.example.com/1.mp4", "vcodec": "h264" },
                { "url": "https://cdn.example.com/2.jpg", "vcodec": "none" }
            ]
        });

        let asset = select_media("SCmulti", &payload).unwrap();
        assert_eq!(asset.media_urls.len(), 2);
        assert!(asset.is_video);
    }

    #[test]
    fn highest_quality_video_format_wins() {
        let payload = json!({
            "formats": [
                { "url": "https://cdn.example.com/low.mp4", "vcodec": "h264", "quality": 1.0 },
                { "url": "https://cdn.example.com/audio.m4a", "vcodec": "none", "quality": 9.0 },
                { "url": "https://cdn.example.com/high.mp4", "vcodec": "h264", "quality": 3.0 }
            ]
        });

        let asset = select_media("SCfmt", &payload).unwrap();
        assert!(asset.is_video);
        assert_eq!(asset.media_urls, vec!["https://cdn.example.com/high.mp4"]);
    }

    #[test]
    fn codecless_formats_fall_back_to_any_url() {
        let payload = json!({
            "formats": [
                { "vcodec": "none" },
                { "url": "https://cdn.example.com/only.jpg", "vcodec": "none" }
            ]
        });

        let asset = select_media("SCany", &payload).unwrap();
        assert!(!asset.is_video);
        assert_eq!(asset.media_urls, vec!["https://cdn.example.com/only.jpg"]);
    }

    #[test]
    fn empty_dump_is_an_extractor_error() {
        let payload = json!({ "id": "SCnone" });
        assert!(matches!(
            select_media("SCnone", &payload),
            Err(ScraperError::ExtractorError(_))
        ));
    }
}
