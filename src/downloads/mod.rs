use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, SystemTime};

use chrono::Utc;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::instagram::{DownloadResponse, DownloadedFile, MediaAsset};

/// Keep at most this many timestamp directories under the download root.
const MAX_DOWNLOAD_DIRS: usize = 20;
/// Drop directories older than this regardless of count.
const MAX_DOWNLOAD_AGE: StdDuration = StdDuration::from_secs(7 * 24 * 60 * 60);

lazy_static! {
    static ref SHORTCODE_RE: Regex = Regex::new(r"/(?:p|reel)/([A-Za-z0-9_-]+)").unwrap();
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Download failed for URL {index}: {message}")]
    FetchFailed { index: usize, message: String },
}

/// Extract the post shortcode from a canonical `/p/` or `/reel/` URL.
pub fn extract_shortcode(url: &str) -> Option<String> {
    SHORTCODE_RE
        .captures(url)
        .map(|captures| captures[1].to_string())
}

/// Fetches resolved media URLs into timestamped directories under the
/// configured download root, reusing prior downloads when complete.
pub struct DownloadManager {
    root: PathBuf,
    timeout: StdDuration,
}

impl DownloadManager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            root: PathBuf::from(&config.download_dir),
            timeout: StdDuration::from_secs(config.timeout),
        }
    }

    pub async fn download(
        &self,
        shortcode: &str,
        media: &MediaAsset,
    ) -> Result<DownloadResponse, DownloadError> {
        if let Some(files) = self.find_existing(shortcode, media.media_urls.len()).await {
            info!("Reusing existing downloads for {}", shortcode);
            return Ok(DownloadResponse {
                shortcode: shortcode.to_string(),
                files,
                dir: None,
                preview_thumbnail: media.thumbnail_url.clone(),
                cached: true,
            });
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = self.root.join(&stamp);
        tokio::fs::create_dir_all(&dir).await?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let mut files = Vec::with_capacity(media.media_urls.len());
        for (i, url) in media.media_urls.iter().enumerate() {
            let index = i + 1;
            let extension = media_extension(url, media.is_video);
            let filename = format!("{}_{:03}.{}", shortcode, index, extension);

            let response = client.get(url).send().await.map_err(|err| {
                DownloadError::FetchFailed {
                    index,
                    message: err.to_string(),
                }
            })?;
            if !response.status().is_success() {
                return Err(DownloadError::FetchFailed {
                    index,
                    message: format!("status {}", response.status()),
                });
            }
            let bytes = response.bytes().await.map_err(|err| {
                DownloadError::FetchFailed {
                    index,
                    message: err.to_string(),
                }
            })?;

            tokio::fs::write(dir.join(&filename), &bytes).await?;
            info!("Downloaded {} ({} bytes)", filename, bytes.len());

            files.push(DownloadedFile {
                name: filename.clone(),
                path: format!("/downloads/{}/{}", stamp, filename),
                kind: extension,
            });
        }

        self.cleanup_old().await;

        Ok(DownloadResponse {
            shortcode: shortcode.to_string(),
            files,
            dir: Some(dir.to_string_lossy().to_string()),
            preview_thumbnail: media.thumbnail_url.clone(),
            cached: false,
        })
    }

    /// Look for a prior timestamp directory already holding every expected
    /// file for this shortcode.
    async fn find_existing(
        &self,
        shortcode: &str,
        expected_count: usize,
    ) -> Option<Vec<DownloadedFile>> {
        if expected_count == 0 {
            return None;
        }

        let mut dirs = tokio::fs::read_dir(&self.root).await.ok()?;
        while let Ok(Some(entry)) = dirs.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();

            if let Some(files) = match_complete_set(&path, &dir_name, shortcode, expected_count).await
            {
                return Some(files);
            }
        }

        None
    }

    async fn cleanup_old(&self) {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut dirs: Vec<(String, SystemTime)> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.path().is_dir() {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            dirs.push((entry.file_name().to_string_lossy().to_string(), modified));
        }

        let stale = stale_dirs(&dirs, MAX_DOWNLOAD_DIRS, MAX_DOWNLOAD_AGE, SystemTime::now());
        let mut deleted = 0usize;
        for name in stale {
            let path = self.root.join(&name);
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!("Could not delete {}: {}", path.display(), err),
            }
        }

        if deleted > 0 {
            info!("Cleanup: deleted {} old download directory(ies)", deleted);
        }
    }
}

async fn match_complete_set(
    dir: &Path,
    dir_name: &str,
    shortcode: &str,
    expected_count: usize,
) -> Option<Vec<DownloadedFile>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().to_string());
    }

    let mut files = Vec::with_capacity(expected_count);
    for index in 1..=expected_count {
        let prefix = format!("{}_{:03}.", shortcode, index);
        let name = names.iter().find(|name| name.starts_with(&prefix))?;
        let kind = name.rsplit('.').next().unwrap_or_default().to_lowercase();
        files.push(DownloadedFile {
            name: name.clone(),
            path: format!("/downloads/{}/{}", dir_name, name),
            kind,
        });
    }

    Some(files)
}

/// Directories to delete: anything beyond the newest `max_dirs`, plus
/// anything older than `max_age`.
pub(crate) fn stale_dirs(
    dirs: &[(String, SystemTime)],
    max_dirs: usize,
    max_age: StdDuration,
    now: SystemTime,
) -> Vec<String> {
    let mut sorted: Vec<(String, SystemTime)> = dirs.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    sorted
        .into_iter()
        .enumerate()
        .filter(|(rank, (_, modified))| {
            *rank >= max_dirs
                || now
                    .duration_since(*modified)
                    .map_or(false, |age| age > max_age)
        })
        .map(|(_, (name, _))| name)
        .collect()
}

/// Guess a file extension from the media URL path, defaulting by media
/// kind when the path carries none.
pub(crate) fn media_extension(url: &str, is_video: bool) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    match candidate {
        Some(ext) if !ext.is_empty() && ext.len() <= 4 && ext.chars().all(char::is_alphanumeric) => {
            ext
        }
        _ if is_video => "mp4".to_string(),
        _ => "jpg".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_shortcode_from_post_and_reel_urls() {
        assert_eq!(
            extract_shortcode("https://www.instagram.com/p/C_abc123/"),
            Some("C_abc123".to_string())
        );
        assert_eq!(
            extract_shortcode("https://www.instagram.com/reel/DQ6KvymjeLO/?igsh=x"),
            Some("DQ6KvymjeLO".to_string())
        );
        assert_eq!(extract_shortcode("https://www.instagram.com/nasa/"), None);
    }

    #[test]
    fn extension_comes_from_url_path_not_query() {
        assert_eq!(
            media_extension("https://cdn.example.com/v/clip.mp4?token=abc.def", true),
            "mp4"
        );
        assert_eq!(
            media_extension("https://cdn.example.com/img.jpg", false),
            "jpg"
        );
    }

    #[test]
    fn extensionless_urls_default_by_media_kind() {
        assert_eq!(media_extension("https://cdn.example.com/stream", true), "mp4");
        assert_eq!(media_extension("https://cdn.example.com/img", false), "jpg");
    }

    #[test]
    fn stale_dirs_keeps_newest_within_limits() {
        let now = SystemTime::now();
        let hour = StdDuration::from_secs(3600);
        let dirs = vec![
            ("new".to_string(), now - hour),
            ("newer".to_string(), now),
            ("old".to_string(), now - StdDuration::from_secs(8 * 24 * 3600)),
        ];

        let stale = stale_dirs(&dirs, 20, MAX_DOWNLOAD_AGE, now);
        assert_eq!(stale, vec!["old".to_string()]);
    }

    #[test]
    fn stale_dirs_enforces_directory_count() {
        let now = SystemTime::now();
        let dirs: Vec<(String, SystemTime)> = (0..5u64)
            .map(|i| {
                (
                    format!("dir{}", i),
                    now - StdDuration::from_secs(i * 60),
                )
            })
            .collect();

        // Keep the 3 newest (dir0..dir2); dir3 and dir4 are beyond the cap.
        let mut stale = stale_dirs(&dirs, 3, MAX_DOWNLOAD_AGE, now);
        stale.sort();
        assert_eq!(stale, vec!["dir3".to_string(), "dir4".to_string()]);
    }
}
