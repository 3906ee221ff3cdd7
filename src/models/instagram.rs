use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub biography: String,
    pub followers: u64,
    pub following: u64,
    pub posts_count: u64,
    pub is_private: bool,
    pub profile_pic_url: String,
    pub external_url: Option<String>,
    pub sample_posts: Vec<SamplePost>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePost {
    pub shortcode: String,
    pub caption: String,
    pub likes: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub shortcode: String,
    pub caption: String,
    pub likes: u64,
    pub comments: u64,
    pub timestamp: i64,
    pub is_video: bool,
    pub media_type: String,
    pub accessibility_caption: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub shortcode: String,
    pub media_urls: Vec<String>,
    pub thumbnail_url: String,
    pub is_video: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    pub index: usize,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub shortcode: String,
    pub thumbnails: Vec<PreviewItem>,
    pub is_multi: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedFile {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub shortcode: String,
    pub files: Vec<DownloadedFile>,
    pub dir: Option<String>,
    pub preview_thumbnail: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub csv: String,
    pub download: String,
}
