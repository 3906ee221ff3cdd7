use rocket::serde::json::Json;
use rocket::State;

use crate::api::ApiError;
use crate::config::AppConfig;
use crate::downloads::{extract_shortcode, DownloadManager};
use crate::models::instagram::{
    DownloadResponse, ExportResponse, MediaAsset, Post, PreviewItem, PreviewResponse, Profile,
};
use crate::scrapers::instagram::{MediaScraper, PostsScraper, ProfileScraper};

const DEFAULT_MAX_POSTS: usize = 50;
const MAX_POSTS_LIMIT: usize = 200;

#[get("/profile/<username>")]
pub async fn get_profile(
    username: &str,
    config: &State<AppConfig>,
) -> Result<Json<Profile>, ApiError> {
    let mut scraper = ProfileScraper::new(config.inner().clone())?;
    Ok(Json(scraper.scrape(username).await?))
}

#[get("/posts/<username>?<max_posts>")]
pub async fn get_posts(
    username: &str,
    max_posts: Option<usize>,
    config: &State<AppConfig>,
) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(scrape_posts(username, max_posts, config).await?))
}

#[get("/posts/<username>/export?<max_posts>")]
pub async fn export_posts(
    username: &str,
    max_posts: Option<usize>,
    config: &State<AppConfig>,
) -> Result<Json<ExportResponse>, ApiError> {
    let posts = scrape_posts(username, max_posts, config).await?;
    let csv = build_csv(&posts)?;
    let download = format!("data:text/csv;charset=utf-8,{}", csv);
    Ok(Json(ExportResponse { csv, download }))
}

#[get("/media/<shortcode>")]
pub async fn get_media(
    shortcode: &str,
    config: &State<AppConfig>,
) -> Result<Json<MediaAsset>, ApiError> {
    let mut scraper = MediaScraper::new(config.inner().clone())?;
    Ok(Json(scraper.scrape(shortcode).await?))
}

#[get("/preview/<shortcode>")]
pub async fn preview_media(
    shortcode: &str,
    config: &State<AppConfig>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let mut scraper = MediaScraper::new(config.inner().clone())?;
    let media = scraper.scrape(shortcode).await?;
    Ok(Json(build_preview(&media)))
}

#[get("/download?<url>&<shortcode>")]
pub async fn download_media(
    url: Option<String>,
    shortcode: Option<String>,
    config: &State<AppConfig>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let shortcode = match (url, shortcode) {
        (Some(url), _) => extract_shortcode(&url).ok_or_else(|| {
            ApiError::BadRequest(
                "Invalid URL; must contain /p/ or /reel/ for shortcode".to_string(),
            )
        })?,
        (None, Some(shortcode)) => shortcode,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Provide 'url' or 'shortcode' parameter".to_string(),
            ))
        }
    };

    let mut scraper = MediaScraper::new(config.inner().clone())?;
    let media = scraper.scrape(&shortcode).await?;

    let manager = DownloadManager::new(config.inner());
    Ok(Json(manager.download(&shortcode, &media).await?))
}

async fn scrape_posts(
    username: &str,
    max_posts: Option<usize>,
    config: &State<AppConfig>,
) -> Result<Vec<Post>, ApiError> {
    let max_posts = max_posts.unwrap_or(DEFAULT_MAX_POSTS).min(MAX_POSTS_LIMIT);

    // The feed walk needs the numeric user id, which only the profile
    // payload carries.
    let mut profile_scraper = ProfileScraper::new(config.inner().clone())?;
    let profile = profile_scraper.scrape(username).await?;

    let mut scraper = PostsScraper::new(config.inner().clone(), profile.id)?;
    Ok(scraper.scrape(max_posts).await?)
}

fn build_csv(posts: &[Post]) -> Result<String, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for post in posts {
        writer
            .serialize(post)
            .map_err(|err| ApiError::Internal(format!("CSV serialization failed: {}", err)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ApiError::Internal(format!("CSV serialization failed: {}", err)))?;
    String::from_utf8(bytes)
        .map_err(|err| ApiError::Internal(format!("CSV output was not UTF-8: {}", err)))
}

fn build_preview(media: &MediaAsset) -> PreviewResponse {
    let thumb_base = if media.thumbnail_url.is_empty() {
        media.media_urls.first().cloned().unwrap_or_default()
    } else {
        media.thumbnail_url.clone()
    };

    let thumbnails: Vec<PreviewItem> = media
        .media_urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let extension = crate::downloads::media_extension(url, media.is_video);
            let is_video = media.is_video || extension == "mp4" || extension == "mov";
            PreviewItem {
                index: i + 1,
                url: thumb_base.clone(),
                kind: if is_video { "video" } else { "image" }.to_string(),
                download_url: format!(
                    "/downloads/{}_{:03}.{}",
                    media.shortcode,
                    i + 1,
                    if is_video { extension } else { "jpg".to_string() }
                ),
            }
        })
        .collect();

    PreviewResponse {
        shortcode: media.shortcode.clone(),
        is_multi: thumbnails.len() > 1,
        thumbnails,
    }
}
