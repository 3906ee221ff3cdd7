use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::models::instagram::MediaAsset;

use super::{fallback, RequestEngine, ScraperError};

const GRAPHQL_ENDPOINT: &str = "https://www.instagram.com/graphql/query";
const DOC_ID_POST: &str = "8845758582119845";

/// Known-public profile page requested once per resolution, purely to
/// harvest a csrftoken cookie for the GraphQL call.
const CSRF_SEED_URL: &str = "https://www.instagram.com/nasa/";
const DUMMY_CSRF_TOKEN: &str = "dummy_csrf";

pub struct MediaScraper {
    engine: RequestEngine,
}

impl MediaScraper {
    pub fn new(config: AppConfig) -> Result<Self, ScraperError> {
        Ok(Self {
            engine: RequestEngine::new(config)?,
        })
    }

    /// Resolve the media URLs behind a post. The GraphQL path is tried
    /// first; any primary failure, whatever its kind, triggers the generic
    /// extractor fallback. When both paths fail the surfaced error carries
    /// both failure details.
    pub async fn scrape(&mut self, shortcode: &str) -> Result<MediaAsset, ScraperError> {
        info!("Resolving media for post {}", shortcode);

        let primary_err = match self.primary(shortcode).await {
            Ok(asset) => return Ok(asset),
            Err(err) => err,
        };

        warn!(
            "Primary media resolution failed for {} ({}), trying extractor fallback",
            shortcode, primary_err
        );

        match fallback::extract(shortcode).await {
            Ok(asset) => Ok(asset),
            Err(fallback_err) => Err(ScraperError::MediaResolutionFailed {
                primary: primary_err.to_string(),
                fallback: fallback_err.to_string(),
            }),
        }
    }

    async fn primary(&mut self, shortcode: &str) -> Result<MediaAsset, ScraperError> {
        let seed = self
            .engine
            .execute(Method::GET, CSRF_SEED_URL, None, None, None)
            .await?;

        let csrf_token = seed
            .cookies()
            .find(|cookie| cookie.name() == "csrftoken")
            .map(|cookie| cookie.value().to_string())
            .unwrap_or_else(|| DUMMY_CSRF_TOKEN.to_string());
        self.engine.set_csrf_token(csrf_token);

        let variables = json!({ "shortcode": shortcode }).to_string();
        let body = format!(
            "variables={}&doc_id={}",
            urlencoding::encode(&variables),
            DOC_ID_POST
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let response = self
            .engine
            .execute(Method::POST, GRAPHQL_ENDPOINT, None, Some(&body), Some(headers))
            .await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ScraperError::ParsingError(format!("invalid JSON payload: {}", err)))?;

        parse_media(shortcode, &payload)
    }
}

/// Parse the GraphQL media payload. A video post yields its direct video
/// URLs; a carousel yields one URL per child, preferring video; a single
/// image yields its display URL. Anything else is a parse failure.
pub(crate) fn parse_media(shortcode: &str, payload: &Value) -> Result<MediaAsset, ScraperError> {
    if let Some(errors) = payload.get("errors") {
        return Err(ScraperError::ParsingError(format!(
            "GraphQL error: {}",
            errors
        )));
    }

    let data = payload
        .pointer("/data/xdt_shortcode_media")
        .filter(|media| !media.is_null())
        .ok_or_else(|| {
            ScraperError::ParsingError("response missing xdt_shortcode_media".to_string())
        })?;

    let mut media_urls = Vec::new();

    if let Some(url) = data.get("video_url").and_then(Value::as_str) {
        media_urls.push(url.to_string());
    } else if let Some(versions) = data.get("video_versions").and_then(Value::as_array) {
        for version in versions {
            if let Some(url) = version.get("url").and_then(Value::as_str) {
                media_urls.push(url.to_string());
            }
        }
    } else if let Some(children) = data
        .pointer("/edge_sidecar_to_children/edges")
        .and_then(Value::as_array)
    {
        for child in children {
            let node = child.get("node").ok_or_else(|| {
                ScraperError::ParsingError("carousel child missing node".to_string())
            })?;
            if let Some(url) = node.get("video_url").and_then(Value::as_str) {
                media_urls.push(url.to_string());
            } else if let Some(url) = node.pointer("/video_versions/0/url").and_then(Value::as_str)
            {
                media_urls.push(url.to_string());
            } else if let Some(url) = node.get("display_url").and_then(Value::as_str) {
                media_urls.push(url.to_string());
            }
        }
    } else if let Some(url) = data.get("display_url").and_then(Value::as_str) {
        media_urls.push(url.to_string());
    }

    if media_urls.is_empty() {
        return Err(ScraperError::ParsingError(
            "no media URLs found in response".to_string(),
        ));
    }

    let is_video = data
        .get("video_url")
        .map_or(false, |url| !url.is_null())
        || data
            .get("video_versions")
            .map_or(false, |versions| !versions.is_null());

    Ok(MediaAsset {
        shortcode: shortcode.to_string(),
        media_urls,
        thumbnail_url: data
            .get("thumbnail_src")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        is_video,
    })
}
