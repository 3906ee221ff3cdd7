use chrono::Utc;
use log::info;
use reqwest::Method;
use serde_json::Value;

use crate::config::AppConfig;
use crate::models::instagram::{Profile, SamplePost};

use super::{RequestEngine, ScraperError};

const PROFILE_ENDPOINT: &str = "https://i.instagram.com/api/v1/users/web_profile_info/";

pub struct ProfileScraper {
    engine: RequestEngine,
}

impl ProfileScraper {
    pub fn new(config: AppConfig) -> Result<Self, ScraperError> {
        Ok(Self {
            engine: RequestEngine::new(config)?,
        })
    }

    pub async fn scrape(&mut self, username: &str) -> Result<Profile, ScraperError> {
        info!("Scraping profile: {}", username);

        let response = self
            .engine
            .execute(
                Method::GET,
                PROFILE_ENDPOINT,
                Some(&[("username", username)]),
                None,
                None,
            )
            .await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ScraperError::ParsingError(format!("invalid JSON payload: {}", err)))?;

        parse_profile(&payload)
    }
}

pub(crate) fn parse_profile(payload: &Value) -> Result<Profile, ScraperError> {
    let user = payload
        .pointer("/data/user")
        .filter(|user| !user.is_null())
        .ok_or(ScraperError::ProfileNotFound)?;

    let id = required_str(user, "id")?;
    let username = required_str(user, "username")?;
    let followers = required_count(user, "edge_followed_by")?;
    let following = required_count(user, "edge_follow")?;

    let timeline = user.get("edge_owner_to_timeline_media");
    let posts_count = timeline
        .and_then(|media| media.get("count"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let mut sample_posts = Vec::new();
    if let Some(edges) = timeline
        .and_then(|media| media.get("edges"))
        .and_then(Value::as_array)
    {
        for edge in edges {
            sample_posts.push(parse_sample_post(edge)?);
        }
    }

    Ok(Profile {
        id,
        username,
        full_name: optional_str(user, "full_name"),
        biography: optional_str(user, "biography"),
        followers,
        following,
        posts_count,
        is_private: user
            .get("is_private")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        profile_pic_url: optional_str(user, "profile_pic_url"),
        external_url: user
            .get("external_url")
            .and_then(Value::as_str)
            .map(str::to_string),
        sample_posts,
        scraped_at: Utc::now(),
    })
}

fn parse_sample_post(edge: &Value) -> Result<SamplePost, ScraperError> {
    let node = edge
        .get("node")
        .ok_or_else(|| ScraperError::ParsingError("timeline edge missing node".to_string()))?;

    Ok(SamplePost {
        shortcode: required_str(node, "shortcode")?,
        caption: caption_text(node),
        likes: node
            .pointer("/edge_media_preview_like/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ScraperError::ParsingError("sample post missing like count".to_string()))?,
        timestamp: node
            .get("taken_at_timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| ScraperError::ParsingError("sample post missing timestamp".to_string()))?,
    })
}

/// First caption edge text, or empty string when the post has no caption.
pub(crate) fn caption_text(node: &Value) -> String {
    node.pointer("/edge_media_to_caption/edges/0/node/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn required_str(value: &Value, key: &str) -> Result<String, ScraperError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ScraperError::ParsingError(format!("missing required field '{}'", key)))
}

fn optional_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn required_count(value: &Value, key: &str) -> Result<u64, ScraperError> {
    value
        .get(key)
        .and_then(|edge| edge.get("count"))
        .and_then(Value::as_u64)
        .ok_or_else(|| ScraperError::ParsingError(format!("missing count under '{}'", key)))
}
