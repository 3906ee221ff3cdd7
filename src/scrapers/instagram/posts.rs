use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::models::instagram::Post;

use super::engine::random_delay;
use super::profile::caption_text;
use super::{RequestEngine, ScraperError};

const GRAPHQL_ENDPOINT: &str = "https://www.instagram.com/graphql/query";
const DOC_ID_FEED: &str = "9310670392322965";

pub struct PostsScraper {
    engine: RequestEngine,
    user_id: String,
}

/// One parsed page of the timeline feed.
pub(crate) struct FeedPage {
    pub posts: Vec<Post>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PostsScraper {
    pub fn new(config: AppConfig, user_id: String) -> Result<Self, ScraperError> {
        Ok(Self {
            engine: RequestEngine::new(config)?,
            user_id,
        })
    }

    /// Walk the paginated feed, accumulating posts in server order until
    /// `max_posts` is reached or the platform reports no further pages.
    pub async fn scrape(&mut self, max_posts: usize) -> Result<Vec<Post>, ScraperError> {
        info!(
            "Scraping up to {} posts for user id {}",
            max_posts, self.user_id
        );

        let mut posts: Vec<Post> = Vec::new();
        let mut cursor: Option<String> = None;

        while posts.len() < max_posts {
            let page = self.fetch_page(cursor.as_deref()).await?;
            debug!(
                "Fetched page with {} posts (has_next_page: {})",
                page.posts.len(),
                page.has_next_page
            );

            extend_bounded(&mut posts, page.posts, max_posts);

            if !page.has_next_page {
                break;
            }
            cursor = page.end_cursor;

            if posts.len() < max_posts {
                // Politeness throttle between pages, distinct from the
                // engine's own retry backoff.
                let delay = random_delay(
                    self.engine.config().request_delay_min,
                    self.engine.config().request_delay_max,
                );
                sleep(delay).await;
            }
        }

        Ok(posts)
    }

    async fn fetch_page(&mut self, cursor: Option<&str>) -> Result<FeedPage, ScraperError> {
        let variables = json!({
            "id": self.user_id,
            "first": self.engine.config().max_posts_per_request,
            "after": cursor,
        });
        let body = format!(
            "variables={}&doc_id={}",
            urlencoding::encode(&variables.to_string()),
            DOC_ID_FEED
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

        parse_feed_page(&payload)
    }
}

/// Append page posts until the requested count is reached; posts keep the
/// feed's server-defined order.
pub(crate) fn extend_bounded(posts: &mut Vec<Post>, page_posts: Vec<Post>, max_posts: usize) {
    for post in page_posts {
        if posts.len() >= max_posts {
            break;
        }
        posts.push(post);
    }
}

pub(crate) fn parse_feed_page(payload: &Value) -> Result<FeedPage, ScraperError> {
    let media = payload
        .pointer("/data/user/edge_owner_to_timeline_media")
        .ok_or_else(|| {
            ScraperError::ParsingError("feed response missing timeline media".to_string())
        })?;

    let edges = media
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| ScraperError::ParsingError("feed page missing edges".to_string()))?;

    let mut posts = Vec::with_capacity(edges.len());
    for edge in edges {
        posts.push(parse_post(edge)?);
    }

    let page_info = media
        .get("page_info")
        .ok_or_else(|| ScraperError::ParsingError("feed page missing page_info".to_string()))?;
    let has_next_page = page_info
        .get("has_next_page")
        .and_then(Value::as_bool)
        .ok_or_else(|| ScraperError::ParsingError("page_info missing has_next_page".to_string()))?;
    let end_cursor = page_info
        .get("end_cursor")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(FeedPage {
        posts,
        has_next_page,
        end_cursor,
    })
}

fn parse_post(edge: &Value) -> Result<Post, ScraperError> {
    let node = edge
        .get("node")
        .ok_or_else(|| ScraperError::ParsingError("feed edge missing node".to_string()))?;

    Ok(Post {
        shortcode: node
            .get("shortcode")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ScraperError::ParsingError("post missing shortcode".to_string()))?,
        caption: caption_text(node),
        likes: node
            .pointer("/edge_media_preview_like/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ScraperError::ParsingError("post missing like count".to_string()))?,
        comments: node
            .pointer("/edge_media_to_comment/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ScraperError::ParsingError("post missing comment count".to_string()))?,
        timestamp: node
            .get("taken_at_timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| ScraperError::ParsingError("post missing timestamp".to_string()))?,
        is_video: node
            .get("is_video")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        media_type: node
            .get("__typename")
            .and_then(Value::as_str)
            .unwrap_or("GraphImage")
            .to_string(),
        accessibility_caption: node
            .get("accessibility_caption")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_node(shortcode: &str, caption: Option<&str>) -> Value {
        let mut node = json!({
            "shortcode": shortcode,
            "edge_media_preview_like": { "count": 10 },
            "edge_media_to_comment": { "count": 2 },
            "taken_at_timestamp": 1717000000i64,
            "is_video": false,
            "__typename": "GraphImage"
        });
        if let Some(text) = caption {
            node["edge_media_to_caption"] = json!({ "edges": [{ "node": { "text": text } }] });
        }
        json!({ "node": node })
    }

    fn feed_payload(count: usize, has_next_page: bool, end_cursor: Option<&str>) -> Value {
        let edges: Vec<Value> = (0..count)
            .map(|i| feed_node(&format!("SC{:03}", i), Some("hello")))
            .collect();
        json!({
            "data": {
                "user": {
                    "edge_owner_to_timeline_media": {
                        "edges": edges,
                        "page_info": {
                            "has_next_page": has_next_page,
                            "end_cursor": end_cursor
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn parses_feed_page_with_pagination_state() {
        let page = parse_feed_page(&feed_payload(6, true, Some("cursor-1"))).unwrap();
        assert_eq!(page.posts.len(), 6);
        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("cursor-1"));
        assert_eq!(page.posts[0].shortcode, "SC000");
        assert_eq!(page.posts[0].caption, "hello");
    }

    #[test]
    fn missing_caption_defaults_to_empty_string() {
        let payload = json!({
            "data": { "user": { "edge_owner_to_timeline_media": {
                "edges": [feed_node("SCabc", None)],
                "page_info": { "has_next_page": false, "end_cursor": null }
            } } }
        });

        let page = parse_feed_page(&payload).unwrap();
        assert_eq!(page.posts[0].caption, "");
        assert_eq!(page.posts[0].accessibility_caption, "");
    }

    #[test]
    fn missing_like_count_is_a_parse_error() {
        let mut payload = feed_payload(1, false, None);
        payload["data"]["user"]["edge_owner_to_timeline_media"]["edges"][0]["node"]
            .as_object_mut()
            .unwrap()
            .remove("edge_media_preview_like");

        assert!(matches!(
            parse_feed_page(&payload),
            Err(ScraperError::ParsingError(_))
        ));
    }

    #[test]
    fn two_pages_of_six_accumulate_to_requested_ten_in_order() {
        // max_posts = 10 against two 6-item pages: the first page is taken
        // whole, the second is cut at 4.
        let first = parse_feed_page(&feed_payload(6, true, Some("cursor-1"))).unwrap();
        let second = parse_feed_page(&feed_payload(6, false, None)).unwrap();

        let mut posts = Vec::new();
        extend_bounded(&mut posts, first.posts, 10);
        assert_eq!(posts.len(), 6);
        assert!(first.has_next_page);

        extend_bounded(&mut posts, second.posts, 10);
        assert_eq!(posts.len(), 10);

        let shortcodes: Vec<&str> = posts.iter().map(|p| p.shortcode.as_str()).collect();
        assert_eq!(
            shortcodes,
            vec![
                "SC000", "SC001", "SC002", "SC003", "SC004", "SC005", "SC000", "SC001", "SC002",
                "SC003"
            ]
        );
    }
}
