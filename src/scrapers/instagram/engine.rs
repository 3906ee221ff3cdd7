use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Method, Response};
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::identity::IdentityProvider;
use crate::proxy::select_proxy;

use super::ScraperError;

/// Classification of a response status inside the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    /// 429 or 403: the current identity is burned, rotate and retry.
    SoftBlock,
    /// Any other error status: a request- or server-level problem that
    /// rotation cannot fix, surfaced immediately.
    Hard,
}

pub fn classify_status(status: reqwest::StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Ok
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::FORBIDDEN
    {
        StatusClass::SoftBlock
    } else {
        StatusClass::Hard
    }
}

/// Exponential backoff for soft blocks: 2^attempt seconds plus a random
/// jitter in [0, 1) seconds.
pub fn soft_block_backoff(attempt: u32) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_secs_f64(f64::from(2u32.pow(attempt)) + jitter)
}

/// Random delay within the configured window, used between transport-error
/// retries and between feed pages.
pub fn random_delay(min_secs: u64, max_secs: u64) -> Duration {
    let secs = rand::thread_rng().gen_range(min_secs as f64..=max_secs as f64);
    Duration::from_secs_f64(secs)
}

/// Browser-like header set sent with every request.
pub fn disguise_headers(
    user_agent: &str,
    ig_app_id: &str,
    csrf_token: Option<&str>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    if let Ok(value) = HeaderValue::from_str(ig_app_id) {
        headers.insert("x-ig-app-id", value);
    }
    headers.insert("x-ig-www-claim", HeaderValue::from_static("0"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    headers.insert(
        "X-Requested-With",
        HeaderValue::from_static("XMLHttpRequest"),
    );
    if let Some(token) = csrf_token {
        if let Ok(value) = HeaderValue::from_str(token) {
            headers.insert("x-csrftoken", value);
        }
    }

    headers
}

/// Owns one HTTP session: a reqwest client bound to the active proxy, the
/// current disguise headers and the optional CSRF token. One engine is
/// created per scraping operation and torn down with it; dropping the
/// engine closes the underlying connection pool.
pub struct RequestEngine {
    client: Client,
    headers: HeaderMap,
    csrf_token: Option<String>,
    identity: IdentityProvider,
    config: AppConfig,
}

impl RequestEngine {
    pub fn new(config: AppConfig) -> Result<Self, ScraperError> {
        let identity = IdentityProvider::new();
        let headers = disguise_headers(&identity.next_user_agent(), &config.ig_app_id, None);

        let pool = config.proxies.as_deref().unwrap_or(&[]);
        let proxy = select_proxy(pool);
        if let Some(proxy_url) = &proxy {
            debug!("Session bound to proxy {}", proxy_url);
        }

        let client = build_client(config.timeout, proxy.as_deref())?;

        Ok(Self {
            client,
            headers,
            csrf_token: None,
            identity,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Install a harvested CSRF token into the session headers. The rest of
    /// the header set is regenerated with a fresh user agent at the same
    /// time.
    pub fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = Some(token);
        self.headers = disguise_headers(
            &self.identity.next_user_agent(),
            &self.config.ig_app_id,
            self.csrf_token.as_deref(),
        );
    }

    /// Execute one logical HTTP call with bounded retries. Soft blocks
    /// (429/403) back off exponentially and rotate identity; transport
    /// errors retry with a randomized delay; any other error status is
    /// surfaced immediately.
    pub async fn execute(
        &mut self,
        method: Method,
        url: &str,
        params: Option<&[(&str, &str)]>,
        body: Option<&str>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<Response, ScraperError> {
        let max_retries = self.config.max_retries;

        for attempt in 0..max_retries {
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(self.headers.clone());
            if let Some(params) = params {
                request = request.query(params);
            }
            if let Some(body) = body {
                request = request.body(body.to_string());
            }
            if let Some(extra) = &extra_headers {
                request = request.headers(extra.clone());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    match classify_status(status) {
                        StatusClass::Ok => return Ok(response),
                        StatusClass::SoftBlock => {
                            warn!(
                                "Soft block (status {}) on attempt {}/{}",
                                status,
                                attempt + 1,
                                max_retries
                            );
                            sleep(soft_block_backoff(attempt)).await;
                            if attempt > 0 {
                                self.rotate_identity()?;
                            }
                        }
                        StatusClass::Hard => {
                            warn!("Request to {} failed with status {}", url, status);
                            return Err(ScraperError::StatusError(status));
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Transport error on attempt {}/{}: {}",
                        attempt + 1,
                        max_retries,
                        err
                    );
                    if attempt + 1 == max_retries {
                        return Err(ScraperError::NetworkError(err));
                    }
                    sleep(random_delay(
                        self.config.request_delay_min,
                        self.config.request_delay_max,
                    ))
                    .await;
                }
            }
        }

        Err(ScraperError::RetriesExhausted(max_retries))
    }

    /// Regenerate the disguise headers and, when the pool yields a proxy,
    /// replace the client with a fresh one bound to it. The old client is
    /// dropped first, closing its connection pool.
    fn rotate_identity(&mut self) -> Result<(), ScraperError> {
        self.headers = disguise_headers(
            &self.identity.next_user_agent(),
            &self.config.ig_app_id,
            self.csrf_token.as_deref(),
        );

        let pool = self.config.proxies.as_deref().unwrap_or(&[]);
        if let Some(proxy_url) = select_proxy(pool) {
            info!("Rotating session to proxy {}", proxy_url);
            self.client = build_client(self.config.timeout, Some(&proxy_url))?;
        }

        Ok(())
    }
}

fn build_client(timeout_secs: u64, proxy_url: Option<&str>) -> Result<Client, ScraperError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .cookie_store(true);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| ScraperError::ProxyError(format!("{}: {}", proxy_url, err)))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn rate_limit_and_forbidden_are_soft_blocks() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::SoftBlock
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::SoftBlock);
    }

    #[test]
    fn other_error_statuses_are_hard() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::Hard);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Hard
        );
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), StatusClass::Hard);
    }

    #[test]
    fn success_statuses_are_ok() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Ok);
        assert_eq!(classify_status(StatusCode::CREATED), StatusClass::Ok);
    }

    #[test]
    fn soft_block_backoff_grows_exponentially_with_jitter() {
        for attempt in 0..4 {
            let base = f64::from(2u32.pow(attempt));
            let backoff = soft_block_backoff(attempt).as_secs_f64();
            assert!(backoff >= base, "attempt {}: {} < {}", attempt, backoff, base);
            assert!(
                backoff < base + 1.0,
                "attempt {}: {} >= {}",
                attempt,
                backoff,
                base + 1.0
            );
        }
    }

    #[test]
    fn random_delay_stays_within_window() {
        for _ in 0..50 {
            let delay = random_delay(2, 5).as_secs_f64();
            assert!((2.0..=5.0).contains(&delay));
        }
    }

    #[test]
    fn random_delay_handles_degenerate_window() {
        assert_eq!(random_delay(3, 3).as_secs(), 3);
    }

    #[test]
    fn disguise_headers_carry_the_given_user_agent() {
        let headers = disguise_headers("test-agent/1.0", "936619743392459", None);
        assert_eq!(headers.get(USER_AGENT).unwrap(), "test-agent/1.0");
        assert_eq!(headers.get("x-ig-app-id").unwrap(), "936619743392459");
        assert_eq!(headers.get("Sec-Fetch-Site").unwrap(), "same-origin");
        assert!(headers.get("x-csrftoken").is_none());
    }

    #[test]
    fn disguise_headers_include_csrf_token_when_held() {
        let headers = disguise_headers("test-agent/1.0", "936619743392459", Some("tok123"));
        assert_eq!(headers.get("x-csrftoken").unwrap(), "tok123");
    }

    #[test]
    fn rotation_regenerates_headers_from_fresh_user_agent() {
        let identity = crate::identity::IdentityProvider::new();
        let first = disguise_headers(&identity.next_user_agent(), "936619743392459", None);
        let second = disguise_headers(&identity.next_user_agent(), "936619743392459", None);
        // Both header sets must be complete disguises regardless of which
        // agent was drawn.
        for headers in [&first, &second] {
            assert!(headers.get(USER_AGENT).is_some());
            assert!(headers.get("X-Requested-With").is_some());
        }
    }
}
