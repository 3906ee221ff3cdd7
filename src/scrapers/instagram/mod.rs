pub mod engine;
pub mod fallback;
pub mod media;
pub mod posts;
pub mod profile;

use thiserror::Error;

pub use engine::RequestEngine;
pub use media::MediaScraper;
pub use posts::PostsScraper;
pub use profile::ProfileScraper;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("HTTP error status: {0}")]
    StatusError(reqwest::StatusCode),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Retries exhausted after {0} attempts")]
    RetriesExhausted(u32),

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Proxy error: {0}")]
    ProxyError(String),

    #[error("Extractor error: {0}")]
    ExtractorError(String),

    #[error("Media resolution failed. Primary: {primary}. Fallback: {fallback}")]
    MediaResolutionFailed { primary: String, fallback: String },
}
