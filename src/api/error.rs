use crate::downloads::DownloadError;
use crate::scrapers::instagram::ScraperError;
use rocket::http::Status;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    ScraperError(ScraperError),
    DownloadError(DownloadError),
    BadRequest(String),
    Internal(String),
}

impl From<ScraperError> for ApiError {
    fn from(error: ScraperError) -> Self {
        ApiError::ScraperError(error)
    }
}

impl From<DownloadError> for ApiError {
    fn from(error: DownloadError) -> Self {
        ApiError::DownloadError(error)
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        match self {
            ApiError::ScraperError(ScraperError::ProfileNotFound) => rocket::Response::build()
                .status(Status::NotFound)
                .sized_body(None, std::io::Cursor::new("Profile not found"))
                .ok(),
            ApiError::ScraperError(ScraperError::RetriesExhausted(attempts)) => {
                let body = json!({
                    "error": "Rate limited",
                    "message": format!("Blocked on all {} attempts, please try again later", attempts)
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::TooManyRequests)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::ScraperError(ScraperError::NetworkError(error)) => {
                let body = json!({
                    "error": "Network error",
                    "message": error.to_string()
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::ServiceUnavailable)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::ScraperError(ScraperError::ProxyError(error)) => {
                let body = json!({
                    "error": "Proxy error",
                    "message": error
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::BadGateway)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::ScraperError(ScraperError::StatusError(status)) => {
                let body = json!({
                    "error": "Upstream error",
                    "message": format!("Platform responded with status {}", status)
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::BadGateway)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::ScraperError(ScraperError::MediaResolutionFailed { primary, fallback }) => {
                let body = json!({
                    "error": "Media resolution failed",
                    "message": format!("Primary: {}. Fallback: {}", primary, fallback)
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::BadGateway)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::ScraperError(ScraperError::ParsingError(error)) => rocket::Response::build()
                .status(Status::InternalServerError)
                .sized_body(
                    None,
                    std::io::Cursor::new(format!("Error parsing platform response: {}", error)),
                )
                .ok(),
            ApiError::ScraperError(ScraperError::ExtractorError(error)) => {
                let body = json!({
                    "error": "Extractor error",
                    "message": error
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::InternalServerError)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::DownloadError(error) => {
                let body = json!({
                    "error": "Download error",
                    "message": error.to_string()
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::InternalServerError)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::BadRequest(message) => {
                let body = json!({
                    "error": "Bad request",
                    "message": message
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::BadRequest)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
            ApiError::Internal(message) => {
                let body = json!({
                    "error": "Internal error",
                    "message": message
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::InternalServerError)
                    .sized_body(None, std::io::Cursor::new(body))
                    .ok()
            }
        }
    }
}
