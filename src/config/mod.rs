use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub address: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_request_delay_min")]
    pub request_delay_min: u64,
    #[serde(default = "default_request_delay_max")]
    pub request_delay_max: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_posts_per_request")]
    pub max_posts_per_request: u32,
    #[serde(default = "default_ig_app_id")]
    pub ig_app_id: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    pub proxies: Option<Vec<String>>,
}

fn default_timeout() -> u64 {
    10
}

fn default_request_delay_min() -> u64 {
    2
}

fn default_request_delay_max() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_posts_per_request() -> u32 {
    12
}

fn default_ig_app_id() -> String {
    "936619743392459".to_string()
}

fn default_download_dir() -> String {
    "data/downloads".to_string()
}

/// Parse the PROXIES environment value: accepts a JSON array string
/// ("[\"http://a\", \"http://b\"]") or a comma-separated string ("a, b").
pub fn parse_proxy_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect();
    }

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_form() {
        let proxies = parse_proxy_list(r#"["http://10.0.0.1:8080", "socks5://10.0.0.2:1080"]"#);
        assert_eq!(
            proxies,
            vec!["http://10.0.0.1:8080", "socks5://10.0.0.2:1080"]
        );
    }

    #[test]
    fn parses_comma_separated_form() {
        let proxies = parse_proxy_list("10.0.0.1:8080, 10.0.0.2:1080 ,");
        assert_eq!(proxies, vec!["10.0.0.1:8080", "10.0.0.2:1080"]);
    }

    #[test]
    fn empty_value_yields_empty_list() {
        assert!(parse_proxy_list("").is_empty());
        assert!(parse_proxy_list("   ").is_empty());
    }
}
