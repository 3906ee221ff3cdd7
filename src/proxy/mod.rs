use rand::seq::SliceRandom;

const RECOGNIZED_SCHEMES: [&str; 4] = ["http://", "https://", "socks5://", "socks4://"];

/// Pick one proxy endpoint at random from the configured pool, normalized
/// to carry a recognized scheme prefix. Returns `None` when the pool is
/// empty. Pure function over an immutable pool, safe to call from
/// concurrent operations.
pub fn select_proxy(pool: &[String]) -> Option<String> {
    pool.choose(&mut rand::thread_rng())
        .map(|proxy| normalize_proxy_url(proxy))
}

/// Trim whitespace and ensure the URL carries one of the recognized
/// scheme prefixes. Bare `host:port` entries default to `http://`.
pub fn normalize_proxy_url(proxy_url: &str) -> String {
    let trimmed = proxy_url.trim();

    if RECOGNIZED_SCHEMES
        .iter()
        .any(|scheme| trimmed.starts_with(scheme))
    {
        return trimmed.to_string();
    }

    format!("http://{}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_yields_no_proxy() {
        assert_eq!(select_proxy(&[]), None);
    }

    #[test]
    fn selected_proxy_always_carries_a_recognized_scheme() {
        let pool = vec![
            "http://10.0.0.1:8080".to_string(),
            "https://10.0.0.2:443".to_string(),
            "socks5://10.0.0.3:1080".to_string(),
            "socks4://10.0.0.4:1080".to_string(),
            "10.0.0.5:3128".to_string(),
        ];

        for _ in 0..50 {
            let proxy = select_proxy(&pool).unwrap();
            assert!(
                RECOGNIZED_SCHEMES
                    .iter()
                    .any(|scheme| proxy.starts_with(scheme)),
                "unexpected proxy form: {}",
                proxy
            );
        }
    }

    #[test]
    fn bare_endpoint_defaults_to_http() {
        assert_eq!(normalize_proxy_url("10.0.0.1:3128"), "http://10.0.0.1:3128");
    }

    #[test]
    fn existing_scheme_is_preserved() {
        assert_eq!(
            normalize_proxy_url("socks5://10.0.0.1:1080"),
            "socks5://10.0.0.1:1080"
        );
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(
            normalize_proxy_url("  10.0.0.1:8080  "),
            "http://10.0.0.1:8080"
        );
    }
}
