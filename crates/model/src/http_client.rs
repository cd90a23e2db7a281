use std::{sync::OnceLock, time::Duration};

use reqwest::{Client, header};

pub(crate) fn default_http_client_builder(headers: header::HeaderMap) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(Duration::from_secs(120))
        // Short idle timeout so DNS changes are picked up between calls
        // without a TTL on pooled connections.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}

/// Common HTTP client to re-use the same connections wherever no
/// provider-specific default headers are needed.
pub(crate) fn http_client() -> reqwest::Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            let mut headers = header::HeaderMap::new();
            headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));

            default_http_client_builder(headers)
                .build()
                .unwrap_or_else(|_| Client::new())
        })
        .clone()
}
