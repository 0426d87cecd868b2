use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

use crate::config::Config;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0";

/// `socks5h` keeps name resolution inside the proxy, which `.onion` hosts need.
pub fn proxy_url(address: &str) -> String {
    if address.contains("://") {
        address.to_owned()
    } else {
        format!("socks5h://{address}")
    }
}

/// Client that egresses through the configured anonymizing proxy.
///
/// Routing is only proven once [`crate::gate::verify`] has succeeded.
pub fn tor_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let proxy_url = proxy_url(&config.tor_proxy);
    let proxy = reqwest::Proxy::all(&proxy_url)
        .with_context(|| format!("configure proxy: {proxy_url}"))?;
    build_client(config.timeout, Some(proxy))
}

/// Client without a proxy; for local stubs in tests.
pub fn direct_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    build_client(timeout, None)
}

fn build_client(timeout: Duration, proxy: Option<reqwest::Proxy>) -> anyhow::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }
    builder.build().context("build http client")
}

#[cfg(test)]
mod tests {
    use super::proxy_url;

    #[test]
    fn bare_address_gets_remote_dns_socks_scheme() {
        assert_eq!(proxy_url("127.0.0.1:9050"), "socks5h://127.0.0.1:9050");
        assert_eq!(proxy_url("socks5://tor:9150"), "socks5://tor:9150");
    }

    #[test]
    fn builds_proxied_client() {
        let config = crate::config::Config::default();
        assert!(super::tor_client(&config).is_ok());
    }
}
