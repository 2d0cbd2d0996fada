use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors raised when a feed-supplied link is refused for fetching.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a post permalink before the page fetcher requests it.
///
/// Links come straight out of the feed, so a hostile or misconfigured feed
/// could point the fetcher at internal services. Only `http`/`https` are
/// accepted, and unless `allow_private_hosts` is set, localhost and private,
/// link-local or unspecified addresses are refused.
///
/// # Examples
///
/// ```
/// use stacksync::util::validate_fetch_url;
///
/// assert!(validate_fetch_url("https://example.substack.com/p/post", false).is_ok());
/// assert!(validate_fetch_url("http://192.168.1.1/p/post", false).is_err());
/// assert!(validate_fetch_url("http://127.0.0.1:8080/p/post", true).is_ok());
/// assert!(validate_fetch_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_fetch_url(
    url_str: &str,
    allow_private_hosts: bool,
) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if allow_private_hosts {
        return Ok(url);
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        // IPv6 hosts come back bracketed
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = bare.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
