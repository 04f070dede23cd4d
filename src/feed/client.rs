//! Feed client: fetches a feed over HTTP and parses it into items.
//!
//! The HTTP client enforces SSRF checks on the URL, timeouts, a redirect
//! limit and a body size limit before handing the bytes to feed-rs.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use tracing::debug;

use crate::config::FetcherConfig;
use crate::feed::types::Item;
use crate::{RelayError, Result};

/// User agent string for feed fetching.
const USER_AGENT: &str = "feedrelay/0.1 (feed fetcher)";

/// Fetches a feed and returns its entries.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch and parse the feed at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<Item>>;
}

/// HTTP feed client backed by reqwest.
pub struct HttpFeedClient {
    client: Client,
    max_feed_size: u64,
}

impl HttpFeedClient {
    /// Create a client using the fetcher's network settings.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RelayError::Feed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, url: &str) -> Result<Vec<Item>> {
        validate_url(url)?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Feed(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RelayError::Feed(format!("HTTP error: {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(too_large(content_length, self.max_feed_size));
            }
        }

        // Content-Length can be absent or wrong, so count while streaming.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RelayError::Feed(format!("failed to read response: {}", e)))?
        {
            let total = (body.len() + chunk.len()) as u64;
            if total > self.max_feed_size {
                return Err(too_large(total, self.max_feed_size));
            }
            body.extend_from_slice(&chunk);
        }

        let items = parse_feed(&body)?;
        debug!("Fetched {} item(s) from {}", items.len(), url);
        Ok(items)
    }
}

fn too_large(size: u64, max: u64) -> RelayError {
    RelayError::Feed(format!("feed too large: {} bytes (max {} bytes)", size, max))
}

/// Validate a feed URL.
///
/// Only http/https are allowed, and the host must not be a local name or a
/// private, loopback, link-local or otherwise reserved address.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| RelayError::Feed(format!("invalid URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RelayError::Feed(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    let ip = match parsed
        .host()
        .ok_or_else(|| RelayError::Feed("URL has no host".to_string()))?
    {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(RelayError::Feed(format!("forbidden host: {}", domain)));
            }
            return Ok(());
        }
        url::Host::Ipv4(v4) => IpAddr::V4(v4),
        url::Host::Ipv6(v6) => IpAddr::V6(v6),
    };

    if is_private_ip(&ip) {
        return Err(RelayError::Feed(format!(
            "private IP address not allowed: {}",
            ip
        )));
    }
    Ok(())
}

const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".local",
    ".localhost",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // Documentation ranges
                || (a, b, c) == (192, 0, 2)
                || (a, b, c) == (198, 51, 100)
                || (a, b, c) == (203, 0, 113)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link-local
        }
    }
}

/// Parse feed bytes into items.
///
/// Entries without a link are dropped, since the link is what identifies
/// an article.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Item>> {
    let feed = parser::parse(bytes)
        .map_err(|e| RelayError::Feed(format!("failed to parse feed: {}", e)))?;

    let total = feed.entries.len();
    let items: Vec<Item> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.trim().to_string())?;
            if link.is_empty() {
                return None;
            }
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());
            let categories = entry
                .categories
                .into_iter()
                .map(|c| c.label.unwrap_or(c.term))
                .collect();

            Some(Item {
                title,
                link,
                categories,
                published_at: entry.published.or(entry.updated),
            })
        })
        .collect();

    if items.len() < total {
        debug!("Skipped {} entry(ies) without a link", total - items.len());
    }
    Ok(items)
}
