// ABOUTME: HTTP transport for documents, images and oEmbed payloads with SSRF protection.
// ABOUTME: Opens responses (200 only), enforces a content-length cap and decodes bodies by charset.

use std::collections::HashMap;
use std::net::IpAddr;

use bytes::{Bytes, BytesMut};
use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use url::Url;

use crate::error::PreviewError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

static PRIVATE_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "0.0.0.0/8",
    ]
    .iter()
    .map(|net| net.parse().unwrap())
    .collect()
});

static PRIVATE_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    ["fc00::/7", "fe80::/10"]
        .iter()
        .map(|net| net.parse().unwrap())
        .collect()
});

/// Options for fetching a resource.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
}

/// A response whose status and headers were accepted but whose body is unread.
#[derive(Debug)]
pub struct Opened {
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    response: reqwest::Response,
}

impl Opened {
    /// The lowercase MIME essence of the Content-Type header, without parameters.
    pub fn mime(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Reads the whole body, enforcing [`MAX_CONTENT_LENGTH`].
    pub async fn bytes(self) -> Result<Bytes, PreviewError> {
        self.read_capped(MAX_CONTENT_LENGTH).await
    }

    /// Streams the body chunk by chunk and gives up as soon as it exceeds `limit`.
    async fn read_capped(mut self, limit: usize) -> Result<Bytes, PreviewError> {
        if self.content_length.is_some_and(|len| len > limit as u64) {
            return Err(too_large(&self.url));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = self
            .response
            .chunk()
            .await
            .map_err(|e| request_error(&self.url, "Read", e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large(&self.url));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Reads the body and decodes it to text.
    pub async fn text(self) -> Result<String, PreviewError> {
        let content_type = self.content_type.clone();
        let body = self.bytes().await?;
        Ok(decode_body(&body, content_type.as_deref()))
    }
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Check if an IP address is in a private/reserved range.
pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => PRIVATE_V4.iter().any(|net| net.contains(ip)),
        IpAddr::V6(ip) => {
            ip.is_loopback()
                || ip.is_unspecified()
                || PRIVATE_V6.iter().any(|net| net.contains(ip))
        }
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    content_type.to_lowercase().split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|c| c.trim_matches('"').trim_matches('\'').to_string())
    })
}

fn too_large(url: &str) -> PreviewError {
    PreviewError::fetch(url, "Read", Some(anyhow::anyhow!("content too large")))
}

fn request_error(url: &str, op: &str, e: reqwest::Error) -> PreviewError {
    if e.is_timeout() {
        PreviewError::timeout(url, op, Some(e.into()))
    } else {
        PreviewError::fetch(url, op, Some(e.into()))
    }
}

/// Rejects `target` when its host is, or resolves to, a private address.
async fn check_host(url: &str, target: &Url) -> Result<(), PreviewError> {
    let Some(host) = target.host_str() else {
        return Ok(());
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let blocked = if let Ok(ip) = host.parse::<IpAddr>() {
        is_private_ip(&ip)
    } else {
        let port = target.port_or_known_default().unwrap_or(80);
        let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
            PreviewError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("DNS lookup failed for {}: {}", host, e)),
            )
        })?;
        addrs.any(|sa| is_private_ip(&sa.ip()))
    };

    if blocked {
        return Err(PreviewError::ssrf(
            url,
            "Fetch",
            Some(anyhow::anyhow!("private address {} is not allowed", host)),
        ));
    }
    Ok(())
}

/// Sends a GET for `url` and accepts the response if it is a 200. The body is
/// left unread; the size cap applies when it is read.
pub async fn open(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<Opened, PreviewError> {
    if url.is_empty() {
        return Err(PreviewError::invalid_url(url, "Fetch", None));
    }

    let parsed = Url::parse(url).map_err(|e| {
        PreviewError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PreviewError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }

    if !opts.allow_private_networks {
        check_host(url, &parsed).await?;
    }

    let mut request = client.get(parsed);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }
    let response = request
        .send()
        .await
        .map_err(|e| request_error(url, "Fetch", e))?;

    // Redirects were followed; the final hop must pass the same check.
    if !opts.allow_private_networks {
        check_host(url, response.url()).await?;
    }

    let status = response.status().as_u16();
    if status != 200 {
        return Err(PreviewError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP status {}", status)),
        ));
    }

    let content_length = response.content_length().or_else(|| {
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    });

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    Ok(Opened {
        url: url.to_string(),
        final_url: response.url().to_string(),
        content_type,
        content_length,
        response,
    })
}

/// Opens `url` and reads the whole body.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult, PreviewError> {
    let opened = open(client, url, opts).await?;
    let final_url = opened.final_url.clone();
    let content_type = opened.content_type.clone();
    let body = opened.bytes().await?;

    Ok(FetchResult {
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}
