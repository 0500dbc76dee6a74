// ABOUTME: The Engine that resolves link previews from documents or URLs.
// ABOUTME: parse() runs scan, assembly, oEmbed and merge; describe() adds fetching, dispatch and post-processing.

use std::net::ToSocketAddrs;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::description::{Description, Embed, Source, Summary};
use crate::error::PreviewError;
use crate::merge::{fill_oembed, merge};
use crate::oembed::{self, OembedSettings, ProviderRouter};
use crate::options::{EngineBuilder, Options, Providers};
use crate::resource::{self, is_private_ip, FetchOptions};
use crate::router::Whitelist;
use crate::tags::{scan, DocumentMode, ScannedTags};
use crate::{ogp, twitter};

/// Redirect hops followed before a fetch gives up.
pub const MAX_REDIRECTS: usize = 5;

static IMAGE_MIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^image/\w+$").unwrap());

/// The link preview engine.
///
/// Cheap to clone; routers and the HTTP client are shared.
#[derive(Debug, Clone)]
pub struct Engine {
    http_client: reqwest::Client,
    fetch_opts: FetchOptions,
    oembed: OembedSettings,
    whitelist: Option<Arc<Whitelist>>,
    summary: bool,
}

impl Engine {
    /// Create a new EngineBuilder for configuring the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a new Engine with the given options.
    pub fn new(opts: Options) -> Result<Self, PreviewError> {
        let http_client = match opts.http_client {
            Some(ref client) => client.clone(),
            None => build_http_client(&opts)?,
        };

        let router = match opts.providers {
            Providers::Builtin => Some(ProviderRouter::builtin()),
            Providers::Custom(ref providers) => Some(ProviderRouter::new(providers)),
            Providers::Disabled => None,
        };

        let whitelist = opts
            .whitelist
            .as_ref()
            .filter(|patterns| !patterns.is_empty())
            .map(|patterns| Arc::new(Whitelist::from_patterns(patterns)));

        Ok(Self {
            http_client,
            fetch_opts: FetchOptions {
                headers: opts.headers.clone(),
                allow_private_networks: opts.allow_private_networks,
            },
            oembed: OembedSettings {
                router: router.map(Arc::new),
                max_width: opts.max_width.filter(|w| *w > 0),
                max_height: opts.max_height.filter(|h| *h > 0),
            },
            whitelist,
            summary: opts.summary,
        })
    }

    /// Resolves the description of an already fetched HTML `document`.
    ///
    /// Never fails: with nothing to go on the result is `{type: "website", url}`.
    pub async fn parse(&self, document: &str, url: &str) -> Description {
        let ScannedTags {
            og,
            twitter: twitter_tags,
            meta,
            oembed_link,
        } = scan(document, url, DocumentMode::for_url(url));

        let assembled = async { (ogp::describe(&og), twitter::describe(&twitter_tags)) };
        let enrichment = oembed::describe(
            &self.http_client,
            &self.fetch_opts,
            &self.oembed,
            url,
            oembed_link.as_deref(),
        );
        let ((og_description, twitter_description), oembed_result) =
            tokio::join!(assembled, enrichment);

        merge(og_description, twitter_description, oembed_result, meta, url)
    }

    /// Fetches `url` and resolves its description.
    ///
    /// URLs outside the whitelist are not fetched. Transport failures fall back
    /// to provider-routed oEmbed data. Never fails.
    pub async fn describe(&self, url: &str) -> Description {
        if let Some(ref whitelist) = self.whitelist {
            if !whitelist.matches(url) {
                tracing::debug!(url, "url not whitelisted, skipping fetch");
                return self.finish(Description::website(url));
            }
        }

        let description = self.resolve(url).await;
        self.finish(description)
    }

    async fn resolve(&self, url: &str) -> Description {
        let opened = match resource::open(&self.http_client, url, &self.fetch_opts).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::debug!(url, error = %e, "resource unavailable");
                return self.unreachable(url).await;
            }
        };

        let Some(mime) = opened.mime().map(str::to_string) else {
            tracing::debug!(url, "resource has no content type");
            return self.unreachable(url).await;
        };

        if mime == "text/html" {
            return match opened.text().await {
                Ok(document) => self.parse(&document, url).await,
                Err(e) => {
                    tracing::debug!(url, error = %e, "failed to read document");
                    Description::website(url)
                }
            };
        }

        if IMAGE_MIME_RE.is_match(&mime) {
            return image_description(url, opened.content_length);
        }

        Description::website(url)
    }

    /// Description of a resource that could not be read, enriched from the provider router.
    async fn unreachable(&self, url: &str) -> Description {
        let mut description = Description::website(url);
        if self.oembed.router.is_some() {
            let result = oembed::describe(
                &self.http_client,
                &self.fetch_opts,
                &self.oembed,
                url,
                None,
            )
            .await;
            fill_oembed(&mut description, result);
        }
        description
    }

    /// Post-processing for every description `describe` returns.
    fn finish(&self, mut description: Description) -> Description {
        if description.site_name.is_none() {
            description.site_name = description.url.as_deref().and_then(site_name_for);
        }
        if self.summary {
            description.summary = Some(Summary::of(&description));
        }
        description
    }
}

fn image_description(url: &str, size: Option<u64>) -> Description {
    let mut description = Description {
        site_name: Some(Summary::IMAGE_SITE.to_string()),
        embed: Some(Embed {
            kind: "photo".to_string(),
            height: None,
            width: None,
            url: Some(url.to_string()),
            html: None,
            size,
        }),
        ..Description::website(url)
    };
    description.add_source(Source::Resource);
    description
}

/// Derives a display site name from the host: `Example` for `www.example.com`,
/// the bare host name otherwise.
fn site_name_for(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;

    let labels: Vec<&str> = host.split('.').collect();
    match labels.as_slice() {
        [.., name, "com"] => {
            let mut chars = name.chars();
            Some(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => host.to_string(),
            })
        }
        _ => Some(host.to_string()),
    }
}

fn build_http_client(opts: &Options) -> Result<reqwest::Client, PreviewError> {
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        if !allow_private {
            let next = attempt.url();
            if let Some(host) = next.host_str() {
                let port = next.port_or_known_default().unwrap_or(80);
                let host = host.trim_start_matches('[').trim_end_matches(']');
                if let Ok(ip) = host.parse::<std::net::IpAddr>() {
                    if is_private_ip(&ip) {
                        return attempt.error("redirect to private IP blocked");
                    }
                } else {
                    // synchronous DNS resolution to avoid async in redirect policy
                    match (host, port).to_socket_addrs() {
                        Ok(mut addrs) => {
                            if addrs.any(|sa| is_private_ip(&sa.ip())) {
                                return attempt.error("redirect to private IP blocked");
                            }
                        }
                        Err(_) => return attempt.error("DNS lookup failed during redirect"),
                    }
                }
            }
        }
        attempt.follow()
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .timeout(opts.timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| {
            PreviewError::fetch(
                "",
                "BuildClient",
                Some(anyhow::anyhow!("failed to build HTTP client: {}", e)),
            )
        })
}
