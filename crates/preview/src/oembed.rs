// ABOUTME: oEmbed resolver: provider routing, request URL construction, response validation and normalization.
// ABOUTME: Every failure is soft and yields an empty result; the built-in provider list is embedded JSON.

//! oEmbed enrichment.
//!
//! The request URL comes either from a discovery `<link>` found in the document
//! or from the provider router. The response must be an oEmbed 1.0 JSON object;
//! numbers may be sent as numeric strings and are normalized to JSON numbers.
//! A `link` response contributes a canonical `url`, any other type contributes
//! an `embed` block.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use url::Url;

use crate::description::{is_http_uri, Embed, Thumbnail};
use crate::error::PreviewError;
use crate::resource::{fetch, FetchOptions};
use crate::router::Router;

const BUILTIN_PROVIDERS_JSON: &str = include_str!("../data/providers.json");

const TYPES: &[&str] = &["photo", "video", "link", "rich"];
const VERSION: &str = "1.0";
const OP: &str = "OEmbed";

/// One endpoint of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemes: Option<Vec<String>>,
    pub url: String,
}

/// An oEmbed provider entry in the oembed.com registry format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    pub provider_url: String,
    pub endpoints: Vec<Endpoint>,
}

/// Loads the provider list embedded in the crate.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed.
pub fn builtin_providers() -> Vec<Provider> {
    serde_json::from_str(BUILTIN_PROVIDERS_JSON).expect("failed to parse builtin providers")
}

/// Maps resource URLs to provider endpoints.
#[derive(Debug, Clone, Default)]
pub struct ProviderRouter {
    router: Router<String>,
}

impl ProviderRouter {
    pub fn new(providers: &[Provider]) -> Self {
        let mut router = Router::new();
        for provider in providers {
            for endpoint in &provider.endpoints {
                let url = endpoint.url.replace("{format}", "json");
                match endpoint.schemes {
                    Some(ref schemes) => {
                        for scheme in schemes {
                            router.add(scheme, url.clone());
                        }
                    }
                    None => {
                        router.add(&provider.provider_url, url);
                    }
                }
            }
        }
        Self { router }
    }

    /// Router over [`builtin_providers`].
    pub fn builtin() -> Self {
        Self::new(&builtin_providers())
    }

    /// The endpoint registered for `resource`, if any.
    pub fn endpoint(&self, resource: &str) -> Option<&str> {
        self.router.lookup(resource).map(String::as_str)
    }

    /// Builds the full oEmbed request URL for `resource`.
    pub fn match_url(&self, resource: &str, settings: &OembedSettings) -> Option<String> {
        let endpoint = self.endpoint(resource)?;
        let mut url = match Url::parse(endpoint) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(endpoint, error = %e, "provider endpoint is not a valid URL");
                return None;
            }
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("url", resource);
            query.append_pair("format", "json");
            if let Some(height) = settings.max_height {
                query.append_pair("maxheight", &height.to_string());
            }
            if let Some(width) = settings.max_width {
                query.append_pair("maxwidth", &width.to_string());
            }
        }
        Some(url.into())
    }

    pub fn len(&self) -> usize {
        self.router.len()
    }

    pub fn is_empty(&self) -> bool {
        self.router.is_empty()
    }
}

/// Resolver configuration shared by every request.
#[derive(Debug, Clone, Default)]
pub struct OembedSettings {
    pub router: Option<Arc<ProviderRouter>>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// What an oEmbed response contributes to a description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OembedResult {
    pub site_name: Option<String>,
    pub thumbnail: Option<Thumbnail>,
    pub url: Option<String>,
    pub embed: Option<Embed>,
}

impl OembedResult {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Rewrites a discovery link to request JSON with the configured size limits.
pub fn rewrite_link(link: &str, settings: &OembedSettings) -> Option<String> {
    let mut url = Url::parse(link).ok()?;

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    set_pair(&mut pairs, "format", "json".to_string());
    if let Some(height) = settings.max_height {
        set_pair(&mut pairs, "maxheight", height.to_string());
    }
    if let Some(width) = settings.max_width {
        set_pair(&mut pairs, "maxwidth", width.to_string());
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
    Some(url.into())
}

fn set_pair(pairs: &mut Vec<(String, String)>, key: &str, value: String) {
    pairs.retain(|(k, _)| k != key);
    pairs.push((key.to_string(), value));
}

/// Fetches and normalizes the oEmbed description of `resource`.
///
/// `link` is the discovery link found in the document; without one the
/// provider router is consulted. No endpoint means no request.
pub async fn describe(
    client: &reqwest::Client,
    fetch_opts: &FetchOptions,
    settings: &OembedSettings,
    resource: &str,
    link: Option<&str>,
) -> OembedResult {
    let endpoint = link
        .and_then(|l| rewrite_link(l, settings))
        .or_else(|| {
            settings
                .router
                .as_ref()
                .and_then(|r| r.match_url(resource, settings))
        });
    let Some(endpoint) = endpoint else {
        return OembedResult::default();
    };

    match request(client, fetch_opts, &endpoint).await {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!(resource, error = %e, "oembed enrichment failed");
            OembedResult::default()
        }
    }
}

async fn request(
    client: &reqwest::Client,
    fetch_opts: &FetchOptions,
    endpoint: &str,
) -> Result<OembedResult, PreviewError> {
    let fetched = fetch(client, endpoint, fetch_opts).await?;
    let raw: Value = serde_json::from_slice(&fetched.body)
        .map_err(|e| PreviewError::decode(endpoint, OP, Some(e.into())))?;
    validate(endpoint, &raw)
}

/// Validates an oEmbed 1.0 payload and converts it to an [`OembedResult`].
pub fn validate(endpoint: &str, raw: &Value) -> Result<OembedResult, PreviewError> {
    let Value::Object(obj) = raw else {
        return Err(PreviewError::schema(endpoint, OP, "payload is not an object"));
    };
    let fields = Fields { endpoint, obj };

    let kind = fields
        .string("type")?
        .filter(|t| TYPES.contains(t))
        .ok_or_else(|| fields.error("type must be one of photo, video, link, rich"))?;
    if fields.string("version")? != Some(VERSION) {
        return Err(fields.error("version must be \"1.0\""));
    }

    let url = fields.string("url")?;
    if url.is_some_and(|u| !is_http_uri(u)) {
        return Err(fields.error("url must be an http(s) URI"));
    }
    let html = fields.string("html")?;
    let width = fields.number("width", true, false)?;
    let height = fields.number("height", true, true)?;

    match kind {
        "photo" if url.is_none() => return Err(fields.error("photo requires url")),
        "rich" | "video" if html.is_none() => {
            return Err(fields.error(format!("{} requires html", kind)))
        }
        _ => {}
    }
    if kind != "link" {
        if width.is_none() {
            return Err(fields.error("width is required"));
        }
        if !obj.contains_key("height") {
            return Err(fields.error("height is required"));
        }
    }

    let thumbnail_url = fields.string("thumbnail_url")?;
    if thumbnail_url.is_some_and(|u| !is_http_uri(u)) {
        return Err(fields.error("thumbnail_url must be an http(s) URI"));
    }
    let thumbnail_width = fields.number("thumbnail_width", true, false)?;
    let thumbnail_height = fields.number("thumbnail_height", true, false)?;
    fields.number("cache_age", false, false)?;
    for key in ["title", "author_name", "author_url", "provider_url"] {
        fields.string(key)?;
    }

    let site_name = match (fields.string("provider_name")?, fields.string("site_name")?) {
        (Some(_), Some(_)) => {
            return Err(fields.error("provider_name and site_name are both present"));
        }
        (provider_name, site_name) => provider_name.or(site_name),
    };

    let mut result = OembedResult {
        site_name: site_name.map(str::to_string),
        thumbnail: thumbnail_url.map(|u| Thumbnail {
            url: u.to_string(),
            width: thumbnail_width,
            height: thumbnail_height,
        }),
        ..Default::default()
    };

    if kind == "link" {
        result.url = url.map(str::to_string);
    } else {
        result.embed = Some(Embed {
            kind: kind.to_string(),
            height,
            width,
            url: url.map(str::to_string),
            html: html.map(str::to_string),
            size: None,
        });
    }
    Ok(result)
}

struct Fields<'a> {
    endpoint: &'a str,
    obj: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn error(&self, reason: impl std::fmt::Display) -> PreviewError {
        PreviewError::schema(self.endpoint, OP, reason)
    }

    /// An optional field that must be a non-empty string when present.
    fn string(&self, key: &str) -> Result<Option<&'a str>, PreviewError> {
        match self.obj.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.as_str())),
            Some(_) => Err(self.error(format!("{} must be a non-empty string", key))),
        }
    }

    /// An optional numeric field; numeric strings are accepted.
    fn number(
        &self,
        key: &str,
        positive: bool,
        nullable: bool,
    ) -> Result<Option<Number>, PreviewError> {
        let number = match self.obj.get(key) {
            None => return Ok(None),
            Some(Value::Null) if nullable => return Ok(None),
            Some(Value::Number(n)) => Some(n.clone()),
            Some(Value::String(s)) => parse_number(s),
            Some(_) => None,
        };
        let Some(number) = number else {
            return Err(self.error(format!("{} must be a number", key)));
        };
        if positive && number.as_f64().is_some_and(|n| n < 1.0) {
            return Err(self.error(format!("{} must be at least 1", key)));
        }
        Ok(Some(number))
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return Some(n.into());
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n.into());
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const ENDPOINT: &str = "https://publish.twitter.com/oembed";

    fn tweet() -> Value {
        json!({
            "author_name": "Sideway",
            "author_url": "https://twitter.com/sideway",
            "cache_age": "3153600000",
            "height": null,
            "html": "<blockquote class=\"twitter-tweet\"><p>First steps</p></blockquote>",
            "provider_name": "Twitter",
            "provider_url": "https://twitter.com",
            "type": "rich",
            "url": "https://twitter.com/sideway/status/626158822705401856",
            "version": "1.0",
            "width": 550
        })
    }

    fn local_fetch() -> FetchOptions {
        FetchOptions {
            allow_private_networks: true,
            ..Default::default()
        }
    }

    #[test]
    fn builtin_providers_load() {
        let providers = builtin_providers();
        assert!(providers.iter().any(|p| p.provider_name.as_deref() == Some("YouTube")));

        let router = ProviderRouter::builtin();
        assert_eq!(
            router.endpoint("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("https://www.youtube.com/oembed")
        );
        assert_eq!(
            router.endpoint("https://vimeo.com/76979871"),
            Some("https://vimeo.com/api/oembed.json")
        );
        assert_eq!(router.endpoint("https://example.com/"), None);
    }

    #[test]
    fn endpoint_without_schemes_registers_provider_url() {
        let providers: Vec<Provider> = serde_json::from_value(json!([{
            "provider_name": "Example",
            "provider_url": "https://media.example.com/",
            "endpoints": [{"url": "https://media.example.com/oembed"}]
        }]))
        .unwrap();
        let router = ProviderRouter::new(&providers);
        assert_eq!(
            router.endpoint("https://media.example.com/anything"),
            Some("https://media.example.com/oembed")
        );
    }

    #[test]
    fn match_url_adds_query() {
        let router = ProviderRouter::builtin();
        let settings = OembedSettings {
            max_width: Some(400),
            max_height: Some(300),
            ..Default::default()
        };
        let url = router
            .match_url("https://youtu.be/abc", &settings)
            .unwrap();
        assert_eq!(
            url,
            "https://www.youtube.com/oembed?url=https%3A%2F%2Fyoutu.be%2Fabc&format=json&maxheight=300&maxwidth=400"
        );
        assert_eq!(router.match_url("https://example.com/", &settings), None);
    }

    #[test]
    fn rewrite_link_forces_json() {
        let settings = OembedSettings {
            max_width: Some(640),
            ..Default::default()
        };
        let rewritten = rewrite_link(
            "https://example.com/oembed?url=https%3A%2F%2Fexample.com%2Fa&format=xml&maxwidth=100",
            &settings,
        )
        .unwrap();
        assert_eq!(
            rewritten,
            "https://example.com/oembed?url=https%3A%2F%2Fexample.com%2Fa&format=json&maxwidth=640"
        );
    }

    #[test]
    fn rich_response_becomes_embed() {
        let result = validate(ENDPOINT, &tweet()).unwrap();
        assert_eq!(result.site_name.as_deref(), Some("Twitter"));
        assert_eq!(result.url, None);
        assert_eq!(result.thumbnail, None);

        let embed = result.embed.unwrap();
        assert_eq!(embed.kind, "rich");
        assert_eq!(embed.width, Some(550.into()));
        assert_eq!(embed.height, None);
        assert_eq!(
            embed.url.as_deref(),
            Some("https://twitter.com/sideway/status/626158822705401856")
        );
        assert!(embed.html.unwrap().starts_with("<blockquote"));
    }

    #[test]
    fn link_response_contributes_url_and_thumbnail() {
        let result = validate(
            ENDPOINT,
            &json!({
                "type": "link",
                "version": "1.0",
                "url": "https://example.com/canonical",
                "thumbnail_url": "https://example.com/t.jpg",
                "thumbnail_width": "120",
                "thumbnail_height": 90
            }),
        )
        .unwrap();
        assert_eq!(result.url.as_deref(), Some("https://example.com/canonical"));
        assert_eq!(result.embed, None);
        assert_eq!(
            result.thumbnail,
            Some(Thumbnail {
                url: "https://example.com/t.jpg".into(),
                width: Some(120.into()),
                height: Some(90.into()),
            })
        );
    }

    #[test]
    fn schema_violations_are_rejected() {
        let cases = [
            json!({"type": "video", "version": "1.0", "width": 1, "height": 1}),
            json!({"type": "photo", "version": "1.0", "width": 1, "height": 1}),
            json!({"type": "photo", "version": "1.0", "url": "https://a/b.jpg", "height": 1}),
            json!({"type": "photo", "version": "1.0", "url": "https://a/b.jpg", "width": 1}),
            json!({"type": "photo", "version": "1.0", "url": "https://a/b.jpg", "width": 0, "height": 1}),
            json!({"type": "photo", "version": "1.0", "url": "ftp://a/b.jpg", "width": 1, "height": 1}),
            json!({"type": "link", "version": "2.0"}),
            json!({"type": "link"}),
            json!({"type": "audio", "version": "1.0"}),
            json!({"type": "link", "version": "1.0", "width": "wide"}),
            json!(["not", "an", "object"]),
        ];
        for case in cases {
            let err = validate(ENDPOINT, &case).expect_err(&case.to_string());
            assert!(err.is_schema(), "{}", case);
        }
    }

    #[test]
    fn site_name_accepted_directly_and_unknown_fields_tolerated() {
        let result = validate(
            ENDPOINT,
            &json!({"type": "link", "version": "1.0", "site_name": "Example", "extra": {"x": 1}}),
        )
        .unwrap();
        assert_eq!(result.site_name.as_deref(), Some("Example"));
    }

    #[test]
    fn provider_name_and_site_name_together_are_rejected() {
        let err = validate(
            ENDPOINT,
            &json!({
                "type": "link",
                "version": "1.0",
                "provider_name": "Provider",
                "site_name": "Site"
            }),
        )
        .expect_err("both names present");
        assert!(err.is_schema());
    }

    #[tokio::test]
    async fn describe_via_router() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/oembed")
                .query_param("url", "https://media.example.com/v/1")
                .query_param("format", "json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "type": "video",
                    "version": "1.0",
                    "provider_name": "Example Media",
                    "html": "<iframe src=\"https://media.example.com/e/1\"></iframe>",
                    "width": "640",
                    "height": "360"
                }));
        });

        let providers = vec![Provider {
            provider_name: Some("Example Media".into()),
            provider_url: "https://media.example.com/".into(),
            endpoints: vec![Endpoint {
                schemes: Some(vec!["https://media.example.com/v/*".into()]),
                url: server.url("/oembed"),
            }],
        }];
        let settings = OembedSettings {
            router: Some(Arc::new(ProviderRouter::new(&providers))),
            ..Default::default()
        };

        let client = reqwest::Client::new();
        let result = describe(
            &client,
            &local_fetch(),
            &settings,
            "https://media.example.com/v/1",
            None,
        )
        .await;
        mock.assert();

        assert_eq!(result.site_name.as_deref(), Some("Example Media"));
        let embed = result.embed.unwrap();
        assert_eq!(embed.kind, "video");
        assert_eq!(embed.width, Some(640.into()));
        assert_eq!(embed.height, Some(360.into()));
    }

    #[tokio::test]
    async fn describe_via_discovery_link() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/oembed")
                .query_param("format", "json")
                .query_param("maxwidth", "500");
            then.status(200).json_body(tweet());
        });

        let settings = OembedSettings {
            max_width: Some(500),
            ..Default::default()
        };
        let link = format!("{}?format=xml", server.url("/oembed"));
        let result = describe(
            &reqwest::Client::new(),
            &local_fetch(),
            &settings,
            "https://twitter.com/sideway/status/626158822705401856",
            Some(&link),
        )
        .await;
        mock.assert();
        assert_eq!(result.site_name.as_deref(), Some("Twitter"));
    }

    #[tokio::test]
    async fn failures_are_soft() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.path("/500");
            then.status(500).body("boom");
        });
        server.mock(|when, then| {
            when.path("/garbage");
            then.status(200).body("<html>not json</html>");
        });
        server.mock(|when, then| {
            when.path("/invalid");
            then.status(200).json_body(json!({"type": "video", "version": "1.0"}));
        });

        let client = reqwest::Client::new();
        let settings = OembedSettings::default();
        for path in ["/500", "/garbage", "/invalid"] {
            let link = server.url(path);
            let result = describe(
                &client,
                &local_fetch(),
                &settings,
                "https://example.com/",
                Some(&link),
            )
            .await;
            assert!(result.is_empty(), "{}", path);
        }
    }

    #[tokio::test]
    async fn no_endpoint_means_no_request() {
        let result = describe(
            &reqwest::Client::new(),
            &local_fetch(),
            &OembedSettings::default(),
            "https://example.com/",
            None,
        )
        .await;
        assert!(result.is_empty());
    }
}
