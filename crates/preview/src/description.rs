// ABOUTME: Description value object returned by every resolution path, plus its compound parts.
// ABOUTME: Includes provenance tags, thumbnail/embed blocks, the optional summary and URL shape helpers.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::tags::Icons;

static HTTP_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://.+").unwrap());

/// Fallback `type` when nothing better is known.
pub const WEBSITE: &str = "website";

/// Upstream source that contributed at least one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ogp,
    Twitter,
    Oembed,
    Resource,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Ogp => "ogp",
            Source::Twitter => "twitter",
            Source::Oembed => "oembed",
            Source::Resource => "resource",
        };
        write!(f, "{}", s)
    }
}

/// Preview image supplied by an oEmbed provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Number>,
}

/// Embeddable representation of the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Byte size, when the resource itself is the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Condensed view used by link cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Summary {
    /// Site name used for bare image resources; never shown as the summary site.
    pub const IMAGE_SITE: &'static str = "Image";

    /// Condenses `description` into a link card.
    pub fn of(description: &Description) -> Self {
        let url = description.url.clone().unwrap_or_default();
        Self {
            title: description.title.clone().unwrap_or_else(|| url.clone()),
            url,
            description: description.description.clone(),
            icon: description.icon.as_ref().map(|i| i.smallest.clone()),
            site: description
                .site_name
                .clone()
                .filter(|s| s != Self::IMAGE_SITE),
            image: description.image_urls().first().map(|u| u.to_string()),
        }
    }
}

/// The merged link preview description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icons>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<Value>,
    /// Remaining Open Graph properties (`audio`, `video`, `locale`, ...).
    #[serde(flatten)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl Default for Description {
    fn default() -> Self {
        Self {
            kind: WEBSITE.to_string(),
            custom_type: None,
            url: None,
            title: None,
            site_name: None,
            description: None,
            image: Vec::new(),
            thumbnail: None,
            embed: None,
            author: None,
            icon: None,
            avatar: None,
            app: None,
            player: None,
            twitter: None,
            properties: Map::new(),
            sources: Vec::new(),
            summary: None,
        }
    }
}

impl Description {
    /// The minimal description: `{type: "website", url}`.
    pub fn website(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Records `source` unless it is already listed.
    pub fn add_source(&mut self, source: Source) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// Image URLs in preview preference order: thumbnail, photo embed, page images.
    pub fn image_urls(&self) -> Vec<&str> {
        let mut urls = Vec::new();
        if let Some(ref thumbnail) = self.thumbnail {
            urls.push(thumbnail.url.as_str());
        }
        if let Some(ref embed) = self.embed {
            if embed.kind == "photo" {
                if let Some(ref url) = embed.url {
                    urls.push(url.as_str());
                }
            }
        }
        for image in &self.image {
            match image {
                Value::Object(object) => {
                    if let Some(Value::String(url)) = object.get("url") {
                        urls.push(url.as_str());
                    }
                }
                Value::String(url) => urls.push(url.as_str()),
                _ => {}
            }
        }
        urls
    }
}

/// Returns `url` if it has an `http(s)://` shape.
pub fn http_url(url: Option<&str>) -> Option<&str> {
    url.filter(|u| HTTP_URL_RE.is_match(u))
}

/// Returns true if `url` parses as an absolute http or https URI.
pub fn is_http_uri(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn website_serializes_minimal_shape() {
        let description = Description::website("https://example.com");
        assert_eq!(
            serde_json::to_value(&description).unwrap(),
            json!({"type": "website", "url": "https://example.com"})
        );
    }

    #[test]
    fn extra_properties_flatten_into_the_object() {
        let mut description = Description::website("https://example.com");
        description
            .properties
            .insert("locale".into(), json!({"primary": "en_US"}));
        description.add_source(Source::Ogp);
        description.add_source(Source::Ogp);

        let value = serde_json::to_value(&description).unwrap();
        assert_eq!(value["locale"], json!({"primary": "en_US"}));
        assert_eq!(value["sources"], json!(["ogp"]));
    }

    #[test]
    fn round_trips_through_json() {
        let value = json!({
            "type": "video",
            "url": "https://example.com/v",
            "embed": {"type": "video", "width": 640, "height": null, "html": "<iframe></iframe>"},
            "video": {"url": "https://example.com/v.mp4"},
            "sources": ["ogp", "oembed"],
        });
        let description: Description = serde_json::from_value(value).unwrap();
        assert_eq!(description.kind, "video");
        assert_eq!(description.embed.as_ref().unwrap().width, Some(640.into()));
        assert_eq!(description.properties["video"], json!({"url": "https://example.com/v.mp4"}));
        assert_eq!(description.sources, vec![Source::Ogp, Source::Oembed]);
    }

    #[test]
    fn image_urls_follow_preview_order() {
        let description = Description {
            thumbnail: Some(Thumbnail {
                url: "https://t".into(),
                width: None,
                height: None,
            }),
            embed: Some(Embed {
                kind: "photo".into(),
                height: None,
                width: None,
                url: Some("https://e".into()),
                html: None,
                size: None,
            }),
            image: vec![json!({"url": "https://i"})],
            ..Default::default()
        };
        assert_eq!(description.image_urls(), vec!["https://t", "https://e", "https://i"]);
        assert!(Description::default().image_urls().is_empty());
    }

    #[test]
    fn summary_condenses_the_description() {
        let description = Description {
            title: None,
            site_name: Some("Image".into()),
            image: vec![json!({"url": "https://i"}), json!({"url": "https://j"})],
            ..Description::website("https://example.com/a.png")
        };
        assert_eq!(
            Summary::of(&description),
            Summary {
                url: "https://example.com/a.png".into(),
                title: "https://example.com/a.png".into(),
                description: None,
                icon: None,
                site: None,
                image: Some("https://i".into()),
            }
        );
    }

    #[test]
    fn url_shape_checks() {
        assert_eq!(http_url(Some("https://a.b")), Some("https://a.b"));
        assert_eq!(http_url(Some("ftp://a.b")), None);
        assert_eq!(http_url(Some("https://")), None);
        assert_eq!(http_url(None), None);

        assert!(is_http_uri("http://example.com/x"));
        assert!(!is_http_uri("/relative"));
        assert!(!is_http_uri("mailto:a@b.c"));
    }
}
