// ABOUTME: Single-pass tag scanner that flattens og:/twitter: meta tags into tuples.
// ABOUTME: Also collects author/description meta, favicons, the oEmbed discovery link and status-page avatars.

//! Structured-data tag scanner.
//!
//! Elements are visited in document order. On ordinary pages the scan stops as
//! soon as `<body>` opens, so only the head contributes. On micro-blog status
//! pages the scan continues into the body until the profile avatar image is
//! found. Markup errors never surface: the html5ever tokenizer behind
//! `scraper` recovers, and whatever was seen before the damage is kept.
//!
//! The whole document is parsed into a tree before the walk starts; only the
//! walk stops early. Cutting the input at the first `<body` would misread
//! pages whose head scripts or styles contain that text, and the tree builder
//! is what tells raw text apart from markup. Inputs are bounded by the fetch
//! size cap.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Element;
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

/// Class marking the profile avatar on status pages.
pub const AVATAR_CLASS: &str = "ProfileAvatar-image";

/// MIME type announced by oEmbed discovery links.
pub const OEMBED_LINK_TYPE: &str = "application/json+oembed";

static PROPERTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(og|twitter):([^:]*)(?::(.*))?$").unwrap());
static ICON_SIZES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)x\d+$").unwrap());
static STATUS_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/\w+/status(?:es)?/\d+").unwrap()
});

/// Whether status-page scanning rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentMode {
    /// Head-only scan.
    #[default]
    Page,
    /// Micro-blog status page: scan until the profile avatar.
    Status,
}

impl DocumentMode {
    /// Picks the mode for a source URL.
    pub fn for_url(url: &str) -> Self {
        if STATUS_URL_RE.is_match(url) {
            DocumentMode::Status
        } else {
            DocumentMode::Page
        }
    }
}

/// One `og:` or `twitter:` meta tag, split into key and optional sub-key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub sub: Option<String>,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, sub: Option<&str>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            sub: sub.map(str::to_string),
            value: value.into(),
        }
    }
}

/// Favicons keyed by declared width (or `any`), plus the resolved smallest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icons {
    #[serde(flatten)]
    pub sizes: BTreeMap<String, String>,
    pub smallest: String,
}

/// Fallback signals that are not namespaced tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaTags {
    pub author: Option<String>,
    pub description: Option<String>,
    pub icon: Option<Icons>,
    pub avatar: Option<String>,
}

/// Everything one scan produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedTags {
    pub og: Vec<Tag>,
    pub twitter: Vec<Tag>,
    pub meta: MetaTags,
    pub oembed_link: Option<String>,
}

/// Scans `document` and returns its structured-data tags.
///
/// `base` resolves relative `<link href>` values.
pub fn scan(document: &str, base: &str, mode: DocumentMode) -> ScannedTags {
    let html = Html::parse_document(document);
    let mut scanner = Scanner::new(base, mode);

    for node in html.tree.root().descendants() {
        if let Some(element) = node.value().as_element() {
            if scanner.visit(element).is_break() {
                break;
            }
        }
    }

    scanner.finish()
}

fn non_empty_attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element.attr(name).filter(|v| !v.is_empty())
}

struct Scanner {
    base: Option<Url>,
    mode: DocumentMode,
    tags: ScannedTags,
    icons: BTreeMap<String, String>,
    smallest_icon: Option<u32>,
}

impl Scanner {
    fn new(base: &str, mode: DocumentMode) -> Self {
        Self {
            base: Url::parse(base).ok(),
            mode,
            tags: ScannedTags::default(),
            icons: BTreeMap::new(),
            smallest_icon: None,
        }
    }

    fn visit(&mut self, element: &Element) -> ControlFlow<()> {
        match element.name() {
            "meta" => {
                self.meta(element);
                ControlFlow::Continue(())
            }
            "link" => {
                self.link(element);
                ControlFlow::Continue(())
            }
            "img" if self.mode == DocumentMode::Status => {
                if element.classes().any(|c| c == AVATAR_CLASS) {
                    self.tags.meta.avatar = element.attr("src").map(str::to_string);
                    tracing::trace!("profile avatar found, stopping scan");
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            "body" if self.mode == DocumentMode::Page => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }

    fn meta(&mut self, element: &Element) {
        let property =
            non_empty_attr(element, "property").or_else(|| non_empty_attr(element, "name"));
        let value =
            non_empty_attr(element, "content").or_else(|| non_empty_attr(element, "value"));
        let (Some(property), Some(value)) = (property, value) else {
            return;
        };

        match property {
            "author" => self.tags.meta.author = Some(value.to_string()),
            "description" => self.tags.meta.description = Some(value.to_string()),
            _ => {
                if let Some(parsed) = PROPERTY_RE.captures(property) {
                    let tag = Tag::new(&parsed[2], parsed.get(3).map(|m| m.as_str()), value);
                    match &parsed[1] {
                        "og" => self.tags.og.push(tag),
                        _ => self.tags.twitter.push(tag),
                    }
                }
            }
        }
    }

    fn link(&mut self, element: &Element) {
        let (Some(href), Some(rel)) = (element.attr("href"), element.attr("rel")) else {
            return;
        };
        let Some(href) = self.resolve(href) else {
            return;
        };

        // The first recognised rel token decides what the link is.
        for token in rel.split_whitespace() {
            match token {
                "alternate" | "alternative" => {
                    if element.attr("type") == Some(OEMBED_LINK_TYPE) {
                        self.tags.oembed_link = Some(href);
                    }
                    return;
                }
                "icon" => {
                    self.icon(element.attr("sizes"), href);
                    return;
                }
                _ => {}
            }
        }
    }

    fn icon(&mut self, sizes: Option<&str>, href: String) {
        let key = match sizes {
            None | Some("any") => "any".to_string(),
            Some(sizes) => {
                let Some(width) = ICON_SIZES_RE
                    .captures(sizes)
                    .and_then(|c| c[1].parse::<u32>().ok())
                else {
                    return;
                };
                if self.smallest_icon.map_or(true, |s| width < s) {
                    self.smallest_icon = Some(width);
                }
                width.to_string()
            }
        };
        self.icons.entry(key).or_insert(href);
    }

    fn resolve(&self, href: &str) -> Option<String> {
        match &self.base {
            Some(base) => base.join(href).ok().map(String::from),
            None => Url::parse(href).ok().map(String::from),
        }
    }

    fn finish(mut self) -> ScannedTags {
        if !self.icons.is_empty() {
            let key = self
                .smallest_icon
                .map_or_else(|| "any".to_string(), |s| s.to_string());
            if let Some(smallest) = self.icons.get(&key).cloned() {
                self.tags.meta.icon = Some(Icons {
                    sizes: self.icons,
                    smallest,
                });
            }
        }
        self.tags
    }
}
