// ABOUTME: Reversed-label domain trie mapping URL patterns to payloads.
// ABOUTME: Backs both the whitelist gate and the oEmbed provider endpoint lookup.

//! Domain/path router.
//!
//! Patterns follow `http(s)://[www.][*.]domain[/path]`. Domains are indexed from
//! the top-level label down, so `a.b.example.com` lives at
//! `com -> example -> b -> a`. A leading `*.` marks the terminal node as a
//! wildcard, which lets a lookup for an unknown first label stop one level
//! early. Paths containing `*` compile to anchored regexes where each `*`
//! matches a run of non-`/` characters; any other path matches everything
//! under the domain.
//!
//! A router is built once and then only read, so it can be shared behind an
//! `Arc` by any number of concurrent callers.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static PATTERN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.)?(?:(\*)\.)?([^/]+)(?:/(.*))?$").unwrap()
});

#[derive(Debug, Clone)]
struct Node<T> {
    children: HashMap<String, Node<T>>,
    wildcard: bool,
    any_path: bool,
    paths: Vec<Regex>,
    endpoint: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            wildcard: false,
            any_path: false,
            paths: Vec::new(),
            endpoint: None,
        }
    }
}

/// A URL pattern router over an opaque payload type.
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    existing: HashSet<String>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            existing: HashSet::new(),
        }
    }
}

impl<T> Router<T> {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pattern` with `payload`.
    ///
    /// Returns false when the pattern is malformed or its normalized form was
    /// already registered; nothing is changed in either case.
    pub fn add(&mut self, pattern: &str, payload: T) -> bool {
        let Some(parts) = PATTERN_RE.captures(pattern) else {
            tracing::debug!(pattern, "skipping malformed router pattern");
            return false;
        };

        let wildcard = parts.get(1).is_some();
        // Lookups compare host names only, so a port in the pattern is dropped.
        let authority = parts.get(2).map_or("", |m| m.as_str());
        let domain = authority
            .split_once(':')
            .map_or(authority, |(host, _)| host)
            .to_lowercase();
        let path = parts.get(3).map(|m| m.as_str());

        // Compile before touching the tree so a bad glob never leaves a partial entry.
        let compiled = match path {
            Some(p) if p != "*" && p.contains('*') => match compile_glob(p) {
                Some(re) => Some(re),
                None => {
                    tracing::debug!(pattern, "skipping router pattern with invalid path glob");
                    return false;
                }
            },
            _ => None,
        };

        let normalized = format!(
            "{}{}/{}",
            if wildcard { "*." } else { "" },
            domain,
            path.unwrap_or_default()
        );
        if !self.existing.insert(normalized) {
            return false;
        }

        let mut node = &mut self.root;
        for label in domain.split('.').rev() {
            node = node.children.entry(label.to_string()).or_default();
        }

        // The latest distinct pattern on a node owns its payload and wildcard flag.
        node.endpoint = Some(payload);
        node.wildcard = wildcard;

        match compiled {
            Some(re) => node.paths.push(re),
            None => node.any_path = true,
        }

        true
    }

    /// Finds the payload registered for `url`, if any.
    pub fn lookup(&self, url: &str) -> Option<&T> {
        let uri = Url::parse(url).ok()?;
        let host = uri.host_str()?;

        let mut labels: Vec<&str> = host.split('.').collect();
        if labels.first() == Some(&"www") {
            labels.remove(0);
        }

        let mut node = &self.root;
        for (i, label) in labels.iter().enumerate().rev() {
            match node.children.get(*label) {
                Some(child) => node = child,
                None if i == 0 && node.wildcard => break,
                None => return None,
            }
        }

        let endpoint = node.endpoint.as_ref()?;
        if node.any_path {
            return Some(endpoint);
        }

        let path = uri.path();
        node.paths
            .iter()
            .any(|re| re.is_match(path))
            .then_some(endpoint)
    }

    /// Returns true when `url` matches any registered pattern.
    pub fn matches(&self, url: &str) -> bool {
        self.lookup(url).is_some()
    }

    /// Number of distinct patterns registered.
    pub fn len(&self) -> usize {
        self.existing.len()
    }

    /// Returns true if no pattern was registered.
    pub fn is_empty(&self) -> bool {
        self.existing.is_empty()
    }
}

impl<S: AsRef<str>, T> FromIterator<(S, T)> for Router<T> {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut router = Router::new();
        for (pattern, payload) in iter {
            router.add(pattern.as_ref(), payload);
        }
        router
    }
}

/// A router used purely as an allow-list.
pub type Whitelist = Router<()>;

impl Whitelist {
    /// Builds an allow-list from URL patterns.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns.into_iter().map(|p| (p, ())).collect()
    }
}

/// Compiles a path glob into an anchored regex. `*` matches within one segment.
fn compile_glob(path: &str) -> Option<Regex> {
    let body = path
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^/]*");
    Regex::new(&format!("^/{}$", body)).ok()
}
