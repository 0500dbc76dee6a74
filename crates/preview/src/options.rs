// ABOUTME: Configuration for the preview engine: Options, the provider selection and EngineBuilder.
// ABOUTME: EngineBuilder provides a fluent API for constructing Engine instances with custom settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::engine::Engine;
use crate::error::PreviewError;
use crate::oembed::Provider;

/// User agent sent when none is configured. Many sites only emit their
/// Open Graph tags to browser-like clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/50.0.2661.102 Safari/537.36";

/// Which oEmbed providers the engine routes resource URLs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Providers {
    /// The provider list embedded in the crate.
    #[default]
    Builtin,
    /// A caller-supplied provider list.
    Custom(Vec<Provider>),
    /// No provider routing; only discovery links are followed.
    Disabled,
}

/// Configuration options for the preview engine.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    /// Sent to oEmbed endpoints as `maxwidth`.
    pub max_width: Option<u32>,
    /// Sent to oEmbed endpoints as `maxheight`.
    pub max_height: Option<u32>,
    pub providers: Providers,
    /// URL patterns allowed to be fetched. `None` allows everything.
    pub whitelist: Option<Vec<String>>,
    /// Attach a `summary` block to described resources.
    pub summary: bool,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allow_private_networks: false,
            max_width: None,
            max_height: None,
            providers: Providers::Builtin,
            whitelist: None,
            summary: false,
            http_client: None,
            headers: HashMap::new(),
        }
    }
}

/// Builder for constructing Engine instances with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    opts: Options,
}

impl EngineBuilder {
    /// Create a new EngineBuilder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    pub fn max_width(mut self, width: u32) -> Self {
        self.opts.max_width = Some(width);
        self
    }

    pub fn max_height(mut self, height: u32) -> Self {
        self.opts.max_height = Some(height);
        self
    }

    /// Route resource URLs to the given providers instead of the built-in list.
    pub fn providers(mut self, providers: Vec<Provider>) -> Self {
        self.opts.providers = Providers::Custom(providers);
        self
    }

    /// Turn provider routing off.
    pub fn disable_providers(mut self) -> Self {
        self.opts.providers = Providers::Disabled;
        self
    }

    /// Only fetch URLs matching one of `patterns`.
    pub fn whitelist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.whitelist = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a summary block to described resources.
    pub fn summary(mut self, enabled: bool) -> Self {
        self.opts.summary = enabled;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Build the Engine with the configured options.
    pub fn build(self) -> Result<Engine, PreviewError> {
        Engine::new(self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let opts = Options::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.providers, Providers::Builtin);
        assert!(opts.whitelist.is_none());
        assert!(!opts.summary);
        assert!(!opts.allow_private_networks);
    }

    #[test]
    fn builder_sets_fields() {
        let builder = EngineBuilder::new()
            .max_width(640)
            .max_height(480)
            .disable_providers()
            .whitelist(["https://*.example.com/*"])
            .summary(true)
            .header("x-test", "1");

        assert_eq!(builder.opts.max_width, Some(640));
        assert_eq!(builder.opts.max_height, Some(480));
        assert_eq!(builder.opts.providers, Providers::Disabled);
        assert_eq!(
            builder.opts.whitelist,
            Some(vec!["https://*.example.com/*".to_string()])
        );
        assert!(builder.opts.summary);
        assert_eq!(builder.opts.headers.get("x-test").map(String::as_str), Some("1"));
    }
}
