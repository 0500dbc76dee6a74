// ABOUTME: Main library entry point for the digests link preview resolver.
// ABOUTME: Re-exports the public API: Engine, EngineBuilder, Description, Options, PreviewError and the routers.

//! Link preview descriptions from Open Graph, Twitter Card, oEmbed and meta tags.
//!
//! A document is scanned once for structured-data tags. Open Graph and Twitter
//! tags are assembled into property trees while oEmbed data is fetched, and all
//! sources are merged into one [`Description`] that records which sources
//! contributed. Enrichment failures never surface; the worst case is a bare
//! `{type: "website", url}`.
//!
//! # Example
//!
//! ```no_run
//! use digests_preview::{Engine, PreviewError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PreviewError> {
//!     let engine = Engine::builder().max_width(640).summary(true).build()?;
//!     let description = engine.describe("https://example.com/article").await;
//!     println!("{}", serde_json::to_string_pretty(&description).unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod description;
pub mod engine;
pub mod error;
pub mod merge;
pub mod oembed;
pub mod ogp;
pub mod options;
pub mod resource;
pub mod router;
pub mod tags;
pub mod twitter;

pub use crate::description::{Description, Embed, Source, Summary, Thumbnail};
pub use crate::engine::Engine;
pub use crate::error::{ErrorCode, PreviewError};
pub use crate::oembed::{builtin_providers, Endpoint, OembedResult, Provider, ProviderRouter};
pub use crate::options::{EngineBuilder, Options, Providers};
pub use crate::router::{Router, Whitelist};
pub use crate::tags::{DocumentMode, Icons, MetaTags, Tag};
pub use crate::twitter::TwitterDescription;
