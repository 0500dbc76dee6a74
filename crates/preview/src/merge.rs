// ABOUTME: Merges Open Graph, Twitter, oEmbed and meta-fallback descriptions into one.
// ABOUTME: Earlier sources win for singular fields; each contributing source is recorded once.

use crate::description::{http_url, Description, Source};
use crate::oembed::OembedResult;
use crate::tags::MetaTags;
use crate::twitter::TwitterDescription;

/// Combines the per-source descriptions of `url`.
///
/// The Open Graph description is the base. Singular fields are only filled
/// when still empty, in this order: oEmbed `site_name`; Twitter `description`,
/// `title`, `image`; meta `description`, `author`, `icon`, `avatar`. The
/// compound oEmbed blocks (`thumbnail`, `embed`) and Twitter blocks (`app`,
/// `player`, `twitter`) overwrite whatever is there.
pub fn merge(
    og: Description,
    twitter: TwitterDescription,
    oembed: OembedResult,
    meta: MetaTags,
    url: &str,
) -> Description {
    let mut description = og;

    let resolved = http_url(description.url.as_deref())
        .or_else(|| http_url(oembed.url.as_deref()))
        .unwrap_or(url)
        .to_string();
    description.url = Some(resolved);

    if fill(&mut description.site_name, oembed.site_name) {
        description.add_source(Source::Oembed);
    }

    let mut used = fill(&mut description.description, twitter.description);
    used |= fill(&mut description.title, twitter.title);
    if description.image.is_empty() && !twitter.image.is_empty() {
        description.image = twitter.image;
        used = true;
    }
    if used {
        description.add_source(Source::Twitter);
    }

    let mut used = fill(&mut description.description, meta.description);
    used |= fill(&mut description.author, meta.author);
    used |= fill(&mut description.icon, meta.icon);
    used |= fill(&mut description.avatar, meta.avatar);
    if used {
        description.add_source(Source::Resource);
    }

    let mut used = copy(&mut description.thumbnail, oembed.thumbnail);
    used |= copy(&mut description.embed, oembed.embed);
    if used {
        description.add_source(Source::Oembed);
    }

    let mut used = copy(&mut description.app, twitter.app);
    used |= copy(&mut description.player, twitter.player);
    used |= copy(&mut description.twitter, twitter.twitter);
    if used {
        description.add_source(Source::Twitter);
    }

    description
}

/// Fills `site_name`, `thumbnail` and `embed` from oEmbed alone, for resources
/// whose own content could not be read.
pub fn fill_oembed(description: &mut Description, oembed: OembedResult) {
    let mut used = fill(&mut description.site_name, oembed.site_name);
    used |= fill(&mut description.thumbnail, oembed.thumbnail);
    used |= fill(&mut description.embed, oembed.embed);
    if used {
        description.add_source(Source::Oembed);
    }
}

/// Sets `slot` from `value` when `slot` is empty. Returns true if it did.
fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_some() || value.is_none() {
        return false;
    }
    *slot = value;
    true
}

/// Replaces `slot` with `value` when there is one. Returns true if it did.
fn copy<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}
