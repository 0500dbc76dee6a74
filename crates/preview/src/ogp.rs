// ABOUTME: Open Graph describer: schema for og: tags and conversion of the property tree to a Description.
// ABOUTME: Normalizes og:type against the known type list and drops a non-http(s) og:url.

use crate::assembler::{assemble, first_string, into_list, KeySpec, PropertyTree, Schema};
use crate::description::{is_http_uri, Description, Source, WEBSITE};
use crate::tags::Tag;

/// Open Graph key schema.
pub static OG_SCHEMA: Schema = Schema {
    keys: &[
        KeySpec::group(
            "article",
            &[
                "published_time",
                "modified_time",
                "expiration_time",
                "section",
                "tag",
            ],
        ),
        KeySpec::object("audio", "url", &["url", "secure_url", "type"]),
        KeySpec::group("book", &["isbn", "release_date", "tag"]),
        KeySpec::scalar("description"),
        KeySpec::scalar("determiner"),
        KeySpec::object(
            "image",
            "url",
            &["url", "secure_url", "width", "height", "type"],
        ),
        KeySpec::object("locale", "primary", &["primary", "alternate"]),
        KeySpec::group("music", &["duration", "release_date"]),
        KeySpec::group(
            "profile",
            &["first_name", "last_name", "username", "gender"],
        ),
        KeySpec::group(
            "restrictions",
            &["age", "country:allowed", "country:disallowed", "content"],
        ),
        KeySpec::scalar("rich_attachment"),
        KeySpec::scalar("see_also"),
        KeySpec::scalar("site_name"),
        KeySpec::scalar("title"),
        KeySpec::scalar("ttl"),
        KeySpec::scalar("type"),
        KeySpec::scalar("updated_time"),
        KeySpec::scalar("url"),
        KeySpec::object(
            "video",
            "url",
            &[
                "url",
                "secure_url",
                "width",
                "height",
                "type",
                "tag",
                "duration",
                "release_date",
            ],
        ),
    ],
    numeric: &["width", "height", "duration", "age"],
    overwrites: &[("secure_url", "url")],
    open_groups: false,
};

/// Recognized og:type values.
pub const TYPES: &[&str] = &[
    "article",
    "book",
    "books.author",
    "books.book",
    "books.genre",
    "business.business",
    "fitness.course",
    "game.achievement",
    "music",
    "music.album",
    "music.playlist",
    "music.radio_station",
    "music.song",
    "photo",
    "place",
    "product",
    "product.group",
    "product.item",
    "profile",
    "restaurant",
    "restaurant.menu",
    "restaurant.menu_item",
    "restaurant.menu_section",
    "restaurant.restaurant",
    "video",
    "video.episode",
    "video.movie",
    "video.other",
    "video.tv_show",
    "website",
];

/// Namespaces of the dotted types above.
const TYPE_NAMESPACES: &[&str] = &[
    "books",
    "business",
    "fitness",
    "game",
    "music",
    "product",
    "restaurant",
    "video",
];

/// Fallback `type` for namespaced types outside the known list.
pub const CUSTOM: &str = "custom";

/// Builds the Open Graph description from `og:` tags.
pub fn describe(tags: &[Tag]) -> Description {
    from_tree(assemble(&OG_SCHEMA, tags))
}

/// Converts an assembled Open Graph property tree into a description.
pub fn from_tree(mut tree: PropertyTree) -> Description {
    let found = !tree.is_empty();
    let mut description = Description::default();

    let raw_type = tree
        .remove("type")
        .and_then(|v| first_string(&v).map(str::to_string));
    let (kind, custom_type) = normalize_type(raw_type.as_deref());
    description.kind = kind;
    description.custom_type = custom_type;

    description.title = take_string(&mut tree, "title");
    description.description = take_string(&mut tree, "description");
    description.site_name = take_string(&mut tree, "site_name");
    description.url = take_string(&mut tree, "url").filter(|u| is_http_uri(u));
    description.image = tree.remove("image").map(into_list).unwrap_or_default();
    description.properties = tree;

    if found {
        description.add_source(Source::Ogp);
    }
    description
}

/// Maps a raw og:type to `(type, custom_type)`.
///
/// `foo:bar` keeps the original as `custom_type` and becomes `bar` when that is a
/// known type, else `custom`. A dotted type in a known namespace that is not
/// itself known (`music.custom_x`) is treated the same way.
pub fn normalize_type(raw: Option<&str>) -> (String, Option<String>) {
    let Some(raw) = raw else {
        return (WEBSITE.to_string(), None);
    };

    if raw.contains(':') {
        let last = raw.rsplit(':').next().unwrap_or_default();
        let kind = if TYPES.contains(&last) { last } else { CUSTOM };
        return (kind.to_string(), Some(raw.to_string()));
    }

    if TYPES.contains(&raw) {
        return (raw.to_string(), None);
    }

    match raw.split_once('.') {
        Some((namespace, _)) if TYPE_NAMESPACES.contains(&namespace) => {
            (CUSTOM.to_string(), Some(raw.to_string()))
        }
        _ => (WEBSITE.to_string(), None),
    }
}

fn take_string(tree: &mut PropertyTree, key: &str) -> Option<String> {
    tree.remove(key)
        .and_then(|v| first_string(&v).map(str::to_string))
        .filter(|s| !s.is_empty())
}
