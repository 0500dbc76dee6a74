// ABOUTME: Twitter Card describer: schema for twitter: tags and the flatter description they produce.
// ABOUTME: Reshapes app tags per platform and collects card/site/creator into the twitter block.

use serde_json::{Map, Value};

use crate::assembler::{assemble, first_string, into_list, KeySpec, PropertyTree, Schema};
use crate::tags::Tag;

/// Twitter Card key schema.
pub static TWITTER_SCHEMA: Schema = Schema {
    keys: &[
        KeySpec::group(
            "app",
            &[
                "name:iphone",
                "id:iphone",
                "url:iphone",
                "name:ipad",
                "id:ipad",
                "url:ipad",
                "name:googleplay",
                "id:googleplay",
                "url:googleplay",
            ],
        ),
        KeySpec::scalar("card"),
        KeySpec::object("creator", "handle", &["handle", "id"]),
        KeySpec::scalar("description"),
        KeySpec::object("image", "url", &["url", "alt", "width", "height"])
            .with_default_aliases(&["src"]),
        KeySpec::object(
            "player",
            "url",
            &["url", "width", "height", "stream", "stream:content_type"],
        ),
        KeySpec::object("site", "handle", &["handle", "id"]),
        KeySpec::scalar("title"),
        KeySpec::scalar("url"),
    ],
    numeric: &["width", "height"],
    overwrites: &[],
    open_groups: true,
};

/// What Twitter Card tags contribute to the merged description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TwitterDescription {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Vec<Value>,
    pub app: Option<Value>,
    pub player: Option<Value>,
    pub twitter: Option<Value>,
}

impl TwitterDescription {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Builds the Twitter description from `twitter:` tags.
pub fn describe(tags: &[Tag]) -> TwitterDescription {
    from_tree(assemble(&TWITTER_SCHEMA, tags))
}

fn from_tree(mut tree: PropertyTree) -> TwitterDescription {
    let mut block = Map::new();
    if let Some(card) = take_string(&mut tree, "card") {
        block.insert("card".into(), Value::String(card));
    }
    for key in ["site", "creator"] {
        let Some(entry) = tree.remove(key).and_then(|v| into_list(v).into_iter().next()) else {
            continue;
        };
        if let Some(handle) = entry.get("handle").and_then(first_string) {
            block.insert(key.into(), Value::String(handle.to_string()));
        }
        if let Some(id) = entry.get("id").and_then(first_string) {
            block.insert(format!("{}_id", key), Value::String(id.to_string()));
        }
    }

    TwitterDescription {
        title: take_string(&mut tree, "title"),
        description: take_string(&mut tree, "description"),
        url: take_string(&mut tree, "url"),
        image: tree.remove("image").map(into_list).unwrap_or_default(),
        app: tree.remove("app").and_then(reshape_apps),
        player: tree.remove("player"),
        twitter: (!block.is_empty()).then_some(Value::Object(block)),
    }
}

/// Turns `{"name:iphone": ..}` groups into `{"iphone": {"name": ..}}`.
fn reshape_apps(value: Value) -> Option<Value> {
    let mut platforms = Map::new();
    for entry in into_list(value) {
        let Value::Object(fields) = entry else {
            continue;
        };
        for (field, value) in fields {
            let Some((name, platform)) = field.split_once(':') else {
                continue;
            };
            let Some(value) = first_string(&value) else {
                continue;
            };
            let slot = platforms
                .entry(platform.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(app) = slot {
                app.entry(name.to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }
    }
    (!platforms.is_empty()).then_some(Value::Object(platforms))
}

fn take_string(tree: &mut PropertyTree, key: &str) -> Option<String> {
    tree.remove(key)
        .and_then(|v| first_string(&v).map(str::to_string))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tw(key: &str, sub: Option<&str>, value: &str) -> Tag {
        Tag::new(key, sub, value)
    }

    #[test]
    fn card_block_collects_site_and_creator() {
        let description = describe(&[
            tw("card", None, "summary"),
            tw("site", None, "@nytimes"),
            tw("site", Some("id"), "807095"),
            tw("creator", None, "emmarieNYT"),
        ]);
        assert_eq!(
            description.twitter,
            Some(json!({
                "card": "summary",
                "site": "@nytimes",
                "site_id": "807095",
                "creator": "emmarieNYT",
            }))
        );
    }

    #[test]
    fn text_fields_and_images() {
        let description = describe(&[
            tw("title", None, "G.O.P. Opposition"),
            tw("description", None, "The House energy and water bill failed."),
            tw("image", Some("alt"), "stray alt"),
            tw("image", None, "https://static.example.com/a.jpg"),
            tw("image", Some("alt"), "The speaker"),
        ]);
        assert_eq!(description.title.as_deref(), Some("G.O.P. Opposition"));
        assert_eq!(
            description.description.as_deref(),
            Some("The House energy and water bill failed.")
        );
        assert_eq!(
            description.image,
            vec![json!({"url": "https://static.example.com/a.jpg", "alt": "The speaker"})]
        );
    }

    #[test]
    fn image_src_is_a_synonym_for_image() {
        let description = describe(&[tw("image", Some("src"), "https://example.com/i.png")]);
        assert_eq!(description.image, vec![json!({"url": "https://example.com/i.png"})]);
    }

    #[test]
    fn apps_are_grouped_by_platform() {
        let description = describe(&[
            tw("app", Some("name:googleplay"), "NYTimes"),
            tw("app", Some("id:googleplay"), "com.nytimes.android"),
            tw("app", Some("url:googleplay"), "nytimes://reader/id/100000004438278"),
            tw("app", Some("name:iphone"), "NYTimes"),
        ]);
        assert_eq!(
            description.app,
            Some(json!({
                "googleplay": {
                    "name": "NYTimes",
                    "id": "com.nytimes.android",
                    "url": "nytimes://reader/id/100000004438278",
                },
                "iphone": {"name": "NYTimes"},
            }))
        );
    }

    #[test]
    fn player_keeps_numeric_dimensions() {
        let description = describe(&[
            tw("player", None, "https://example.com/embed/1"),
            tw("player", Some("width"), "480"),
            tw("player", Some("height"), "tall"),
        ]);
        assert_eq!(
            description.player,
            Some(json!({"url": "https://example.com/embed/1", "width": 480}))
        );
    }

    #[test]
    fn no_tags_is_empty() {
        assert!(describe(&[]).is_empty());
        assert!(describe(&[tw("label1", None, "Reading time")]).is_empty());
    }
}
