// ABOUTME: Schema-driven reducer folding flat namespace tags into a nested property tree.
// ABOUTME: Shared by the Open Graph and Twitter Card describers; enforces the adjacency grouping rule.

//! Tag assembler.
//!
//! The assembler is a small state machine: the property tree built so far and
//! the key of the last tag seen. A sub-keyed tag (`image:width`) only joins the
//! most recent entry of its key when the tag immediately before it had the same
//! key. A later `image:width` separated from its `image` by, say, `title` is
//! skipped rather than attached, even though both tags are individually valid.
//! The skipped tag still counts as the last key, so an `image:height` right
//! after it attaches again. Invalid tags close the window.

use serde_json::map::Entry;
use serde_json::{Map, Value};

use crate::tags::Tag;

/// Nested properties keyed by tag key.
pub type PropertyTree = Map<String, Value>;

/// What a key accepts after the namespace prefix.
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub key: &'static str,
    /// `None` means the key takes no sub-key at all.
    pub subs: Option<&'static [&'static str]>,
    /// Sub-key a bare value is wrapped under, making the entry an object.
    pub default: Option<&'static str>,
    /// Sub-keys that are plain synonyms of the default sub-key.
    pub default_aliases: &'static [&'static str],
}

impl KeySpec {
    /// A key that accepts no sub-key.
    pub const fn scalar(key: &'static str) -> Self {
        Self {
            key,
            subs: None,
            default: None,
            default_aliases: &[],
        }
    }

    /// A key with sub-keys whose bare value wraps into `{default: value}`.
    pub const fn object(
        key: &'static str,
        default: &'static str,
        subs: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            subs: Some(subs),
            default: Some(default),
            default_aliases: &[],
        }
    }

    /// A key that only exists through its sub-keys.
    pub const fn group(key: &'static str, subs: &'static [&'static str]) -> Self {
        Self {
            key,
            subs: Some(subs),
            default: None,
            default_aliases: &[],
        }
    }

    pub const fn with_default_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.default_aliases = aliases;
        self
    }
}

/// Per-namespace schema.
#[derive(Debug)]
pub struct Schema {
    pub keys: &'static [KeySpec],
    /// Sub-keys whose values are parsed as integers.
    pub numeric: &'static [&'static str],
    /// Sub-keys that overwrite another sub-key instead of accumulating.
    pub overwrites: &'static [(&'static str, &'static str)],
    /// Whether keys without a default sub-key open an entry from a sub-keyed
    /// tag. When false their sub-keyed tags are never stored.
    pub open_groups: bool,
}

impl Schema {
    fn get(&self, key: &str) -> Option<&KeySpec> {
        self.keys.iter().find(|spec| spec.key == key)
    }

    fn overwrite_target(&self, sub: &str) -> Option<&'static str> {
        self.overwrites
            .iter()
            .find(|(from, _)| *from == sub)
            .map(|(_, to)| *to)
    }
}

/// What happened to a sub-keyed tag.
enum Attach {
    Stored,
    /// Not stored, but the grouping window moves to this key.
    Skipped,
    /// Not stored and the window closes.
    Dropped,
}

/// Accumulator over one tag sequence.
#[derive(Debug)]
pub struct Assembler<'s> {
    schema: &'s Schema,
    tree: PropertyTree,
    last: Option<String>,
}

impl<'s> Assembler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            tree: PropertyTree::new(),
            last: None,
        }
    }

    /// Key of the last stored or skipped tag, if the grouping window is still open.
    pub fn last_key(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Folds one tag into the tree. Returns false if the tag was not stored.
    pub fn push(&mut self, tag: &Tag) -> bool {
        let schema = self.schema;
        let mut sub = tag.sub.as_deref();

        let value = match sub {
            Some(s) if schema.numeric.contains(&s) => match parse_int(&tag.value) {
                Some(n) => Value::from(n),
                None => return self.drop_tag(),
            },
            _ => Value::String(tag.value.clone()),
        };

        let Some(spec) = schema.get(&tag.key) else {
            return self.drop_tag();
        };

        match spec.subs {
            None if sub.is_some() => return self.drop_tag(),
            None => {}
            Some(allowed) => match sub.or(spec.default) {
                Some(s) if allowed.contains(&s) || spec.default_aliases.contains(&s) => {}
                _ => return self.drop_tag(),
            },
        }

        if let (Some(s), Some(default)) = (sub, spec.default) {
            if s == default || spec.default_aliases.contains(&s) {
                sub = None;
            }
        }

        let outcome = match sub {
            Some(sub) => self.attach(spec, sub, value),
            None => {
                let value = match spec.default {
                    Some(default) => {
                        let mut object = Map::new();
                        object.insert(default.to_string(), value);
                        Value::Object(object)
                    }
                    None => value,
                };
                self.append(spec.key, value);
                Attach::Stored
            }
        };

        let stored = match outcome {
            Attach::Stored => true,
            Attach::Skipped => false,
            Attach::Dropped => return self.drop_tag(),
        };
        self.last = Some(spec.key.to_string());
        stored
    }

    /// Returns the assembled tree.
    pub fn finish(self) -> PropertyTree {
        self.tree
    }

    fn drop_tag(&mut self) -> bool {
        self.last = None;
        false
    }

    fn attach(&mut self, spec: &KeySpec, sub: &str, value: Value) -> Attach {
        let schema = self.schema;
        let adjacent = self.last.as_deref() == Some(spec.key);

        if spec.default.is_none() {
            if !schema.open_groups {
                return Attach::Skipped;
            }
            if !adjacent {
                let mut object = Map::new();
                object.insert(sub.to_string(), value);
                self.append(spec.key, Value::Object(object));
                return Attach::Stored;
            }
        } else if !adjacent {
            return Attach::Skipped;
        }

        let current = match self.tree.get_mut(spec.key) {
            Some(Value::Array(items)) => items.last_mut(),
            other => other,
        };
        let Some(Value::Object(prev)) = current else {
            return Attach::Dropped;
        };

        if let Some(target) = schema.overwrite_target(sub) {
            prev.insert(target.to_string(), value);
            return Attach::Stored;
        }

        push_value(prev, sub, value);
        Attach::Stored
    }

    fn append(&mut self, key: &str, value: Value) {
        push_value(&mut self.tree, key, value);
    }
}

/// Inserts `value` under `key`, promoting an existing value to an array.
fn push_value(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(mut slot) => match slot.get_mut() {
            Value::Array(items) => items.push(value),
            existing => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        },
    }
}

/// Folds a whole tag sequence.
pub fn assemble(schema: &Schema, tags: &[Tag]) -> PropertyTree {
    let mut assembler = Assembler::new(schema);
    for tag in tags {
        assembler.push(tag);
    }
    assembler.finish()
}

/// Parses a leading integer the way lenient HTML consumers do: optional
/// whitespace and sign, then digits; trailing garbage such as `px` is ignored.
pub fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let n: i64 = digits[..end].parse().ok()?;
    Some(if negative { -n } else { n })
}

/// Returns the first string held by `value`, looking into arrays.
pub fn first_string(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(first_string),
        _ => None,
    }
}

/// Flattens a single entry or an array of entries into a list.
pub fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}
