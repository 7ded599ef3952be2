//! Collision renaming: non-canonical variants get their own names.

use indexmap::IndexMap;
use regex::{Captures, Regex};
use smol_str::SmolStr;

use crate::base::{DisambiguationTag, TextRange};
use crate::syntax::DefinitionKind;

/// `"{original}_{tag}"` → the name the variant was bundled under.
///
/// Append-only. When the wrapper instantiates a collided name, every
/// variant recorded here becomes an entry point too.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameMap {
    entries: IndexMap<SmolStr, SmolStr>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(original: &str, tag: &DisambiguationTag) -> SmolStr {
        SmolStr::new(format!("{}_{}", original, tag))
    }

    /// Record a rename. An existing key keeps its first value.
    pub fn record(&mut self, original: &str, tag: &DisambiguationTag, resolved: &str) {
        self.entries
            .entry(Self::key(original, tag))
            .or_insert_with(|| SmolStr::new(resolved));
    }

    pub fn get(&self, key: &str) -> Option<&SmolStr> {
        self.entries.get(key)
    }

    pub fn contains_resolved(&self, name: &str) -> bool {
        self.entries.values().any(|v| v == name)
    }

    pub fn resolved_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.entries.values()
    }

    /// Resolved names of every recorded variant of `original`: the values
    /// whose key starts with `"{original}_"`.
    pub fn variants_of<'m>(&'m self, original: &str) -> impl Iterator<Item = &'m SmolStr> + 'm {
        let prefix = format!("{}_", original);
        self.entries
            .iter()
            .filter(move |(key, _)| key.starts_with(&prefix))
            .map(|(_, resolved)| resolved)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &SmolStr)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rename the header of a definition: the first `class Name` / `def Name`
/// occurrence only. Uses and nested definitions are left alone.
///
/// Returns `None` when no header for `name` is found.
pub fn rename_definition_header(
    text: &str,
    kind: DefinitionKind,
    name: &str,
    new_name: &str,
) -> Option<String> {
    let keyword = kind.keyword();
    let pattern = format!(r"\b{}(\s+){}\b", keyword, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    if !re.is_match(text) {
        return None;
    }
    let renamed = re.replacen(text, 1, |caps: &Captures<'_>| {
        format!("{}{}{}", keyword, &caps[1], new_name)
    });
    Some(renamed.into_owned())
}

/// Replace each `range` of `text` with its replacement. Ranges must not
/// overlap.
pub fn rewrite_ranges(text: &str, edits: &[(TextRange, SmolStr)]) -> String {
    let mut edits: Vec<_> = edits.iter().collect();
    edits.sort_by_key(|(range, _)| range.start());

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for (range, replacement) in edits {
        let start = usize::from(range.start());
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(replacement);
        cursor = usize::from(range.end());
    }
    out.push_str(&text[cursor..]);
    out
}
