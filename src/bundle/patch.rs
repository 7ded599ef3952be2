//! Textual fixes applied to the bundle after resolution.
//!
//! Some corpus code only works in its original package (a class attribute
//! patched in from another module, a lazy import the bundler cannot see).
//! Such fixes are registered on the [`Compiler`](super::Compiler) as
//! patches instead of being special-cased in the engine.

use tracing::debug;

/// A rewrite of the whole bundle text.
pub trait BundlePatch: Send + Sync {
    /// Short name, used in logs.
    fn name(&self) -> &str;

    fn apply(&self, text: &str) -> String;
}

/// Replace every occurrence of a snippet with another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteralPatch {
    name: String,
    find: String,
    replace: String,
}

impl LiteralPatch {
    pub fn new(
        name: impl Into<String>,
        find: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            find: find.into(),
            replace: replace.into(),
        }
    }
}

impl BundlePatch for LiteralPatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, text: &str) -> String {
        if self.find.is_empty() || !text.contains(&self.find) {
            return text.to_string();
        }
        text.replace(&self.find, &self.replace)
    }
}

/// Apply `patches` in order.
pub fn apply_patches(text: String, patches: &[Box<dyn BundlePatch>]) -> String {
    patches.iter().fold(text, |text, patch| {
        let patched = patch.apply(&text);
        if patched != text {
            debug!(patch = patch.name(), "applied bundle patch");
        }
        patched
    })
}
