//! Splitting bundle text into movable top-level items.

use super::python::{PythonParser, TopLevelDefinition};
use crate::base::TextSize;
use crate::error::Result;

/// Separator between items when bundle text is rendered.
pub const ITEM_SEPARATOR: &str = "\n\n";

/// Bundle text cut at top-level definition boundaries.
///
/// Text before the first definition is the preamble and always stays first.
/// Anything between two definitions (comments, assignments patching the
/// class) travels with the preceding definition.
#[derive(Clone, Debug)]
pub struct BundleLayout {
    pub preamble: String,
    pub items: Vec<LayoutItem>,
}

#[derive(Clone, Debug)]
pub struct LayoutItem {
    pub definition: TopLevelDefinition,
    pub text: String,
}

impl BundleLayout {
    pub fn parse(parser: &mut PythonParser, text: &str) -> Result<Self> {
        let tree = parser.parse(text, "bundle")?;
        let definitions = tree.definitions();

        let first_start = definitions
            .first()
            .map(|d| usize::from(d.range.start()))
            .unwrap_or(text.len());
        let preamble = text[..first_start].trim_end().to_string();

        let ends: Vec<TextSize> = definitions
            .iter()
            .skip(1)
            .map(|d| d.range.start())
            .chain(std::iter::once(TextSize::from(text.len() as u32)))
            .collect();

        let items = definitions
            .into_iter()
            .zip(ends)
            .map(|(definition, end)| {
                let start = usize::from(definition.range.start());
                let text = text[start..usize::from(end)].trim_end().to_string();
                LayoutItem { definition, text }
            })
            .collect();

        Ok(Self { preamble, items })
    }

    /// Render the preamble followed by `items`, in the order given.
    pub fn render<'a>(&'a self, items: impl IntoIterator<Item = &'a LayoutItem>) -> String {
        let preamble = (!self.preamble.is_empty()).then_some(self.preamble.as_str());
        preamble
            .into_iter()
            .chain(items.into_iter().map(|item| item.text.as_str()))
            .collect::<Vec<_>>()
            .join(ITEM_SEPARATOR)
    }
}
