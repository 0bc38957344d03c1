use std::sync::Arc;

use serde_json::Value;

use crate::source::Item;

/// Pure rendering function mapping an item to a display or value string.
/// Called synchronously on the popup-population and selection paths, so it
/// must not block.
pub type RenderFn = Arc<dyn Fn(&Item) -> String + Send + Sync>;

/// Maps suggestion items to their user-facing label and to the canonical
/// value written into the input on focus/select.
pub struct ItemRenderer {
    label: RenderFn,
    value: RenderFn,
}

impl ItemRenderer {
    /// Missing `label` falls back to [`default_label`]; missing `value`
    /// falls back to whatever `label` resolved to.
    pub fn new(label: Option<RenderFn>, value: Option<RenderFn>) -> Self {
        let label = label.unwrap_or_else(|| Arc::new(default_label));
        let value = value.unwrap_or_else(|| Arc::clone(&label));
        ItemRenderer { label, value }
    }

    pub fn label(&self, item: &Item) -> String {
        (self.label)(item)
    }

    pub fn value(&self, item: &Item) -> String {
        (self.value)(item)
    }
}

impl Default for ItemRenderer {
    fn default() -> Self {
        ItemRenderer::new(None, None)
    }
}

/// Default label: the `label` field of record items, the string itself for
/// string items, the JSON rendering otherwise.
pub fn default_label(item: &Item) -> String {
    match item {
        Value::String(text) => text.clone(),
        Value::Object(fields) => match fields.get("label") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => item.to_string(),
        },
        other => other.to_string(),
    }
}
