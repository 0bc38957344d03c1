use thiserror::Error;

use crate::source::Item;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Widget has no open popup")]
    PopupClosed,
    #[error("Layout query failed: {0}")]
    Query(String),
}

/// Box metrics of the bound input element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputMetrics {
    pub outer_width: f64,
    pub border_left: f64,
    pub border_right: f64,
}

/// Popup position as reported by the widget before any fix-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupMetrics {
    pub top: f64,
    pub top_margin: f64,
}

/// Popup geometry after the binder's fix-up pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupLayout {
    pub width: f64,
    pub stack_order: i64,
    pub top: f64,
}

/// What a wrapped lifecycle hook tells the widget to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Suppress the widget's default behavior; the binder already handled it.
    Handled,
    /// Let the widget run its default behavior.
    PerformDefault,
}

/// Caller-supplied lifecycle hook, invoked with the item under focus or
/// selection when there is one.
pub type LifecycleHook = Box<dyn FnMut(Option<&Item>) + Send>;

/// The external suggestion widget's surface, as seen by the binder.
///
/// Implemented by the hosting UI layer; the binder only ever calls these
/// during bind and inside wrapped lifecycle hooks.
pub trait WidgetHost {
    fn input_metrics(&self) -> Result<InputMetrics, LayoutError>;

    /// Stacking orders of every ancestor of the bound input, innermost first.
    fn ancestor_stack_orders(&self) -> Result<Vec<i64>, LayoutError>;

    fn popup_metrics(&self) -> Result<PopupMetrics, LayoutError>;

    fn apply_popup_layout(&mut self, layout: PopupLayout) -> Result<(), LayoutError>;

    /// Overwrites the text displayed in the bound input.
    fn set_input_text(&mut self, text: &str);

    /// Declarative `source` attribute attached to the bound element, if any.
    fn source_attribute(&self) -> Option<String>;

    /// Turns off the browser-native completion affordance on the input.
    fn disable_native_completion(&mut self);
}
