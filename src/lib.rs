//! Compatibility and behavior-enhancement layer for text-input suggestion
//! widgets: one source configuration (inline list or remote endpoint) becomes
//! a uniform asynchronous fetch protocol with term-keyed caching and
//! in-flight supersession, deliveries are normalized across widget event
//! contracts, and lifecycle hooks are wrapped to fix rendering and popup
//! layout quirks.

pub mod binder;
pub mod compat;
pub mod render;
pub mod source;
pub mod transport;
pub mod widget;

pub use binder::{bind, BindError, BindOptions, Binding, RenderedEntry};
pub use compat::{ResponseHook, ResponseNotifier, WidgetCaps};
pub use render::{default_label, ItemRenderer, RenderFn};
pub use source::{
    substring_filter, BeforeFetchHook, Item, ListFilter, Respond, SourceAdapter, SourceSpec,
};
#[cfg(feature = "transport-http")]
pub use transport::HttpTransport;
pub use transport::{SuggestTransport, TransportError};
pub use widget::{
    HookOutcome, InputMetrics, LayoutError, LifecycleHook, PopupLayout, PopupMetrics, WidgetHost,
};
