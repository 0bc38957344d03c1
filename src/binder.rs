use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::compat::{ResponseHook, ResponseNotifier, WidgetCaps};
use crate::render::{ItemRenderer, RenderFn};
use crate::source::{BeforeFetchHook, Item, ListFilter, Respond, SourceAdapter, SourceSpec};
use crate::transport::SuggestTransport;
use crate::widget::{HookOutcome, LayoutError, LifecycleHook, PopupLayout, WidgetHost};

#[derive(Error, Debug)]
pub enum BindError {
    #[error("No suggestion source configured and element has no source attribute")]
    MissingSource,
    #[error("Invalid source attribute: {0}")]
    InvalidSourceAttribute(String),
    #[error("Remote source requires a transport")]
    MissingTransport,
}

/// Caller-supplied configuration, resolved against defaults at bind time.
pub struct BindOptions {
    /// Suggestion source; falls back to the element's `source` attribute.
    pub source: Option<SourceSpec>,
    pub render_item: Option<RenderFn>,
    pub render_value: Option<RenderFn>,
    /// Term-keyed response caching for remote sources.
    pub cache: bool,
    pub before_fetch: Option<BeforeFetchHook>,
    /// Legacy-contract response observer, honored only on widgets that
    /// predate the native response event.
    pub response: Option<ResponseHook>,
    /// Matching algorithm for static lists; defaults to the widget's
    /// substring filter.
    pub filter: Option<ListFilter>,
    pub open: Option<LifecycleHook>,
    pub focus: Option<LifecycleHook>,
    pub select: Option<LifecycleHook>,
    pub close: Option<LifecycleHook>,
}

impl Default for BindOptions {
    fn default() -> Self {
        BindOptions {
            source: None,
            render_item: None,
            render_value: None,
            cache: true,
            before_fetch: None,
            response: None,
            filter: None,
            open: None,
            focus: None,
            select: None,
            close: None,
        }
    }
}

/// One rendered popup entry: the label to display plus the id that maps back
/// to the source item while the popup is up.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry {
    pub entry_id: u64,
    pub label: String,
}

/// A widget instance enhanced by this layer. Owns the source adapter, the
/// renderers and the wrapped lifecycle hooks; dropped together with the
/// widget it was bound to.
pub struct Binding {
    adapter: Arc<SourceAdapter>,
    renderer: ItemRenderer,
    open_hook: Option<LifecycleHook>,
    focus_hook: Option<LifecycleHook>,
    select_hook: Option<LifecycleHook>,
    close_hook: Option<LifecycleHook>,
    // rendered-entry id -> source item; rebuilt on every popup population,
    // consumed on selection
    entries: HashMap<u64, Item>,
    next_entry_id: u64,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("entries", &self.entries)
            .field("next_entry_id", &self.next_entry_id)
            .finish_non_exhaustive()
    }
}

/// Binds this enhancement layer to a widget instance: resolves the source,
/// disables native completion on the input and assembles the adapter plus
/// wrapped hooks the widget will call back into.
pub fn bind(
    widget: &mut dyn WidgetHost,
    caps: WidgetCaps,
    mut options: BindOptions,
    transport: Option<Arc<dyn SuggestTransport>>,
) -> Result<Binding, BindError> {
    let spec = match options.source.take() {
        Some(spec) => spec,
        None => {
            let raw = widget.source_attribute().ok_or(BindError::MissingSource)?;
            SourceSpec::from_attribute(&raw)
                .map_err(|e| BindError::InvalidSourceAttribute(e.to_string()))?
        }
    };

    widget.disable_native_completion();

    let renderer = ItemRenderer::new(options.render_item.take(), options.render_value.take());
    let notifier = Arc::new(ResponseNotifier::new(&caps, options.response.take()));

    let adapter = match spec {
        SourceSpec::Static(items) => {
            SourceAdapter::new_static(items, options.filter.take(), notifier)
        }
        SourceSpec::Remote { endpoint, params } => {
            let transport = transport
                .or_else(default_transport)
                .ok_or(BindError::MissingTransport)?;
            SourceAdapter::new_remote(
                endpoint,
                params,
                transport,
                options.cache,
                options.before_fetch.take(),
                notifier,
            )
        }
    };

    Ok(Binding {
        adapter: Arc::new(adapter),
        renderer,
        open_hook: options.open,
        focus_hook: options.focus,
        select_hook: options.select,
        close_hook: options.close,
        entries: HashMap::new(),
        next_entry_id: 1,
    })
}

#[cfg(feature = "transport-http")]
fn default_transport() -> Option<Arc<dyn SuggestTransport>> {
    Some(Arc::new(crate::transport::HttpTransport::new()))
}

#[cfg(not(feature = "transport-http"))]
fn default_transport() -> Option<Arc<dyn SuggestTransport>> {
    None
}

impl Binding {
    /// The widget's data-source entry point; see [`SourceAdapter::fetch`].
    pub fn fetch(&self, term: &str, respond: Respond) {
        self.adapter.fetch(term, respond);
    }

    pub fn renderer(&self) -> &ItemRenderer {
        &self.renderer
    }

    /// Wrapped `open` hook: fix popup width, stacking order and vertical
    /// position, then run the caller's hook. Layout trouble is swallowed so
    /// the caller's hook always runs.
    pub fn notify_open(&mut self, widget: &mut dyn WidgetHost) {
        if let Err(e) = adjust_popup(widget) {
            debug!(error = %e, "popup layout adjustment failed");
        }
        if let Some(hook) = &mut self.open_hook {
            hook(None);
        }
    }

    /// Wrapped `focus` hook: write the item's value form into the input
    /// before the caller's hook; the widget's own insertion is suppressed.
    pub fn notify_focus(&mut self, widget: &mut dyn WidgetHost, item: &Item) -> HookOutcome {
        widget.set_input_text(&self.renderer.value(item));
        if let Some(hook) = &mut self.focus_hook {
            hook(Some(item));
        }
        HookOutcome::Handled
    }

    /// Wrapped `select` hook: writes the selected entry's value form into
    /// the input, runs the caller's hook and consumes that entry's
    /// association; equal sibling entries keep theirs. Unknown entry ids
    /// leave the input untouched.
    pub fn notify_select(&mut self, widget: &mut dyn WidgetHost, entry_id: u64) -> HookOutcome {
        if let Some(item) = self.take_entry(entry_id) {
            widget.set_input_text(&self.renderer.value(&item));
            if let Some(hook) = &mut self.select_hook {
                hook(Some(&item));
            }
        }
        HookOutcome::Handled
    }

    pub fn notify_close(&mut self) -> HookOutcome {
        if let Some(hook) = &mut self.close_hook {
            hook(None);
        }
        HookOutcome::Handled
    }

    /// Builds the popup entries for a delivered list, one per item in order,
    /// replacing any associations left over from the previous popup.
    pub fn render_list(&mut self, items: &[Item]) -> Vec<RenderedEntry> {
        self.entries.clear();
        items
            .iter()
            .map(|item| {
                let entry_id = self.next_entry_id;
                self.next_entry_id += 1;
                self.entries.insert(entry_id, item.clone());
                RenderedEntry {
                    entry_id,
                    label: self.renderer.label(item),
                }
            })
            .collect()
    }

    /// Looks up the source item behind a rendered entry.
    pub fn item_for_entry(&self, entry_id: u64) -> Option<&Item> {
        self.entries.get(&entry_id)
    }

    /// Consumes the association for a selected entry.
    pub fn take_entry(&mut self, entry_id: u64) -> Option<Item> {
        self.entries.remove(&entry_id)
    }
}

/// Popup fix-up applied on open: width matches the input's content width,
/// stacking order beats every ancestor, and the top coordinate undoes the
/// widget's own top-margin compensation.
fn adjust_popup(widget: &mut dyn WidgetHost) -> Result<(), LayoutError> {
    let input = widget.input_metrics()?;
    let width = input.outer_width - input.border_left - input.border_right;

    let stack_order = widget
        .ancestor_stack_orders()?
        .into_iter()
        .max()
        .unwrap_or(0)
        + 1;

    let popup = widget.popup_metrics()?;
    let top = popup.top + popup.top_margin;

    widget.apply_popup_layout(PopupLayout {
        width,
        stack_order,
        top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{InputMetrics, PopupMetrics};
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeWidget {
        input: Option<InputMetrics>,
        ancestors: Vec<i64>,
        popup: Option<PopupMetrics>,
        applied: Option<PopupLayout>,
        text: Option<String>,
        source_attr: Option<String>,
        native_completion_disabled: bool,
    }

    impl FakeWidget {
        fn new() -> Self {
            FakeWidget {
                input: Some(InputMetrics {
                    outer_width: 200.0,
                    border_left: 1.0,
                    border_right: 1.0,
                }),
                ancestors: vec![0, 30, 10],
                popup: Some(PopupMetrics {
                    top: 120.0,
                    top_margin: 4.0,
                }),
                applied: None,
                text: None,
                source_attr: None,
                native_completion_disabled: false,
            }
        }
    }

    impl WidgetHost for FakeWidget {
        fn input_metrics(&self) -> Result<InputMetrics, LayoutError> {
            self.input.ok_or(LayoutError::PopupClosed)
        }

        fn ancestor_stack_orders(&self) -> Result<Vec<i64>, LayoutError> {
            Ok(self.ancestors.clone())
        }

        fn popup_metrics(&self) -> Result<PopupMetrics, LayoutError> {
            self.popup.ok_or(LayoutError::PopupClosed)
        }

        fn apply_popup_layout(&mut self, layout: PopupLayout) -> Result<(), LayoutError> {
            self.applied = Some(layout);
            Ok(())
        }

        fn set_input_text(&mut self, text: &str) {
            self.text = Some(text.to_string());
        }

        fn source_attribute(&self) -> Option<String> {
            self.source_attr.clone()
        }

        fn disable_native_completion(&mut self) {
            self.native_completion_disabled = true;
        }
    }

    fn static_options(items: Vec<Item>) -> BindOptions {
        BindOptions {
            source: Some(SourceSpec::Static(items)),
            ..BindOptions::default()
        }
    }

    fn modern_caps() -> WidgetCaps {
        WidgetCaps::detect("1.10.3")
    }

    #[test]
    fn bind_disables_native_completion() {
        let mut widget = FakeWidget::new();
        bind(&mut widget, modern_caps(), static_options(vec![]), None).unwrap();
        assert!(widget.native_completion_disabled);
    }

    #[test]
    fn bind_without_source_reads_element_attribute() {
        let mut widget = FakeWidget::new();
        widget.source_attr = Some(r#"["apple", "apricot"]"#.to_string());
        let mut binding =
            bind(&mut widget, modern_caps(), BindOptions::default(), None).unwrap();

        let delivered = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&delivered);
        binding.fetch(
            "ap",
            Box::new(move |data| {
                *seen.lock().unwrap() = data;
            }),
        );
        assert_eq!(
            delivered.lock().unwrap().clone(),
            Some(vec![json!("apple"), json!("apricot")])
        );
    }

    #[test]
    fn bind_without_any_source_fails() {
        let mut widget = FakeWidget::new();
        let err = bind(&mut widget, modern_caps(), BindOptions::default(), None).unwrap_err();
        assert!(matches!(err, BindError::MissingSource));
    }

    #[test]
    fn bind_rejects_malformed_source_attribute() {
        let mut widget = FakeWidget::new();
        widget.source_attr = Some(r#"["apple""#.to_string());
        let err = bind(&mut widget, modern_caps(), BindOptions::default(), None).unwrap_err();
        assert!(matches!(err, BindError::InvalidSourceAttribute(_)));
    }

    #[cfg(not(feature = "transport-http"))]
    #[test]
    fn remote_source_without_transport_fails() {
        let mut widget = FakeWidget::new();
        let options = BindOptions {
            source: Some(SourceSpec::Remote {
                endpoint: "/suggest".to_string(),
                params: Default::default(),
            }),
            ..BindOptions::default()
        };
        let err = bind(&mut widget, modern_caps(), options, None).unwrap_err();
        assert!(matches!(err, BindError::MissingTransport));
    }

    #[test]
    fn open_sizes_popup_and_runs_caller_hook() {
        let opened = Arc::new(Mutex::new(false));
        let seen = Arc::clone(&opened);
        let mut widget = FakeWidget::new();
        let options = BindOptions {
            open: Some(Box::new(move |_| {
                *seen.lock().unwrap() = true;
            })),
            ..static_options(vec![])
        };
        let mut binding = bind(&mut widget, modern_caps(), options, None).unwrap();

        binding.notify_open(&mut widget);

        let applied = widget.applied.expect("layout applied");
        assert_eq!(applied.width, 198.0);
        assert_eq!(applied.stack_order, 31);
        assert_eq!(applied.top, 124.0);
        assert!(*opened.lock().unwrap());
    }

    #[test]
    fn open_swallows_layout_failure_and_still_runs_hook() {
        let opened = Arc::new(Mutex::new(false));
        let seen = Arc::clone(&opened);
        let mut widget = FakeWidget::new();
        widget.popup = None;
        let options = BindOptions {
            open: Some(Box::new(move |_| {
                *seen.lock().unwrap() = true;
            })),
            ..static_options(vec![])
        };
        let mut binding = bind(&mut widget, modern_caps(), options, None).unwrap();

        binding.notify_open(&mut widget);

        assert!(widget.applied.is_none());
        assert!(*opened.lock().unwrap());
    }

    #[test]
    fn focus_writes_value_form_and_suppresses_default() {
        let focused = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&focused);
        let mut widget = FakeWidget::new();
        let options = BindOptions {
            focus: Some(Box::new(move |item| {
                *seen.lock().unwrap() = item.cloned();
            })),
            ..static_options(vec![])
        };
        let mut binding = bind(&mut widget, modern_caps(), options, None).unwrap();

        let item = json!({"label": "Paris", "id": 42});
        let outcome = binding.notify_focus(&mut widget, &item);

        assert_eq!(outcome, HookOutcome::Handled);
        assert_eq!(widget.text.as_deref(), Some("Paris"));
        assert_eq!(focused.lock().unwrap().clone(), Some(item));
    }

    #[test]
    fn select_uses_custom_value_renderer() {
        let mut widget = FakeWidget::new();
        let options = BindOptions {
            render_value: Some(Arc::new(|item| {
                item.get("id").map(|id| id.to_string()).unwrap_or_default()
            })),
            ..static_options(vec![])
        };
        let mut binding = bind(&mut widget, modern_caps(), options, None).unwrap();

        let item = json!({"label": "Paris", "id": 42});
        let entries = binding.render_list(std::slice::from_ref(&item));
        let outcome = binding.notify_select(&mut widget, entries[0].entry_id);

        assert_eq!(outcome, HookOutcome::Handled);
        assert_eq!(widget.text.as_deref(), Some("42"));
    }

    #[test]
    fn select_consumes_only_the_chosen_entry() {
        let selected = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&selected);
        let mut widget = FakeWidget::new();
        let options = BindOptions {
            select: Some(Box::new(move |item| {
                *seen.lock().unwrap() = item.cloned();
            })),
            ..static_options(vec![])
        };
        let mut binding = bind(&mut widget, modern_caps(), options, None).unwrap();

        // Two entries rendering the same item value.
        let entries = binding.render_list(&[json!("paris"), json!("paris")]);
        let outcome = binding.notify_select(&mut widget, entries[0].entry_id);

        assert_eq!(outcome, HookOutcome::Handled);
        assert_eq!(widget.text.as_deref(), Some("paris"));
        assert_eq!(selected.lock().unwrap().clone(), Some(json!("paris")));
        assert_eq!(binding.item_for_entry(entries[0].entry_id), None);
        // The equal sibling keeps its association.
        assert_eq!(
            binding.item_for_entry(entries[1].entry_id),
            Some(&json!("paris"))
        );
    }

    #[test]
    fn select_with_unknown_entry_leaves_input_untouched() {
        let mut widget = FakeWidget::new();
        let mut binding =
            bind(&mut widget, modern_caps(), static_options(vec![]), None).unwrap();

        let outcome = binding.notify_select(&mut widget, 99);

        assert_eq!(outcome, HookOutcome::Handled);
        assert_eq!(widget.text, None);
    }

    #[test]
    fn close_runs_hook_and_suppresses_default() {
        let closed = Arc::new(Mutex::new(false));
        let seen = Arc::clone(&closed);
        let mut widget = FakeWidget::new();
        let options = BindOptions {
            close: Some(Box::new(move |_| {
                *seen.lock().unwrap() = true;
            })),
            ..static_options(vec![])
        };
        let mut binding = bind(&mut widget, modern_caps(), options, None).unwrap();

        assert_eq!(binding.notify_close(), HookOutcome::Handled);
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn rendered_entries_map_back_to_items_until_consumed() {
        let mut widget = FakeWidget::new();
        let mut binding =
            bind(&mut widget, modern_caps(), static_options(vec![]), None).unwrap();

        let items = vec![json!({"label": "Paris"}), json!({"label": "Prague"})];
        let entries = binding.render_list(&items);

        assert_eq!(
            entries.iter().map(|e| e.label.as_str()).collect::<Vec<_>>(),
            vec!["Paris", "Prague"]
        );
        assert_eq!(binding.item_for_entry(entries[0].entry_id), Some(&items[0]));
        assert_eq!(binding.take_entry(entries[1].entry_id), Some(items[1].clone()));
        assert_eq!(binding.item_for_entry(entries[1].entry_id), None);
    }

    #[test]
    fn render_list_replaces_previous_popup_associations() {
        let mut widget = FakeWidget::new();
        let mut binding =
            bind(&mut widget, modern_caps(), static_options(vec![]), None).unwrap();

        let first = binding.render_list(&[json!("apple")]);
        let second = binding.render_list(&[json!("banana")]);

        assert_eq!(binding.item_for_entry(first[0].entry_id), None);
        assert_eq!(
            binding.item_for_entry(second[0].entry_id),
            Some(&json!("banana"))
        );
    }
}
