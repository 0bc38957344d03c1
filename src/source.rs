use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::compat::ResponseNotifier;
use crate::render::default_label;
use crate::transport::SuggestTransport;

/// Suggestion item. Structurally opaque to the adapter; only renderers and
/// the list filter ever look inside.
pub type Item = serde_json::Value;

/// Consumer callback handed in by the widget for one fetch. `None` means no
/// result was produced (veto or transport failure) and the widget should
/// clear its pending state.
pub type Respond = Box<dyn FnOnce(Option<Vec<Item>>) + Send + 'static>;

/// Pre-fetch hook for remote sources. Returning `false` vetoes the fetch:
/// no request is issued, no cache is touched, an absent result is delivered.
pub type BeforeFetchHook = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Matching algorithm applied to static lists. Supplied by the hosting
/// widget; the adapter treats it as a black box.
pub type ListFilter = Arc<dyn Fn(&[Item], &str) -> Vec<Item> + Send + Sync>;

/// Case-insensitive substring match against each item's default label,
/// preserving source order. The stand-in for the widget's own filter.
pub fn substring_filter() -> ListFilter {
    Arc::new(|items, term| {
        let needle = term.to_lowercase();
        items
            .iter()
            .filter(|item| default_label(item).to_lowercase().contains(&needle))
            .cloned()
            .collect()
    })
}

/// Origin of suggestion data, chosen once at bind time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    /// Fixed in-memory list, filtered locally per term.
    Static(Vec<Item>),
    /// Remote endpoint queried per term, with extra request parameters.
    Remote {
        endpoint: String,
        #[serde(default)]
        params: HashMap<String, String>,
    },
}

impl SourceSpec {
    /// Resolves a declarative `source` attribute: JSON (an inline list or a
    /// `{"endpoint": ...}` object) when it looks like JSON, otherwise a bare
    /// endpoint identifier.
    pub fn from_attribute(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
        } else {
            Ok(SourceSpec::Remote {
                endpoint: trimmed.to_string(),
                params: HashMap::new(),
            })
        }
    }
}

struct RemoteState {
    endpoint: String,
    params: HashMap<String, String>,
    transport: Arc<dyn SuggestTransport>,
    before_fetch: Option<BeforeFetchHook>,
    cache_enabled: bool,
    // term -> last successful result; grows unboundedly for the adapter's
    // lifetime, matching the observable caching contract
    cache: Mutex<HashMap<String, Vec<Item>>>,
    // current request token; a response is honored only while its token is
    // still the latest one
    token: AtomicU64,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

enum SourceKind {
    Static { items: Vec<Item>, filter: ListFilter },
    Remote(Arc<RemoteState>),
}

/// Turns a [`SourceSpec`] into the widget's asynchronous suggestion-fetch
/// protocol: term in, delivery out, with caching and in-flight supersession
/// for remote endpoints.
///
/// One adapter per bound widget instance; cache and in-flight slot are owned
/// exclusively by it.
pub struct SourceAdapter {
    notifier: Arc<ResponseNotifier>,
    kind: SourceKind,
}

impl SourceAdapter {
    pub fn new_static(
        items: Vec<Item>,
        filter: Option<ListFilter>,
        notifier: Arc<ResponseNotifier>,
    ) -> Self {
        SourceAdapter {
            notifier,
            kind: SourceKind::Static {
                items,
                filter: filter.unwrap_or_else(substring_filter),
            },
        }
    }

    pub fn new_remote(
        endpoint: String,
        params: HashMap<String, String>,
        transport: Arc<dyn SuggestTransport>,
        cache_enabled: bool,
        before_fetch: Option<BeforeFetchHook>,
        notifier: Arc<ResponseNotifier>,
    ) -> Self {
        SourceAdapter {
            notifier,
            kind: SourceKind::Remote(Arc::new(RemoteState {
                endpoint,
                params,
                transport,
                before_fetch,
                cache_enabled,
                cache: Mutex::new(HashMap::new()),
                token: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            })),
        }
    }

    /// Resolves suggestions for `term` and delivers them through `respond`.
    ///
    /// Always returns immediately. Static lists and cache hits deliver
    /// synchronously within this call; remote fetches deliver later from a
    /// spawned task, so remote adapters must be used inside a tokio runtime.
    pub fn fetch(&self, term: &str, respond: Respond) {
        match &self.kind {
            SourceKind::Static { items, filter } => {
                let matched = filter(items, term);
                self.notifier.deliver(respond, Some(matched));
            }
            SourceKind::Remote(state) => self.fetch_remote(state, term, respond),
        }
    }

    fn fetch_remote(&self, state: &Arc<RemoteState>, term: &str, respond: Respond) {
        if let Some(hook) = &state.before_fetch {
            if !hook(term) {
                debug!(term, "fetch vetoed by before-fetch hook");
                self.notifier.deliver(respond, None);
                return;
            }
        }

        if state.cache_enabled {
            let cached = state.cache.lock().unwrap().get(term).cloned();
            if let Some(hit) = cached {
                debug!(term, "serving suggestions from cache");
                self.notifier.deliver(respond, Some(hit));
                return;
            }
        }

        // Supersede: only the newest request may deliver, whatever its term.
        let token = state.token.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = state.in_flight.lock().unwrap().take() {
            debug!(term, "aborting superseded in-flight request");
            previous.abort();
        }

        let task_state = Arc::clone(state);
        let notifier = Arc::clone(&self.notifier);
        let term = term.to_string();
        let handle = tokio::spawn(async move {
            let state = task_state;
            let result = state
                .transport
                .fetch(&state.endpoint, &term, &state.params)
                .await;

            if state.token.load(Ordering::SeqCst) != token {
                debug!(term = %term, "discarding superseded response");
                return;
            }
            state.in_flight.lock().unwrap().take();

            match result {
                Ok(items) => {
                    if state.cache_enabled {
                        state
                            .cache
                            .lock()
                            .unwrap()
                            .insert(term.clone(), items.clone());
                    }
                    notifier.deliver(respond, Some(items));
                }
                Err(e) => {
                    warn!(term = %term, error = %e, "suggestion fetch failed");
                    notifier.deliver(respond, None);
                }
            }
        });
        *state.in_flight.lock().unwrap() = Some(handle);
    }
}
