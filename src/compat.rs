use std::sync::Arc;

use crate::source::{Item, Respond};

/// Widget versions from this one on deliver suggestion lists through the
/// native response event; older versions need the event synthesized here.
const RESPONSE_EVENT_SINCE: &str = "1.9.0";

/// Observer for the synthesized response notification in legacy mode.
/// Receives the delivered list, or an empty slice when nothing was delivered.
pub type ResponseHook = Arc<dyn Fn(&[Item]) + Send + Sync>;

/// Immutable capability descriptor for the suggestion widget in use.
///
/// Detect once at startup from the widget's reported version and pass the
/// result into every binding; the compatibility mode is a process-wide choice,
/// not a per-adapter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetCaps {
    version_id: u64,
    needs_response_events: bool,
}

impl WidgetCaps {
    pub fn detect(widget_version: &str) -> Self {
        let id = version_id(widget_version);
        WidgetCaps {
            version_id: id,
            needs_response_events: id < version_id(RESPONSE_EVENT_SINCE),
        }
    }

    pub fn version_id(&self) -> u64 {
        self.version_id
    }

    /// True when the bound widget predates the native response event and
    /// deliveries must emit one on its behalf.
    pub fn needs_response_events(&self) -> bool {
        self.needs_response_events
    }
}

/// Encodes a dotted version as two decimal digits per component, first three
/// components only: "1.9.0" -> 10900, "1.10.3" -> 11003. Trailing non-digit
/// noise within a component ("2-rc1") is ignored, missing components count
/// as zero.
fn version_id(version: &str) -> u64 {
    let mut parts = version.split('.');
    let mut id = 0u64;
    for _ in 0..3 {
        let component = parts
            .next()
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse::<u64>().unwrap_or(0)
            })
            .unwrap_or(0);
        id = id * 100 + component;
    }
    id
}

/// Normalizes the two historical delivery contracts into one: invoke the
/// consumer callback, and in legacy mode additionally notify the response
/// hook with the delivered list first.
pub struct ResponseNotifier {
    emit_response_events: bool,
    response_hook: Option<ResponseHook>,
}

impl ResponseNotifier {
    pub fn new(caps: &WidgetCaps, response_hook: Option<ResponseHook>) -> Self {
        ResponseNotifier {
            emit_response_events: caps.needs_response_events(),
            response_hook,
        }
    }

    /// Hands a resolved suggestion list (or an absent result) to the widget's
    /// consumer callback. `None` tells the widget to clear its pending state.
    pub fn deliver(&self, respond: Respond, data: Option<Vec<Item>>) {
        if self.emit_response_events {
            if let Some(hook) = &self.response_hook {
                hook(data.as_deref().unwrap_or(&[]));
            }
        }
        respond(data);
    }
}
