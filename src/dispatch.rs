//! Turns accumulated tool-call slots into invocations at stream end.

use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregate::ToolCallSlot;
use crate::model::ToolInvocation;
use crate::options::StreamOptions;

/// Decodes finished tool-call argument buffers.
///
/// A slot that has no name, is not in the recognized set, or whose arguments
/// never became valid JSON produces no invocation. None of these are errors
/// for the caller; they are only logged.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDispatcher {
    recognized: Option<Vec<String>>,
}

impl ToolCallDispatcher {
    pub fn new(recognized: Option<Vec<String>>) -> Self {
        Self { recognized }
    }

    pub fn from_options(options: &StreamOptions) -> Self {
        Self::new(options.recognized_tools.clone())
    }

    /// Dispatch every slot in ascending index order.
    pub fn dispatch(&self, slots: Vec<Option<ToolCallSlot>>) -> Vec<ToolInvocation> {
        slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| self.dispatch_one(index, slot?))
            .collect()
    }

    fn dispatch_one(&self, index: usize, slot: ToolCallSlot) -> Option<ToolInvocation> {
        let Some(name) = slot.name else {
            warn!(index, bytes = slot.arguments.len(), "tool call without a name dropped");
            return None;
        };

        if !self.recognizes(&name) {
            debug!(index, name = %name, "unrecognized tool call dropped");
            return None;
        }

        match serde_json::from_str::<Value>(&slot.arguments) {
            Ok(arguments) => Some(ToolInvocation {
                index,
                id: slot.id,
                name,
                arguments,
            }),
            Err(e) => {
                warn!(index, name = %name, error = %e, "incomplete tool call arguments dropped");
                None
            }
        }
    }

    fn recognizes(&self, name: &str) -> bool {
        self.recognized
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slot(name: Option<&str>, arguments: &str) -> Option<ToolCallSlot> {
        Some(ToolCallSlot {
            id: None,
            name: name.map(str::to_string),
            arguments: arguments.to_string(),
        })
    }

    #[test]
    fn test_dispatch_in_index_order() {
        let dispatcher = ToolCallDispatcher::default();
        let invocations = dispatcher.dispatch(vec![
            slot(Some("first"), "{\"a\":1}"),
            None,
            slot(Some("third"), "[1,2]"),
        ]);

        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].index, 0);
        assert_eq!(invocations[0].name, "first");
        assert_eq!(invocations[0].arguments, json!({"a": 1}));
        assert_eq!(invocations[1].index, 2);
        assert_eq!(invocations[1].arguments, json!([1, 2]));
    }

    #[test]
    fn test_incomplete_arguments_dropped_silently() {
        let dispatcher = ToolCallDispatcher::default();
        let invocations = dispatcher.dispatch(vec![
            slot(Some("cut_off"), "{\"headline\": \"Summer"),
            slot(Some("empty"), ""),
            slot(Some("ok"), "{}"),
        ]);

        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].name, "ok");
        assert_eq!(invocations[0].index, 2);
    }

    #[test]
    fn test_nameless_slot_dropped() {
        let dispatcher = ToolCallDispatcher::default();
        assert!(dispatcher.dispatch(vec![slot(None, "{}")]).is_empty());
    }

    #[test]
    fn test_recognized_filter_and_id_passthrough() {
        let dispatcher = ToolCallDispatcher::new(Some(vec!["generate_communication_briefing".to_string()]));
        let mut known = slot(Some("generate_communication_briefing"), "{\"difficulty\":3}");
        if let Some(s) = known.as_mut() {
            s.id = Some("call_9".to_string());
        }

        let invocations = dispatcher.dispatch(vec![slot(Some("other_tool"), "{}"), known]);
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].id.as_deref(), Some("call_9"));
        assert_eq!(invocations[0].arguments, json!({"difficulty": 3}));
    }
}
