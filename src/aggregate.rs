//! Delta aggregation for streamed content and tool calls.

use serde_json::Value;
use tracing::{debug, warn};

use crate::options::{ExtractionPaths, StreamOptions};

/// Accumulated state of one tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallSlot {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// One partial tool call as carried by a single payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Merges content and tool-call deltas across payloads.
///
/// Tool calls are kept in slots indexed directly by the call index the
/// producer assigns; typical turns use one to three of them.
#[derive(Debug)]
pub struct DeltaAggregator {
    paths: ExtractionPaths,
    max_tool_calls: usize,
    content: String,
    slots: Vec<Option<ToolCallSlot>>,
}

impl DeltaAggregator {
    pub fn new(paths: ExtractionPaths, max_tool_calls: usize) -> Self {
        Self {
            paths,
            max_tool_calls,
            content: String::new(),
            slots: Vec::new(),
        }
    }

    pub fn from_options(options: &StreamOptions) -> Self {
        Self::new(options.paths.clone(), options.max_tool_calls)
    }

    /// Merge one decoded payload.
    ///
    /// Returns the cumulative content when the payload carried a non-empty
    /// content fragment. Tool-call fragments are merged silently.
    pub fn apply(&mut self, payload: &Value) -> Option<String> {
        let content = payload
            .pointer(&self.paths.content)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| self.push_content(s));

        for fragment in extract_tool_calls(payload, &self.paths) {
            self.push_tool_call(fragment);
        }

        content
    }

    /// Append a content fragment and return the cumulative text.
    pub fn push_content(&mut self, fragment: &str) -> String {
        self.content.push_str(fragment);
        self.content.clone()
    }

    /// Merge a tool-call fragment into its slot.
    pub fn push_tool_call(&mut self, fragment: ToolCallFragment) {
        let ToolCallFragment {
            index,
            id,
            name,
            arguments,
        } = fragment;

        if index >= self.max_tool_calls {
            warn!(index, max = self.max_tool_calls, "tool call index out of range, fragment dropped");
            return;
        }
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        let slot = self.slots[index].get_or_insert_with(ToolCallSlot::default);

        if let Some(name) = name {
            if slot.name.is_none() {
                slot.name = Some(name);
            } else if slot.name.as_deref() != Some(name.as_str()) {
                warn!(index, existing = ?slot.name, ignored = %name, "conflicting tool name for call index");
            }
        }
        if let Some(id) = id {
            if slot.id.is_none() {
                slot.id = Some(id);
            }
        }
        if let Some(arguments) = arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    /// Content accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Tool-call slots by index, skipping unused indices.
    pub fn tool_calls(&self) -> impl Iterator<Item = (usize, &ToolCallSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
    }

    /// Move the tool-call slots out, leaving the aggregator without any.
    pub fn take_tool_calls(&mut self) -> Vec<Option<ToolCallSlot>> {
        std::mem::take(&mut self.slots)
    }
}

/// Read the tool-call fragments of a payload.
///
/// A missing index means index 0. Fragments whose index is present but not a
/// non-negative integer are skipped.
pub fn extract_tool_calls(payload: &Value, paths: &ExtractionPaths) -> Vec<ToolCallFragment> {
    let raw: Vec<&Value> = match payload.pointer(&paths.tool_calls) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => return Vec::new(),
    };

    raw.into_iter()
        .filter_map(|item| {
            let index = match item.pointer(&paths.index) {
                None | Some(Value::Null) => 0,
                Some(value) => match value.as_u64() {
                    Some(i) => i as usize,
                    None => {
                        debug!(index = %value, "tool call fragment with unusable index skipped");
                        return None;
                    }
                },
            };

            Some(ToolCallFragment {
                index,
                id: non_empty_str(item.pointer(&paths.id)),
                name: non_empty_str(item.pointer(&paths.name)),
                arguments: argument_text(item.pointer(&paths.arguments)),
            })
        })
        .collect()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Argument deltas are strings; some producers send the finished object
/// instead, which is kept as its JSON text.
fn argument_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
