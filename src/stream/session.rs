//! Mutable state owned by one streaming call.
//!
//! Buffers are keyed by the backend item id and are never removed, so a
//! buffer exists iff the item was ever started. The `active_*` sets only
//! hold items whose `-start` was emitted and whose `-end` was not.
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::protocol::canonical::{FinishReason, Usage};
use crate::protocol::openai_responses::ResponsesOutputItem;

/// Kind of a backend output item, recorded when the item is first seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Message,
    Reasoning,
    FunctionCall,
    Other,
}

impl ItemKind {
    #[must_use]
    pub fn of(item: &ResponsesOutputItem) -> Self {
        match item {
            ResponsesOutputItem::Message { .. } => ItemKind::Message,
            ResponsesOutputItem::Reasoning { .. } => ItemKind::Reasoning,
            ResponsesOutputItem::FunctionCall { .. } => ItemKind::FunctionCall,
            ResponsesOutputItem::ImageGenerationCall { .. } | ResponsesOutputItem::Unknown => {
                ItemKind::Other
            }
        }
    }
}

/// Status of one reasoning summary part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryPartStatus {
    Active,
    /// Done on the wire, but its end is deferred until a later part opens or
    /// the item itself is done.
    CanConclude,
    Concluded,
}

#[derive(Debug, Default)]
pub(crate) struct ReasoningItem {
    pub(crate) encrypted_content: Option<String>,
    pub(crate) parts: BTreeMap<u32, SummaryPartStatus>,
}

#[derive(Debug)]
pub(crate) struct ToolCallBuffer {
    pub(crate) call_id: String,
    pub(crate) tool_name: String,
    pub(crate) arguments: String,
    /// Set when the done payload did not extend `arguments`.
    pub(crate) final_arguments: Option<String>,
}

impl ToolCallBuffer {
    /// The argument string a `tool-call` carries.
    pub(crate) fn input(&self) -> &str {
        self.final_arguments.as_deref().unwrap_or(&self.arguments)
    }
}

/// Identifiers currently open. Each carries its open sequence so a flush
/// closes them in the order they were opened.
#[derive(Debug, Default)]
pub(crate) struct ActiveSet {
    ids: FxHashMap<String, u64>,
    next_seq: u64,
}

impl ActiveSet {
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Returns `false` when `id` was already open.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains_key(id) {
            return false;
        }
        self.ids.insert(id.to_string(), self.next_seq);
        self.next_seq += 1;
        true
    }

    /// Returns `false` when `id` was not open.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id).is_some()
    }

    pub(crate) fn take_all(&mut self) -> Vec<String> {
        let mut open: Vec<(String, u64)> = self.ids.drain().collect();
        open.sort_unstable_by_key(|(_, seq)| *seq);
        open.into_iter().map(|(id, _)| id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Session state of one streaming call.
#[derive(Debug, Default)]
pub struct SessionState {
    pub(crate) text_buffers: FxHashMap<String, String>,
    pub(crate) reasoning_buffers: FxHashMap<String, String>,
    pub(crate) tool_call_buffers: FxHashMap<String, ToolCallBuffer>,
    pub(crate) active_text: ActiveSet,
    pub(crate) active_reasoning: ActiveSet,
    pub(crate) active_tool_calls: ActiveSet,
    pub(crate) reasoning_items: FxHashMap<String, ReasoningItem>,
    pub(crate) item_kinds: FxHashMap<String, ItemKind>,
    pub(crate) tool_item_by_output_index: FxHashMap<usize, String>,
    /// Bytes of each `(item_id, content_index)` part already emitted as deltas.
    pub(crate) content_offsets: FxHashMap<(String, usize), usize>,

    pub(crate) finish_reason: Option<FinishReason>,
    pub(crate) usage: Usage,
    pub(crate) response_id: Option<String>,
    pub(crate) service_tier: Option<String>,
    pub(crate) has_function_call: bool,
    pub(crate) metadata_emitted: bool,
    pub(crate) terminated: bool,
    pub(crate) finished: bool,
}

impl SessionState {
    /// Accumulated text of a message item.
    #[must_use]
    pub fn text_buffer(&self, item_id: &str) -> Option<&str> {
        self.text_buffers.get(item_id).map(String::as_str)
    }

    /// Accumulated reasoning text of a reasoning item, across all summary parts.
    #[must_use]
    pub fn reasoning_buffer(&self, item_id: &str) -> Option<&str> {
        self.reasoning_buffers.get(item_id).map(String::as_str)
    }

    /// Accumulated argument string of a function call item.
    #[must_use]
    pub fn tool_arguments(&self, item_id: &str) -> Option<&str> {
        self.tool_call_buffers
            .get(item_id)
            .map(|buffer| buffer.arguments.as_str())
    }

    /// Argument string of a function call as reported by `tool-call`. Differs
    /// from [`Self::tool_arguments`] only when the final arguments diverged
    /// from the streamed deltas.
    #[must_use]
    pub fn tool_input(&self, item_id: &str) -> Option<&str> {
        self.tool_call_buffers.get(item_id).map(ToolCallBuffer::input)
    }

    /// Status of one summary part of a reasoning item that is still open.
    #[must_use]
    pub fn summary_part_status(&self, item_id: &str, index: u32) -> Option<SummaryPartStatus> {
        self.reasoning_items
            .get(item_id)
            .and_then(|item| item.parts.get(&index).copied())
    }

    #[must_use]
    pub fn item_kind(&self, item_id: &str) -> Option<ItemKind> {
        self.item_kinds.get(item_id).copied()
    }

    /// Number of text, reasoning and tool-input items still open.
    #[must_use]
    pub fn open_item_count(&self) -> usize {
        self.active_text.len() + self.active_reasoning.len() + self.active_tool_calls.len()
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    #[must_use]
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    #[must_use]
    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    /// Whether a terminal event has been processed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the `finish` event has been emitted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_set_keeps_open_order() {
        let mut set = ActiveSet::default();
        assert!(set.insert("b"));
        assert!(set.insert("a"));
        assert!(!set.insert("b"));
        assert!(set.contains("a"));
        assert!(set.remove("b"));
        assert!(!set.remove("b"));
        assert!(set.insert("c"));
        assert_eq!(set.take_all(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_active_set_reopened_id_moves_to_back() {
        let mut set = ActiveSet::default();
        for id in ["x", "y", "z"] {
            set.insert(id);
        }
        set.remove("x");
        set.insert("x");
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.take_all(),
            vec!["y".to_string(), "z".to_string(), "x".to_string()]
        );
    }

    #[test]
    fn test_item_kind_from_payload() {
        let item: ResponsesOutputItem = serde_json::from_str(
            r#"{"type":"function_call","id":"fc_1","call_id":"call_1","name":"f","arguments":""}"#,
        )
        .unwrap();
        assert_eq!(ItemKind::of(&item), ItemKind::FunctionCall);
        assert_eq!(ItemKind::of(&ResponsesOutputItem::Unknown), ItemKind::Other);
    }
}
