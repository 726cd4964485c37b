//! Rebuilds the caller-facing lifecycle stream from Responses wire events.
//!
//! One [`StreamReconstructor`] is owned per streaming call. Events are fed
//! in arrival order through [`StreamReconstructor::process_into`]; once the
//! source closes, [`StreamReconstructor::finish_into`] closes whatever is
//! still open and emits the single `finish` event.
use tracing::{debug, warn};

use crate::protocol::canonical::{FinishReason, LifecycleEvent, ProviderMetadata};
use crate::protocol::mapping::{
    item_metadata, reasoning_metadata, response_metadata, responses_finish_reason,
    responses_usage,
};
use crate::protocol::openai_responses::{
    ResponsesContentPart, ResponsesOutput, ResponsesOutputItem, ResponsesRequest,
    ResponsesStreamEvent,
};
use crate::util::{is_complete_json, json_scalar_to_string, parses_as_json};

use super::session::{ItemKind, ReasoningItem, SessionState, SummaryPartStatus, ToolCallBuffer};

/// Request-time settings the stream itself cannot reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Whether the backend persists this turn. Decides if reasoning summary
    /// parts close immediately or wait for the next part / item end.
    pub store: bool,
    /// Key under which provider metadata is emitted.
    pub provider_key: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            store: true,
            provider_key: "openai".to_string(),
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn from_request(request: &ResponsesRequest, provider_key: &str) -> Self {
        Self {
            store: request.store.unwrap_or(true),
            provider_key: provider_key.to_string(),
        }
    }
}

/// Streaming reconstruction state machine for the Responses protocol.
#[derive(Debug, Default)]
pub struct StreamReconstructor {
    options: SessionOptions,
    state: SessionState,
}

#[inline]
fn part_id(item_id: &str, index: u32) -> String {
    format!("{item_id}:{index}")
}

#[inline]
fn tool_key<'a>(item_id: &'a str, call_id: &'a str) -> &'a str {
    if item_id.is_empty() {
        call_id
    } else {
        item_id
    }
}

#[inline]
fn unseen_suffix(full: &str, seen: usize) -> Option<&str> {
    if full.len() > seen {
        full.get(seen..)
    } else {
        None
    }
}

#[inline]
fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl StreamReconstructor {
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: SessionState::default(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether a terminal wire event (completion or stream error) was seen.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.terminated
    }

    pub fn process(&mut self, event: &ResponsesStreamEvent) -> Vec<LifecycleEvent> {
        let mut events = Vec::with_capacity(4);
        self.process_into(event, &mut events);
        events
    }

    /// Process one wire event, appending lifecycle events to `out`.
    pub fn process_into(&mut self, event: &ResponsesStreamEvent, out: &mut Vec<LifecycleEvent>) {
        if self.state.terminated || self.state.finished {
            debug!("ignoring stream event after terminal event");
            return;
        }
        match event {
            ResponsesStreamEvent::ResponseCreated { response } => {
                self.on_response_created(response, out);
            }
            ResponsesStreamEvent::ResponseInProgress { response } => {
                self.record_response_identity(response);
            }
            ResponsesStreamEvent::ResponseCompleted { response }
            | ResponsesStreamEvent::ResponseIncomplete { response } => {
                self.on_response_finished(response, None, out);
            }
            ResponsesStreamEvent::ResponseFailed { response } => {
                self.on_response_finished(response, Some("failed"), out);
            }
            ResponsesStreamEvent::OutputItemAdded { output_index, item } => {
                self.on_item_added(*output_index, item, out);
            }
            ResponsesStreamEvent::OutputItemDone { item, .. } => self.on_item_done(item, out),
            ResponsesStreamEvent::ContentPartAdded {
                item_id,
                content_index,
                part,
                ..
            }
            | ResponsesStreamEvent::ContentPartDone {
                item_id,
                content_index,
                part,
                ..
            } => self.on_content_part(item_id, *content_index, part, out),
            ResponsesStreamEvent::OutputTextDelta {
                item_id,
                content_index,
                delta,
                ..
            }
            | ResponsesStreamEvent::RefusalDelta {
                item_id,
                content_index,
                delta,
                ..
            } => self.on_text_delta(item_id, *content_index, delta, out),
            ResponsesStreamEvent::ReasoningSummaryPartAdded {
                item_id,
                summary_index,
                ..
            } => self.on_summary_part_added(item_id, *summary_index, out),
            ResponsesStreamEvent::ReasoningSummaryPartDone {
                item_id,
                summary_index,
                ..
            } => self.on_summary_part_done(item_id, *summary_index, out),
            ResponsesStreamEvent::ReasoningSummaryTextDelta {
                item_id,
                summary_index,
                delta,
                ..
            } => {
                self.on_reasoning_delta(item_id, *summary_index, delta, out);
            }
            ResponsesStreamEvent::ReasoningTextDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                if self.on_reasoning_delta(item_id, 0, delta, out) {
                    self.bump_offset(item_id, *content_index, delta.len());
                }
            }
            ResponsesStreamEvent::FunctionCallArgumentsDelta {
                item_id,
                output_index,
                delta,
            } => match self.resolve_tool_item(item_id.as_deref(), *output_index) {
                Some(key) => self.append_tool_arguments(&key, delta, out),
                None => debug!(
                    item_id = item_id.as_deref().unwrap_or(""),
                    "dropping argument delta for unknown tool call"
                ),
            },
            ResponsesStreamEvent::FunctionCallArgumentsDone {
                item_id,
                output_index,
                arguments,
            } => match self.resolve_tool_item(item_id.as_deref(), *output_index) {
                Some(key) => self.complete_tool_call(&key, arguments, out),
                None => debug!(
                    item_id = item_id.as_deref().unwrap_or(""),
                    "arguments done for unknown tool call"
                ),
            },
            ResponsesStreamEvent::Error { message, code, .. } => {
                let code = code.as_ref().and_then(json_scalar_to_string);
                warn!(code = code.as_deref().unwrap_or(""), "backend stream error: {message}");
                self.fail(message.clone(), code, true, out);
            }
            ResponsesStreamEvent::Unknown => {}
        }
    }

    /// Record a payload that could not be parsed. The stream keeps going;
    /// a later completion event still overrides the finish reason.
    pub fn record_parse_failure(&mut self, message: &str, out: &mut Vec<LifecycleEvent>) {
        if self.state.terminated || self.state.finished {
            return;
        }
        warn!("malformed stream event: {message}");
        self.fail(message.to_string(), None, false, out);
    }

    /// Record a transport failure. No further wire events are processed.
    pub fn record_transport_failure(&mut self, message: &str, out: &mut Vec<LifecycleEvent>) {
        if self.state.terminated || self.state.finished {
            return;
        }
        warn!("stream transport failure: {message}");
        self.fail(message.to_string(), None, true, out);
    }

    pub fn finish(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::with_capacity(4);
        self.finish_into(&mut events);
        events
    }

    /// Close every open item and emit the `finish` event. Runs once; later
    /// calls emit nothing.
    pub fn finish_into(&mut self, out: &mut Vec<LifecycleEvent>) {
        if self.state.finished {
            return;
        }
        self.state.finished = true;
        let closed_any = self.state.open_item_count() > 0;

        for id in self.state.active_text.take_all() {
            debug!(item_id = %id, "closing text item left open at end of stream");
            out.push(LifecycleEvent::TextEnd {
                provider_metadata: Some(item_metadata(&self.options.provider_key, &id)),
                id,
            });
        }
        for id in self.state.active_reasoning.take_all() {
            debug!(item_id = %id, "closing reasoning item left open at end of stream");
            self.close_reasoning(&id, None, out);
        }
        for key in self.state.active_tool_calls.take_all() {
            debug!(item_id = %key, "closing tool input left open at end of stream");
            self.emit_tool_close(&key, out);
        }

        let finish_reason = self.state.finish_reason.clone().unwrap_or({
            if closed_any {
                FinishReason::Other(None)
            } else {
                FinishReason::Stop
            }
        });
        self.state.finish_reason = Some(finish_reason.clone());
        out.push(LifecycleEvent::Finish {
            finish_reason,
            usage: self.state.usage.clone(),
            provider_metadata: response_metadata(
                &self.options.provider_key,
                self.state.response_id.as_deref(),
                self.state.service_tier.as_deref(),
            ),
        });
    }

    // -----------------------------------------------------------------------
    // Response-level events
    // -----------------------------------------------------------------------

    fn record_response_identity(&mut self, response: &ResponsesOutput) {
        if !response.id.is_empty() {
            self.state.response_id = Some(response.id.clone());
        }
        if let Some(tier) = &response.service_tier {
            self.state.service_tier = Some(tier.clone());
        }
    }

    fn on_response_created(&mut self, response: &ResponsesOutput, out: &mut Vec<LifecycleEvent>) {
        self.record_response_identity(response);
        if self.state.metadata_emitted {
            return;
        }
        self.state.metadata_emitted = true;
        out.push(LifecycleEvent::ResponseMetadata {
            id: non_empty(&response.id),
            model_id: non_empty(&response.model),
            timestamp: response.created_at,
        });
    }

    fn on_response_finished(
        &mut self,
        response: &ResponsesOutput,
        status_override: Option<&str>,
        out: &mut Vec<LifecycleEvent>,
    ) {
        self.record_response_identity(response);
        if let Some(usage) = &response.usage {
            self.state.usage = responses_usage(usage);
        }
        let status = status_override.or(response.status.as_deref());
        if status == Some("failed") {
            if let Some(error) = &response.error {
                out.push(LifecycleEvent::Error {
                    message: error.message.clone(),
                    code: error.code.as_ref().and_then(json_scalar_to_string),
                });
            }
        }
        let has_function_call = self.state.has_function_call
            || response
                .output
                .iter()
                .any(|item| matches!(item, ResponsesOutputItem::FunctionCall { .. }));
        let incomplete_reason = response
            .incomplete_details
            .as_ref()
            .and_then(|details| details.reason.as_deref());
        self.state.finish_reason = Some(responses_finish_reason(
            status,
            incomplete_reason,
            has_function_call,
        ));
        self.state.terminated = true;
    }

    fn fail(
        &mut self,
        message: String,
        code: Option<String>,
        terminal: bool,
        out: &mut Vec<LifecycleEvent>,
    ) {
        out.push(LifecycleEvent::Error { message, code });
        self.state.finish_reason = Some(FinishReason::Error);
        if terminal {
            self.state.terminated = true;
        }
    }

    // -----------------------------------------------------------------------
    // Item-level events
    // -----------------------------------------------------------------------

    fn on_item_added(
        &mut self,
        output_index: usize,
        item: &ResponsesOutputItem,
        out: &mut Vec<LifecycleEvent>,
    ) {
        if let Some(id) = item.id() {
            self.state
                .item_kinds
                .entry(id.to_string())
                .or_insert_with(|| ItemKind::of(item));
        }
        match item {
            ResponsesOutputItem::Message { id, content } => {
                self.open_text(id, out);
                for (index, part) in content.iter().enumerate() {
                    self.on_content_part(id, index, part, out);
                }
            }
            ResponsesOutputItem::Reasoning {
                id,
                encrypted_content,
                ..
            } => {
                self.open_reasoning(id, encrypted_content.as_deref(), out);
            }
            ResponsesOutputItem::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => {
                self.state.has_function_call = true;
                let key = tool_key(id, call_id);
                if self.open_tool_call(key, call_id, name, Some(output_index), out) {
                    self.append_tool_arguments(key, arguments, out);
                }
            }
            ResponsesOutputItem::ImageGenerationCall { .. } | ResponsesOutputItem::Unknown => {}
        }
    }

    fn on_item_done(&mut self, item: &ResponsesOutputItem, out: &mut Vec<LifecycleEvent>) {
        let Some(id) = item.id() else {
            return;
        };
        // The added event is sometimes missing for short-lived items.
        let kind = self
            .state
            .item_kinds
            .get(id)
            .copied()
            .unwrap_or_else(|| ItemKind::of(item));

        match (kind, item) {
            (ItemKind::Message, ResponsesOutputItem::Message { id, content }) => {
                if self.open_text(id, out) {
                    debug!(item_id = %id, "message done without added event; synthesized text-start");
                }
                for (index, part) in content.iter().enumerate() {
                    self.on_content_part(id, index, part, out);
                }
                self.close_text(id, out);
            }
            (
                ItemKind::Reasoning,
                ResponsesOutputItem::Reasoning {
                    id,
                    encrypted_content,
                    summary,
                },
            ) => {
                if self.open_reasoning(id, encrypted_content.as_deref(), out) {
                    debug!(item_id = %id, "reasoning done without added event; replaying summary");
                    for (index, part) in (0u32..).zip(summary.iter()) {
                        if index > 0 {
                            self.on_summary_part_added(id, index, out);
                        }
                        self.on_reasoning_delta(id, index, &part.text, out);
                    }
                }
                self.close_reasoning(id, encrypted_content.as_deref(), out);
            }
            (
                ItemKind::FunctionCall,
                ResponsesOutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                },
            ) => {
                self.state.has_function_call = true;
                let key = tool_key(id, call_id);
                if self.open_tool_call(key, call_id, name, None, out) {
                    debug!(item_id = %key, "function call done without added event; synthesized tool-input-start");
                }
                self.complete_tool_call(key, arguments, out);
            }
            (ItemKind::Message, _) => self.close_text(id, out),
            (ItemKind::Reasoning, _) => self.close_reasoning(id, None, out),
            (ItemKind::FunctionCall, _) => {
                if self.state.active_tool_calls.remove(id) {
                    self.emit_tool_close(id, out);
                }
            }
            (ItemKind::Other, _) => {}
        }
    }

    fn on_content_part(
        &mut self,
        item_id: &str,
        content_index: usize,
        part: &ResponsesContentPart,
        out: &mut Vec<LifecycleEvent>,
    ) {
        let seen = self.offset(item_id, content_index);
        match part {
            ResponsesContentPart::OutputText { text }
            | ResponsesContentPart::Refusal { refusal: text } => {
                if let Some(suffix) = unseen_suffix(text, seen) {
                    self.on_text_delta(item_id, content_index, suffix, out);
                }
            }
            ResponsesContentPart::ReasoningText { text } => {
                if let Some(suffix) = unseen_suffix(text, seen) {
                    if self.on_reasoning_delta(item_id, 0, suffix, out) {
                        self.bump_offset(item_id, content_index, suffix.len());
                    }
                }
            }
            ResponsesContentPart::Unknown => {}
        }
    }

    fn offset(&self, item_id: &str, content_index: usize) -> usize {
        self.state
            .content_offsets
            .get(&(item_id.to_string(), content_index))
            .copied()
            .unwrap_or(0)
    }

    fn bump_offset(&mut self, item_id: &str, content_index: usize, len: usize) {
        *self
            .state
            .content_offsets
            .entry((item_id.to_string(), content_index))
            .or_default() += len;
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    /// Returns `true` when a `text-start` was emitted.
    fn open_text(&mut self, item_id: &str, out: &mut Vec<LifecycleEvent>) -> bool {
        if self.state.text_buffers.contains_key(item_id) {
            return false;
        }
        self.state
            .text_buffers
            .insert(item_id.to_string(), String::new());
        self.state.active_text.insert(item_id);
        self.state
            .item_kinds
            .entry(item_id.to_string())
            .or_insert(ItemKind::Message);
        out.push(LifecycleEvent::TextStart {
            id: item_id.to_string(),
            provider_metadata: Some(item_metadata(&self.options.provider_key, item_id)),
        });
        true
    }

    fn on_text_delta(
        &mut self,
        item_id: &str,
        content_index: usize,
        delta: &str,
        out: &mut Vec<LifecycleEvent>,
    ) {
        if delta.is_empty() {
            return;
        }
        if self.open_text(item_id, out) {
            debug!(item_id, "text delta before item added; synthesized text-start");
        }
        if !self.state.active_text.contains(item_id) {
            debug!(item_id, "dropping text delta for closed item");
            return;
        }
        if let Some(buffer) = self.state.text_buffers.get_mut(item_id) {
            buffer.push_str(delta);
        }
        self.bump_offset(item_id, content_index, delta.len());
        out.push(LifecycleEvent::TextDelta {
            id: item_id.to_string(),
            delta: delta.to_string(),
        });
    }

    fn close_text(&mut self, item_id: &str, out: &mut Vec<LifecycleEvent>) {
        if !self.state.active_text.remove(item_id) {
            return;
        }
        out.push(LifecycleEvent::TextEnd {
            id: item_id.to_string(),
            provider_metadata: Some(item_metadata(&self.options.provider_key, item_id)),
        });
    }

    // -----------------------------------------------------------------------
    // Reasoning
    // -----------------------------------------------------------------------

    fn reasoning_meta(&self, item_id: &str) -> ProviderMetadata {
        let encrypted = self
            .state
            .reasoning_items
            .get(item_id)
            .and_then(|item| item.encrypted_content.as_deref());
        reasoning_metadata(&self.options.provider_key, item_id, encrypted)
    }

    /// Register a reasoning item with summary part 0 open. Returns `true`
    /// when a `reasoning-start` was emitted.
    fn open_reasoning(
        &mut self,
        item_id: &str,
        encrypted_content: Option<&str>,
        out: &mut Vec<LifecycleEvent>,
    ) -> bool {
        if self.state.reasoning_buffers.contains_key(item_id) {
            return false;
        }
        let mut item = ReasoningItem {
            encrypted_content: encrypted_content.map(str::to_string),
            ..ReasoningItem::default()
        };
        item.parts.insert(0, SummaryPartStatus::Active);
        self.state
            .reasoning_buffers
            .insert(item_id.to_string(), String::new());
        self.state
            .reasoning_items
            .insert(item_id.to_string(), item);
        self.state.active_reasoning.insert(item_id);
        self.state
            .item_kinds
            .entry(item_id.to_string())
            .or_insert(ItemKind::Reasoning);
        out.push(LifecycleEvent::ReasoningStart {
            id: part_id(item_id, 0),
            provider_metadata: Some(self.reasoning_meta(item_id)),
        });
        true
    }

    /// Conclude every deferred part of the item, then open `index`.
    fn open_summary_part(&mut self, item_id: &str, index: u32, out: &mut Vec<LifecycleEvent>) {
        let metadata = self.reasoning_meta(item_id);
        let Some(item) = self.state.reasoning_items.get_mut(item_id) else {
            return;
        };
        for (part, status) in &mut item.parts {
            if *status == SummaryPartStatus::CanConclude {
                *status = SummaryPartStatus::Concluded;
                out.push(LifecycleEvent::ReasoningEnd {
                    id: part_id(item_id, *part),
                    provider_metadata: Some(metadata.clone()),
                });
            }
        }
        item.parts.insert(index, SummaryPartStatus::Active);
        out.push(LifecycleEvent::ReasoningStart {
            id: part_id(item_id, index),
            provider_metadata: Some(metadata),
        });
    }

    fn on_summary_part_added(&mut self, item_id: &str, index: u32, out: &mut Vec<LifecycleEvent>) {
        if self.open_reasoning(item_id, None, out) {
            debug!(item_id, "summary part before item added; synthesized reasoning-start");
        }
        let Some(item) = self.state.reasoning_items.get(item_id) else {
            debug!(item_id, "summary part added for closed reasoning item");
            return;
        };
        if item.parts.contains_key(&index) {
            return;
        }
        self.open_summary_part(item_id, index, out);
    }

    fn on_summary_part_done(&mut self, item_id: &str, index: u32, out: &mut Vec<LifecycleEvent>) {
        let store = self.options.store;
        let metadata = self.reasoning_meta(item_id);
        let Some(status) = self
            .state
            .reasoning_items
            .get_mut(item_id)
            .and_then(|item| item.parts.get_mut(&index))
        else {
            return;
        };
        if *status != SummaryPartStatus::Active {
            return;
        }
        if store {
            *status = SummaryPartStatus::Concluded;
            out.push(LifecycleEvent::ReasoningEnd {
                id: part_id(item_id, index),
                provider_metadata: Some(metadata),
            });
        } else {
            *status = SummaryPartStatus::CanConclude;
        }
    }

    /// Returns `true` when the delta was applied.
    fn on_reasoning_delta(
        &mut self,
        item_id: &str,
        index: u32,
        delta: &str,
        out: &mut Vec<LifecycleEvent>,
    ) -> bool {
        if delta.is_empty() {
            return false;
        }
        if self.open_reasoning(item_id, None, out) {
            debug!(item_id, "reasoning delta before item added; synthesized reasoning-start");
        }
        let status = match self.state.reasoning_items.get(item_id) {
            Some(item) => item.parts.get(&index).copied(),
            None => {
                debug!(item_id, "dropping reasoning delta for closed item");
                return false;
            }
        };
        match status {
            Some(SummaryPartStatus::Concluded) => {
                debug!(item_id, index, "dropping reasoning delta for concluded part");
                return false;
            }
            None => {
                debug!(item_id, index, "reasoning delta before part added; synthesized start");
                self.open_summary_part(item_id, index, out);
            }
            Some(SummaryPartStatus::Active | SummaryPartStatus::CanConclude) => {}
        }
        if let Some(buffer) = self.state.reasoning_buffers.get_mut(item_id) {
            buffer.push_str(delta);
        }
        out.push(LifecycleEvent::ReasoningDelta {
            id: part_id(item_id, index),
            delta: delta.to_string(),
            provider_metadata: Some(self.reasoning_meta(item_id)),
        });
        true
    }

    /// End every part that is not yet concluded, in ascending order, and
    /// drop the item's part registry.
    fn close_reasoning(
        &mut self,
        item_id: &str,
        encrypted_content: Option<&str>,
        out: &mut Vec<LifecycleEvent>,
    ) {
        if let Some(encrypted) = encrypted_content {
            if let Some(item) = self.state.reasoning_items.get_mut(item_id) {
                item.encrypted_content = Some(encrypted.to_string());
            }
        }
        let metadata = self.reasoning_meta(item_id);
        self.state.active_reasoning.remove(item_id);
        let Some(item) = self.state.reasoning_items.remove(item_id) else {
            return;
        };
        for (index, status) in item.parts {
            if status != SummaryPartStatus::Concluded {
                out.push(LifecycleEvent::ReasoningEnd {
                    id: part_id(item_id, index),
                    provider_metadata: Some(metadata.clone()),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tool calls
    // -----------------------------------------------------------------------

    fn resolve_tool_item(&self, item_id: Option<&str>, output_index: Option<usize>) -> Option<String> {
        if let Some(id) = item_id {
            if self.state.tool_call_buffers.contains_key(id) {
                return Some(id.to_string());
            }
        }
        output_index.and_then(|index| self.state.tool_item_by_output_index.get(&index).cloned())
    }

    /// Returns `true` when a `tool-input-start` was emitted.
    fn open_tool_call(
        &mut self,
        key: &str,
        call_id: &str,
        tool_name: &str,
        output_index: Option<usize>,
        out: &mut Vec<LifecycleEvent>,
    ) -> bool {
        if let Some(index) = output_index {
            self.state
                .tool_item_by_output_index
                .entry(index)
                .or_insert_with(|| key.to_string());
        }
        if self.state.tool_call_buffers.contains_key(key) {
            return false;
        }
        let call_id = if call_id.is_empty() { key } else { call_id };
        self.state.tool_call_buffers.insert(
            key.to_string(),
            ToolCallBuffer {
                call_id: call_id.to_string(),
                tool_name: tool_name.to_string(),
                arguments: String::new(),
                final_arguments: None,
            },
        );
        self.state.active_tool_calls.insert(key);
        self.state
            .item_kinds
            .entry(key.to_string())
            .or_insert(ItemKind::FunctionCall);
        out.push(LifecycleEvent::ToolInputStart {
            id: call_id.to_string(),
            tool_name: tool_name.to_string(),
        });
        true
    }

    fn append_tool_arguments(&mut self, key: &str, delta: &str, out: &mut Vec<LifecycleEvent>) {
        if delta.is_empty() {
            return;
        }
        if !self.state.active_tool_calls.contains(key) {
            debug!(item_id = key, "dropping argument delta for closed tool call");
            return;
        }
        let Some(buffer) = self.state.tool_call_buffers.get_mut(key) else {
            return;
        };
        buffer.arguments.push_str(delta);
        out.push(LifecycleEvent::ToolInputDelta {
            id: buffer.call_id.clone(),
            delta: delta.to_string(),
        });
        // Arguments may become a complete value before the done marker.
        if is_complete_json(&buffer.arguments) {
            self.state.active_tool_calls.remove(key);
            self.emit_tool_close(key, out);
        }
    }

    /// Apply the final argument string, then close the input.
    fn complete_tool_call(&mut self, key: &str, arguments: &str, out: &mut Vec<LifecycleEvent>) {
        if !self.state.active_tool_calls.contains(key) {
            return;
        }
        let Some(buffer) = self.state.tool_call_buffers.get_mut(key) else {
            return;
        };
        let suffix = if let Some(suffix) = arguments.strip_prefix(buffer.arguments.as_str()) {
            suffix
        } else {
            // The final string wins for `tool-call`; the streamed deltas stand as sent.
            warn!(item_id = key, "final arguments diverge from streamed deltas");
            buffer.final_arguments = Some(arguments.to_string());
            ""
        };
        self.append_tool_arguments(key, suffix, out);
        if self.state.active_tool_calls.remove(key) {
            self.emit_tool_close(key, out);
        }
    }

    /// Emit `tool-input-end`, plus `tool-call` when the input parses as one JSON value.
    /// The caller has already removed `key` from the active set.
    fn emit_tool_close(&mut self, key: &str, out: &mut Vec<LifecycleEvent>) {
        let Some(buffer) = self.state.tool_call_buffers.get(key) else {
            return;
        };
        out.push(LifecycleEvent::ToolInputEnd {
            id: buffer.call_id.clone(),
        });
        let input = buffer.input();
        if parses_as_json(input) {
            out.push(LifecycleEvent::ToolCall {
                tool_call_id: buffer.call_id.clone(),
                tool_name: buffer.tool_name.clone(),
                input: input.to_string(),
                provider_metadata: Some(item_metadata(&self.options.provider_key, key)),
            });
        } else {
            debug!(item_id = key, "tool input closed with incomplete arguments");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_responses::stream::parse_responses_stream_event;

    fn feed(reconstructor: &mut StreamReconstructor, raw: &[&str]) -> Vec<LifecycleEvent> {
        let mut out = Vec::new();
        for data in raw {
            let event = parse_responses_stream_event(data).unwrap().unwrap();
            reconstructor.process_into(&event, &mut out);
        }
        out
    }

    #[test]
    fn test_empty_deltas_are_skipped() {
        let mut r = StreamReconstructor::default();
        let out = feed(
            &mut r,
            &[
                r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"message","id":"m1","role":"assistant","content":[]}}"#,
                r#"{"type":"response.output_text.delta","item_id":"m1","output_index":0,"content_index":0,"delta":""}"#,
            ],
        );
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], LifecycleEvent::TextStart { .. }));
    }

    #[test]
    fn test_content_part_done_emits_only_missing_suffix() {
        let mut r = StreamReconstructor::default();
        let out = feed(
            &mut r,
            &[
                r#"{"type":"response.output_text.delta","item_id":"m1","output_index":0,"content_index":0,"delta":"Hel"}"#,
                r#"{"type":"response.content_part.done","item_id":"m1","output_index":0,"content_index":0,"part":{"type":"output_text","text":"Hello"}}"#,
            ],
        );
        let deltas: Vec<_> = out
            .iter()
            .filter_map(|e| match e {
                LifecycleEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(r.state().text_buffer("m1"), Some("Hello"));
        assert!(!out.iter().any(|e| matches!(e, LifecycleEvent::TextEnd { .. })));
    }

    #[test]
    fn test_arguments_delta_correlated_by_output_index() {
        let mut r = StreamReconstructor::default();
        let out = feed(
            &mut r,
            &[
                r#"{"type":"response.output_item.added","output_index":3,"item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"lookup","arguments":""}}"#,
                r#"{"type":"response.function_call_arguments.delta","output_index":3,"delta":"{}"}"#,
            ],
        );
        assert_eq!(
            out.last(),
            Some(&LifecycleEvent::ToolCall {
                tool_call_id: "call_1".into(),
                tool_name: "lookup".into(),
                input: "{}".into(),
                provider_metadata: Some(item_metadata("openai", "fc_1")),
            })
        );
        assert_eq!(r.state().tool_arguments("fc_1"), Some("{}"));
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut r = StreamReconstructor::default();
        assert_eq!(r.finish().len(), 1);
        assert!(r.finish().is_empty());
        assert!(r.state().is_finished());
    }

    #[test]
    fn test_failed_response_emits_error_and_finish_error() {
        let mut r = StreamReconstructor::default();
        let mut out = feed(
            &mut r,
            &[
                r#"{"type":"response.failed","response":{"id":"resp_9","status":"failed","error":{"code":"server_error","message":"boom"}}}"#,
            ],
        );
        r.finish_into(&mut out);
        assert_eq!(
            out[0],
            LifecycleEvent::Error {
                message: "boom".into(),
                code: Some("server_error".into()),
            }
        );
        match &out[1] {
            LifecycleEvent::Finish {
                finish_reason,
                provider_metadata,
                ..
            } => {
                assert_eq!(finish_reason, &FinishReason::Error);
                assert_eq!(provider_metadata["openai"]["responseId"], "resp_9");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_session_options_from_request() {
        let request = ResponsesRequest {
            store: Some(false),
            ..ResponsesRequest::default()
        };
        let options = SessionOptions::from_request(&request, "azure");
        assert!(!options.store);
        assert_eq!(options.provider_key, "azure");
        assert!(SessionOptions::from_request(&ResponsesRequest::default(), "openai").store);
    }
}
