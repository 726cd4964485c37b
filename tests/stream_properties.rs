use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use responses_adapter::protocol::canonical::LifecycleEvent;
use responses_adapter::protocol::openai_responses::{
    ResponsesOutput, ResponsesOutputItem, ResponsesStreamEvent, ResponsesUsage,
};
use responses_adapter::stream::{SessionOptions, StreamReconstructor};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
enum Op {
    AddMessage(usize),
    TextDelta(usize, String),
    DoneMessage(usize),
    AddReasoning(usize),
    SummaryDelta(usize, u32, String),
    PartAdded(usize, u32),
    PartDone(usize, u32),
    DoneReasoning(usize),
    AddCall(usize),
    ArgDelta(usize, &'static str),
    ArgDone(usize, &'static str),
    DoneCall(usize, &'static str),
    Completed,
    StreamError,
}

const FRAGMENTS: &[&str] = &["{", "}", "\"k\"", ":", "1", "[", "]", ",", " ", ""];

fn fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(FRAGMENTS)
}

fn op() -> impl Strategy<Value = Op> {
    let item = 0..3usize;
    let part = 0..3u32;
    prop_oneof![
        3 => item.clone().prop_map(Op::AddMessage),
        4 => (item.clone(), "[a-z ]{0,3}").prop_map(|(i, s)| Op::TextDelta(i, s)),
        2 => item.clone().prop_map(Op::DoneMessage),
        3 => item.clone().prop_map(Op::AddReasoning),
        4 => (item.clone(), part.clone(), "[a-z]{0,3}").prop_map(|(i, p, s)| Op::SummaryDelta(i, p, s)),
        2 => (item.clone(), part.clone()).prop_map(|(i, p)| Op::PartAdded(i, p)),
        2 => (item.clone(), part).prop_map(|(i, p)| Op::PartDone(i, p)),
        2 => item.clone().prop_map(Op::DoneReasoning),
        3 => item.clone().prop_map(Op::AddCall),
        5 => (item.clone(), fragment()).prop_map(|(i, f)| Op::ArgDelta(i, f)),
        1 => (item.clone(), fragment()).prop_map(|(i, f)| Op::ArgDone(i, f)),
        1 => (item, fragment()).prop_map(|(i, f)| Op::DoneCall(i, f)),
        1 => Just(Op::Completed),
        1 => Just(Op::StreamError),
    ]
}

fn function_call(i: usize, arguments: &str) -> ResponsesOutputItem {
    ResponsesOutputItem::FunctionCall {
        id: format!("fc_{i}"),
        call_id: format!("call_{i}"),
        name: "lookup".into(),
        arguments: arguments.into(),
    }
}

fn to_wire(op: &Op) -> ResponsesStreamEvent {
    match op {
        Op::AddMessage(i) => ResponsesStreamEvent::OutputItemAdded {
            output_index: *i,
            item: ResponsesOutputItem::Message {
                id: format!("m{i}"),
                content: Vec::new(),
            },
        },
        Op::TextDelta(i, delta) => ResponsesStreamEvent::OutputTextDelta {
            item_id: format!("m{i}"),
            output_index: *i,
            content_index: 0,
            delta: delta.clone(),
        },
        Op::DoneMessage(i) => ResponsesStreamEvent::OutputItemDone {
            output_index: *i,
            item: ResponsesOutputItem::Message {
                id: format!("m{i}"),
                content: Vec::new(),
            },
        },
        Op::AddReasoning(i) => ResponsesStreamEvent::OutputItemAdded {
            output_index: 10 + i,
            item: ResponsesOutputItem::Reasoning {
                id: format!("r{i}"),
                encrypted_content: Some(format!("enc-{i}")),
                summary: Vec::new(),
            },
        },
        Op::SummaryDelta(i, part, delta) => ResponsesStreamEvent::ReasoningSummaryTextDelta {
            item_id: format!("r{i}"),
            output_index: 10 + i,
            summary_index: *part,
            delta: delta.clone(),
        },
        Op::PartAdded(i, part) => ResponsesStreamEvent::ReasoningSummaryPartAdded {
            item_id: format!("r{i}"),
            output_index: 10 + i,
            summary_index: *part,
        },
        Op::PartDone(i, part) => ResponsesStreamEvent::ReasoningSummaryPartDone {
            item_id: format!("r{i}"),
            output_index: 10 + i,
            summary_index: *part,
        },
        Op::DoneReasoning(i) => ResponsesStreamEvent::OutputItemDone {
            output_index: 10 + i,
            item: ResponsesOutputItem::Reasoning {
                id: format!("r{i}"),
                encrypted_content: None,
                summary: Vec::new(),
            },
        },
        Op::AddCall(i) => ResponsesStreamEvent::OutputItemAdded {
            output_index: 20 + i,
            item: function_call(*i, ""),
        },
        Op::ArgDelta(i, delta) => ResponsesStreamEvent::FunctionCallArgumentsDelta {
            item_id: Some(format!("fc_{i}")),
            output_index: Some(20 + i),
            delta: (*delta).to_string(),
        },
        Op::ArgDone(i, arguments) => ResponsesStreamEvent::FunctionCallArgumentsDone {
            item_id: Some(format!("fc_{i}")),
            output_index: Some(20 + i),
            arguments: (*arguments).to_string(),
        },
        Op::DoneCall(i, arguments) => ResponsesStreamEvent::OutputItemDone {
            output_index: 20 + i,
            item: function_call(*i, arguments),
        },
        Op::Completed => ResponsesStreamEvent::ResponseCompleted {
            response: ResponsesOutput {
                id: "resp_prop".into(),
                status: Some("completed".into()),
                usage: Some(ResponsesUsage {
                    input_tokens: 3,
                    output_tokens: 2,
                    ..ResponsesUsage::default()
                }),
                ..ResponsesOutput::default()
            },
        },
        Op::StreamError => ResponsesStreamEvent::Error {
            message: "boom".into(),
            code: None,
            param: None,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lane {
    Text,
    Reasoning,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Delta,
    End,
}

fn classify(event: &LifecycleEvent) -> Option<(Lane, Phase, &str)> {
    match event {
        LifecycleEvent::TextStart { id, .. } => Some((Lane::Text, Phase::Start, id)),
        LifecycleEvent::TextDelta { id, .. } => Some((Lane::Text, Phase::Delta, id)),
        LifecycleEvent::TextEnd { id, .. } => Some((Lane::Text, Phase::End, id)),
        LifecycleEvent::ReasoningStart { id, .. } => Some((Lane::Reasoning, Phase::Start, id)),
        LifecycleEvent::ReasoningDelta { id, .. } => Some((Lane::Reasoning, Phase::Delta, id)),
        LifecycleEvent::ReasoningEnd { id, .. } => Some((Lane::Reasoning, Phase::End, id)),
        LifecycleEvent::ToolInputStart { id, .. } => Some((Lane::Tool, Phase::Start, id)),
        LifecycleEvent::ToolInputDelta { id, .. } => Some((Lane::Tool, Phase::Delta, id)),
        LifecycleEvent::ToolInputEnd { id } => Some((Lane::Tool, Phase::End, id)),
        _ => None,
    }
}

/// Start-before-delta, one open per identifier, and everything closed at the end.
fn check_lifecycle(events: &[LifecycleEvent]) -> Result<(), TestCaseError> {
    let mut open: FxHashMap<(Lane, String), bool> = FxHashMap::default();
    for event in events {
        let Some((lane, phase, id)) = classify(event) else {
            continue;
        };
        let key = (lane, id.to_string());
        let is_open = open.get(&key).copied().unwrap_or(false);
        match phase {
            Phase::Start => {
                prop_assert!(!is_open, "second start for {key:?}");
                open.insert(key, true);
            }
            Phase::Delta => prop_assert!(is_open, "delta without open start for {key:?}"),
            Phase::End => {
                prop_assert!(is_open, "end without open start for {key:?}");
                open.insert(key, false);
            }
        }
    }
    for (key, still_open) in &open {
        prop_assert!(!still_open, "{key:?} left open after finish");
    }
    Ok(())
}

fn concat_deltas(events: &[LifecycleEvent], matches: impl Fn(&LifecycleEvent) -> Option<&str>) -> String {
    events.iter().filter_map(matches).collect()
}

fn check_buffers(
    events: &[LifecycleEvent],
    reconstructor: &StreamReconstructor,
) -> Result<(), TestCaseError> {
    let state = reconstructor.state();
    for i in 0..3 {
        let text_id = format!("m{i}");
        let text = concat_deltas(events, |event| match event {
            LifecycleEvent::TextDelta { id, delta } if *id == text_id => Some(delta.as_str()),
            _ => None,
        });
        prop_assert_eq!(state.text_buffer(&text_id).unwrap_or(""), text.as_str());

        let reasoning_id = format!("r{i}");
        let prefix = format!("r{i}:");
        let reasoning = concat_deltas(events, |event| match event {
            LifecycleEvent::ReasoningDelta { id, delta, .. } if id.starts_with(&prefix) => {
                Some(delta.as_str())
            }
            _ => None,
        });
        prop_assert_eq!(
            state.reasoning_buffer(&reasoning_id).unwrap_or(""),
            reasoning.as_str()
        );

        let call_id = format!("call_{i}");
        let arguments = concat_deltas(events, |event| match event {
            LifecycleEvent::ToolInputDelta { id, delta } if *id == call_id => Some(delta.as_str()),
            _ => None,
        });
        let buffer = state.tool_arguments(&format!("fc_{i}"));
        prop_assert_eq!(buffer.unwrap_or(""), arguments.as_str());
        let tool_input = state.tool_input(&format!("fc_{i}"));

        let tool_calls: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                LifecycleEvent::ToolCall {
                    tool_call_id,
                    input,
                    ..
                } if *tool_call_id == call_id => Some(input.as_str()),
                _ => None,
            })
            .collect();
        let complete = tool_input.is_some_and(|args| {
            !args.trim().is_empty() && serde_json::from_str::<serde_json::Value>(args.trim()).is_ok()
        });
        prop_assert!(tool_calls.len() <= 1, "tool-call fired twice for {call_id}");
        prop_assert_eq!(tool_calls.len() == 1, complete, "arguments {:?}", tool_input);
        if let Some(input) = tool_calls.first() {
            prop_assert_eq!(Some(*input), tool_input);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_lifecycle_invariants(ops in prop::collection::vec(op(), 0..48), store in any::<bool>()) {
        let mut reconstructor = StreamReconstructor::new(SessionOptions {
            store,
            provider_key: "openai".into(),
        });
        let mut events = Vec::new();
        for op in &ops {
            reconstructor.process_into(&to_wire(op), &mut events);
        }
        reconstructor.finish_into(&mut events);

        check_lifecycle(&events)?;
        check_buffers(&events, &reconstructor)?;

        prop_assert_eq!(reconstructor.state().open_item_count(), 0);
        let finishes = events
            .iter()
            .filter(|event| matches!(event, LifecycleEvent::Finish { .. }))
            .count();
        prop_assert_eq!(finishes, 1);
        prop_assert!(matches!(events.last(), Some(LifecycleEvent::Finish { .. })), "finish must be last");
        prop_assert!(reconstructor.finish().is_empty());
    }
}
