use serde_json::Value;

use crate::protocol::canonical::{ProviderDefinedTool, ToolChoice, ToolSpec, Warning};

use super::ResponsesTool;

/// Tools and tool choice in Responses wire shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedTools {
    pub tools: Option<Vec<ResponsesTool>>,
    pub tool_choice: Option<Value>,
    pub warnings: Vec<Warning>,
}

/// Wire `type` of a supported provider-defined tool.
fn builtin_type(id: &str) -> Option<&'static str> {
    match id {
        "openai.web_search" => Some("web_search"),
        "openai.web_search_preview" => Some("web_search_preview"),
        "openai.file_search" => Some("file_search"),
        "openai.code_interpreter" => Some("code_interpreter"),
        _ => None,
    }
}

fn encode_builtin(tool: &ProviderDefinedTool) -> Option<ResponsesTool> {
    let extra = tool.args.clone();
    match builtin_type(&tool.id)? {
        "web_search" => Some(ResponsesTool::WebSearch { extra }),
        "web_search_preview" => Some(ResponsesTool::WebSearchPreview { extra }),
        "file_search" => Some(ResponsesTool::FileSearch { extra }),
        "code_interpreter" => Some(ResponsesTool::CodeInterpreter { extra }),
        _ => None,
    }
}

/// Convert tool definitions and a tool-choice policy into wire shapes.
///
/// Unsupported provider-defined tools are dropped with a warning. When no
/// tool survives, neither `tools` nor `tool_choice` is sent.
#[must_use]
pub fn prepare_tools(
    tools: &[ToolSpec],
    tool_choice: Option<&ToolChoice>,
    strict_json_schema: bool,
) -> PreparedTools {
    let mut warnings = Vec::new();
    let mut wire_tools = Vec::with_capacity(tools.len());

    for tool in tools {
        match tool {
            ToolSpec::Function(function) => wire_tools.push(ResponsesTool::Function {
                name: function.name.clone(),
                description: function.description.clone(),
                parameters: Some(function.input_schema.clone()),
                strict: Some(strict_json_schema),
            }),
            ToolSpec::ProviderDefined(provider_tool) => match encode_builtin(provider_tool) {
                Some(encoded) => wire_tools.push(encoded),
                None => warnings.push(Warning::UnsupportedTool {
                    tool_name: provider_tool.name.clone(),
                    details: Some(format!(
                        "provider-defined tool '{}' is not supported",
                        provider_tool.id
                    )),
                }),
            },
        }
    }

    if wire_tools.is_empty() {
        return PreparedTools {
            tools: None,
            tool_choice: None,
            warnings,
        };
    }

    let tool_choice = tool_choice.map(|choice| match choice {
        ToolChoice::Auto => Value::String("auto".to_string()),
        ToolChoice::None => Value::String("none".to_string()),
        ToolChoice::Required => Value::String("required".to_string()),
        ToolChoice::Tool(name) => {
            let builtin = tools.iter().find_map(|tool| match tool {
                ToolSpec::ProviderDefined(provider_tool) if provider_tool.name == *name => {
                    builtin_type(&provider_tool.id)
                }
                _ => None,
            });
            match builtin {
                Some(kind) => serde_json::json!({ "type": kind }),
                None => serde_json::json!({ "type": "function", "name": name }),
            }
        }
    });

    PreparedTools {
        tools: Some(wire_tools),
        tool_choice,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::FunctionTool;

    fn weather() -> ToolSpec {
        ToolSpec::Function(FunctionTool {
            name: "getWeather".into(),
            description: Some("Look up the weather".into()),
            input_schema: serde_json::json!({"type": "object", "properties": {"loc": {"type": "string"}}}),
        })
    }

    fn provider_tool(id: &str, name: &str) -> ToolSpec {
        ToolSpec::ProviderDefined(ProviderDefinedTool {
            id: id.into(),
            name: name.into(),
            args: serde_json::Map::new(),
        })
    }

    #[test]
    fn test_no_tools_sends_nothing() {
        let prepared = prepare_tools(&[], Some(&ToolChoice::Required), true);
        assert_eq!(prepared, PreparedTools::default());
    }

    #[test]
    fn test_function_tool_shape() {
        let prepared = prepare_tools(&[weather()], Some(&ToolChoice::Auto), false);
        let value = serde_json::to_value(prepared.tools.unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "type": "function",
                "name": "getWeather",
                "description": "Look up the weather",
                "parameters": {"type": "object", "properties": {"loc": {"type": "string"}}},
                "strict": false
            }])
        );
        assert_eq!(prepared.tool_choice, Some(serde_json::json!("auto")));
    }

    #[test]
    fn test_specific_tool_choice() {
        let tools = [weather(), provider_tool("openai.web_search_preview", "web_search_preview")];
        let prepared = prepare_tools(&tools, Some(&ToolChoice::Tool("getWeather".into())), true);
        assert_eq!(
            prepared.tool_choice,
            Some(serde_json::json!({"type": "function", "name": "getWeather"}))
        );

        let prepared = prepare_tools(
            &tools,
            Some(&ToolChoice::Tool("web_search_preview".into())),
            true,
        );
        assert_eq!(
            prepared.tool_choice,
            Some(serde_json::json!({"type": "web_search_preview"}))
        );
    }

    #[test]
    fn test_unsupported_provider_tool_warns() {
        let tools = [weather(), provider_tool("anthropic.computer", "computer")];
        let prepared = prepare_tools(&tools, None, true);
        assert_eq!(prepared.tools.as_ref().map(Vec::len), Some(1));
        assert!(prepared.tool_choice.is_none());
        assert!(matches!(
            &prepared.warnings[..],
            [Warning::UnsupportedTool { tool_name, .. }] if tool_name == "computer"
        ));
    }

    #[test]
    fn test_provider_tool_args_pass_through() {
        let mut args = serde_json::Map::new();
        args.insert("vector_store_ids".into(), serde_json::json!(["vs_1"]));
        let tools = [ToolSpec::ProviderDefined(ProviderDefinedTool {
            id: "openai.file_search".into(),
            name: "file_search".into(),
            args,
        })];
        let prepared = prepare_tools(&tools, None, true);
        let value = serde_json::to_value(prepared.tools.unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"type": "file_search", "vector_store_ids": ["vs_1"]}])
        );
    }
}
