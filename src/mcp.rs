//! MCP (Model Context Protocol) server implementation.
//!
//! Exposes the image tools to AI agents as JSON-RPC 2.0 over stdio, one
//! message per line.

use crate::error::SmartImageError;
use crate::tools::{GenerateImageArgs, ImageTools, TransformImageArgs};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Maps a tool failure: validation kinds are the caller's fault.
    fn tool_error(id: Value, err: &SmartImageError) -> Self {
        let code = if err.is_validation() {
            INVALID_PARAMS
        } else {
            INTERNAL_ERROR
        };
        let mut data = json!({
            "kind": err.kind(),
            "provider": err.provider(),
        });
        if let Some(retry_after) = err.retry_after() {
            data["retry_after_secs"] = json!(retry_after.as_secs());
        }
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: err.to_string(),
                data: Some(data),
            }),
        }
    }

    fn text(id: Value, text: impl Into<String>) -> Self {
        Self::success(
            id,
            json!({
                "content": [{ "type": "text", "text": text.into() }]
            }),
        )
    }
}

/// MCP tool definition.
#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

/// MCP server for image generation.
pub struct McpServer {
    tools: ImageTools,
}

impl McpServer {
    /// Creates a server over the given tool surface.
    pub fn new(tools: ImageTools) -> Self {
        Self { tools }
    }

    /// Run the MCP server, reading from stdin and writing to stdout.
    pub async fn run(&self) -> io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serves line-delimited JSON-RPC until `reader` reaches end of input.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(resp) = self.handle_message(line).await {
                let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
                    json!({
                        "jsonrpc": "2.0",
                        "id": null,
                        "error": {"code": INTERNAL_ERROR, "message": e.to_string()},
                    })
                    .to_string()
                });
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        tracing::debug!("stdin closed, MCP server stopping");
        Ok(())
    }

    async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        // Notifications never get a reply.
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        };

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(id, &request.params)),
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tools_call(id, &request.params).await),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            _ => Some(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    fn handle_initialize(&self, id: Value, params: &Value) -> JsonRpcResponse {
        if let Some(client_info) = params.get("clientInfo") {
            tracing::info!(
                client = client_info.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                version = client_info
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown"),
                "MCP client connected"
            );
        }

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "smart-image",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        let tools = vec![
            Tool {
                name: "list_models",
                description: "List the image generation models available from the enabled providers (AWS Bedrock, OpenAI, Gemini). Use the returned model_id with generate_image or transform_image.",
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            Tool {
                name: "generate_image",
                description: "Generate an image from a text prompt and save it to output_path. Optionally steer it with a reference image. Call prompt_guide for tips on writing prompts.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "Detailed description of the image"
                        },
                        "model_id": {
                            "type": "string",
                            "description": "Model identifier from list_models"
                        },
                        "output_path": {
                            "type": "string",
                            "description": "Where to save the image (e.g. ~/images/fox.png)"
                        },
                        "reference_image": {
                            "type": "string",
                            "description": "Optional path to an image that guides style or content"
                        },
                        "width": {
                            "type": "integer",
                            "description": "Width in pixels",
                            "default": 1024
                        },
                        "height": {
                            "type": "integer",
                            "description": "Height in pixels",
                            "default": 1024
                        }
                    },
                    "required": ["prompt", "model_id", "output_path"]
                }),
            },
            Tool {
                name: "transform_image",
                description: "Transform an existing image according to a prompt and save the result to output_path.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "image_path": {
                            "type": "string",
                            "description": "Path to the image to transform"
                        },
                        "prompt": {
                            "type": "string",
                            "description": "Description of the change to make"
                        },
                        "model_id": {
                            "type": "string",
                            "description": "Model identifier from list_models"
                        },
                        "output_path": {
                            "type": "string",
                            "description": "Where to save the result"
                        }
                    },
                    "required": ["image_path", "prompt", "model_id", "output_path"]
                }),
            },
            Tool {
                name: "prompt_guide",
                description: "Best practices and examples for writing image generation prompts.",
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
        ];

        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        tracing::debug!(tool = tool_name, "tool call");

        match tool_name {
            "list_models" => match self.tools.list_models().await {
                Ok(models) => JsonRpcResponse::text(id, to_pretty(&models)),
                Err(e) => JsonRpcResponse::tool_error(id, &e),
            },
            "generate_image" => {
                let args: GenerateImageArgs = match serde_json::from_value(arguments) {
                    Ok(a) => a,
                    Err(e) => {
                        return JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            format!("Invalid parameters: {}", e),
                        );
                    }
                };
                match self.tools.generate_image(args).await {
                    Ok(output) => JsonRpcResponse::text(id, to_pretty(&output)),
                    Err(e) => JsonRpcResponse::tool_error(id, &e),
                }
            }
            "transform_image" => {
                let args: TransformImageArgs = match serde_json::from_value(arguments) {
                    Ok(a) => a,
                    Err(e) => {
                        return JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            format!("Invalid parameters: {}", e),
                        );
                    }
                };
                match self.tools.transform_image(args).await {
                    Ok(output) => JsonRpcResponse::text(id, to_pretty(&output)),
                    Err(e) => JsonRpcResponse::tool_error(id, &e),
                }
            }
            "prompt_guide" => JsonRpcResponse::text(id, self.tools.prompt_guide()),
            _ => JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", tool_name)),
        }
    }
}

fn to_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Provider;
    use crate::testing::{stub_pool, StubProvider};
    use std::sync::Arc;

    fn make_server() -> McpServer {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"]));
        McpServer::new(ImageTools::from_pool(stub_pool(&[openai])))
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = make_server();
        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();

        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "smart-image");
    }

    #[tokio::test]
    async fn test_initialized_notification_has_no_response() {
        let server = make_server();
        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_requests_without_id_get_no_response() {
        let server = make_server();
        for message in [
            r#"{"jsonrpc":"2.0","method":"ping"}"#,
            r#"{"jsonrpc":"2.0","method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"prompt_guide"}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":4}}"#,
        ] {
            assert!(server.handle_message(message).await.is_none(), "{}", message);
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let server = make_server();
        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"ping","params":{}}"#)
            .await
            .unwrap();

        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let server = make_server();
        let resp = server.handle_tools_list(json!(1));

        let result = resp.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec!["list_models", "generate_image", "transform_image", "prompt_guide"]
        );

        let generate = &tools[1]["inputSchema"];
        assert_eq!(
            generate["required"],
            json!(["prompt", "model_id", "output_path"])
        );
        assert_eq!(generate["properties"]["width"]["default"], 1024);
    }

    #[tokio::test]
    async fn test_list_models_call() {
        let server = make_server();
        let resp = server
            .handle_tools_call(json!(1), &json!({"name": "list_models"}))
            .await;

        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let models: Value = serde_json::from_str(text).unwrap();
        assert_eq!(models[0]["model_id"], "gpt-image-1.5");
        assert_eq!(models[0]["provider"], "openai");
    }

    #[tokio::test]
    async fn test_prompt_guide_call() {
        let server = make_server();
        let resp = server
            .handle_tools_call(json!(1), &json!({"name": "prompt_guide"}))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert!(!result["content"][0]["text"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_is_invalid_params() {
        let server = make_server();
        let resp = server
            .handle_tools_call(
                json!(7),
                &json!({
                    "name": "generate_image",
                    "arguments": {
                        "prompt": "a fox",
                        "model_id": "gpt-image-42",
                        "output_path": "/tmp/never-written.png"
                    }
                }),
            )
            .await;

        let error = resp.error.unwrap();
        assert_eq!(error.code, -32602);
        let data = error.data.unwrap();
        assert_eq!(data["kind"], "unknown_model_error");
        assert!(data["provider"].is_null());
    }

    #[tokio::test]
    async fn test_missing_arguments() {
        let server = make_server();
        let resp = server
            .handle_tools_call(
                json!(1),
                &json!({"name": "transform_image", "arguments": {"prompt": "x"}}),
            )
            .await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let server = make_server();
        let resp = server
            .handle_tools_call(json!(1), &json!({"name": "generate_video"}))
            .await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_remote_failure_is_internal_error() {
        let failing = Arc::new(StubProvider::new(Provider::Gemini, &[]).failing());
        let server = McpServer::new(ImageTools::from_pool(stub_pool(&[failing])));
        let resp = server
            .handle_tools_call(json!(1), &json!({"name": "list_models"}))
            .await;

        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.data.unwrap()["kind"], "no_providers_available_error");
    }

    #[tokio::test]
    async fn test_invalid_jsonrpc_version() {
        let server = make_server();
        let resp = server
            .handle_message(r#"{"jsonrpc":"1.0","id":1,"method":"ping","params":{}}"#)
            .await
            .unwrap();

        assert_eq!(resp.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let server = make_server();
        let resp = server.handle_message("not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = make_server();
        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let server = make_server();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        );
        let mut output = Vec::new();
        server
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
    }
}
