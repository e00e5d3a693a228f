// MCP server implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::indexer::Indexer;
use crate::mcp::tools;

const PROTOCOL_VERSION: &str = "2024-11-05";
const STATS_URI: &str = "tsgraph://stats";
const ROUTES_URI: &str = "tsgraph://routes";

/// JSON-RPC message
#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcMessage {
    jsonrpc: String,
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
}

/// MCP tool definition
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

/// MCP resource definition
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Resource {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    mime_type: &'static str,
}

/// MCP server capabilities
#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: Value,
    resources: Value,
}

/// MCP server info
#[derive(Debug, Serialize)]
struct ServerInfo {
    name: String,
    version: String,
}

/// MCP initialize result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

fn rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Option<Value>, code: i32, message: impl Into<String>) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message.into() } })
}

/// MCP server over stdio, one JSON-RPC message per line
pub struct McpServer {
    indexer: Arc<Indexer>,
}

impl McpServer {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }

    /// Serve until stdin closes or a `shutdown` request arrives
    pub async fn run(self) -> Result<()> {
        info!("Starting MCP server");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            let (response, shutdown) = match self.handle_message(&line).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Error handling message: {}", e);
                    (Some(rpc_error(None, -32700, format!("Parse error: {}", e))), false)
                }
            };

            if let Some(response) = response {
                let mut body = serde_json::to_vec(&response)?;
                body.push(b'\n');
                stdout.write_all(&body).await?;
                stdout.flush().await?;
            }

            if shutdown {
                break;
            }
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Handle one JSON-RPC message. Returns the response (none for
    /// notifications) and whether the server should stop.
    pub async fn handle_message(&self, message: &str) -> Result<(Option<Value>, bool)> {
        let msg: JsonRpcMessage = serde_json::from_str(message)?;
        let method = msg.method.as_deref().unwrap_or_default();

        if msg.id.is_none() {
            debug!("Notification: {}", method);
            return Ok((None, false));
        }

        let response = match method {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: json!({}),
                        resources: json!({}),
                    },
                    server_info: ServerInfo {
                        name: "tsgraph".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                rpc_result(msg.id, serde_json::to_value(result)?)
            }

            "ping" => rpc_result(msg.id, json!({})),

            "tools/list" => rpc_result(msg.id, json!({ "tools": list_tools() })),

            "tools/call" => match msg.params.as_ref() {
                Some(params) => match self.call_tool(params).await {
                    Some(result) => rpc_result(msg.id, result),
                    None => rpc_error(msg.id, -32602, format!("Unknown tool: {}", params["name"])),
                },
                None => rpc_error(msg.id, -32602, "Invalid params"),
            },

            "resources/list" => rpc_result(msg.id, json!({ "resources": list_resources() })),

            "resources/read" => {
                let uri = msg.params.as_ref().and_then(|p| p["uri"].as_str()).unwrap_or_default();
                match self.read_resource(uri) {
                    Some(contents) => rpc_result(msg.id, contents),
                    None => rpc_error(msg.id, -32602, format!("Unknown resource: {}", uri)),
                }
            }

            "shutdown" => {
                info!("Received shutdown request");
                return Ok((Some(rpc_result(msg.id, Value::Null)), true));
            }

            _ => rpc_error(msg.id, -32601, "Method not found"),
        };

        Ok((Some(response), false))
    }

    /// Dispatch a tool call; `None` when the tool is unknown
    async fn call_tool(&self, params: &Value) -> Option<Value> {
        let name = params["name"].as_str()?;
        let args = params["arguments"].as_object().cloned().unwrap_or_else(Map::new);
        let indexer = self.indexer.as_ref();
        debug!("Calling tool {}", name);

        let payload = match name {
            "analyze_project" => tools::analyze_project(indexer, &args).await,
            "search_symbols" => tools::search_symbols(indexer, &args).await,
            "find_usages" => tools::find_usages(indexer, &args).await,
            "find_dependencies" => tools::find_dependencies(indexer, &args).await,
            "list_routes" => tools::list_routes(indexer, &args).await,
            "get_file_symbols" => tools::get_file_symbols(indexer, &args).await,
            "index_stats" => tools::index_stats(indexer, &args).await,
            _ => return None,
        };

        Some(tools::tool_result(payload))
    }

    fn read_resource(&self, uri: &str) -> Option<Value> {
        let payload = match uri {
            STATS_URI => json!(self.indexer.stats()),
            ROUTES_URI => json!(self
                .indexer
                .query(|engine| engine.list_routes(None, None))
                .unwrap_or_default()),
            _ => return None,
        };

        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        Some(json!({
            "contents": [{ "uri": uri, "mimeType": "application/json", "text": text }]
        }))
    }
}

fn list_resources() -> Vec<Resource> {
    vec![
        Resource {
            uri: STATS_URI,
            name: "Index statistics",
            description: "File, symbol, route and dependency totals for the analyzed project",
            mime_type: "application/json",
        },
        Resource {
            uri: ROUTES_URI,
            name: "HTTP routes",
            description: "Every HTTP route declaration found in the analyzed project",
            mime_type: "application/json",
        },
    ]
}

fn list_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "analyze_project",
            description: "Index a TypeScript/JavaScript project (restored from cache when possible)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectPath": { "type": "string", "description": "Absolute path of the project root" },
                    "includePatterns": { "type": "array", "items": { "type": "string" }, "description": "Glob patterns to include" },
                    "excludePatterns": { "type": "array", "items": { "type": "string" }, "description": "Glob patterns to exclude" },
                    "forceReindex": { "type": "boolean", "default": false, "description": "Ignore any cached index" }
                },
                "required": ["projectPath"]
            }),
        },
        Tool {
            name: "search_symbols",
            description: "Search functions, methods, classes, interfaces, types and enums by name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Case-insensitive name fragment" },
                    "kind": {
                        "type": "string",
                        "enum": ["method", "function", "class", "interface", "type", "enum", "variable", "all"],
                        "default": "all"
                    },
                    "includeUsages": { "type": "boolean", "default": false },
                    "limit": { "type": "integer", "default": 50, "description": "Maximum number of results" }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "find_usages",
            description: "Find the files importing a file, or dependency edges mentioning a method or class name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string", "description": "Project-relative or absolute file path" },
                    "methodName": { "type": "string" },
                    "className": { "type": "string" },
                    "searchType": { "type": "string", "enum": ["imports", "usages", "both"], "default": "both" }
                }
            }),
        },
        Tool {
            name: "find_dependencies",
            description: "Walk the import graph around a file or name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entityName": { "type": "string" },
                    "direction": { "type": "string", "enum": ["incoming", "outgoing", "both"], "default": "both" },
                    "depth": { "type": "integer", "minimum": 1, "maximum": 10, "default": 3 }
                },
                "required": ["entityName"]
            }),
        },
        Tool {
            name: "list_routes",
            description: "List HTTP route declarations",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "method": { "type": "string", "description": "HTTP verb filter" },
                    "pathContains": { "type": "string", "description": "Substring of the route path" }
                }
            }),
        },
        Tool {
            name: "get_file_symbols",
            description: "Symbols, routes and imports recorded for one file",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string", "description": "Project-relative or absolute file path" }
                },
                "required": ["filePath"]
            }),
        },
        Tool {
            name: "index_stats",
            description: "Get index statistics",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    fn server(cache_dir: &std::path::Path) -> McpServer {
        let mut config = Config::default();
        config.cache.directory = Some(cache_dir.to_path_buf());
        McpServer::new(Arc::new(Indexer::new(config)))
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let cache = tempdir().unwrap();
        let server = server(cache.path());

        let (response, stop) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let response = response.unwrap();
        assert!(!stop);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "tsgraph");

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response.unwrap()["result"]["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 7);
        assert!(tools.iter().all(|t| t.get("inputSchema").is_some()));

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.unwrap()["result"]["resources"][0]["uri"], STATS_URI);
    }

    #[tokio::test]
    async fn test_tool_call_and_errors() {
        let cache = tempdir().unwrap();
        let server = server(cache.path());

        let (response, _) = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"analyze_project","arguments":{"projectPath":"relative"}}}"#,
            )
            .await
            .unwrap();
        let result = &response.unwrap()["result"];
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("\"success\": false"));

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope"}}"#)
            .await
            .unwrap();
        assert_eq!(response.unwrap()["error"]["code"], -32602);

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":6,"method":"bogus"}"#)
            .await
            .unwrap();
        assert_eq!(response.unwrap()["error"]["code"], -32601);

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(response.is_none());

        assert!(server.handle_message("not json").await.is_err());
    }

    #[tokio::test]
    async fn test_resources_and_shutdown() {
        let cache = tempdir().unwrap();
        let server = server(cache.path());

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":7,"method":"resources/read","params":{"uri":"tsgraph://routes"}}"#)
            .await
            .unwrap();
        let contents = &response.unwrap()["result"]["contents"][0];
        assert_eq!(contents["mimeType"], "application/json");
        assert_eq!(contents["text"], "[]");

        let (response, stop) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":8,"method":"shutdown"}"#)
            .await
            .unwrap();
        assert!(stop);
        assert!(response.unwrap()["result"].is_null());
    }
}
