//! Recordwalk MCP Server — Model Context Protocol over JSON-RPC / HTTP
//!
//! Exposes one [`IterationEngine`] as **Tools** and a status **Resource** to
//! any MCP-compatible LLM client. Each request is independent: the client
//! walks a dataset by calling `next_record` / `save_result` repeatedly, and
//! the engine remembers where it is between calls.
//!
//! # Protocol
//!
//! | Method                        | Purpose                                    |
//! |-------------------------------|--------------------------------------------|
//! | `initialize`                  | Handshake — returns server capabilities    |
//! | `tools/list`                  | Enumerate available tools                  |
//! | `tools/call`                  | Execute a tool (e.g. `next_record`)        |
//! | `resources/list`              | Enumerate exposed resources                |
//! | `resources/read`              | Read the engine status resource            |
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   JSON-RPC   ┌──────────────┐   serialized   ┌──────────────┐
//! │  LLM Client  │─────────────▶│  Axum Router │───────────────▶│ Iteration    │
//! │ (Claude/etc) │◀─────────────│  (async)     │◀───────────────│ Engine       │
//! └──────────────┘              └──────────────┘                └──────────────┘
//! ```

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::IterationEngine;
use crate::error::display_chain;

/// URI of the read-only status resource.
pub const STATUS_URI: &str = "recordwalk://status";

// ─── JSON-RPC 2.0 types ────────────────────────────────────────────────────

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Successful tool call rendered as a single text block.
    fn text(id: Option<Value>, text: String) -> Self {
        Self::success(id, json!({ "content": [ContentBlock::text(text)] }))
    }

    /// Successful tool call with a text block plus structured metadata.
    fn text_with_metadata(id: Option<Value>, text: String, metadata: Value) -> Self {
        Self::success(
            id,
            json!({ "content": [ContentBlock::text(text)], "metadata": metadata }),
        )
    }
}

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

// ─── MCP protocol types ────────────────────────────────────────────────────

/// MCP server capabilities announced during `initialize`.
#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: ListChanged,
    resources: ListChanged,
}

#[derive(Debug, Serialize)]
struct ListChanged {
    #[serde(rename = "listChanged")]
    list_changed: bool,
}

#[derive(Debug, Serialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: String,
    version: String,
}

/// MCP tool descriptor.
#[derive(Debug, Serialize)]
struct ToolDescriptor {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

/// MCP resource descriptor.
#[derive(Debug, Serialize)]
struct ResourceDescriptor {
    uri: String,
    name: String,
    description: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

/// Result content block returned by tool calls.
#[derive(Debug, Serialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

impl ContentBlock {
    fn text(text: String) -> Self {
        Self {
            content_type: "text".into(),
            text,
        }
    }
}

// ─── Shared state ───────────────────────────────────────────────────────────

/// State shared between Axum handlers. The mutex serializes every
/// operation on the engine.
pub struct McpState {
    pub engine: IterationEngine,
}

pub type SharedMcpState = Arc<Mutex<McpState>>;

// ─── Server bootstrap ──────────────────────────────────────────────────────

/// Build the JSON-RPC router around `engine`.
pub fn router(engine: IterationEngine) -> Router {
    let state: SharedMcpState = Arc::new(Mutex::new(McpState { engine }));

    Router::new()
        .route("/", post(handle_jsonrpc))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `engine` on `127.0.0.1:<port>` until the process exits.
pub async fn start_mcp_server(engine: IterationEngine, port: u16) -> Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("MCP server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health-check endpoint (useful for readiness probes).
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok", "server": "recordwalk"})))
}

// ─── JSON-RPC dispatcher ───────────────────────────────────────────────────

async fn handle_jsonrpc(
    State(state): State<SharedMcpState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let response = match req.method.as_str() {
        "initialize" => handle_initialize(req.id),
        "initialized" => JsonRpcResponse::success(req.id, json!({})),
        "tools/list" => handle_tools_list(req.id),
        "tools/call" => handle_tools_call(req.id, req.params, &state).await,
        "resources/list" => handle_resources_list(req.id, &state).await,
        "resources/read" => handle_resources_read(req.id, req.params, &state).await,
        _ => JsonRpcResponse::error(
            req.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Json(response)
}

// ─── Method handlers ────────────────────────────────────────────────────────

fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    let result = InitializeResult {
        protocol_version: "2024-11-05".into(),
        capabilities: ServerCapabilities {
            tools: ListChanged {
                list_changed: false,
            },
            resources: ListChanged {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: "recordwalk".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    };

    JsonRpcResponse::success(
        id,
        serde_json::to_value(result).expect("InitializeResult is serializable"),
    )
}

fn tool_descriptors() -> Vec<ToolDescriptor> {
    let no_args = json!({ "type": "object", "properties": {} });

    vec![
        ToolDescriptor {
            name: "load_jsonl",
            description: "Load a JSONL file (one JSON record per line) and start iterating \
                          from the first record. Invalid lines are skipped. Replaces any \
                          previously loaded dataset and clears saved results.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the JSONL file"
                    }
                },
                "required": ["file_path"]
            }),
        },
        ToolDescriptor {
            name: "load_json",
            description: "Load records from a JSON document by running a jq query that \
                          returns an array. Without jq installed, supports paths like \
                          `.data.items` and `map(select(.field == value))` stages.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the JSON document"
                    },
                    "query": {
                        "type": "string",
                        "description": "Query expression that yields an array, e.g. `.users`"
                    }
                },
                "required": ["file_path", "query"]
            }),
        },
        ToolDescriptor {
            name: "next_record",
            description: "Return the next record of the loaded dataset and advance the cursor.",
            input_schema: no_args.clone(),
        },
        ToolDescriptor {
            name: "save_result",
            description: "Save a processing result for the record just before the cursor: \
                          the one next_record last returned, unless reset or \
                          jump_to moved the cursor since.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "result": {
                        "type": "string",
                        "description": "Result text for the current record"
                    }
                },
                "required": ["result"]
            }),
        },
        ToolDescriptor {
            name: "get_status",
            description: "Report the dataset source, cursor position, record count and \
                          number of saved results.",
            input_schema: no_args.clone(),
        },
        ToolDescriptor {
            name: "reset",
            description: "Rewind the cursor to the first record. Saved results are kept.",
            input_schema: no_args,
        },
        ToolDescriptor {
            name: "jump_to",
            description: "Move the cursor so the next record returned is the one at `index` \
                          (0-based).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "index": {
                        "type": "integer",
                        "description": "0-based record index"
                    }
                },
                "required": ["index"]
            }),
        },
        ToolDescriptor {
            name: "export_results",
            description: "Write all saved results to a JSON file as an array of \
                          {record_index, result} objects.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "output_path": {
                        "type": "string",
                        "description": "Destination file (overwritten)"
                    }
                },
                "required": ["output_path"]
            }),
        },
    ]
}

fn handle_tools_list(id: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        json!({ "tools": serde_json::to_value(tool_descriptors()).expect("ToolDescriptor is serializable") }),
    )
}

/// Fetch a required string argument.
fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required parameter: {}", name))
}

/// Execute a tool call.
async fn handle_tools_call(
    id: Option<Value>,
    params: Value,
    state: &SharedMcpState,
) -> JsonRpcResponse {
    let tool_name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match tool_name {
        "load_jsonl" => tool_load_jsonl(id, arguments, state).await,
        "load_json" => tool_load_json(id, arguments, state).await,
        "next_record" => tool_next_record(id, state).await,
        "save_result" => tool_save_result(id, arguments, state).await,
        "get_status" => tool_get_status(id, state).await,
        "reset" => tool_reset(id, state).await,
        "jump_to" => tool_jump_to(id, arguments, state).await,
        "export_results" => tool_export_results(id, arguments, state).await,
        _ => JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", tool_name)),
    }
}

/// `load_jsonl` — replace the dataset with a line-delimited file.
async fn tool_load_jsonl(id: Option<Value>, args: Value, state: &SharedMcpState) -> JsonRpcResponse {
    let path = match str_arg(&args, "file_path") {
        Ok(path) => path,
        Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, message),
    };

    let mut state = state.lock().await;
    match state.engine.load_line_delimited(path).await {
        Ok(report) => {
            let mut text = format!("Loaded {} records from {}", report.records, path);
            if !report.skipped.is_empty() {
                text.push_str(&format!(" ({} invalid lines skipped)", report.skipped.len()));
            }
            JsonRpcResponse::text_with_metadata(id, text, json!(report))
        }
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, display_chain(&e)),
    }
}

/// `load_json` — replace the dataset with the array a query selects.
async fn tool_load_json(id: Option<Value>, args: Value, state: &SharedMcpState) -> JsonRpcResponse {
    let (path, query) = match (str_arg(&args, "file_path"), str_arg(&args, "query")) {
        (Ok(path), Ok(query)) => (path, query),
        (Err(message), _) | (_, Err(message)) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, message)
        }
    };

    let mut state = state.lock().await;
    match state.engine.load_queried(path, query).await {
        Ok(report) => JsonRpcResponse::text_with_metadata(
            id,
            format!("Loaded {} records from {} using query `{}`", report.records, path, query),
            json!(report),
        ),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, display_chain(&e)),
    }
}

/// `next_record` — hand out the record under the cursor.
async fn tool_next_record(id: Option<Value>, state: &SharedMcpState) -> JsonRpcResponse {
    let mut state = state.lock().await;
    match state.engine.next() {
        Some(view) => {
            let pretty = serde_json::to_string_pretty(view.record)
                .expect("serde_json::Value is serializable");
            let text = format!("Record {}\n\n{}", view.progress, pretty);
            JsonRpcResponse::text_with_metadata(
                id,
                text,
                json!({
                    "record_number": view.record_number,
                    "total": view.total,
                    "progress": view.progress,
                }),
            )
        }
        None => JsonRpcResponse::text(id, "No more records to process.".into()),
    }
}

/// `save_result` — attach a result to the last returned record.
async fn tool_save_result(id: Option<Value>, args: Value, state: &SharedMcpState) -> JsonRpcResponse {
    let result = match str_arg(&args, "result") {
        Ok(result) => result,
        Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, message),
    };

    let mut state = state.lock().await;
    match state.engine.save_result(result) {
        Ok(()) => {
            let status = state.engine.status();
            JsonRpcResponse::text(
                id,
                format!("Result saved ({} results, {}/{} records visited)", status.completed, status.cursor, status.total),
            )
        }
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, display_chain(&e)),
    }
}

/// `get_status` — progress snapshot.
async fn tool_get_status(id: Option<Value>, state: &SharedMcpState) -> JsonRpcResponse {
    let state = state.lock().await;
    let status = state.engine.status();

    let text = format!(
        "Source: {}\nProgress: {}/{}\nRemaining: {}\nResults saved: {}\nHas more: {}",
        status.source.as_deref().unwrap_or("(none)"),
        status.cursor,
        status.total,
        status.remaining,
        status.completed,
        state.engine.has_more(),
    );

    let mut metadata = json!(status);
    metadata["has_more"] = json!(state.engine.has_more());
    JsonRpcResponse::text_with_metadata(id, text, metadata)
}

/// `reset` — rewind to the first record.
async fn tool_reset(id: Option<Value>, state: &SharedMcpState) -> JsonRpcResponse {
    let mut state = state.lock().await;
    state.engine.reset();
    JsonRpcResponse::text(id, format!("Cursor reset to the first of {} records", state.engine.len()))
}

/// `jump_to` — random access by 0-based index.
async fn tool_jump_to(id: Option<Value>, args: Value, state: &SharedMcpState) -> JsonRpcResponse {
    let index = match args.get("index").and_then(Value::as_i64) {
        Some(index) => index,
        None => {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                "Missing required parameter: index".into(),
            )
        }
    };

    let mut state = state.lock().await;
    let total = state.engine.len();
    if state.engine.jump_to(index) {
        JsonRpcResponse::text(id, format!("Jumped to record {} of {}", index + 1, total))
    } else {
        JsonRpcResponse::error(
            id,
            INVALID_PARAMS,
            format!("Index {} out of range (dataset has {} records)", index, total),
        )
    }
}

/// `export_results` — write saved results to disk.
async fn tool_export_results(id: Option<Value>, args: Value, state: &SharedMcpState) -> JsonRpcResponse {
    let path = match str_arg(&args, "output_path") {
        Ok(path) => path,
        Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, message),
    };

    let state = state.lock().await;
    match state.engine.export_results(path).await {
        Ok(count) => JsonRpcResponse::text(id, format!("Exported {} results to {}", count, path)),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, display_chain(&e)),
    }
}

/// Handle `resources/list` — expose the engine status as a resource.
async fn handle_resources_list(id: Option<Value>, state: &SharedMcpState) -> JsonRpcResponse {
    let state = state.lock().await;
    let status = state.engine.status();

    let resources = vec![ResourceDescriptor {
        uri: STATUS_URI.into(),
        name: "Iteration status".into(),
        description: match &status.source {
            Some(source) => format!("{} records from {}", status.total, source),
            None => "No dataset loaded".into(),
        },
        mime_type: "application/json".into(),
    }];

    JsonRpcResponse::success(
        id,
        json!({ "resources": serde_json::to_value(&resources).expect("ResourceDescriptor is serializable") }),
    )
}

/// Handle `resources/read` — return the status snapshot as JSON text.
async fn handle_resources_read(
    id: Option<Value>,
    params: Value,
    state: &SharedMcpState,
) -> JsonRpcResponse {
    let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
    if uri != STATUS_URI {
        return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Unknown resource: {}", uri));
    }

    let state = state.lock().await;
    let text = serde_json::to_string_pretty(&state.engine.status())
        .expect("Status is serializable");

    let contents = vec![json!({
        "uri": STATUS_URI,
        "mimeType": "application/json",
        "text": text,
    })];

    JsonRpcResponse::success(id, json!({ "contents": contents }))
}
