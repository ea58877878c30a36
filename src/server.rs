/**
 * @file server.rs
 * @brief Tools, resources, and the MCP `ServerHandler` wiring (spec §4.7)
 *
 * `PtyService` holds the actual tool logic against a bound session's
 * `SessionManager`/`PtyManager` pair; `McpServer` is the thin `rmcp`
 * facing adapter that registers it as tools (`#[tool_router]`) and
 * resources (`list_resources`/`read_resource`). Keeping the two separate
 * means the streaming-HTTP binder's hand-rolled JSON-RPC dispatch (which
 * has no `rmcp` transport underneath it — see `transport::http`) can
 * call straight into `PtyService` without going through a second
 * protocol layer.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::sync::Arc;

use axum::body::Bytes;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::{
	CallToolResult, Content, ListResourcesResult, PaginatedRequestParam, RawResource,
	ReadResourceRequestParam, ReadResourceResult, ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{tool, tool_handler, tool_router, ErrorData, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::config::expand_cwd;
use crate::error::PtyError;
use crate::ids::ProcessId;
use crate::pty::{ProcessState, SpawnOptions};
use crate::session::SessionManager;
use crate::transport::http::{EndpointFactory, McpEndpoint};
use crate::transport::SessionContext;

impl From<PtyError> for ErrorData {
	fn from(err: PtyError) -> Self {
		ErrorData::internal_error(err.to_string(), None)
	}
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartArgs {
	/// Command to run, e.g. `"bash"` or `"echo hello"`.
	pub command: String,
	/// Working directory, absolute or `~`-prefixed.
	pub pwd: String,
	/// When true, the PTY manager removes this process from its map as
	/// soon as the child exits, instead of keeping a terminated entry.
	#[serde(default)]
	pub auto_dispose_on_exit: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KillArgs {
	pub process_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadArgs {
	pub process_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteInputArgs {
	pub process_id: String,
	pub input: Option<String>,
	pub ctrl_code: Option<String>,
	pub data: Option<String>,
	#[serde(default = "default_wait_ms")]
	pub wait_ms: u64,
}

fn default_wait_ms() -> u64 {
	1000
}

#[derive(Debug, Serialize)]
pub struct StartResult {
	pub process_id: String,
	pub screen: Vec<String>,
	pub exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct WriteResult {
	pub screen: Vec<String>,
	pub cursor: (u16, u16),
	pub exit_code: Option<i32>,
	pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PtyListEntry {
	pub id: String,
	pub status: &'static str,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub last_activity: chrono::DateTime<chrono::Utc>,
	pub exit_code: Option<i32>,
}

fn status_name(state: ProcessState) -> &'static str {
	match state {
		ProcessState::Initializing => "initializing",
		ProcessState::Active => "active",
		ProcessState::Idle => "idle",
		ProcessState::Terminating => "terminating",
		ProcessState::Terminated => "terminated",
	}
}

/// Core tool logic, independent of which protocol layer is calling it.
#[derive(Clone)]
pub struct PtyService {
	session_manager: Arc<SessionManager>,
	context: Arc<SessionContext>,
}

impl PtyService {
	pub fn new(session_manager: Arc<SessionManager>, context: Arc<SessionContext>) -> Self {
		Self { session_manager, context }
	}

	async fn pty_manager(&self) -> Result<Arc<crate::pty::PtyManager>, PtyError> {
		let session_id = self.context.session_id()?.clone();
		let session = self
			.session_manager
			.get_session(&session_id)
			.await
			.ok_or_else(|| PtyError::SessionNotFound(session_id.to_string()))?;
		self.session_manager.touch(&session_id).await?;
		Ok(session.read().await.pty_manager.clone())
	}

	pub async fn start(&self, args: StartArgs) -> Result<StartResult, PtyError> {
		let manager = self.pty_manager().await?;
		let cwd = expand_cwd(&args.pwd)?;
		let opts = SpawnOptions {
			command: args.command,
			cwd: Some(cwd),
			env_overlay: Default::default(),
			cols: 80,
			rows: 24,
			timeout: None,
			auto_dispose_on_exit: args.auto_dispose_on_exit,
		};
		let process = manager.create_pty(opts, system_clock()).await?;
		// Let output settle briefly before the initial screen capture.
		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		let (lines, _, _) = process.snapshot().await;
		let exit_code = match process.state().await {
			ProcessState::Terminated => Some(process.wait(()).await),
			_ => None,
		};
		Ok(StartResult { process_id: process.id().to_string(), screen: lines, exit_code })
	}

	pub async fn kill(&self, args: KillArgs) -> Result<bool, PtyError> {
		let manager = self.pty_manager().await?;
		let id = ProcessId::from(args.process_id);
		match manager.remove_pty(&id).await {
			Ok(()) => Ok(true),
			Err(PtyError::ProcessNotFound(_)) => Ok(false),
			Err(e) => Err(e),
		}
	}

	pub async fn list(&self) -> Result<Vec<PtyListEntry>, PtyError> {
		let manager = self.pty_manager().await?;
		let mut entries = Vec::new();
		for process in manager.all_ptys().await {
			entries.push(PtyListEntry {
				id: process.id().to_string(),
				status: status_name(process.state().await),
				created_at: process.created_at(),
				last_activity: process.last_activity().await,
				exit_code: process.exit_code(),
			});
		}
		Ok(entries)
	}

	pub async fn read(&self, args: ReadArgs) -> Result<Vec<String>, PtyError> {
		let manager = self.pty_manager().await?;
		let id = ProcessId::from(args.process_id.clone());
		let process = manager.get_pty(&id).await.ok_or(PtyError::ProcessNotFound(args.process_id))?;
		let (lines, _, _) = process.snapshot().await;
		Ok(lines)
	}

	pub async fn write_input(&self, args: WriteInputArgs) -> Result<WriteResult, PtyError> {
		let manager = self.pty_manager().await?;
		let id = ProcessId::from(args.process_id.clone());
		let process = manager.get_pty(&id).await.ok_or(PtyError::ProcessNotFound(args.process_id))?;

		let bytes = match (&args.data, &args.input, &args.ctrl_code) {
			(Some(data), None, None) => data.clone().into_bytes(),
			(None, input, ctrl_code) => {
				let mut bytes = input.clone().unwrap_or_default().into_bytes();
				if let Some(code) = ctrl_code {
					bytes.extend(crate::control_code::resolve(code)?);
				}
				bytes
			}
			_ => {
				return Err(PtyError::SchemaValidation(
					"write_input accepts either `data` or `input`/`ctrlCode`, not both".to_string(),
				))
			}
		};

		if bytes.is_empty() {
			let (lines, cursor, _) = process.snapshot().await;
			return Ok(WriteResult {
				screen: lines,
				cursor,
				exit_code: None,
				warning: Some("Empty input ignored - use '\\n' for Enter key".to_string()),
			});
		}

		process.write(&bytes).await?;
		tokio::time::sleep(std::time::Duration::from_millis(args.wait_ms.min(5000))).await;
		let (lines, cursor, _) = process.snapshot().await;
		let exit_code = match process.state().await {
			ProcessState::Terminated => Some(process.wait(()).await),
			_ => None,
		};
		Ok(WriteResult { screen: lines, cursor, exit_code, warning: None })
	}

	pub async fn resource_status(&self) -> Result<Value, PtyError> {
		let manager = self.pty_manager().await?;
		Ok(serde_json::json!({
			"sessionCount": self.session_manager.session_count().await,
			"processCount": manager.len().await,
		}))
	}

	pub async fn resource_output(&self, process_id: &str) -> Result<Value, PtyError> {
		let manager = self.pty_manager().await?;
		let id = ProcessId::from(process_id.to_string());
		let process = manager.get_pty(&id).await.ok_or_else(|| PtyError::ProcessNotFound(process_id.to_string()))?;
		let buffer = process.output_buffer().await;
		let (_, _, ansi) = process.snapshot().await;
		Ok(serde_json::json!({
			"raw": String::from_utf8_lossy(&buffer).to_string(),
			"ansi": ansi,
		}))
	}

	pub async fn resource_process_status(&self, process_id: &str) -> Result<Value, PtyError> {
		let manager = self.pty_manager().await?;
		let id = ProcessId::from(process_id.to_string());
		let process = manager.get_pty(&id).await.ok_or_else(|| PtyError::ProcessNotFound(process_id.to_string()))?;
		Ok(serde_json::json!({
			"status": status_name(process.state().await),
			"createdAt": process.created_at(),
			"lastActivity": process.last_activity().await,
			"exitCode": process.exit_code(),
		}))
	}
}

fn system_clock() -> crate::clock::SharedClock {
	Arc::new(crate::clock::SystemClock)
}

fn to_tool_result<T: Serialize>(result: Result<T, PtyError>) -> Result<CallToolResult, ErrorData> {
	match result {
		Ok(value) => {
			let text = serde_json::to_string(&value).unwrap_or_default();
			Ok(CallToolResult::success(vec![Content::text(text)]))
		}
		Err(e) => Err(e.into()),
	}
}

/// The `rmcp`-facing server handler. Registers tools via `#[tool_router]`
/// and resources directly on `ServerHandler`.
#[derive(Clone)]
pub struct McpServer {
	service: PtyService,
	deactivate_resources: bool,
	tool_router: ToolRouter<McpServer>,
}

#[tool_router]
impl McpServer {
	pub fn new(session_manager: Arc<SessionManager>, context: Arc<SessionContext>, deactivate_resources: bool) -> Self {
		Self {
			service: PtyService::new(session_manager, context),
			deactivate_resources,
			tool_router: Self::tool_router(),
		}
	}

	#[tool(description = "Spawn a new PTY-backed process and return its initial screen")]
	async fn start(&self, args: StartArgs) -> Result<CallToolResult, ErrorData> {
		to_tool_result(self.service.start(args).await)
	}

	#[tool(description = "Terminate a PTY-backed process")]
	async fn kill(&self, args: KillArgs) -> Result<CallToolResult, ErrorData> {
		to_tool_result(self.service.kill(args).await.map(|success| serde_json::json!({ "success": success })))
	}

	#[tool(description = "List every PTY-backed process in the current session")]
	async fn list(&self) -> Result<CallToolResult, ErrorData> {
		to_tool_result(self.service.list().await.map(|ptys| serde_json::json!({ "ptys": ptys })))
	}

	#[tool(description = "Read the current rendered screen of a PTY-backed process")]
	async fn read(&self, args: ReadArgs) -> Result<CallToolResult, ErrorData> {
		to_tool_result(self.service.read(args).await.map(|screen| serde_json::json!({ "screen": screen })))
	}

	#[tool(description = "Write text, a control code, or raw bytes to a PTY-backed process")]
	async fn write_input(&self, args: WriteInputArgs) -> Result<CallToolResult, ErrorData> {
		to_tool_result(self.service.write_input(args).await)
	}

	#[tool(description = "Re-register list/read as tools when resources are deactivated")]
	async fn activate_pty_tools(&self) -> Result<CallToolResult, ErrorData> {
		if !self.deactivate_resources {
			return Ok(CallToolResult::success(vec![Content::text(
				"resources are already active".to_string(),
			)]));
		}
		Ok(CallToolResult::success(vec![Content::text("list/read are available as tools".to_string())]))
	}
}

#[tool_handler]
impl ServerHandler for McpServer {
	fn get_info(&self) -> ServerInfo {
		ServerInfo {
			capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
			..Default::default()
		}
	}

	async fn list_resources(
		&self,
		_request: Option<PaginatedRequestParam>,
		_ctx: RequestContext<RoleServer>,
	) -> Result<ListResourcesResult, ErrorData> {
		if self.deactivate_resources {
			return Ok(ListResourcesResult { resources: vec![], next_cursor: None });
		}
		let resources = vec![
			RawResource::new("pty://status", "PTY session/process counts").no_annotation(),
			RawResource::new("pty://list", "PTY list for the current session").no_annotation(),
		];
		Ok(ListResourcesResult { resources, next_cursor: None })
	}

	async fn read_resource(
		&self,
		request: ReadResourceRequestParam,
		_ctx: RequestContext<RoleServer>,
	) -> Result<ReadResourceResult, ErrorData> {
		let uri = request.uri.as_str();
		let value = if uri == "pty://status" {
			self.service.resource_status().await
		} else if uri == "pty://list" {
			self.service.list().await.map(|ptys| serde_json::json!({ "ptys": ptys }))
		} else if let Some(rest) = uri.strip_prefix("pty://").and_then(|r| r.strip_suffix("/output")) {
			self.service.resource_output(rest).await
		} else if let Some(rest) = uri.strip_prefix("pty://").and_then(|r| r.strip_suffix("/status")) {
			self.service.resource_process_status(rest).await
		} else {
			Err(PtyError::SchemaValidation(format!("unknown resource uri: {uri}")))
		}
		.map_err(ErrorData::from)?;

		Ok(ReadResourceResult {
			contents: vec![ResourceContents::text(serde_json::to_string(&value).unwrap_or_default(), request.uri)],
		})
	}
}

/// Drives the real `rmcp` stdio transport to completion. One process, one
/// session, no reconnection — `connect` doesn't return until the client
/// closes stdin.
pub struct StdioEndpoint {
	session_manager: Arc<SessionManager>,
	deactivate_resources: bool,
}

impl StdioEndpoint {
	pub fn new(session_manager: Arc<SessionManager>, deactivate_resources: bool) -> Self {
		Self { session_manager, deactivate_resources }
	}
}

#[async_trait::async_trait]
impl McpEndpoint for StdioEndpoint {
	async fn connect(&self, ctx: Arc<SessionContext>) -> crate::error::Result<()> {
		let server = McpServer::new(self.session_manager.clone(), ctx, self.deactivate_resources);
		let running = rmcp::serve_server(server, rmcp::transport::stdio())
			.await
			.map_err(|e| PtyError::InternalError(format!("rmcp stdio transport: {e}")))?;
		running.waiting().await.map_err(|e| PtyError::InternalError(format!("rmcp stdio transport: {e}")))?;
		Ok(())
	}

	async fn handle_request(&self, body: Bytes) -> crate::error::Result<Bytes> {
		// `connect` owns the whole request/response pump for stdio; nothing
		// ever calls this.
		Ok(body)
	}
}

pub struct StdioFactory {
	session_manager: Arc<SessionManager>,
	deactivate_resources: bool,
}

impl StdioFactory {
	pub fn new(session_manager: Arc<SessionManager>, deactivate_resources: bool) -> Self {
		Self { session_manager, deactivate_resources }
	}
}

impl EndpointFactory for StdioFactory {
	fn new_endpoint(&self) -> Arc<dyn McpEndpoint> {
		Arc::new(StdioEndpoint::new(self.session_manager.clone(), self.deactivate_resources))
	}
}

#[derive(Deserialize)]
struct JsonRpcRequest {
	#[allow(dead_code)]
	jsonrpc: String,
	id: Option<Value>,
	method: String,
	#[serde(default)]
	params: Value,
}

#[derive(Serialize)]
struct JsonRpcResponse {
	jsonrpc: &'static str,
	id: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<Value>,
}

/// Streaming-HTTP has no persistent duplex stream for `rmcp`'s own
/// transport to pump, so each request/response pair is dispatched by hand
/// against `PtyService` directly (spec §4.6's session-recovery semantics
/// are the reason the streaming-HTTP binder doesn't use `rmcp`'s built-in
/// HTTP session manager at all — see `transport::http`).
pub struct HttpEndpoint {
	session_manager: Arc<SessionManager>,
	service: OnceCell<PtyService>,
}

impl HttpEndpoint {
	pub fn new(session_manager: Arc<SessionManager>) -> Self {
		Self { session_manager, service: OnceCell::new() }
	}

	async fn dispatch(&self, service: &PtyService, request: JsonRpcRequest) -> Value {
		let result = match request.method.as_str() {
			"initialize" => Ok(serde_json::json!({
				"protocolVersion": "2024-11-05",
				"serverInfo": { "name": "mcp-pty", "version": env!("CARGO_PKG_VERSION") },
			})),
			"tools/call" => self.dispatch_tool_call(service, request.params).await,
			"resources/list" => service.list().await.map(|ptys| serde_json::json!({ "ptys": ptys })),
			"resources/read" => {
				let uri = request.params.get("uri").and_then(Value::as_str).unwrap_or_default();
				if uri == "pty://status" {
					service.resource_status().await
				} else if let Some(rest) = uri.strip_prefix("pty://").and_then(|r| r.strip_suffix("/output")) {
					service.resource_output(rest).await
				} else if let Some(rest) = uri.strip_prefix("pty://").and_then(|r| r.strip_suffix("/status")) {
					service.resource_process_status(rest).await
				} else {
					Err(PtyError::BadRequest(format!("unknown resource uri: {uri}")))
				}
			}
			other => Err(PtyError::BadRequest(format!("unknown method: {other}"))),
		};

		match result {
			Ok(value) => {
				serde_json::to_value(JsonRpcResponse { jsonrpc: "2.0", id: request.id, result: Some(value), error: None })
					.unwrap_or(Value::Null)
			}
			Err(e) => serde_json::to_value(JsonRpcResponse {
				jsonrpc: "2.0",
				id: request.id,
				result: None,
				error: Some(serde_json::json!({ "code": e.http_status(), "message": e.to_string() })),
			})
			.unwrap_or(Value::Null),
		}
	}

	async fn dispatch_tool_call(&self, service: &PtyService, params: Value) -> Result<Value, PtyError> {
		let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
		let args = params.get("arguments").cloned().unwrap_or(Value::Null);
		let parse = |v: Value| serde_json::from_value(v).map_err(|e| PtyError::BadRequest(e.to_string()));

		match name {
			"start" => service.start(parse(args)?).await.and_then(|r| {
				serde_json::to_value(r).map_err(|e| PtyError::InternalError(e.to_string()))
			}),
			"kill" => service
				.kill(parse(args)?)
				.await
				.map(|success| serde_json::json!({ "success": success })),
			"list" => service.list().await.map(|ptys| serde_json::json!({ "ptys": ptys })),
			"read" => service.read(parse(args)?).await.map(|screen| serde_json::json!({ "screen": screen })),
			"write_input" => service.write_input(parse(args)?).await.and_then(|r| {
				serde_json::to_value(r).map_err(|e| PtyError::InternalError(e.to_string()))
			}),
			other => Err(PtyError::BadRequest(format!("unknown tool: {other}"))),
		}
	}
}

#[async_trait::async_trait]
impl McpEndpoint for HttpEndpoint {
	async fn connect(&self, ctx: Arc<SessionContext>) -> crate::error::Result<()> {
		let service = PtyService::new(self.session_manager.clone(), ctx);
		self.service
			.set(service)
			.map_err(|_| PtyError::InternalError("endpoint already connected".to_string()))?;
		Ok(())
	}

	async fn handle_request(&self, body: Bytes) -> crate::error::Result<Bytes> {
		let service = self.service.get().ok_or(PtyError::NoSessionBound)?;
		let request: JsonRpcRequest =
			serde_json::from_slice(&body).map_err(|e| PtyError::BadRequest(e.to_string()))?;
		let response = self.dispatch(service, request).await;
		Ok(Bytes::from(serde_json::to_vec(&response).unwrap_or_default()))
	}
}

pub struct HttpFactory {
	session_manager: Arc<SessionManager>,
}

impl HttpFactory {
	pub fn new(session_manager: Arc<SessionManager>) -> Self {
		Self { session_manager }
	}
}

impl EndpointFactory for HttpFactory {
	fn new_endpoint(&self) -> Arc<dyn McpEndpoint> {
		Arc::new(HttpEndpoint::new(self.session_manager.clone()))
	}
}
