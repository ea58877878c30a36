//! End-to-end scenario tests for the PTY + session runtime.
//!
//! Each test exercises a concrete scenario from the spec's testable
//! properties: spawn/read, a REPL round-trip, the per-session PTY cap,
//! dangerous-command rejection, idle-sweep disposal, and the
//! streaming-HTTP stale-session recovery contract.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use chrono::Utc;
use tower::ServiceExt;

use mcp_pty::clock::{ManualClock, SharedClock, SystemClock};
use mcp_pty::ids::SessionId;
use mcp_pty::pty::{PtyManager, SpawnOptions, MAX_PTYS_PER_SESSION};
use mcp_pty::session::SessionManager;
use mcp_pty::transport::context::SessionContext;
use mcp_pty::transport::http::{EndpointFactory, HttpBinder, McpEndpoint, SESSION_HEADER};

fn opts(command: &str) -> SpawnOptions {
	SpawnOptions {
		command: command.to_string(),
		cwd: Some(std::env::temp_dir()),
		env_overlay: Default::default(),
		cols: 80,
		rows: 24,
		timeout: None,
		auto_dispose_on_exit: false,
	}
}

#[tokio::test]
async fn echo_scenario_reports_hello_and_exit_zero() {
	let manager = Arc::new(PtyManager::new());
	let clock: SharedClock = Arc::new(SystemClock);
	let process = manager.create_pty(opts("echo hello"), clock).await.unwrap();

	let code = process.wait(()).await;
	assert_eq!(code, 0);

	let (lines, _, _) = process.snapshot().await;
	assert!(lines.iter().any(|line| line.contains("hello")));
}

#[tokio::test]
async fn repl_scenario_echoes_input_twice() {
	let manager = Arc::new(PtyManager::new());
	let clock: SharedClock = Arc::new(SystemClock);
	let process = manager.create_pty(opts("cat"), clock).await.unwrap();

	process.write(b"abc").await.unwrap();
	process.send_control_code("Enter").await.unwrap();
	tokio::time::sleep(Duration::from_millis(300)).await;

	let (lines, _, _) = process.snapshot().await;
	let occurrences = lines.iter().filter(|line| line.contains("abc")).count();
	assert!(occurrences >= 2, "expected echo and re-print, got: {lines:?}");

	manager.remove_pty(process.id()).await.unwrap();
}

#[tokio::test]
async fn cap_scenario_eleventh_pty_fails_without_disturbing_the_first_ten() {
	let manager = Arc::new(PtyManager::new());
	let clock: SharedClock = Arc::new(SystemClock);
	let mut ids = Vec::new();
	for _ in 0..MAX_PTYS_PER_SESSION {
		let process = manager.create_pty(opts("sleep 5"), clock.clone()).await.unwrap();
		ids.push(process.id().clone());
	}

	let err = manager.create_pty(opts("sleep 5"), clock).await.unwrap_err();
	assert!(matches!(err, mcp_pty::error::PtyError::TooManyPtys(n) if n == MAX_PTYS_PER_SESSION));

	for id in &ids {
		assert!(manager.get_pty(id).await.is_some());
	}
	manager.dispose_all().await;
}

#[tokio::test]
async fn dangerous_rejection_scenario_creates_no_process() {
	let manager = Arc::new(PtyManager::new());
	let clock: SharedClock = Arc::new(SystemClock);
	let err = manager.create_pty(opts(":(){ :|:& };:"), clock).await.unwrap_err();
	assert!(matches!(err, mcp_pty::error::PtyError::DangerousCommand(_)));
	assert_eq!(manager.len().await, 0);
}

#[tokio::test]
async fn idle_sweep_scenario_terminates_after_310_simulated_seconds() {
	let clock = Arc::new(ManualClock::new(Utc::now()));
	let shared: SharedClock = clock.clone();
	let manager = SessionManager::new(shared);
	let id = manager.create_session().await;

	clock.advance(chrono::Duration::seconds(310));
	manager.sweep_once().await;

	assert!(manager.get_session(&id).await.is_none());
}

struct EchoEndpoint;

#[async_trait::async_trait]
impl McpEndpoint for EchoEndpoint {
	async fn connect(&self, _ctx: Arc<SessionContext>) -> mcp_pty::error::Result<()> {
		Ok(())
	}
	async fn handle_request(&self, body: Bytes) -> mcp_pty::error::Result<Bytes> {
		Ok(body)
	}
}

struct EchoFactory;
impl EndpointFactory for EchoFactory {
	fn new_endpoint(&self) -> Arc<dyn McpEndpoint> {
		Arc::new(EchoEndpoint)
	}
}

#[tokio::test]
async fn stale_session_recovery_scenario_succeeds_on_immediate_retry() {
	let session_manager = SessionManager::new(Arc::new(SystemClock));
	let binder = HttpBinder::new(session_manager, Arc::new(EchoFactory));
	let router = binder.router();

	let stale = SessionId::new().to_string();
	let first = axum::http::Request::post("/mcp")
		.header(SESSION_HEADER, &stale)
		.body(axum::body::Body::from("{}"))
		.unwrap();
	let response = router.clone().oneshot(first).await.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	let new_id = response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string();
	assert_ne!(new_id, stale);

	let retry = axum::http::Request::post("/mcp")
		.header(SESSION_HEADER, &new_id)
		.body(axum::body::Body::from("{}"))
		.unwrap();
	let response = router.oneshot(retry).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}
