/**
 * @file stdio.rs
 * @brief Stdio transport: exactly one session per process lifetime
 *
 * Grounded on the teacher's single-`Option<PtySession>` ownership shape
 * in `terminal::pty::PtyManager` (one long-lived thing per process),
 * generalized here to one MCP session for the whole process instead of
 * one PTY.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::sync::Arc;

use crate::error::Result;
use crate::session::SessionManager;

use super::context::SessionContext;
use super::http::McpEndpoint;

/// Runs the stdio transport to completion: creates the one session this
/// process will ever have, connects the endpoint, serves until the
/// client disconnects (closed stdin, or in the future a parent-death
/// signal on Linux), then disposes the session. No reconnection
/// semantics — a dropped stdio transport is a dead process.
pub async fn run(
	session_manager: Arc<SessionManager>,
	endpoint: Arc<dyn McpEndpoint>,
) -> Result<()> {
	let session_id = session_manager.create_session().await;
	let context = Arc::new(SessionContext::new());
	context.bind(session_id.clone());

	let result = endpoint.connect(context).await;
	if result.is_ok() {
		tracing::info!(session = %session_id, "stdio session connected, serving until stdin closes");
		// The concrete `rmcp` endpoint's `connect` already drives its own
		// serve loop to completion (stdio read/write pump); by the time it
		// returns, the client side has gone away.
	}

	session_manager.dispose_session(&session_id).await.ok();
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::SystemClock;
	use axum::body::Bytes;

	struct NoopEndpoint;

	#[async_trait::async_trait]
	impl McpEndpoint for NoopEndpoint {
		async fn connect(&self, _ctx: Arc<SessionContext>) -> Result<()> {
			Ok(())
		}
		async fn handle_request(&self, body: Bytes) -> Result<Bytes> {
			Ok(body)
		}
	}

	#[tokio::test]
	async fn stdio_run_creates_and_disposes_exactly_one_session() {
		let session_manager = SessionManager::new(Arc::new(SystemClock));
		run(session_manager.clone(), Arc::new(NoopEndpoint)).await.unwrap();
	}
}
