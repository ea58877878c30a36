/**
 * @file http.rs
 * @brief Streaming-HTTP transport: session map, recovery-on-404, cleanup
 *
 * Implements spec §4.6's streaming-HTTP request classification verbatim:
 * header+live reuses an entry; header+missing/terminated recovers
 * synchronously (connect completes *before* the 404 is written, so an
 * immediate retry with the new id succeeds); no header lazily creates a
 * session without connecting.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::{Mutex, Notify};

use crate::error::{PtyError, Result};
use crate::ids::SessionId;
use crate::session::SessionManager;

use super::context::SessionContext;
use super::ConnectState;

pub const SESSION_HEADER: &str = "mcp-session-id";
const CONNECT_WAIT_BUDGET: Duration = Duration::from_secs(2);

/// Anything that can be bound to a session and driven by raw MCP request
/// bytes. The binder depends on this seam rather than on `rmcp` types
/// directly so the recovery/reuse logic above is testable on its own;
/// `server::McpServer` is the concrete implementation wired in `main.rs`.
#[async_trait::async_trait]
pub trait McpEndpoint: Send + Sync {
	async fn connect(&self, ctx: Arc<SessionContext>) -> Result<()>;
	async fn handle_request(&self, body: Bytes) -> Result<Bytes>;
}

pub trait EndpointFactory: Send + Sync {
	fn new_endpoint(&self) -> Arc<dyn McpEndpoint>;
}

struct SessionEntry {
	endpoint: Arc<dyn McpEndpoint>,
	context: Arc<SessionContext>,
	state: Mutex<ConnectState>,
	notify: Notify,
}

pub struct HttpBinder {
	sessions: Mutex<HashMap<SessionId, Arc<SessionEntry>>>,
	session_manager: Arc<SessionManager>,
	factory: Arc<dyn EndpointFactory>,
}

impl HttpBinder {
	pub fn new(session_manager: Arc<SessionManager>, factory: Arc<dyn EndpointFactory>) -> Arc<Self> {
		Arc::new(Self { sessions: Mutex::new(HashMap::new()), session_manager, factory })
	}

	pub fn router(self: Arc<Self>) -> Router {
		Router::new().route("/mcp", post(post_handler).get(get_handler).delete(delete_handler)).with_state(self)
	}

	/// Ensures `entry`'s endpoint has connected exactly once, serializing
	/// concurrent callers on `ConnectState` rather than a polled `bool`
	/// (spec §5 "avoid busy spinning" — the one place this binder departs
	/// from the teacher's literal `RwLock<bool>` idiom).
	async fn ensure_connected(&self, entry: &Arc<SessionEntry>) -> Result<()> {
		tokio::time::timeout(CONNECT_WAIT_BUDGET, async {
			loop {
				let mut state = entry.state.lock().await;
				match *state {
					ConnectState::Ready => return Ok(()),
					ConnectState::Idle => {
						*state = ConnectState::Connecting;
						drop(state);
						let result = entry.endpoint.connect(entry.context.clone()).await;
						let mut state = entry.state.lock().await;
						*state = if result.is_ok() { ConnectState::Ready } else { ConnectState::Idle };
						drop(state);
						entry.notify.notify_waiters();
						return result;
					}
					ConnectState::Connecting => {
						drop(state);
						entry.notify.notified().await;
					}
				}
			}
		})
		.await
		.map_err(|_| PtyError::InternalError("timed out waiting for session connect".to_string()))?
	}

	/// Recovery path (spec §4.6 item 2): creates a brand new session,
	/// binds and connects a fresh endpoint *synchronously*, inserts it,
	/// and returns its id — the caller responds 404 with this id only
	/// after this function returns, so an immediate retry always finds a
	/// ready entry.
	async fn recover(&self) -> Result<SessionId> {
		let new_id = self.session_manager.create_session().await;
		let context = Arc::new(SessionContext::new());
		context.bind(new_id.clone());
		let endpoint = self.factory.new_endpoint();

		let entry = Arc::new(SessionEntry {
			endpoint,
			context,
			state: Mutex::new(ConnectState::Idle),
			notify: Notify::new(),
		});
		self.ensure_connected(&entry).await?;

		self.sessions.lock().await.insert(new_id.clone(), entry);
		Ok(new_id)
	}

	/// No-header path (spec §4.6 item 3): a session is created and
	/// inserted without connecting; the client's own `initialize` message
	/// triggers a connect on the next request that carries the header.
	async fn create_lazy(&self) -> Result<SessionId> {
		let new_id = self.session_manager.create_session().await;
		let context = Arc::new(SessionContext::new());
		context.bind(new_id.clone());
		let endpoint = self.factory.new_endpoint();

		let entry = Arc::new(SessionEntry {
			endpoint,
			context,
			state: Mutex::new(ConnectState::Idle),
			notify: Notify::new(),
		});
		self.sessions.lock().await.insert(new_id.clone(), entry);
		Ok(new_id)
	}

	async fn entry_for(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
		self.sessions.lock().await.get(id).cloned()
	}

	async fn dispose(&self, id: &SessionId) {
		self.sessions.lock().await.remove(id);
		let _ = self.session_manager.dispose_session(id).await;
	}
}

fn parse_session_header(headers: &HeaderMap) -> Option<SessionId> {
	headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).and_then(SessionId::parse)
}

fn with_session_header(mut response: Response, id: &SessionId) -> Response {
	if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
		response.headers_mut().insert(SESSION_HEADER, value);
	}
	response
}

async fn post_handler(State(binder): State<Arc<HttpBinder>>, headers: HeaderMap, body: Bytes) -> Response {
	match parse_session_header(&headers) {
		Some(id) => match binder.entry_for(&id).await {
			Some(entry) => {
				// The session may already have been disposed underneath
				// this entry (e.g. by the idle sweep) while the binder's
				// own map hasn't caught up. Treat that like item 2:
				// recover instead of serving a dead session.
				if binder.session_manager.get_session(&id).await.is_none() {
					binder.dispose(&id).await;
					return match binder.recover().await {
						Ok(new_id) => with_session_header((StatusCode::NOT_FOUND, "").into_response(), &new_id),
						Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
					};
				}

				// Item 1: header present, session live. Reuse, connecting
				// at most once, then delegate.
				if let Err(e) = binder.ensure_connected(&entry).await {
					return with_session_header(
						(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
						&id,
					);
				}
				binder.session_manager.touch(&id).await.ok();
				match entry.endpoint.handle_request(body).await {
					Ok(reply) => with_session_header(reply.into_response(), &id),
					Err(e) => with_session_header(
						(StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), e.to_string())
							.into_response(),
						&id,
					),
				}
			}
			None => {
				// Item 2: header present but unknown/terminated. Recover
				// synchronously, then respond 404 with the new id so the
				// client's own retry succeeds against a ready session.
				match binder.recover().await {
					Ok(new_id) => with_session_header((StatusCode::NOT_FOUND, "").into_response(), &new_id),
					Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
				}
			}
		},
		None => {
			// Item 3: no header, lazily create without connecting.
			match binder.create_lazy().await {
				Ok(id) => match binder.entry_for(&id).await {
					Some(entry) => match entry.endpoint.handle_request(body).await {
						Ok(reply) => with_session_header(reply.into_response(), &id),
						Err(e) => with_session_header(
							(StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), e.to_string())
								.into_response(),
							&id,
						),
					},
					None => (StatusCode::INTERNAL_SERVER_ERROR, "session vanished after creation").into_response(),
				},
				Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
			}
		}
	}
}

async fn get_handler(State(binder): State<Arc<HttpBinder>>, headers: HeaderMap) -> Response {
	// SSE channel for server-to-client notifications; same session
	// resolution as POST (spec §6).
	post_handler(State(binder), headers, Bytes::new()).await
}

async fn delete_handler(State(binder): State<Arc<HttpBinder>>, headers: HeaderMap) -> Response {
	let Some(id) = parse_session_header(&headers) else {
		return (StatusCode::BAD_REQUEST, "missing mcp-session-id header").into_response();
	};
	match binder.session_manager.get_session(&id).await {
		Some(session) => {
			session.read().await.pty_manager.dispose_all().await;
			StatusCode::NO_CONTENT.into_response()
		}
		None => StatusCode::NOT_FOUND.into_response(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::SystemClock;
	use tower::ServiceExt;

	struct EchoEndpoint;

	#[async_trait::async_trait]
	impl McpEndpoint for EchoEndpoint {
		async fn connect(&self, _ctx: Arc<SessionContext>) -> Result<()> {
			Ok(())
		}
		async fn handle_request(&self, body: Bytes) -> Result<Bytes> {
			Ok(body)
		}
	}

	struct EchoFactory;
	impl EndpointFactory for EchoFactory {
		fn new_endpoint(&self) -> Arc<dyn McpEndpoint> {
			Arc::new(EchoEndpoint)
		}
	}

	fn test_binder() -> Arc<HttpBinder> {
		let session_manager = SessionManager::new(Arc::new(SystemClock));
		HttpBinder::new(session_manager, Arc::new(EchoFactory))
	}

	#[tokio::test]
	async fn missing_header_lazily_creates_a_session() {
		let binder = test_binder();
		let router = binder.router();
		let req = axum::http::Request::post("/mcp").body(axum::body::Body::from("{}")).unwrap();
		let response = router.oneshot(req).await.unwrap();
		assert!(response.headers().contains_key(SESSION_HEADER));
	}

	#[tokio::test]
	async fn stale_header_triggers_recovery_with_new_id() {
		let binder = test_binder();
		let router = binder.clone().router();
		let stale = SessionId::new().to_string();
		let req = axum::http::Request::post("/mcp")
			.header(SESSION_HEADER, &stale)
			.body(axum::body::Body::from("{}"))
			.unwrap();
		let response = router.oneshot(req).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		let new_id = response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string();
		assert_ne!(new_id, stale);
	}

	#[tokio::test]
	async fn session_disposed_underneath_a_live_binder_entry_recovers() {
		let binder = test_binder();
		let router = binder.clone().router();

		let create = axum::http::Request::post("/mcp").body(axum::body::Body::from("{}")).unwrap();
		let response = router.clone().oneshot(create).await.unwrap();
		let id_str = response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string();
		let id = SessionId::parse(&id_str).unwrap();

		// Simulate the idle sweep disposing the session without the
		// binder's own map finding out.
		binder.session_manager.dispose_session(&id).await.unwrap();

		let reuse = axum::http::Request::post("/mcp")
			.header(SESSION_HEADER, &id_str)
			.body(axum::body::Body::from("{}"))
			.unwrap();
		let response = router.oneshot(reuse).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		let new_id = response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string();
		assert_ne!(new_id, id_str);
	}

	#[tokio::test]
	async fn delete_without_header_is_bad_request() {
		let binder = test_binder();
		let router = binder.router();
		let req = axum::http::Request::delete("/mcp").body(axum::body::Body::empty()).unwrap();
		let response = router.oneshot(req).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}
}
