/**
 * @file context.rs
 * @brief Per-connection session context injection (spec §4.6 "session context")
 *
 * Generalizes the teacher's habit of threading an owning ID rather than a
 * back-pointer (see `session/mod.rs`'s `SessionID`-keyed maps) to the MCP
 * server instance: each bound server/transport pair gets exactly one
 * `SessionContext`, set once at bind time, read by every tool handler.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::sync::OnceLock;

use crate::error::{PtyError, Result};
use crate::ids::SessionId;

/// Holds the `SessionId` a bound server instance serves. Set exactly once,
/// at connect time; a tool handler that reads it before binding (or on a
/// server that was never bound) is a programmer error.
#[derive(Debug, Default)]
pub struct SessionContext {
	session_id: OnceLock<SessionId>,
}

impl SessionContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn bind(&self, id: SessionId) {
		let _ = self.session_id.set(id);
	}

	pub fn session_id(&self) -> Result<&SessionId> {
		self.session_id.get().ok_or(PtyError::NoSessionBound)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unbound_context_fails_with_no_session_bound() {
		let ctx = SessionContext::new();
		assert!(matches!(ctx.session_id(), Err(PtyError::NoSessionBound)));
	}

	#[test]
	fn bound_context_returns_its_session_id() {
		let ctx = SessionContext::new();
		let id = SessionId::new();
		ctx.bind(id.clone());
		assert_eq!(ctx.session_id().unwrap(), &id);
	}
}
