/**
 * @file mod.rs
 * @brief Session data model (spec §4.4)
 *
 * Trims the teacher's `SessionMetadata` (which tracked sharing config,
 * tab layout, and named/detached/temporary session types meant for a
 * local multi-pane terminal) down to the single `SessionStatus` axis an
 * MCP-bound session actually needs: a session exists from the moment an
 * MCP client establishes a binding until it disconnects or is swept for
 * inactivity.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

pub mod events;
pub mod manager;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ids::SessionId;
use crate::pty::PtyManager;

pub use events::SessionEvent;
pub use manager::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
	Active,
	Idle,
	Terminated,
}

/// One MCP client's session: an identity, a lifecycle status, and the
/// `PtyManager` that owns every PTY spawned under it.
pub struct Session {
	pub id: SessionId,
	pub created_at: DateTime<Utc>,
	pub status: SessionStatus,
	pub last_activity: DateTime<Utc>,
	pub pty_manager: Arc<PtyManager>,
}

impl Session {
	pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
		Self {
			id,
			created_at: now,
			status: SessionStatus::Active,
			last_activity: now,
			pty_manager: Arc::new(PtyManager::new()),
		}
	}
}
