/**
 * @file manager.rs
 * @brief Session Manager: the global session registry (spec §4.4)
 *
 * Generalizes the teacher's `session::SessionManager`
 * (`Arc<RwLock<HashMap<Uuid, SessionMetadata>>>` plus a `SessionStore`
 * for persistence) into an in-memory registry keyed by `SessionId`. MCP
 * sessions are not persisted across process restarts, so the teacher's
 * `SessionStore` has no counterpart here — a session's whole lifetime is
 * the lifetime of its transport binding.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use crate::clock::SharedClock;
use crate::error::{PtyError, Result};
use crate::ids::SessionId;

use super::events::{self, SessionEvent};
use super::{Session, SessionStatus};

/// A session with no activity for this long is marked `Idle`.
pub const IDLE_AFTER: Duration = Duration::from_secs(5 * 60);
/// An `Idle` session with no activity for this much longer again is
/// disposed outright (ten minutes total since `last_activity`).
pub const TERMINATE_AFTER: Duration = Duration::from_secs(10 * 60);
/// How often the background sweep re-evaluates every session's status.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct SessionManager {
	sessions: RwLock<HashMap<SessionId, Arc<RwLock<Session>>>>,
	clock: SharedClock,
	events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
	pub fn new(clock: SharedClock) -> Arc<Self> {
		let (events_tx, _) = events::channel();
		Arc::new(Self { sessions: RwLock::new(HashMap::new()), clock, events_tx })
	}

	pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
		self.events_tx.subscribe()
	}

	pub async fn create_session(&self) -> SessionId {
		let id = SessionId::new();
		let session = Session::new(id.clone(), self.clock.now());
		self.sessions.write().await.insert(id.clone(), Arc::new(RwLock::new(session)));
		let _ = self.events_tx.send(SessionEvent::Created(id.clone()));
		id
	}

	pub async fn get_session(&self, id: &SessionId) -> Option<Arc<RwLock<Session>>> {
		self.sessions.read().await.get(id).cloned()
	}

	/// Number of live sessions, for the `pty://status` resource.
	pub async fn session_count(&self) -> usize {
		self.sessions.read().await.len()
	}

	pub async fn touch(&self, id: &SessionId) -> Result<()> {
		let session = self.get_session(id).await.ok_or_else(|| PtyError::SessionNotFound(id.to_string()))?;
		let mut session = session.write().await;
		session.last_activity = self.clock.now();
		if session.status != SessionStatus::Active {
			session.status = SessionStatus::Active;
			let _ = self.events_tx.send(SessionEvent::StatusChanged(id.clone(), SessionStatus::Active));
		}
		Ok(())
	}

	pub async fn dispose_session(&self, id: &SessionId) -> Result<()> {
		let session = {
			let mut sessions = self.sessions.write().await;
			sessions.remove(id)
		};
		let session = session.ok_or_else(|| PtyError::SessionNotFound(id.to_string()))?;
		session.read().await.pty_manager.dispose_all().await;
		let _ = self.events_tx.send(SessionEvent::Terminated(id.clone()));
		Ok(())
	}

	/// Re-evaluates every session's status against the idle/terminate
	/// thresholds once. Exposed separately from the spawned loop so tests
	/// can drive it deterministically with a `ManualClock`.
	pub async fn sweep_once(&self) {
		let ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
		for id in ids {
			let Some(session) = self.get_session(&id).await else { continue };
			let elapsed = {
				let session = session.read().await;
				self.clock.now().signed_duration_since(session.last_activity).to_std().unwrap_or(Duration::ZERO)
			};

			if elapsed >= TERMINATE_AFTER {
				let _ = self.dispose_session(&id).await;
				continue;
			}
			if elapsed >= IDLE_AFTER {
				let mut session = session.write().await;
				if session.status == SessionStatus::Active {
					session.status = SessionStatus::Idle;
					let _ = self.events_tx.send(SessionEvent::StatusChanged(id.clone(), SessionStatus::Idle));
				}
			}
		}
	}

	/// Disposes every live session, e.g. on process shutdown. Each
	/// session's PTYs get their own bounded grace period via
	/// `PtyProcess::dispose`; this only sequences the sessions themselves.
	pub async fn dispose_all(&self) {
		let ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
		for id in ids {
			let _ = self.dispose_session(&id).await;
		}
	}

	/// Spawns the background idle-sweep task (spec §4.4): wakes every
	/// `SWEEP_INTERVAL`, re-evaluates every session's status, and disposes
	/// sessions that have been idle long enough.
	pub fn spawn_idle_sweeper(self: &Arc<Self>) {
		let manager = self.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
			loop {
				ticker.tick().await;
				manager.sweep_once().await;
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::ManualClock;
	use chrono::Utc;

	#[tokio::test]
	async fn idle_sweep_marks_session_idle_after_threshold() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let shared: SharedClock = clock.clone();
		let manager = SessionManager::new(shared);
		let id = manager.create_session().await;

		clock.advance(chrono::Duration::from_std(IDLE_AFTER).unwrap());
		manager.sweep_once().await;

		let session = manager.get_session(&id).await.unwrap();
		assert_eq!(session.read().await.status, SessionStatus::Idle);
	}

	#[tokio::test]
	async fn idle_sweep_disposes_session_after_terminate_threshold() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let shared: SharedClock = clock.clone();
		let manager = SessionManager::new(shared);
		let id = manager.create_session().await;

		clock.advance(chrono::Duration::from_std(TERMINATE_AFTER).unwrap());
		manager.sweep_once().await;

		assert!(manager.get_session(&id).await.is_none());
	}

	#[tokio::test]
	async fn touch_reactivates_an_idle_session() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let shared: SharedClock = clock.clone();
		let manager = SessionManager::new(shared);
		let id = manager.create_session().await;

		clock.advance(chrono::Duration::from_std(IDLE_AFTER).unwrap());
		manager.sweep_once().await;
		manager.touch(&id).await.unwrap();

		let session = manager.get_session(&id).await.unwrap();
		assert_eq!(session.read().await.status, SessionStatus::Active);
	}
}
