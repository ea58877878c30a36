/**
 * @file manager.rs
 * @brief PTY Manager: the fleet of PTYs owned by one session (spec §4.3)
 *
 * Generalizes the teacher's `terminal::pty::PtyManager`, which owned a
 * single `Option<PtySession>`, into a registry owning up to ten
 * concurrently-active `PtyProcess`es for one session — the cap spec §3
 * names as the per-session resource ceiling.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::collections::HashMap;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::sync::RwLock;

use crate::clock::SharedClock;
use crate::error::{PtyError, Result};
use crate::ids::ProcessId;

use super::process::{PtyProcess, SpawnOptions};

pub const MAX_PTYS_PER_SESSION: usize = 10;

#[derive(Default)]
pub struct PtyManager {
	ptys: RwLock<HashMap<ProcessId, Arc<PtyProcess>>>,
}

impl PtyManager {
	pub fn new() -> Self {
		Self { ptys: RwLock::new(HashMap::new()) }
	}

	pub async fn len(&self) -> usize {
		self.ptys.read().await.len()
	}

	/// Spawns a new `PtyProcess` and registers it, enforcing the
	/// per-session cap (spec §3 invariant). When `opts.auto_dispose_on_exit`
	/// is set, the entry is removed from this manager's map as soon as the
	/// child exits, so a dead PTY never counts against the cap.
	pub async fn create_pty(
		self: &Arc<Self>,
		opts: SpawnOptions,
		clock: SharedClock,
	) -> Result<Arc<PtyProcess>> {
		{
			let ptys = self.ptys.read().await;
			if ptys.len() >= MAX_PTYS_PER_SESSION {
				return Err(PtyError::TooManyPtys(MAX_PTYS_PER_SESSION));
			}
		}

		let id = ProcessId::new();
		let auto_dispose_on_exit = opts.auto_dispose_on_exit;
		let process = PtyProcess::spawn(id.clone(), opts, clock).await?;

		{
			let mut ptys = self.ptys.write().await;
			ptys.insert(id.clone(), process.clone());
		}

		if auto_dispose_on_exit {
			spawn_auto_dispose_watcher(self.clone(), id, process.clone());
		}

		Ok(process)
	}

	pub async fn get_pty(&self, id: &ProcessId) -> Option<Arc<PtyProcess>> {
		self.ptys.read().await.get(id).cloned()
	}

	pub async fn all_ptys(&self) -> Vec<Arc<PtyProcess>> {
		self.ptys.read().await.values().cloned().collect()
	}

	/// Disposes one PTY and drops the manager's handle to it.
	pub async fn remove_pty(&self, id: &ProcessId) -> Result<()> {
		let process = {
			let mut ptys = self.ptys.write().await;
			ptys.remove(id)
		};
		match process {
			Some(process) => process.dispose(Signal::SIGTERM).await,
			None => Err(PtyError::ProcessNotFound(id.to_string())),
		}
	}

	/// Disposes every PTY the manager owns, e.g. when its session is torn
	/// down (spec §4.3 `autoDisposeOnExit`, applied at the session level).
	pub async fn dispose_all(&self) {
		let processes: Vec<Arc<PtyProcess>> = {
			let mut ptys = self.ptys.write().await;
			ptys.drain().map(|(_, p)| p).collect()
		};
		for process in processes {
			let _ = process.dispose(Signal::SIGTERM).await;
		}
	}
}

/// Background task behind `autoDisposeOnExit` (spec §4.3): waits for the
/// child to exit, then removes its now-terminated entry from the map.
/// `remove_pty` re-disposing an already-terminated process is a no-op.
fn spawn_auto_dispose_watcher(manager: Arc<PtyManager>, id: ProcessId, process: Arc<PtyProcess>) {
	tokio::spawn(async move {
		process.wait(()).await;
		let _ = manager.remove_pty(&id).await;
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::SystemClock;

	fn opts(command: &str) -> SpawnOptions {
		SpawnOptions {
			command: command.to_string(),
			cwd: None,
			env_overlay: Default::default(),
			cols: 80,
			rows: 24,
			timeout: None,
			auto_dispose_on_exit: false,
		}
	}

	#[tokio::test]
	async fn enforces_max_ptys_per_session() {
		let manager = Arc::new(PtyManager::new());
		let clock: SharedClock = Arc::new(SystemClock);
		for _ in 0..MAX_PTYS_PER_SESSION {
			manager.create_pty(opts("sleep 5"), clock.clone()).await.unwrap();
		}
		let err = manager.create_pty(opts("sleep 5"), clock).await.unwrap_err();
		assert!(matches!(err, PtyError::TooManyPtys(n) if n == MAX_PTYS_PER_SESSION));
		manager.dispose_all().await;
	}

	#[tokio::test]
	async fn remove_pty_disposes_and_forgets_it() {
		let manager = Arc::new(PtyManager::new());
		let clock: SharedClock = Arc::new(SystemClock);
		let process = manager.create_pty(opts("sleep 5"), clock).await.unwrap();
		let id = process.id().clone();
		manager.remove_pty(&id).await.unwrap();
		assert!(manager.get_pty(&id).await.is_none());
	}

	#[tokio::test]
	async fn auto_dispose_on_exit_removes_entry_once_child_exits() {
		let manager = Arc::new(PtyManager::new());
		let clock: SharedClock = Arc::new(SystemClock);
		let mut o = opts("echo hi");
		o.auto_dispose_on_exit = true;
		let process = manager.create_pty(o, clock).await.unwrap();
		let id = process.id().clone();
		process.wait(()).await;
		for _ in 0..20 {
			if manager.get_pty(&id).await.is_none() {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		}
		assert!(manager.get_pty(&id).await.is_none());
	}
}
