/**
 * @file clock.rs
 * @brief Injectable time source for the idle-sweep background task
 *
 * The teacher wires its collaborators through constructors rather than
 * reaching for globals (`SessionManager::new(session_store)`,
 * `TabManager::new()` returning an owned value the caller stores in an
 * `Arc`). This generalizes that habit to time itself: production code
 * uses `SystemClock`, tests inject a `ManualClock` so the 5-minute idle /
 * 5-minute-more-terminate timings in §4.4 are exercised without a real
 * ten-minute sleep.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A source of the current time, injectable for deterministic tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
	fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Test clock whose value only moves when explicitly advanced.
#[derive(Debug, Clone)]
pub struct ManualClock {
	inner: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			inner: Arc::new(Mutex::new(start)),
		}
	}

	pub fn advance(&self, duration: chrono::Duration) {
		let mut guard = self.inner.lock().expect("clock mutex poisoned");
		*guard += duration;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.inner.lock().expect("clock mutex poisoned")
	}
}

pub type SharedClock = Arc<dyn Clock>;
