/**
 * @file ids.rs
 * @brief Opaque identifiers for sessions and PTY processes
 *
 * Generalizes the teacher's `Uuid`-keyed session/tab maps (session/mod.rs)
 * to the two token shapes the spec requires: a lexicographically-sortable
 * 26-char session id (a ULID, so clients paging session listings see
 * creation order for free) and a 21-char URL-safe random process id (the
 * same shape `nanoid`'s default alphabet produces).
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque lexicographically-sortable 26-char session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(ulid::Ulid);

impl SessionId {
	pub fn new() -> Self {
		Self(ulid::Ulid::new())
	}

	pub fn parse(s: &str) -> Option<Self> {
		ulid::Ulid::from_string(s).ok().map(Self)
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// 21-char URL-safe random process token, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(String);

impl ProcessId {
	pub fn new() -> Self {
		Self(nanoid::nanoid!(21))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for ProcessId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ProcessId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for ProcessId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_ids_sort_by_creation_order() {
		let a = SessionId::new();
		std::thread::sleep(std::time::Duration::from_millis(2));
		let b = SessionId::new();
		assert!(a.to_string() < b.to_string());
	}

	#[test]
	fn session_id_round_trips_through_display_and_parse() {
		let id = SessionId::new();
		let parsed = SessionId::parse(&id.to_string()).expect("valid ulid");
		assert_eq!(id, parsed);
	}

	#[test]
	fn process_id_is_21_chars() {
		let id = ProcessId::new();
		assert_eq!(id.as_str().len(), 21);
	}
}
