/**
 * @file safety.rs
 * @brief Safety Gate: root/privilege-escalation consent and env sanitization
 *
 * Generalizes the teacher's `Security/sandbox.rs` environment-scrubbing
 * helpers from "protect a local interactive shell" to the two checks the
 * spec names for a PTY spawned on behalf of a remote MCP client: consent
 * gating for elevation, and stripping loader-injection variables from the
 * environment overlay the caller supplied.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use crate::command::{self, NormalizedCommand};
use crate::error::{PtyError, Result};
use std::collections::HashMap;

pub const CONSENT_ENV_VAR: &str = "MCP_PTY_USER_CONSENT_FOR_DANGEROUS_ACTIONS";

/// Variables that must never be forwarded from a caller-supplied overlay:
/// each is a loader/interpreter hook capable of running arbitrary code in
/// the child's address space before its own main() runs. `PATH` is
/// included because the overlay must never override the inherited `PATH`.
const STRIPPED_ENV_VARS: &[&str] = &[
	"LD_PRELOAD",
	"DYLD_INSERT_LIBRARIES",
	"PYTHONPATH",
	"NODE_PATH",
	"GEM_PATH",
	"PERL5LIB",
	"RUBYLIB",
	"CLASSPATH",
	"PATH",
];

/// Returns whether the consent env var is set to a non-empty value.
pub fn consent_granted() -> bool {
	std::env::var(CONSENT_ENV_VAR).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Strips loader-injection variables (and any `PATH` override) from a
/// caller-supplied environment overlay. `PATH` itself still reaches the
/// child — inherited from this process's own environment, never from the
/// overlay.
pub fn sanitize_overlay(overlay: HashMap<String, String>) -> HashMap<String, String> {
	overlay
		.into_iter()
		.filter(|(k, _)| !STRIPPED_ENV_VARS.contains(&k.as_str()))
		.collect()
}

/// True if the current process is running as uid 0.
#[cfg(unix)]
pub fn running_as_root() -> bool {
	nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
	false
}

/// Runs the full Safety Gate ahead of spawning a child for `command`
/// (spec §4.2 step 1): privilege-escalation / dangerous-pattern policy,
/// then a root-execution check independent of argv[0] (e.g. the whole
/// server itself already running as root).
pub fn check_before_spawn(command: &NormalizedCommand, raw: &str) -> Result<()> {
	let consent = consent_granted();
	command::enforce_policy(command, raw, consent)?;

	if running_as_root() && !consent {
		tracing::warn!(command = raw, "spawn as root refused: no operator consent");
		return Err(PtyError::RootWithoutConsent);
	}
	if running_as_root() {
		tracing::warn!(command = raw, "spawning as root with operator consent granted");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitize_overlay_strips_loader_vars_and_path() {
		let mut overlay = HashMap::new();
		overlay.insert("LD_PRELOAD".to_string(), "evil.so".to_string());
		overlay.insert("PATH".to_string(), "/evil/bin".to_string());
		overlay.insert("MY_APP_CONFIG".to_string(), "keep-me".to_string());

		let sanitized = sanitize_overlay(overlay);
		assert_eq!(sanitized.len(), 1);
		assert_eq!(sanitized.get("MY_APP_CONFIG").map(String::as_str), Some("keep-me"));
	}
}
