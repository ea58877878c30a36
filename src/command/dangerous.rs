/**
 * @file dangerous.rs
 * @brief Dangerous-command and privilege-escalation pattern checks
 *
 * Grounded directly on the teacher's `Security/validation.rs`
 * `ValidationConfig::dangerous_command_pattern` regex (fork bombs,
 * `rm -rf`, `dd`), extended to the full list the spec names: `mkfs`,
 * writes to raw block devices, and argv[0]-based privilege-escalation
 * detection with full-path variants.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use regex::Regex;
use std::sync::OnceLock;

const PRIV_ESCALATION_BINS: &[&str] = &[
	"sudo", "su", "doas", "run0", "pkexec", "gosu", "runuser", "machinectl", "systemd-run",
	"ssh-agent", "gksudo", "kdesudo", "newgrp",
];

fn fork_bomb_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r":\(\)\s*\{\s*:\s*\|\s*:\s*&?\s*\}\s*;\s*:").unwrap())
}

fn rm_rf_root_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\brm\s+-[a-zA-Z]*[rf][a-zA-Z]*[rf]?[a-zA-Z]*\s+/\*?(\s|$)").unwrap())
}

fn mkfs_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\bmkfs(\.\w+)?\b").unwrap())
}

fn dd_to_device_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\bdd\b[^|;&]*\bof=/dev/sd\w*").unwrap())
}

fn redirect_to_device_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r">{1,2}\s*/dev/sd\w*").unwrap())
}

/// Returns the matched privilege-escalation binary name, if `argv0` (or a
/// full-path variant like `/usr/bin/sudo`) names one. Wrapper binaries like
/// `nohup` arrive as argv0 themselves with the real binary as their first
/// argument, so the caller unwraps them before calling this (see
/// `enforce_policy`'s argv0 resolution) rather than this function trying to
/// parse a space-joined command string.
pub fn privilege_escalation_binary(argv0: &str) -> Option<&'static str> {
	let base = argv0.rsplit('/').next().unwrap_or(argv0);
	PRIV_ESCALATION_BINS.iter().copied().find(|&bin| base == bin)
}

/// Returns a human-readable description of the dangerous pattern `command`
/// matches, or `None` if it matches none of them. Operates on the raw
/// command text (not tokenized) since the patterns are textual shapes
/// (`rm -rf /`, `dd ... of=/dev/sd*`) rather than argv-structured ones.
pub fn dangerous_pattern(command: &str) -> Option<&'static str> {
	if fork_bomb_re().is_match(command) {
		return Some("fork bomb");
	}
	if rm_rf_root_re().is_match(command) && !command.contains("/tmp") {
		return Some("rm -rf on root filesystem");
	}
	if mkfs_re().is_match(command) {
		return Some("filesystem format (mkfs)");
	}
	if dd_to_device_re().is_match(command) {
		return Some("dd writing to a raw block device");
	}
	if redirect_to_device_re().is_match(command) {
		return Some("redirection to a raw block device");
	}
	None
}

/// Generalizes the teacher's own recursion-shy dangerous-pattern check into
/// the spec's "`sh -c` bypass prevention": when `executable == "sh"` and the
/// arguments are `-c <X>`, the check is re-applied to `X`.
pub fn unwrap_shell_dash_c<'a>(executable: &str, args: &'a [String]) -> Option<&'a str> {
	if executable == "sh" && args.len() >= 2 && args[0] == "-c" {
		Some(args[1].as_str())
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fork_bomb_is_detected() {
		assert_eq!(dangerous_pattern(":(){ :|:& };:"), Some("fork bomb"));
	}

	#[test]
	fn incomplete_fork_bomb_trigger_is_allowed() {
		assert_eq!(dangerous_pattern(":()"), None);
	}

	#[test]
	fn rm_rf_root_is_detected() {
		assert_eq!(dangerous_pattern("rm -rf /"), Some("rm -rf on root filesystem"));
		assert_eq!(dangerous_pattern("rm -rf /*"), Some("rm -rf on root filesystem"));
	}

	#[test]
	fn rm_rf_tmp_is_allowed() {
		assert_eq!(dangerous_pattern("rm -rf /tmp/scratch"), None);
	}

	#[test]
	fn dd_to_block_device_is_detected() {
		assert_eq!(
			dangerous_pattern("dd if=/dev/zero of=/dev/sda"),
			Some("dd writing to a raw block device")
		);
	}

	#[test]
	fn sudo_as_argv0_is_detected() {
		assert_eq!(privilege_escalation_binary("sudo"), Some("sudo"));
		assert_eq!(privilege_escalation_binary("/usr/bin/sudo"), Some("sudo"));
	}

	#[test]
	fn harmless_binary_is_not_flagged() {
		assert_eq!(privilege_escalation_binary("cat"), None);
		assert_eq!(dangerous_pattern("echo hello"), None);
	}

	#[test]
	fn sh_c_bypass_unwraps_inner_command() {
		let args = vec!["-c".to_string(), "sudo rm -rf /".to_string()];
		assert_eq!(unwrap_shell_dash_c("sh", &args), Some("sudo rm -rf /"));
	}
}
