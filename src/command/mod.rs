/**
 * @file mod.rs
 * @brief Command Normalizer (spec §4.1)
 *
 * Parses a user-typed command string into either a direct
 * (executable, args) pair or a "run via shell" directive, and enforces
 * the dangerous-pattern policy before a caller is allowed to spawn
 * anything with the result.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

mod dangerous;
mod tokenizer;

use crate::error::{PtyError, Result};

/// The normalized shape of a command string: either safe to exec()
/// directly, or one that must be handed to `sh -c` because it used shell
/// grammar (pipes, redirections, sequencing, env-var prefixes) that only
/// a real shell can interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedCommand {
	Direct { executable: String, args: Vec<String> },
	Shell { command: String },
}

/// Parses `raw` and decides direct-exec vs shell-wrapped. Never fails:
/// any parse trouble (unterminated quote) falls back to the shell form,
/// same as any use of shell grammar does.
pub fn normalize(raw: &str) -> NormalizedCommand {
	let result = tokenizer::tokenize(raw);

	if result.unterminated_quote || result.has_metacharacter || result.words.is_empty() {
		return NormalizedCommand::Shell { command: raw.to_string() };
	}

	// A leading run of `VAR=value` words is a prefix-assignment form,
	// which also forces the shell-wrapped path (spec §4.1).
	if tokenizer::looks_like_assignment(&result.words[0]) {
		return NormalizedCommand::Shell { command: raw.to_string() };
	}

	let mut words = result.words.into_iter();
	let executable = words.next().expect("checked non-empty above");
	let args: Vec<String> = words.collect();
	NormalizedCommand::Direct { executable, args }
}

/// Applies the dangerous-pattern policy (spec §4.1) to an already-normalized
/// command. `consent_granted` reflects `MCP_PTY_USER_CONSENT_FOR_DANGEROUS_ACTIONS`.
///
/// Recurses into `sh -c <X>` (directly normalized, or because the caller
/// literally typed `sh -c ...`) so the policy cannot be bypassed by one
/// extra layer of shell wrapping.
pub fn enforce_policy(command: &NormalizedCommand, raw: &str, consent_granted: bool) -> Result<()> {
	let (argv0, scan_text): (Option<&str>, &str) = match command {
		NormalizedCommand::Direct { executable, args } => {
			let argv0 = if executable == "nohup" { args.first().map(String::as_str) } else { Some(executable.as_str()) };
			(argv0, raw)
		}
		NormalizedCommand::Shell { command } => {
			let mut words = command.split_whitespace();
			let first = words.next();
			let argv0 = if first == Some("nohup") { words.next() } else { first };
			(argv0, command.as_str())
		}
	};

	if let Some(argv0) = argv0 {
		if let Some(bin) = dangerous::privilege_escalation_binary(argv0) {
			if !consent_granted {
				return Err(PtyError::PrivilegeEscalationWithoutConsent(bin.to_string()));
			}
		}
	}

	if let Some(pattern) = dangerous::dangerous_pattern(scan_text) {
		if !consent_granted {
			return Err(PtyError::DangerousCommand(pattern.to_string()));
		}
	}

	if let NormalizedCommand::Direct { executable, args } = command {
		if let Some(inner) = dangerous::unwrap_shell_dash_c(executable, args) {
			let inner_normalized = normalize(inner);
			return enforce_policy(&inner_normalized, inner, consent_granted);
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn simple_command_is_direct() {
		let n = normalize("echo hello world");
		assert_eq!(
			n,
			NormalizedCommand::Direct {
				executable: "echo".to_string(),
				args: vec!["hello".to_string(), "world".to_string()],
			}
		);
	}

	#[test]
	fn pipeline_is_shell_wrapped() {
		let n = normalize("echo hi | cat");
		assert_eq!(n, NormalizedCommand::Shell { command: "echo hi | cat".to_string() });
	}

	#[test]
	fn logical_and_is_shell_wrapped() {
		assert!(matches!(normalize("make && make test"), NormalizedCommand::Shell { .. }));
	}

	#[test]
	fn redirection_is_shell_wrapped() {
		assert!(matches!(normalize("echo hi > out.txt"), NormalizedCommand::Shell { .. }));
	}

	#[test]
	fn env_prefix_assignment_is_shell_wrapped() {
		assert!(matches!(normalize("FOO=bar env"), NormalizedCommand::Shell { .. }));
	}

	#[test]
	fn unterminated_quote_is_shell_wrapped() {
		assert!(matches!(normalize("echo \"oops"), NormalizedCommand::Shell { .. }));
	}

	#[test]
	fn fork_bomb_rejected_without_consent() {
		let n = normalize(":(){ :|:& };:");
		let err = enforce_policy(&n, ":(){ :|:& };:", false).unwrap_err();
		assert!(matches!(err, PtyError::DangerousCommand(_)));
	}

	#[test]
	fn fork_bomb_allowed_with_consent() {
		let n = normalize(":(){ :|:& };:");
		assert!(enforce_policy(&n, ":(){ :|:& };:", true).is_ok());
	}

	#[test]
	fn sudo_direct_exec_rejected_without_consent() {
		let n = normalize("sudo reboot");
		let err = enforce_policy(&n, "sudo reboot", false).unwrap_err();
		assert!(matches!(err, PtyError::PrivilegeEscalationWithoutConsent(_)));
	}

	#[test]
	fn nohup_sudo_is_still_rejected() {
		let n = normalize("nohup sudo reboot");
		let err = enforce_policy(&n, "nohup sudo reboot", false).unwrap_err();
		assert!(matches!(err, PtyError::PrivilegeEscalationWithoutConsent(_)));
	}

	#[test]
	fn sudo_behind_sh_c_is_still_rejected() {
		let n = normalize("sh -c \"sudo reboot\"");
		let err = enforce_policy(&n, "sh -c \"sudo reboot\"", false).unwrap_err();
		assert!(matches!(err, PtyError::PrivilegeEscalationWithoutConsent(_)));
	}

	#[test]
	fn harmless_command_passes_policy() {
		let n = normalize("echo hello");
		assert!(enforce_policy(&n, "echo hello", false).is_ok());
	}
}
