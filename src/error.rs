/**
 * @file error.rs
 * @brief Typed error kinds for the PTY + session runtime
 *
 * Every fallible operation in the core (command normalization, PTY
 * spawn/write/dispose, session lookup, transport binding) returns one of
 * these variants so that callers — tool handlers, HTTP status mapping,
 * tests — can match on *kind* rather than parse a message string.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use thiserror::Error;

/// Error kinds surfaced by the PTY + session runtime.
///
/// Variants map directly onto an MCP tool error or an HTTP status code at
/// the transport boundary (see `status_code` below); nothing in this crate
/// constructs a bare `anyhow::Error` once control has left `main.rs`.
#[derive(Debug, Error)]
pub enum PtyError {
	#[error("command rejected as dangerous: {0}")]
	DangerousCommand(String),

	#[error("control sequence rejected as dangerous: {0}")]
	DangerousControlSequence(String),

	#[error("command requires root and consent was not granted")]
	RootWithoutConsent,

	#[error("command invokes privilege escalation ({0}) and consent was not granted")]
	PrivilegeEscalationWithoutConsent(String),

	#[error("invalid working directory: {0}")]
	InvalidWorkingDirectory(String),

	#[error("invalid control code: {given}, expected one of: {known}")]
	InvalidControlCode { given: String, known: String },

	#[error("schema validation failed: {0}")]
	SchemaValidation(String),

	#[error("session already has {0} ptys, the per-session limit")]
	TooManyPtys(usize),

	#[error("pty is not active")]
	NotActive,

	#[error("no pty with id {0}")]
	ProcessNotFound(String),

	#[error("no session with id {0}")]
	SessionNotFound(String),

	#[error("failed to spawn child process: {0}")]
	SpawnFailed(String),

	#[error("child exited with code {exit_code}")]
	SpawnError { exit_code: i32 },

	#[error("internal error: {0}")]
	InternalError(String),

	#[error("tool handler invoked on a server with no bound session")]
	NoSessionBound,

	#[error("bad request: {0}")]
	BadRequest(String),
}

impl PtyError {
	/// Error kinds that are never retried by the caller (§7): surfaced verbatim,
	/// never papered over by an automatic retry loop anywhere in this crate.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			PtyError::DangerousCommand(_)
				| PtyError::DangerousControlSequence(_)
				| PtyError::RootWithoutConsent
				| PtyError::PrivilegeEscalationWithoutConsent(_)
		)
	}

	/// HTTP status code for the transport-level subset of errors the
	/// streaming-HTTP binder can produce directly (§7 last bullet).
	pub fn http_status(&self) -> u16 {
		match self {
			PtyError::SchemaValidation(_) | PtyError::InvalidWorkingDirectory(_) | PtyError::BadRequest(_) => 400,
			PtyError::SessionNotFound(_) => 404,
			PtyError::InternalError(_) | PtyError::NoSessionBound => 500,
			_ => 500,
		}
	}
}

pub type Result<T> = std::result::Result<T, PtyError>;
