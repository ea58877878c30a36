/**
 * @file process.rs
 * @brief PTY Process: one child process hosted behind one pseudo-terminal
 *
 * Generalizes the teacher's raw-fd `terminal::pty::PtyManager` (posix_openpt
 * / grantpt / unlockpt / ptsname, raw-mode `termios` setup) and
 * `terminal::process::ProcessManager` (fork/exec, signal-based teardown)
 * into a single owning type: one `PtyProcess` per spawned command, driving
 * the state machine spec §4.3 names (Initializing → Active → Idle ⇄
 * Active → Terminating → Terminated).
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{self, Signal};
use nix::sys::termios;
use nix::unistd::Pid;
use regex::Regex;
use std::sync::OnceLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch, Mutex, RwLock};

use crate::clock::SharedClock;
use crate::command::{self, NormalizedCommand};
use crate::emulator::TerminalEmulator;
use crate::error::{PtyError, Result};
use crate::ids::ProcessId;
use crate::safety;

use super::buffer::OutputBuffer;

const READ_CHUNK: usize = 4096;
const BROADCAST_CAPACITY: usize = 256;
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Lifecycle state of a `PtyProcess` (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Initializing,
	Active,
	Idle,
	Terminating,
	Terminated,
}

pub struct SpawnOptions {
	pub command: String,
	pub cwd: Option<std::path::PathBuf>,
	pub env_overlay: std::collections::HashMap<String, String>,
	pub cols: u16,
	pub rows: u16,
	pub timeout: Option<Duration>,
	/// When set, the owning `PtyManager` removes this PTY from its map as
	/// soon as the child exits, instead of leaving a terminated entry
	/// occupying a slot against the per-session cap (spec §4.3).
	pub auto_dispose_on_exit: bool,
}

/// One child process hosted behind one PTY. Owns the master fd, the
/// headless terminal emulator fed by its output, and a broadcast channel
/// subscribers use for live streaming.
pub struct PtyProcess {
	id: ProcessId,
	state: RwLock<ProcessState>,
	master_fd: RawFd,
	child: Mutex<Child>,
	buffer: Mutex<OutputBuffer>,
	emulator: Mutex<TerminalEmulator>,
	output_tx: broadcast::Sender<Vec<u8>>,
	exit_rx: watch::Receiver<Option<i32>>,
	created_at: DateTime<Utc>,
	last_activity: Mutex<DateTime<Utc>>,
	clock: SharedClock,
	command_text: String,
}

impl std::fmt::Debug for PtyProcess {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PtyProcess").field("id", &self.id).field("command", &self.command_text).finish()
	}
}

fn validate_cwd(dir: &Path) -> Result<()> {
	if !dir.is_dir() {
		return Err(PtyError::InvalidWorkingDirectory(dir.display().to_string()));
	}
	Ok(())
}

fn winsize_of(cols: u16, rows: u16) -> Winsize {
	Winsize { ws_row: rows, ws_col: cols, ws_xpixel: 0, ws_ypixel: 0 }
}

impl PtyProcess {
	/// Runs the full spawn algorithm (spec §4.2 step 1 / §4.3): safety
	/// gate, env sanitization, cwd validation, command normalization, PTY
	/// allocation, child spawn, then a detached reader task that drives
	/// this process from `Initializing` into `Active`.
	pub async fn spawn(id: ProcessId, opts: SpawnOptions, clock: SharedClock) -> Result<Arc<Self>> {
		let normalized = command::normalize(&opts.command);
		safety::check_before_spawn(&normalized, &opts.command)?;
		let overlay = safety::sanitize_overlay(opts.env_overlay);

		if let Some(dir) = &opts.cwd {
			validate_cwd(dir)?;
		}

		let pty = openpty(Some(&winsize_of(opts.cols, opts.rows)), None)
			.map_err(|e| PtyError::SpawnFailed(format!("openpty: {e}")))?;
		let master_fd = pty.master;
		let slave_fd = pty.slave;

		set_raw_mode(slave_fd)?;

		let mut cmd = build_command(&normalized, &opts.cwd, &overlay, slave_fd);
		let child = cmd.spawn().map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

		// The slave is now owned by the child; the parent's copy must be
		// closed or reads on the master will never see EOF.
		let _ = nix::unistd::close(slave_fd);

		let (output_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
		let (exit_tx, exit_rx) = watch::channel(None);
		let created_at = clock.now();

		let process = Arc::new(Self {
			id,
			state: RwLock::new(ProcessState::Initializing),
			master_fd,
			child: Mutex::new(child),
			buffer: Mutex::new(OutputBuffer::new()),
			emulator: Mutex::new(TerminalEmulator::new(opts.cols, opts.rows)),
			output_tx,
			exit_rx,
			created_at,
			last_activity: Mutex::new(created_at),
			clock,
			command_text: opts.command.clone(),
		});

		*process.state.write().await = ProcessState::Active;
		spawn_reader_task(process.clone());
		spawn_exit_watcher(process.clone(), exit_tx);
		if let Some(timeout) = opts.timeout {
			spawn_timeout_watchdog(process.clone(), timeout);
		}

		Ok(process)
	}

	pub fn id(&self) -> &ProcessId {
		&self.id
	}

	pub async fn state(&self) -> ProcessState {
		*self.state.read().await
	}

	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	pub async fn last_activity(&self) -> DateTime<Utc> {
		*self.last_activity.lock().await
	}

	/// Exit code once the child has exited, `None` while still running.
	pub fn exit_code(&self) -> Option<i32> {
		*self.exit_rx.borrow()
	}

	pub async fn is_idle_since(&self, threshold: Duration) -> bool {
		let last = *self.last_activity.lock().await;
		self.clock.now().signed_duration_since(last).to_std().map(|d| d >= threshold).unwrap_or(false)
	}

	/// Writes bytes to the child's stdin via the PTY master (spec §4.3
	/// `write`). Also validates the payload against the dangerous
	/// control-sequence policy and re-runs the dangerous-command check
	/// against it before it reaches the child, so e.g. `sudo` typed
	/// interactively into a running shell is caught the same as one passed
	/// to `start` (spec §4.2 Write steps 3-4).
	pub async fn write(&self, data: &[u8]) -> Result<()> {
		if matches!(*self.state.read().await, ProcessState::Terminating | ProcessState::Terminated) {
			return Err(PtyError::NotActive);
		}
		check_dangerous_control_sequence(data)?;
		check_dangerous_input_text(data)?;

		let fd = self.master_fd;
		let data = data.to_vec();
		tokio::task::spawn_blocking(move || unsafe {
			use std::io::Write;
			let mut f = std::fs::File::from_raw_fd(nix::unistd::dup(fd).map_err(|e| e as i32).unwrap_or(-1));
			f.write_all(&data)
		})
		.await
		.map_err(|e| PtyError::InternalError(e.to_string()))?
		.map_err(|e| PtyError::InternalError(e.to_string()))?;

		*self.last_activity.lock().await = self.clock.now();
		Ok(())
	}

	/// Resolves a named or raw control code and writes its bytes (spec
	/// §4.8 Control-Code Resolver feeding into `write`).
	pub async fn send_control_code(&self, code: &str) -> Result<()> {
		let bytes = crate::control_code::resolve(code)?;
		self.write(&bytes).await
	}

	pub async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
		if !matches!(*self.state.read().await, ProcessState::Active | ProcessState::Idle) {
			return Err(PtyError::NotActive);
		}
		let ws = winsize_of(cols, rows);
		unsafe {
			nix::libc::ioctl(self.master_fd, nix::libc::TIOCSWINSZ, &ws as *const Winsize);
		}
		self.emulator.lock().await.resize(cols, rows);
		Ok(())
	}

	/// Current contents of the bounded output buffer (spec §4.3
	/// `getOutputBuffer`).
	pub async fn output_buffer(&self) -> Vec<u8> {
		self.buffer.lock().await.as_vec()
	}

	/// Rendered `{screen, cursor}` snapshot plus a re-serialized ANSI form,
	/// for the `pty://{id}/output` resource.
	pub async fn snapshot(&self) -> (Vec<String>, (u16, u16), String) {
		let emu = self.emulator.lock().await;
		(emu.lines(), emu.cursor(), emu.snapshot_ansi())
	}

	pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
		self.output_tx.subscribe()
	}

	/// Waits for the child to exit and returns its exit code. Holds a
	/// strong `Arc` to `self` for as long as the wait is pending — a
	/// caller that drops every other handle to this process while a
	/// `wait()` is outstanding must not see the process torn down out
	/// from under it.
	pub async fn wait(self: &Arc<Self>, _keep_alive: ()) -> i32 {
		let mut rx = self.exit_rx.clone();
		loop {
			if let Some(code) = *rx.borrow() {
				return code;
			}
			if rx.changed().await.is_err() {
				return -1;
			}
		}
	}

	/// Idempotent teardown: SIGTERM, a grace period, then SIGKILL (spec
	/// §4.3 `dispose`). Safe to call more than once or after the child has
	/// already exited on its own.
	pub async fn dispose(self: &Arc<Self>, signal: Signal) -> Result<()> {
		{
			let mut state = self.state.write().await;
			if *state == ProcessState::Terminated {
				return Ok(());
			}
			*state = ProcessState::Terminating;
		}

		let pid = {
			let child = self.child.lock().await;
			child.id().map(|p| Pid::from_raw(p as i32))
		};

		if let Some(pid) = pid {
			let _ = signal::kill(pid, signal);
			let exited = tokio::time::timeout(TERM_GRACE, self.wait(())).await;
			if exited.is_err() {
				let _ = signal::kill(pid, Signal::SIGKILL);
			}
		}

		*self.state.write().await = ProcessState::Terminated;
		Ok(())
	}

	pub fn command_text(&self) -> &str {
		&self.command_text
	}
}

fn set_raw_mode(slave_fd: RawFd) -> Result<()> {
	let mut attrs =
		termios::tcgetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(slave_fd) })
			.map_err(|e| PtyError::SpawnFailed(format!("tcgetattr: {e}")))?;
	termios::cfmakeraw(&mut attrs);
	termios::tcsetattr(
		unsafe { std::os::fd::BorrowedFd::borrow_raw(slave_fd) },
		termios::SetArg::TCSANOW,
		&attrs,
	)
	.map_err(|e| PtyError::SpawnFailed(format!("tcsetattr: {e}")))?;
	Ok(())
}

fn build_command(
	normalized: &NormalizedCommand,
	cwd: &Option<std::path::PathBuf>,
	env_overlay: &std::collections::HashMap<String, String>,
	slave_fd: RawFd,
) -> Command {
	let mut cmd = match normalized {
		NormalizedCommand::Direct { executable, args } => {
			let mut c = Command::new(executable);
			c.args(args);
			c
		}
		NormalizedCommand::Shell { command } => {
			let mut c = Command::new("sh");
			c.arg("-c").arg(command);
			c
		}
	};

	if let Some(dir) = cwd {
		cmd.current_dir(dir);
	}
	cmd.env("TERM", "xterm-256color");
	for (k, v) in env_overlay {
		cmd.env(k, v);
	}

	unsafe {
		cmd.stdin(Stdio::from_raw_fd(nix::unistd::dup(slave_fd).unwrap_or(slave_fd)));
		cmd.stdout(Stdio::from_raw_fd(nix::unistd::dup(slave_fd).unwrap_or(slave_fd)));
		cmd.stderr(Stdio::from_raw_fd(nix::unistd::dup(slave_fd).unwrap_or(slave_fd)));
		cmd.pre_exec(|| {
			nix::unistd::setsid().map_err(std::io::Error::from)?;
			if nix::libc::ioctl(0, nix::libc::TIOCSCTTY as _, 0) < 0 {
				return Err(std::io::Error::last_os_error());
			}
			Ok(())
		});
	}
	cmd.kill_on_drop(false);
	cmd
}

fn cursor_position_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\x1b\[\d+;\d+H").unwrap())
}

fn private_mode_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\x1b\[\?\d+[hl]").unwrap())
}

fn check_dangerous_control_sequence(data: &[u8]) -> Result<()> {
	if data.windows(2).any(|w| w == b"\x1b]") && data.contains(&0x07) {
		return Err(PtyError::DangerousControlSequence("OSC title-change sequence".to_string()));
	}
	if data.windows(4).any(|w| w == b"\x1b[2J") {
		return Err(PtyError::DangerousControlSequence("erase-display sequence".to_string()));
	}
	let text = String::from_utf8_lossy(data);
	if cursor_position_re().is_match(&text) {
		return Err(PtyError::DangerousControlSequence("cursor-absolute-position sequence".to_string()));
	}
	if private_mode_re().is_match(&text) {
		return Err(PtyError::DangerousControlSequence("private-mode set/reset sequence".to_string()));
	}
	Ok(())
}

/// Re-runs the command normalizer's dangerous-pattern policy against raw
/// input bytes (spec §4.2 Write step 4), catching e.g. `sudo` typed
/// interactively into an already-running shell.
fn check_dangerous_input_text(data: &[u8]) -> Result<()> {
	let text = String::from_utf8_lossy(data);
	let trimmed = text.trim();
	if trimmed.is_empty() {
		return Ok(());
	}
	let normalized = command::normalize(trimmed);
	command::enforce_policy(&normalized, trimmed, safety::consent_granted())
}

fn spawn_reader_task(process: Arc<PtyProcess>) {
	tokio::spawn(async move {
		let fd = process.master_fd;
		let raw = unsafe { std::fs::File::from_raw_fd(nix::unistd::dup(fd).unwrap_or(fd)) };
		let mut file = tokio::fs::File::from_std(raw);
		let mut chunk = [0u8; READ_CHUNK];
		loop {
			match file.read(&mut chunk).await {
				Ok(0) => break,
				Ok(n) => {
					let bytes = chunk[..n].to_vec();
					process.buffer.lock().await.push(&bytes);
					process.emulator.lock().await.feed(&bytes);
					let _ = process.output_tx.send(bytes);
					*process.last_activity.lock().await = process.clock.now();
				}
				Err(_) => break,
			}
		}
	});
}

fn spawn_exit_watcher(process: Arc<PtyProcess>, exit_tx: watch::Sender<Option<i32>>) {
	tokio::spawn(async move {
		let status = {
			let mut child = process.child.lock().await;
			child.wait().await
		};
		let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
		*process.state.write().await = ProcessState::Terminated;
		let _ = exit_tx.send(Some(code));
	});
}

fn spawn_timeout_watchdog(process: Arc<PtyProcess>, timeout: Duration) {
	tokio::spawn(async move {
		tokio::time::sleep(timeout).await;
		if process.state().await != ProcessState::Terminated {
			let _ = process.dispose(Signal::SIGTERM).await;
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::SystemClock;
	use std::sync::Arc as StdArc;

	#[tokio::test]
	async fn spawn_echo_and_read_output() {
		let clock: SharedClock = StdArc::new(SystemClock);
		let opts = SpawnOptions {
			command: "echo hello".to_string(),
			cwd: None,
			env_overlay: Default::default(),
			cols: 80,
			rows: 24,
			timeout: None,
			auto_dispose_on_exit: false,
		};
		let process = PtyProcess::spawn(ProcessId::new(), opts, clock).await.unwrap();
		let code = process.wait(()).await;
		assert_eq!(code, 0);
		let buf = process.output_buffer().await;
		assert!(String::from_utf8_lossy(&buf).contains("hello"));
	}

	#[tokio::test]
	async fn dangerous_command_is_rejected_before_any_pty_is_opened() {
		let clock: SharedClock = StdArc::new(SystemClock);
		let opts = SpawnOptions {
			command: "rm -rf /".to_string(),
			cwd: None,
			env_overlay: Default::default(),
			cols: 80,
			rows: 24,
			timeout: None,
			auto_dispose_on_exit: false,
		};
		let err = PtyProcess::spawn(ProcessId::new(), opts, clock).await.unwrap_err();
		assert!(matches!(err, PtyError::DangerousCommand(_)));
	}

	#[tokio::test]
	async fn dispose_is_idempotent() {
		let clock: SharedClock = StdArc::new(SystemClock);
		let opts = SpawnOptions {
			command: "sleep 5".to_string(),
			cwd: None,
			env_overlay: Default::default(),
			cols: 80,
			rows: 24,
			timeout: None,
			auto_dispose_on_exit: false,
		};
		let process = PtyProcess::spawn(ProcessId::new(), opts, clock).await.unwrap();
		process.dispose(Signal::SIGTERM).await.unwrap();
		process.dispose(Signal::SIGTERM).await.unwrap();
		assert_eq!(process.state().await, ProcessState::Terminated);
	}
}
