/**
 * @file config.rs
 * @brief Runtime configuration: CLI flags, config file, env vars, defaults
 *
 * Precedence is CLI > config file > env vars > defaults, resolved
 * field-by-field (spec §6). `clap` supplies the CLI surface (already a
 * declared-but-unused teacher dependency); `dirs` locates the XDG config
 * file the same way the teacher's own config lookups do.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::{PtyError, Result};

pub const DEACTIVATE_RESOURCES_ENV: &str = "MCP_PTY_DEACTIVATE_RESOURCES";
const DEFAULT_HTTP_PORT: u16 = 6420;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
	Stdio,
	Http,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-pty", about = "Persistent PTY multiplexer exposed over MCP")]
struct Cli {
	#[arg(long, value_enum)]
	transport: Option<TransportKind>,

	#[arg(long)]
	port: Option<u16>,

	#[arg(long)]
	deactivate_resources: bool,
}

/// The subset of settings a config file may override, every field
/// optional so a partial file doesn't clobber env/default values.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
	transport: Option<TransportKind>,
	port: Option<u16>,
	#[serde(rename = "deactivateResources")]
	deactivate_resources: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub transport: TransportKind,
	pub port: u16,
	pub deactivate_resources: bool,
}

impl Config {
	/// Resolves the effective configuration from `std::env::args`, the
	/// XDG config file, and environment variables, in that precedence
	/// order (spec §6).
	pub fn load() -> Result<Self> {
		let cli = Cli::parse();
		let file = load_file_config();
		Self::resolve(cli, file)
	}

	fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
		let env_deactivate = std::env::var(DEACTIVATE_RESOURCES_ENV)
			.map(|v| v == "true")
			.unwrap_or(false);

		let transport = cli.transport.or(file.transport).unwrap_or(TransportKind::Stdio);
		let port = cli.port.or(file.port).unwrap_or(DEFAULT_HTTP_PORT);
		let deactivate_resources =
			cli.deactivate_resources || file.deactivate_resources.unwrap_or(false) || env_deactivate;

		Ok(Self { transport, port, deactivate_resources })
	}
}

fn config_file_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("mcp-pty").join("config.json"))
}

fn load_file_config() -> FileConfig {
	let Some(path) = config_file_path() else { return FileConfig::default() };
	let Ok(contents) = std::fs::read_to_string(&path) else { return FileConfig::default() };
	match serde_json::from_str(&contents) {
		Ok(cfg) => cfg,
		Err(e) => {
			tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
			FileConfig::default()
		}
	}
}

/// Expands a leading `~` or `~/...` to the process's home directory
/// (spec §8 boundary behavior: "a cwd of `~` expands to the process
/// home; relative paths are rejected").
pub fn expand_cwd(raw: &str) -> Result<PathBuf> {
	if let Some(rest) = raw.strip_prefix("~/") {
		let home = dirs::home_dir().ok_or_else(|| PtyError::InvalidWorkingDirectory(raw.to_string()))?;
		return Ok(home.join(rest));
	}
	if raw == "~" {
		return dirs::home_dir().ok_or_else(|| PtyError::InvalidWorkingDirectory(raw.to_string()));
	}
	let path = PathBuf::from(raw);
	if !path.is_absolute() {
		return Err(PtyError::InvalidWorkingDirectory(raw.to_string()));
	}
	Ok(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cli_flag_wins_over_file_and_env() {
		let cli = Cli { transport: Some(TransportKind::Http), port: Some(9001), deactivate_resources: false };
		let file = FileConfig { transport: Some(TransportKind::Stdio), port: Some(1), deactivate_resources: None };
		let cfg = Config::resolve(cli, file).unwrap();
		assert_eq!(cfg.transport, TransportKind::Http);
		assert_eq!(cfg.port, 9001);
	}

	#[test]
	fn defaults_apply_when_nothing_is_set() {
		let cli = Cli { transport: None, port: None, deactivate_resources: false };
		let cfg = Config::resolve(cli, FileConfig::default()).unwrap();
		assert_eq!(cfg.transport, TransportKind::Stdio);
		assert_eq!(cfg.port, DEFAULT_HTTP_PORT);
		assert!(!cfg.deactivate_resources);
	}

	#[test]
	fn tilde_expands_to_home_directory() {
		let home = dirs::home_dir().unwrap();
		assert_eq!(expand_cwd("~").unwrap(), home);
		assert_eq!(expand_cwd("~/work").unwrap(), home.join("work"));
	}

	#[test]
	fn relative_path_is_rejected() {
		assert!(expand_cwd("relative/path").is_err());
	}
}
