/**
 * @file main.rs
 * @brief Process entry point: config, logging, transport selection, shutdown
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use mcp_pty::clock::SystemClock;
use mcp_pty::config::{Config, TransportKind};
use mcp_pty::server::{HttpFactory, StdioEndpoint};
use mcp_pty::session::SessionManager;
use mcp_pty::transport::http::HttpBinder;
use mcp_pty::transport::stdio;

const SESSION_DISPOSE_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("mcp_pty=info".parse().unwrap()))
		.with_writer(std::io::stderr)
		.init();

	let config = match Config::load() {
		Ok(config) => config,
		Err(e) => {
			tracing::error!(error = %e, "failed to load configuration");
			return ExitCode::from(1);
		}
	};

	let session_manager = SessionManager::new(Arc::new(SystemClock));
	session_manager.spawn_idle_sweeper();

	let mut interrupted = false;
	let run_result = match config.transport {
		TransportKind::Stdio => {
			let endpoint = Arc::new(StdioEndpoint::new(session_manager.clone(), config.deactivate_resources));
			tokio::select! {
				result = stdio::run(session_manager.clone(), endpoint) => result,
				signal = wait_for_shutdown_signal() => {
					interrupted = signal == Shutdown::Interrupt;
					tracing::info!(?signal, "shutdown signal received");
					Ok(())
				}
			}
		}
		TransportKind::Http => {
			let factory = Arc::new(HttpFactory::new(session_manager.clone()));
			let binder = HttpBinder::new(session_manager.clone(), factory);
			let addr = format!("0.0.0.0:{}", config.port);
			tracing::info!(%addr, "listening for streaming-HTTP MCP connections");

			let listener = match tokio::net::TcpListener::bind(&addr).await {
				Ok(listener) => listener,
				Err(e) => {
					tracing::error!(error = %e, %addr, "failed to bind HTTP listener");
					return ExitCode::from(1);
				}
			};

			tokio::select! {
				result = axum::serve(listener, binder.router()).into_future() => {
					result.map_err(|e| mcp_pty::error::PtyError::InternalError(e.to_string()))
				}
				signal = wait_for_shutdown_signal() => {
					interrupted = signal == Shutdown::Interrupt;
					tracing::info!(?signal, "shutdown signal received");
					Ok(())
				}
			}
		}
	};

	shutdown_all_sessions(&session_manager).await;

	match run_result {
		Ok(()) if interrupted => ExitCode::from(130),
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!(error = %e, "transport exited with an error");
			ExitCode::from(1)
		}
	}
}

/// Disposes every still-live session (and with it every PTY) within an
/// overall bound, so a slow child can't hang process shutdown forever.
async fn shutdown_all_sessions(session_manager: &Arc<SessionManager>) {
	if tokio::time::timeout(SESSION_DISPOSE_GRACE * 10, session_manager.dispose_all()).await.is_err() {
		tracing::warn!("session shutdown exceeded its grace period, exiting anyway");
	}
}

/// Which signal triggered shutdown, so `main` can pick the right exit code
/// (spec §6: 130 specifically for SIGINT, 0 for anything else that wasn't
/// an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
	Interrupt,
	Terminate,
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Shutdown {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
	tokio::select! {
		_ = tokio::signal::ctrl_c() => Shutdown::Interrupt,
		_ = sigterm.recv() => Shutdown::Terminate,
	}
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Shutdown {
	let _ = tokio::signal::ctrl_c().await;
	Shutdown::Interrupt
}
