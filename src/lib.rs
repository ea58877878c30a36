/**
 * @file lib.rs
 * @brief Crate root: module registration for the PTY + MCP runtime
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

pub mod clock;
pub mod command;
pub mod config;
pub mod control_code;
pub mod emulator;
pub mod error;
pub mod ids;
pub mod pty;
pub mod safety;
pub mod server;
pub mod session;
pub mod transport;
