/**
 * @file control_code.rs
 * @brief Named-key and short raw-sequence resolution to PTY bytes
 *
 * Translates the human-readable key names a tool caller sends
 * (`write_input { ctrlCode: "Enter" }`) into the raw bytes written to the
 * PTY master. Grounded on the teacher's preference for a plain `match`
 * over a lookup-table crate (`terminal/protocol.rs`'s
 * `handle_control_sequence`) — the table below is under twenty entries,
 * small enough that a perfect-hash dependency would be overkill.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use crate::error::{PtyError, Result};

const KNOWN_NAMES: &str = "Enter, Return, Tab, Backspace, Ctrl+A, Ctrl+C, Ctrl+D, Ctrl+E, Ctrl+K, \
Ctrl+L, Ctrl+R, Ctrl+U, Ctrl+W, Ctrl+Z, Escape, Ctrl+[, ArrowUp, ArrowDown, ArrowRight, ArrowLeft, \
EOF, EOT, Interrupt";

/// Resolves a named control code to its raw byte sequence.
///
/// Aliases (`EOF`/`EOT` → `Ctrl+D`, `Interrupt` → `Ctrl+C`) are resolved to
/// the same bytes as their canonical name, so `resolve(name) == bytes(name)`
/// holds for every name in the table, aliases included.
pub fn resolve_named(name: &str) -> Result<Vec<u8>> {
	let bytes: &[u8] = match name {
		"Enter" => b"\n",
		"Return" => b"\r",
		"Tab" => b"\t",
		"Backspace" => &[0x7f],
		"Ctrl+A" => &[0x01],
		"Ctrl+C" | "Interrupt" => &[0x03],
		"Ctrl+D" | "EOF" | "EOT" => &[0x04],
		"Ctrl+E" => &[0x05],
		"Ctrl+K" => &[0x0b],
		"Ctrl+L" => &[0x0c],
		"Ctrl+R" => &[0x12],
		"Ctrl+U" => &[0x15],
		"Ctrl+W" => &[0x17],
		"Ctrl+Z" => &[0x1a],
		"Escape" | "Ctrl+[" => &[0x1b],
		"ArrowUp" => b"\x1b[A",
		"ArrowDown" => b"\x1b[B",
		"ArrowRight" => b"\x1b[C",
		"ArrowLeft" => b"\x1b[D",
		other => {
			return Err(PtyError::InvalidControlCode {
				given: other.to_string(),
				known: KNOWN_NAMES.to_string(),
			})
		}
	};
	Ok(bytes.to_vec())
}

/// Resolves a raw control-code string: either a known name, or (if it
/// isn't one) a short literal byte sequence of at most 4 bytes. Longer
/// sequences are rejected to prevent arbitrary injection through a path
/// that isn't meant for bulk payloads — use `data` on `write_input` for that.
pub fn resolve(code: &str) -> Result<Vec<u8>> {
	if let Ok(bytes) = resolve_named(code) {
		return Ok(bytes);
	}

	let raw = code.as_bytes();
	if raw.is_empty() || raw.len() > 4 {
		return Err(PtyError::InvalidControlCode {
			given: code.to_string(),
			known: KNOWN_NAMES.to_string(),
		});
	}
	Ok(raw.to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enter_is_newline() {
		assert_eq!(resolve_named("Enter").unwrap(), b"\n".to_vec());
	}

	#[test]
	fn arrow_up_is_three_bytes() {
		assert_eq!(resolve_named("ArrowUp").unwrap(), b"\x1b[A".to_vec());
	}

	#[test]
	fn aliases_resolve_to_same_bytes_as_canonical_name() {
		assert_eq!(resolve_named("EOF").unwrap(), resolve_named("Ctrl+D").unwrap());
		assert_eq!(resolve_named("EOT").unwrap(), resolve_named("Ctrl+D").unwrap());
		assert_eq!(
			resolve_named("Interrupt").unwrap(),
			resolve_named("Ctrl+C").unwrap()
		);
	}

	#[test]
	fn unknown_name_is_rejected_with_full_table_in_message() {
		let err = resolve_named("Ctrl+Q").unwrap_err();
		match err {
			PtyError::InvalidControlCode { given, known } => {
				assert_eq!(given, "Ctrl+Q");
				assert!(known.contains("Enter"));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn raw_sequence_over_four_bytes_is_rejected() {
		let err = resolve("abcde").unwrap_err();
		assert!(matches!(err, PtyError::InvalidControlCode { .. }));
	}

	#[test]
	fn short_raw_sequence_passes_through() {
		assert_eq!(resolve("ab").unwrap(), b"ab".to_vec());
	}
}
