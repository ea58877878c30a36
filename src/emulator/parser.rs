/**
 * @file parser.rs
 * @brief ANSI/VT100 escape-sequence parser
 *
 * A trimmed generalization of the teacher's `terminal::protocol::AnsiParser`
 * (same state machine: Normal → Escape → ControlSequence/OperatingSystem →
 * dispatch on a final byte), narrowed to the xterm-256color subset the
 * headless emulator contract (spec §3) actually needs: cursor movement,
 * erase, SGR, and the handful of private-mode sequences the Safety
 * Gate treats as dangerous to write interactively (spec §4.2 step 3).
 *
 * Parser state persists across `feed()` calls so a partial escape
 * sequence split across two PTY reads resumes correctly instead of being
 * treated as stray bytes — the teacher's own struct-held `state` field
 * already gave us that for free, this keeps the same shape.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
	Normal,
	Escape,
	Csi,
	Osc,
}

/// A parsed terminal command, ready to be applied to a `Screen`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnsiCommand {
	Print(char),
	Newline,
	CarriageReturn,
	Tab,
	Backspace,
	Bell,
	CursorUp(u32),
	CursorDown(u32),
	CursorForward(u32),
	CursorBackward(u32),
	CursorPosition(u32, u32),
	CursorHorizontalAbsolute(u32),
	EraseInDisplay(u32),
	EraseInLine(u32),
	Sgr(Vec<u32>),
	SetPrivateMode(u32),
	ResetPrivateMode(u32),
	OscTitle(String),
}

#[derive(Debug, Clone, Default)]
pub struct AnsiParser {
	state: ParserStateHolder,
	params: Vec<u32>,
	current_param: String,
	private_marker: bool,
	osc_buf: String,
}

#[derive(Debug, Clone, Copy)]
struct ParserStateHolder(ParserState);

impl Default for ParserStateHolder {
	fn default() -> Self {
		Self(ParserState::Normal)
	}
}

impl AnsiParser {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feeds a chunk of child output through the parser, returning every
	/// command recognized so far. Safe to call repeatedly with
	/// arbitrarily-split chunks of the same byte stream.
	pub fn feed(&mut self, input: &[u8]) -> Vec<AnsiCommand> {
		let mut commands = Vec::new();
		for &byte in input {
			self.feed_byte(byte, &mut commands);
		}
		commands
	}

	fn feed_byte(&mut self, byte: u8, out: &mut Vec<AnsiCommand>) {
		match self.state.0 {
			ParserState::Normal => match byte {
				0x1b => self.state.0 = ParserState::Escape,
				b'\n' => out.push(AnsiCommand::Newline),
				b'\r' => out.push(AnsiCommand::CarriageReturn),
				b'\t' => out.push(AnsiCommand::Tab),
				0x08 => out.push(AnsiCommand::Backspace),
				0x07 => out.push(AnsiCommand::Bell),
				_ => {
					if let Some(c) = lossy_char(byte) {
						out.push(AnsiCommand::Print(c));
					}
				}
			},
			ParserState::Escape => match byte {
				b'[' => {
					self.state.0 = ParserState::Csi;
					self.params.clear();
					self.current_param.clear();
					self.private_marker = false;
				}
				b']' => {
					self.state.0 = ParserState::Osc;
					self.osc_buf.clear();
				}
				_ => self.state.0 = ParserState::Normal,
			},
			ParserState::Csi => match byte {
				b'0'..=b'9' => self.current_param.push(byte as char),
				b';' => {
					self.params.push(self.current_param.parse().unwrap_or(0));
					self.current_param.clear();
				}
				b'?' => self.private_marker = true,
				_ => {
					if !self.current_param.is_empty() || self.params.is_empty() {
						self.params.push(self.current_param.parse().unwrap_or(0));
					}
					self.dispatch_csi(byte, out);
					self.state.0 = ParserState::Normal;
				}
			},
			ParserState::Osc => {
				if byte == 0x07 {
					out.push(AnsiCommand::OscTitle(std::mem::take(&mut self.osc_buf)));
					self.state.0 = ParserState::Normal;
				} else if let Some(c) = lossy_char(byte) {
					self.osc_buf.push(c);
				}
			}
		}
	}

	fn dispatch_csi(&mut self, final_byte: u8, out: &mut Vec<AnsiCommand>) {
		let p = |i: usize, default: u32| self.params.get(i).copied().filter(|&v| v != 0).unwrap_or(default);

		match final_byte {
			b'A' => out.push(AnsiCommand::CursorUp(p(0, 1))),
			b'B' => out.push(AnsiCommand::CursorDown(p(0, 1))),
			b'C' => out.push(AnsiCommand::CursorForward(p(0, 1))),
			b'D' => out.push(AnsiCommand::CursorBackward(p(0, 1))),
			b'G' => out.push(AnsiCommand::CursorHorizontalAbsolute(p(0, 1))),
			b'H' | b'f' => out.push(AnsiCommand::CursorPosition(p(0, 1), p(1, 1))),
			b'J' => out.push(AnsiCommand::EraseInDisplay(self.params.first().copied().unwrap_or(0))),
			b'K' => out.push(AnsiCommand::EraseInLine(self.params.first().copied().unwrap_or(0))),
			b'm' => out.push(AnsiCommand::Sgr(if self.params.is_empty() { vec![0] } else { self.params.clone() })),
			b'h' if self.private_marker => {
				for &param in &self.params {
					out.push(AnsiCommand::SetPrivateMode(param));
				}
			}
			b'l' if self.private_marker => {
				for &param in &self.params {
					out.push(AnsiCommand::ResetPrivateMode(param));
				}
			}
			_ => {}
		}
	}
}

fn lossy_char(byte: u8) -> Option<char> {
	Some(byte as char)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prints_plain_text() {
		let mut p = AnsiParser::new();
		let cmds = p.feed(b"hi");
		assert_eq!(cmds, vec![AnsiCommand::Print('h'), AnsiCommand::Print('i')]);
	}

	#[test]
	fn parses_cursor_position() {
		let mut p = AnsiParser::new();
		let cmds = p.feed(b"\x1b[5;10H");
		assert_eq!(cmds, vec![AnsiCommand::CursorPosition(5, 10)]);
	}

	#[test]
	fn parses_erase_display() {
		let mut p = AnsiParser::new();
		assert_eq!(p.feed(b"\x1b[2J"), vec![AnsiCommand::EraseInDisplay(2)]);
	}

	#[test]
	fn parses_sgr_color_sequence() {
		let mut p = AnsiParser::new();
		assert_eq!(p.feed(b"\x1b[31;1m"), vec![AnsiCommand::Sgr(vec![31, 1])]);
	}

	#[test]
	fn tolerates_escape_sequence_split_across_two_feeds() {
		let mut p = AnsiParser::new();
		assert!(p.feed(b"\x1b[5;").is_empty());
		assert_eq!(p.feed(b"10H"), vec![AnsiCommand::CursorPosition(5, 10)]);
	}

	#[test]
	fn parses_private_mode_set() {
		let mut p = AnsiParser::new();
		assert_eq!(p.feed(b"\x1b[?25l"), vec![AnsiCommand::ResetPrivateMode(25)]);
	}
}
