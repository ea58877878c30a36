/**
 * @file screen.rs
 * @brief Screen buffer: applies parsed ANSI commands, renders lines + cursor
 *
 * A trimmed generalization of the teacher's `terminal::renderer::TerminalRenderer`
 * applying `AnsiCommand`s to a `ScreenBuffer` of `Cell`s — narrowed from a
 * GUI-paint role (needs exact pixel-level color/attribute state) to the
 * `{screen, cursor}` snapshot contract spec §3 asks for, while keeping
 * enough SGR state to re-serialize ANSI for the `pty://{id}/output`
 * resource.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

use super::parser::AnsiCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sgr {
	pub fg: Option<u8>,
	pub bg: Option<u8>,
	pub bold: bool,
	pub underline: bool,
	pub reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
	pub ch: char,
	pub sgr: Sgr,
}

impl Default for Cell {
	fn default() -> Self {
		Self { ch: ' ', sgr: Sgr::default() }
	}
}

/// Headless screen buffer: fixed `cols` x `rows` grid plus cursor.
#[derive(Debug, Clone)]
pub struct Screen {
	cols: u16,
	rows: u16,
	cells: Vec<Vec<Cell>>,
	cursor_col: u16,
	cursor_row: u16,
	current_sgr: Sgr,
}

impl Screen {
	pub fn new(cols: u16, rows: u16) -> Self {
		Self {
			cols,
			rows,
			cells: vec![vec![Cell::default(); cols as usize]; rows as usize],
			cursor_col: 0,
			cursor_row: 0,
			current_sgr: Sgr::default(),
		}
	}

	pub fn size(&self) -> (u16, u16) {
		(self.cols, self.rows)
	}

	/// Cursor position as (x, y), 0-indexed, clamped to the visible grid.
	pub fn cursor(&self) -> (u16, u16) {
		(self.cursor_col, self.cursor_row)
	}

	pub fn resize(&mut self, cols: u16, rows: u16) {
		let mut new_cells = vec![vec![Cell::default(); cols as usize]; rows as usize];
		for row in 0..self.rows.min(rows) as usize {
			for col in 0..self.cols.min(cols) as usize {
				new_cells[row][col] = self.cells[row][col];
			}
		}
		self.cells = new_cells;
		self.cols = cols;
		self.rows = rows;
		self.cursor_col = self.cursor_col.min(cols.saturating_sub(1));
		self.cursor_row = self.cursor_row.min(rows.saturating_sub(1));
	}

	pub fn apply(&mut self, cmd: &AnsiCommand) {
		match cmd {
			AnsiCommand::Print(c) => self.print_char(*c),
			AnsiCommand::Newline => self.newline(),
			AnsiCommand::CarriageReturn => self.cursor_col = 0,
			AnsiCommand::Tab => {
				let next_stop = ((self.cursor_col / 8) + 1) * 8;
				self.cursor_col = next_stop.min(self.cols.saturating_sub(1));
			}
			AnsiCommand::Backspace => {
				self.cursor_col = self.cursor_col.saturating_sub(1);
			}
			AnsiCommand::Bell | AnsiCommand::OscTitle(_) => {}
			AnsiCommand::CursorUp(n) => self.cursor_row = self.cursor_row.saturating_sub(*n as u16),
			AnsiCommand::CursorDown(n) => {
				self.cursor_row = (self.cursor_row + *n as u16).min(self.rows.saturating_sub(1))
			}
			AnsiCommand::CursorForward(n) => {
				self.cursor_col = (self.cursor_col + *n as u16).min(self.cols.saturating_sub(1))
			}
			AnsiCommand::CursorBackward(n) => self.cursor_col = self.cursor_col.saturating_sub(*n as u16),
			AnsiCommand::CursorHorizontalAbsolute(col) => {
				self.cursor_col = (*col as u16).saturating_sub(1).min(self.cols.saturating_sub(1))
			}
			AnsiCommand::CursorPosition(row, col) => {
				self.cursor_row = (*row as u16).saturating_sub(1).min(self.rows.saturating_sub(1));
				self.cursor_col = (*col as u16).saturating_sub(1).min(self.cols.saturating_sub(1));
			}
			AnsiCommand::EraseInDisplay(mode) => self.erase_in_display(*mode),
			AnsiCommand::EraseInLine(mode) => self.erase_in_line(*mode),
			AnsiCommand::Sgr(params) => self.apply_sgr(params),
			AnsiCommand::SetPrivateMode(_) | AnsiCommand::ResetPrivateMode(_) => {}
		}
	}

	fn print_char(&mut self, c: char) {
		if self.cursor_col >= self.cols {
			self.newline();
		}
		let row = self.cursor_row as usize;
		let col = self.cursor_col as usize;
		self.cells[row][col] = Cell { ch: c, sgr: self.current_sgr };
		self.cursor_col += 1;
	}

	fn newline(&mut self) {
		if self.cursor_row + 1 >= self.rows {
			self.cells.remove(0);
			self.cells.push(vec![Cell::default(); self.cols as usize]);
		} else {
			self.cursor_row += 1;
		}
	}

	fn erase_in_display(&mut self, mode: u32) {
		match mode {
			2 | 3 => {
				self.cells = vec![vec![Cell::default(); self.cols as usize]; self.rows as usize];
			}
			0 => {
				self.erase_in_line(0);
				for row in (self.cursor_row as usize + 1)..self.rows as usize {
					self.cells[row] = vec![Cell::default(); self.cols as usize];
				}
			}
			1 => {
				self.erase_in_line(1);
				for row in 0..self.cursor_row as usize {
					self.cells[row] = vec![Cell::default(); self.cols as usize];
				}
			}
			_ => {}
		}
	}

	fn erase_in_line(&mut self, mode: u32) {
		let row = self.cursor_row as usize;
		match mode {
			0 => {
				for col in self.cursor_col as usize..self.cols as usize {
					self.cells[row][col] = Cell::default();
				}
			}
			1 => {
				for col in 0..=self.cursor_col as usize {
					self.cells[row][col] = Cell::default();
				}
			}
			2 => {
				self.cells[row] = vec![Cell::default(); self.cols as usize];
			}
			_ => {}
		}
	}

	fn apply_sgr(&mut self, params: &[u32]) {
		let mut i = 0;
		while i < params.len() {
			match params[i] {
				0 => self.current_sgr = Sgr::default(),
				1 => self.current_sgr.bold = true,
				4 => self.current_sgr.underline = true,
				7 => self.current_sgr.reverse = true,
				22 => self.current_sgr.bold = false,
				24 => self.current_sgr.underline = false,
				27 => self.current_sgr.reverse = false,
				30..=37 => self.current_sgr.fg = Some((params[i] - 30) as u8),
				39 => self.current_sgr.fg = None,
				40..=47 => self.current_sgr.bg = Some((params[i] - 40) as u8),
				49 => self.current_sgr.bg = None,
				90..=97 => self.current_sgr.fg = Some((params[i] - 90 + 8) as u8),
				100..=107 => self.current_sgr.bg = Some((params[i] - 100 + 8) as u8),
				38 | 48 => {
					// Extended color: 38;5;N (256-color) or 38;2;R;G;B (truecolor).
					// We only retain a 256-color index; truecolor is downsampled
					// to its nearest named slot by discarding the R/G/B triplet.
					let is_fg = params[i] == 38;
					if params.get(i + 1) == Some(&5) {
						if let Some(&idx) = params.get(i + 2) {
							let slot = Some(idx.min(255) as u8);
							if is_fg {
								self.current_sgr.fg = slot;
							} else {
								self.current_sgr.bg = slot;
							}
							i += 2;
						}
					} else if params.get(i + 1) == Some(&2) {
						i += 4;
					}
				}
				_ => {}
			}
			i += 1;
		}
	}

	/// Rendered screen as ordered lines, each trimmed of trailing
	/// whitespace, with trailing all-blank lines removed (spec §4.6 `read`).
	pub fn lines(&self) -> Vec<String> {
		let mut lines: Vec<String> = self
			.cells
			.iter()
			.map(|row| row.iter().map(|c| c.ch).collect::<String>().trim_end().to_string())
			.collect();
		while lines.last().is_some_and(|l| l.is_empty()) {
			lines.pop();
		}
		lines
	}

	/// Re-serializes the screen as ANSI text (SGR + cursor-position codes)
	/// suitable for the `pty://{id}/output` resource's ANSI snapshot.
	pub fn snapshot_ansi(&self) -> String {
		let mut out = String::new();
		let mut last_sgr = Sgr::default();
		for row in &self.cells {
			for cell in row {
				if cell.sgr != last_sgr {
					out.push_str(&sgr_escape(&cell.sgr));
					last_sgr = cell.sgr;
				}
				out.push(cell.ch);
			}
			out.push('\n');
		}
		out.push_str("\x1b[0m");
		out
	}
}

fn sgr_escape(sgr: &Sgr) -> String {
	let mut codes = vec!["0".to_string()];
	if sgr.bold {
		codes.push("1".to_string());
	}
	if sgr.underline {
		codes.push("4".to_string());
	}
	if sgr.reverse {
		codes.push("7".to_string());
	}
	if let Some(fg) = sgr.fg {
		codes.push(if fg < 8 { (30 + fg).to_string() } else { (90 + fg - 8).to_string() });
	}
	if let Some(bg) = sgr.bg {
		codes.push(if bg < 8 { (40 + bg).to_string() } else { (100 + bg - 8).to_string() });
	}
	format!("\x1b[{}m", codes.join(";"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prints_text_and_advances_cursor() {
		let mut s = Screen::new(80, 24);
		s.apply(&AnsiCommand::Print('h'));
		s.apply(&AnsiCommand::Print('i'));
		assert_eq!(s.lines()[0], "hi");
		assert_eq!(s.cursor(), (2, 0));
	}

	#[test]
	fn newline_advances_row_and_resets_on_wrap() {
		let mut s = Screen::new(80, 2);
		s.apply(&AnsiCommand::Print('a'));
		s.apply(&AnsiCommand::Newline);
		s.apply(&AnsiCommand::CarriageReturn);
		s.apply(&AnsiCommand::Print('b'));
		s.apply(&AnsiCommand::Newline);
		s.apply(&AnsiCommand::CarriageReturn);
		s.apply(&AnsiCommand::Print('c'));
		assert_eq!(s.lines(), vec!["b", "c"]);
	}

	#[test]
	fn trailing_blank_lines_are_trimmed() {
		let mut s = Screen::new(10, 5);
		s.apply(&AnsiCommand::Print('x'));
		assert_eq!(s.lines(), vec!["x"]);
	}

	#[test]
	fn erase_in_display_clears_whole_screen() {
		let mut s = Screen::new(10, 3);
		s.apply(&AnsiCommand::Print('x'));
		s.apply(&AnsiCommand::EraseInDisplay(2));
		assert!(s.lines().is_empty());
	}

	#[test]
	fn cursor_position_is_1_indexed_in_input_0_indexed_in_output() {
		let mut s = Screen::new(80, 24);
		s.apply(&AnsiCommand::CursorPosition(1, 1));
		assert_eq!(s.cursor(), (0, 0));
	}

	#[test]
	fn resize_preserves_overlapping_content() {
		let mut s = Screen::new(10, 5);
		s.apply(&AnsiCommand::Print('x'));
		s.resize(20, 10);
		assert_eq!(s.lines()[0], "x");
	}
}
