/**
 * @file tokenizer.rs
 * @brief Quote-aware Bourne-shell-ish tokenizer
 *
 * A generalization of the teacher's `CommandParser`/`ParseState` char
 * state machine (`shell/parser.rs`): that parser split a command string
 * into words while tracking single/double-quote and backslash-escape
 * state, then stopped there. This version keeps the same state machine
 * but additionally records, for every unquoted character, whether a
 * shell metacharacter (`| & ; > < `) appeared outside quotes — the
 * Command Normalizer needs that to decide direct-exec vs shell-wrapped.
 *
 * @author KleaSCM
 * @email KleaSCM@gmail.com
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
	Unquoted,
	Single,
	Double,
}

/// Result of tokenizing a command string.
#[derive(Debug, Clone, Default)]
pub struct TokenizeResult {
	/// Words with quoting/escaping resolved.
	pub words: Vec<String>,
	/// True if any shell metacharacter (`| & ; > < newline`) appeared
	/// outside of quotes anywhere in the string.
	pub has_metacharacter: bool,
	/// True if the string ended with an open quote (malformed input).
	pub unterminated_quote: bool,
}

/// Tokenizes `input` the way a Bourne shell would split a single simple
/// command into words, while flagging metacharacters seen outside quotes.
pub fn tokenize(input: &str) -> TokenizeResult {
	let mut words = Vec::new();
	let mut current = String::new();
	let mut have_current = false;
	let mut quote = QuoteState::Unquoted;
	let mut escape_next = false;
	let mut has_metacharacter = false;

	let mut chars = input.chars().peekable();
	while let Some(c) = chars.next() {
		if escape_next {
			current.push(c);
			have_current = true;
			escape_next = false;
			continue;
		}

		match quote {
			QuoteState::Unquoted => match c {
				'\\' => {
					escape_next = true;
					have_current = true;
				}
				'\'' => {
					quote = QuoteState::Single;
					have_current = true;
				}
				'"' => {
					quote = QuoteState::Double;
					have_current = true;
				}
				c if c.is_whitespace() => {
					if have_current {
						words.push(std::mem::take(&mut current));
						have_current = false;
					}
				}
				'|' | '&' | ';' | '>' | '<' => {
					has_metacharacter = true;
					if have_current {
						words.push(std::mem::take(&mut current));
						have_current = false;
					}
					// Consume doubled operator forms (&&, ||, >>, <<) as one.
					if let Some(&next) = chars.peek() {
						if next == c && (c == '&' || c == '|' || c == '>' || c == '<') {
							chars.next();
						}
					}
				}
				_ => {
					current.push(c);
					have_current = true;
				}
			},
			QuoteState::Single => {
				if c == '\'' {
					quote = QuoteState::Unquoted;
				} else {
					current.push(c);
				}
			}
			QuoteState::Double => match c {
				'"' => quote = QuoteState::Unquoted,
				'\\' => escape_next = true,
				_ => current.push(c),
			},
		}
	}

	if have_current {
		words.push(current);
	}

	TokenizeResult {
		words,
		has_metacharacter,
		unterminated_quote: quote != QuoteState::Unquoted,
	}
}

/// True if `word` looks like a leading `VAR=value` environment assignment.
pub fn looks_like_assignment(word: &str) -> bool {
	match word.find('=') {
		None => false,
		Some(eq_pos) => {
			let name = &word[..eq_pos];
			!name.is_empty()
				&& name
					.chars()
					.enumerate()
					.all(|(i, c)| if i == 0 { c.is_ascii_alphabetic() || c == '_' } else { c.is_ascii_alphanumeric() || c == '_' })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_plain_words() {
		let r = tokenize("echo hello world");
		assert_eq!(r.words, vec!["echo", "hello", "world"]);
		assert!(!r.has_metacharacter);
	}

	#[test]
	fn respects_single_and_double_quotes() {
		let r = tokenize(r#"echo "hello world" 'a|b'"#);
		assert_eq!(r.words, vec!["echo", "hello world", "a|b"]);
		assert!(!r.has_metacharacter);
	}

	#[test]
	fn detects_pipe_outside_quotes() {
		let r = tokenize("echo hi | cat");
		assert!(r.has_metacharacter);
	}

	#[test]
	fn detects_redirection_without_surrounding_whitespace() {
		let r = tokenize("echo hi>file.txt");
		assert!(r.has_metacharacter);
	}

	#[test]
	fn unterminated_quote_is_flagged() {
		let r = tokenize(r#"echo "unterminated"#);
		assert!(r.unterminated_quote);
	}

	#[test]
	fn env_assignment_prefix_is_detected() {
		assert!(looks_like_assignment("FOO=bar"));
		assert!(!looks_like_assignment("=bar"));
		assert!(!looks_like_assignment("echo"));
	}
}
