// Copyright 2014 Nick Fitzgerald
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A `Session` is one source of input plus its reader cursor: the line and
//! column the reader is sitting at, whatever token has been read but not
//! yet consumed (pushback, for the one-token-of-lookahead the parser
//! needs), and whether this session is interactive (so the evaluator knows
//! whether to print a prompt and whether an `(exit)` at top level should
//! leave the REPL or stop a `load`). Grounded on `session_context_t` in
//! `original_source/session.h`.

use std::fmt;

use crate::object::Value;

/// A single pending character of input the reader peeked at and decided
/// not to consume yet, plus the position it sits at.
pub struct Session {
    /// Name used in error messages: a file path, or `"*stdin*"`.
    pub name: String,
    /// The remaining input, consumed left to right.
    chars: Vec<char>,
    pos: usize,
    pub lineno: u32,
    pub column: u32,
    /// A token read one step ahead of where the parser has consumed to.
    pub pushback: Option<Value>,
    pub is_interactive: bool,
}

impl Session {
    pub fn from_str(name: &str, source: &str) -> Session {
        Session {
            name: name.to_string(),
            chars: source.chars().collect(),
            pos: 0,
            lineno: 1,
            column: 0,
            pushback: None,
            is_interactive: false,
        }
    }

    pub fn interactive(name: &str) -> Session {
        let mut s = Session::from_str(name, "");
        s.is_interactive = true;
        s
    }

    /// Feed more source into an interactive session (one line from the
    /// REPL's line editor).
    pub fn feed(&mut self, line: &str) {
        self.chars.extend(line.chars());
        self.chars.push('\n');
    }

    pub fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.lineno += 1;
                self.column = 0;
            } else if c == '\t' {
                // Tabs advance to the next multiple of 8, per
                // `original_source/reader.c`'s `charclass`.
                self.column = (self.column / 8 + 1) * 8;
            } else {
                self.column += 1;
            }
        }
        c
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.name, self.lineno, self.column)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Session({})", self.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_advances_to_multiple_of_eight() {
        let mut s = Session::from_str("*test*", "\tx");
        s.next_char();
        assert_eq!(s.column, 8);
    }

    #[test]
    fn test_newline_resets_column_and_bumps_line() {
        let mut s = Session::from_str("*test*", "ab\ncd");
        s.next_char();
        s.next_char();
        s.next_char();
        assert_eq!(s.lineno, 2);
        assert_eq!(s.column, 0);
    }
}
