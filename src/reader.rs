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

//! The reader: a small lexer state machine feeding a recursive-descent
//! parser for S-expressions, vectors, and maps. Grounded on
//! `original_source/reader.c` — its six lexer states (`INIT`, inside a
//! string `STRG`, inside a character-literal escape `SBCK`, inside a
//! symbol/number `SYMB`, inside a `;` comment `CMNT`, and the "maybe dotted
//! pair" lookahead `MPRD`) are kept as the `LexState` enum below, walked
//! character-by-character the same way the original's `action`/`newstate`
//! tables do, just dispatched with a `match` instead of a 2-D table.

use crate::heap::Heap;
use crate::object::{SymbolPtr, Value};
use crate::signal::{self, ErrorCode, StrArg};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Dot,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplice,
    /// `#'x` desugars to `(function x)`, per `original_source/reader.c`'s
    /// `do_special(FUNCTION_NAME, sc)`.
    Function,
    /// `[` — `T_OBRACK` in `original_source/reader.c`. No `#` prefix: `#`
    /// only ever introduces `#'` or a character literal.
    VectorOpen,
    /// `]` — `T_CBRACK`.
    VectorClose,
    /// `{` — `T_OBRACE`.
    MapOpen,
    /// `}` — `T_CBRACE`.
    MapClose,
    Atom(String),
    Str(String),
    Char(char),
    Eof,
}

/// The lexer's internal state while scanning a single token. Mirrors the
/// states `original_source/reader.c` names `INIT`/`STRG`/`SBCK`/`SYMB`/
/// `CMNT`/`MPRD`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LexState {
    Init,
    InString,
    InCharEscape,
    InSymbol,
    InComment,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | '\'' | '`' | ',')
}

/// Scans one token at a time from a `Session`'s input.
pub struct Reader<'a> {
    session: &'a mut Session,
}

impl<'a> Reader<'a> {
    pub fn new(session: &'a mut Session) -> Reader<'a> {
        Reader { session }
    }

    fn peek(&self) -> Option<char> {
        self.session.peek_char()
    }

    fn advance(&mut self) -> Option<char> {
        self.session.next_char()
    }

    /// Mirrors `char_constant`'s subtype dispatch on the character right
    /// after `#\`: `b` for backspace-style names, `x` for hex code points,
    /// a literal `'` or `"`, a bare digit sequence for a numeric code
    /// point, or else the next character taken verbatim.
    fn read_char_literal(&mut self) -> Result<char, String> {
        let first = self
            .advance()
            .ok_or_else(|| "unexpected eof reading character literal".to_string())?;

        if first.is_ascii_alphabetic() {
            let mut name = String::new();
            name.push(first);
            while let Some(c) = self.peek() {
                if is_delimiter(c) {
                    break;
                }
                name.push(c);
                self.advance();
            }
            if name.len() == 1 {
                return Ok(first);
            }
            return match name.to_lowercase().as_str() {
                "space" => Ok(' '),
                "newline" | "linefeed" => Ok('\n'),
                "tab" => Ok('\t'),
                "return" => Ok('\r'),
                "backspace" => Ok('\u{8}'),
                "null" | "nul" => Ok('\0'),
                "escape" | "esc" => Ok('\u{1b}'),
                _ if name.starts_with('x') || name.starts_with('X') => {
                    u32::from_str_radix(&name[1..], 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| format!("invalid hex character literal #\\{}", name))
                }
                _ => Err(format!("unknown character name #\\{}", name)),
            };
        }

        Ok(first)
    }

    /// Reads one token, skipping whitespace and `;`-to-end-of-line
    /// comments first. Mirrors `read_next_token`.
    pub fn next_token(&mut self) -> Result<Token, String> {
        let mut state = LexState::Init;
        loop {
            match state {
                LexState::Init => match self.peek() {
                    None => return Ok(Token::Eof),
                    Some(c) if c.is_whitespace() => {
                        self.advance();
                    }
                    Some(';') => {
                        self.advance();
                        state = LexState::InComment;
                    }
                    Some('(') => {
                        self.advance();
                        return Ok(Token::LParen);
                    }
                    Some(')') => {
                        self.advance();
                        return Ok(Token::RParen);
                    }
                    Some('[') => {
                        self.advance();
                        return Ok(Token::VectorOpen);
                    }
                    Some(']') => {
                        self.advance();
                        return Ok(Token::VectorClose);
                    }
                    Some('{') => {
                        self.advance();
                        return Ok(Token::MapOpen);
                    }
                    Some('}') => {
                        self.advance();
                        return Ok(Token::MapClose);
                    }
                    Some('\'') => {
                        self.advance();
                        return Ok(Token::Quote);
                    }
                    Some('`') => {
                        self.advance();
                        return Ok(Token::Quasiquote);
                    }
                    Some(',') => {
                        self.advance();
                        if self.peek() == Some('@') {
                            self.advance();
                            return Ok(Token::UnquoteSplice);
                        }
                        return Ok(Token::Unquote);
                    }
                    Some('"') => {
                        self.advance();
                        state = LexState::InString;
                        return self.finish_string();
                    }
                    Some('#') => {
                        self.advance();
                        match self.peek() {
                            Some('\'') => {
                                self.advance();
                                return Ok(Token::Function);
                            }
                            Some('\\') => {
                                self.advance();
                                let c = self.read_char_literal()?;
                                return Ok(Token::Char(c));
                            }
                            _ => return Err("unsupported # syntax".to_string()),
                        }
                    }
                    Some(_) => {
                        state = LexState::InSymbol;
                    }
                },
                LexState::InComment => {
                    match self.advance() {
                        None | Some('\n') => state = LexState::Init,
                        _ => {}
                    }
                }
                LexState::InSymbol => {
                    return self.finish_symbol_or_dot();
                }
                LexState::InString | LexState::InCharEscape => unreachable!(),
            }
        }
    }

    fn finish_string(&mut self) -> Result<Token, String> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err("unexpected eof in string literal".to_string()),
                Some('"') => return Ok(Token::Str(s)),
                Some('\\') => {
                    let escaped = self
                        .advance()
                        .ok_or_else(|| "unexpected eof after backslash in string".to_string())?;
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '"' => '"',
                        other => other,
                    });
                }
                Some(c) => s.push(c),
            }
        }
    }

    fn finish_symbol_or_dot(&mut self) -> Result<Token, String> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            s.push(c);
            self.advance();
        }
        if s == "." {
            return Ok(Token::Dot);
        }
        Ok(Token::Atom(s))
    }
}

/// Parses atoms into numbers, character-like literal syntax having already
/// been peeled off by the lexer, or else a symbol. Mirrors `make_atom`.
fn atom_value(heap: &mut Heap, text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        let mut n = heap.allocate_number();
        n.value = i as f64;
        n.is_int = true;
        return Value::Number(n);
    }
    if looks_like_float(text) {
        if let Ok(f) = text.parse::<f64>() {
            let mut n = heap.allocate_number();
            n.value = f;
            n.is_int = false;
            return Value::Number(n);
        }
    }
    Value::Symbol(heap.intern(text))
}

fn looks_like_float(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    if matches!(chars.peek(), Some('+') | Some('-')) {
        chars.next();
    }
    let rest: String = chars.collect();
    !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && rest.chars().any(|c| c.is_ascii_digit())
        && (rest.contains('.') || rest.to_lowercase().contains('e'))
}

/// Reads one complete expression from `session`, or `None` at end of input.
/// Mirrors `read_expr`'s top-level dispatch, including the `quote`/
/// `quasiquote`/`unquote`/`unquote-splicing`/`function` reader macros and
/// dotted-pair list syntax.
pub fn read_expr(heap: &mut Heap, session: &mut Session) -> Result<Option<Value>, Value> {
    let mut reader = Reader::new(session);
    let token = reader.next_token().map_err(|msg| reader_error(heap, session, &msg))?;
    read_expr_from(heap, session, token)
}

fn read_expr_from(
    heap: &mut Heap,
    session: &mut Session,
    token: Token,
) -> Result<Option<Value>, Value> {
    match token {
        Token::Eof => Ok(None),
        Token::LParen => Ok(Some(read_list(heap, session)?)),
        Token::VectorOpen => Ok(Some(read_vector(heap, session)?)),
        Token::MapOpen => Ok(Some(read_map(heap, session)?)),
        Token::Quote => Ok(Some(wrap(heap, session, "quote")?)),
        Token::Quasiquote => Ok(Some(wrap(heap, session, "quasiquote")?)),
        Token::Unquote => Ok(Some(wrap(heap, session, "unquote")?)),
        Token::UnquoteSplice => Ok(Some(wrap(heap, session, "unquote-splicing")?)),
        Token::Function => Ok(Some(wrap(heap, session, "function")?)),
        Token::Str(s) => {
            let mut sp = heap.allocate_str();
            sp.content = s;
            Ok(Some(Value::Str(sp)))
        }
        Token::Char(c) => {
            let mut cp = heap.allocate_char();
            cp.value = c;
            Ok(Some(Value::Char(cp)))
        }
        Token::Atom(s) => Ok(Some(atom_value(heap, &s))),
        Token::Dot | Token::RParen | Token::VectorClose | Token::MapClose => {
            Err(reader_error(heap, session, "unexpected token at top level"))
        }
    }
}

fn wrap(heap: &mut Heap, session: &mut Session, name: &str) -> Result<Value, Value> {
    let inner = read_expr(heap, session)?
        .ok_or_else(|| reader_error(heap, session, "preliminary eof after reader macro"))?;
    let sym = heap.intern(name);
    Ok(cons(heap, Value::Symbol(sym), cons(heap, inner, Value::Symbol(heap.nil))))
}

fn cons(heap: &mut Heap, car: Value, cdr: Value) -> Value {
    let mut p = heap.allocate_pair();
    p.car = car;
    p.cdr = cdr;
    Value::Pair(p)
}

/// Builds an `ERR_RSYNTAX` signal with `session`'s current file/line/column
/// embedded in the message, per spec.md §4.2: "Every misuse yields a
/// Signal with code ERR_RSYNTAX embedding file/line/column and a short
/// message."
fn reader_error(heap: &mut Heap, session: &Session, msg: &str) -> Value {
    let text = format!("{}: {}", session.location(), msg);
    signal::throw_error(heap, ErrorCode::RSyntax, Value::Unbound, StrArg::Owned(text))
}

/// Reads the contents of a list already past its opening `(`, handling
/// dotted-pair syntax the way `read_loop`'s lookahead for `Dot` does.
fn read_list(heap: &mut Heap, session: &mut Session) -> Result<Value, Value> {
    let mut reader = Reader::new(session);
    let token = reader.next_token().map_err(|msg| reader_error(heap, session, &msg))?;
    match token {
        Token::RParen => Ok(Value::Symbol(heap.nil)),
        Token::Eof => Err(reader_error(heap, session, "preliminary eof in list")),
        Token::Dot => Err(reader_error(heap, session, "unexpected . at start of list")),
        other => {
            let car = read_expr_from(heap, session, other)?
                .ok_or_else(|| reader_error(heap, session, "preliminary eof in list"))?;

            let mut reader = Reader::new(session);
            let next = reader.next_token().map_err(|msg| reader_error(heap, session, &msg))?;
            let cdr = match next {
                Token::Dot => {
                    let tail = read_expr(heap, session)?
                        .ok_or_else(|| reader_error(heap, session, "preliminary eof after ."))?;
                    let mut reader = Reader::new(session);
                    match reader.next_token().map_err(|msg| reader_error(heap, session, &msg))? {
                        Token::RParen => {}
                        _ => return Err(reader_error(heap, session, "expected ) after dotted tail")),
                    }
                    tail
                }
                other => read_list_rest(heap, session, other)?,
            };
            Ok(cons(heap, car, cdr))
        }
    }
}

fn read_list_rest(heap: &mut Heap, session: &mut Session, token: Token) -> Result<Value, Value> {
    match token {
        Token::RParen => Ok(Value::Symbol(heap.nil)),
        Token::Eof => Err(reader_error(heap, session, "preliminary eof in list")),
        Token::Dot => Err(reader_error(heap, session, "unexpected . mid-list")),
        other => {
            let car = read_expr_from(heap, session, other)?
                .ok_or_else(|| reader_error(heap, session, "preliminary eof in list"))?;
            let mut reader = Reader::new(session);
            let next = reader.next_token().map_err(|msg| reader_error(heap, session, &msg))?;
            let cdr = match next {
                Token::Dot => {
                    let tail = read_expr(heap, session)?
                        .ok_or_else(|| reader_error(heap, session, "preliminary eof after ."))?;
                    let mut reader = Reader::new(session);
                    match reader.next_token().map_err(|msg| reader_error(heap, session, &msg))? {
                        Token::RParen => {}
                        _ => return Err(reader_error(heap, session, "expected ) after dotted tail")),
                    }
                    tail
                }
                other => read_list_rest(heap, session, other)?,
            };
            Ok(cons(heap, car, cdr))
        }
    }
}

/// Reads the contents of a `[ sexpr* ]` vector already past its opening
/// `[`. Mirrors `T_OBRACK sexpr* T_CBRACK` in `original_source/reader.c`.
fn read_vector(heap: &mut Heap, session: &mut Session) -> Result<Value, Value> {
    let mut elems = vec![];
    loop {
        let mut reader = Reader::new(session);
        let token = reader.next_token().map_err(|msg| reader_error(heap, session, &msg))?;
        match token {
            Token::VectorClose => break,
            Token::Eof => return Err(reader_error(heap, session, "preliminary eof in vector")),
            other => {
                let v = read_expr_from(heap, session, other)?
                    .ok_or_else(|| reader_error(heap, session, "preliminary eof in vector"))?;
                elems.push(v);
            }
        }
    }
    let mut vp = heap.allocate_vector();
    vp.elems = elems;
    Ok(Value::Vector(vp))
}

/// Reads the contents of a `{ (atom|list)+ }` map already past its opening
/// `{`, flattening the `k1 v1 k2 v2 ...` sequence into key/value pairs.
/// Mirrors `T_OBRACE {...}+ T_CBRACE` in `original_source/reader.c`.
fn read_map(heap: &mut Heap, session: &mut Session) -> Result<Value, Value> {
    use crate::object::MapKey;
    let mut mp = heap.allocate_map();
    loop {
        let mut reader = Reader::new(session);
        let token = reader.next_token().map_err(|msg| reader_error(heap, session, &msg))?;
        let key = match token {
            Token::MapClose => break,
            Token::Eof => return Err(reader_error(heap, session, "preliminary eof in map")),
            other => read_expr_from(heap, session, other)?
                .ok_or_else(|| reader_error(heap, session, "preliminary eof in map"))?,
        };
        let value = read_expr(heap, session)?
            .ok_or_else(|| reader_error(heap, session, "map entry missing a value"))?;
        mp.table.insert(MapKey(key), value);
    }
    Ok(Value::Map(mp))
}

/// A symbol interned purely for the reader macros, exposed so callers
/// building source programmatically (tests, `builtins::eval_string`) can
/// reach the same symbols the reader would have interned.
pub fn intern_reader_symbol(heap: &mut Heap, name: &str) -> SymbolPtr {
    heap.intern(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_one(src: &str) -> (Heap, Value) {
        let mut heap = Heap::new();
        let mut session = Session::from_str("*test*", src);
        let v = read_expr(&mut heap, &mut session).unwrap().unwrap();
        (heap, v)
    }

    #[test]
    fn test_read_integer() {
        let (_heap, v) = read_one("42");
        match v {
            Value::Number(n) => {
                assert!(n.is_int);
                assert_eq!(n.value, 42.0);
            }
            _ => panic!("expected a number"),
        }
    }

    #[test]
    fn test_read_float() {
        let (_heap, v) = read_one("3.5");
        match v {
            Value::Number(n) => {
                assert!(!n.is_int);
                assert_eq!(n.value, 3.5);
            }
            _ => panic!("expected a number"),
        }
    }

    #[test]
    fn test_read_symbol() {
        let (heap, v) = read_one("foo-bar");
        match v {
            Value::Symbol(s) => assert_eq!(s.name, "foo-bar"),
            _ => panic!("expected a symbol, got something in heap {:?}", heap.nil),
        }
    }

    #[test]
    fn test_read_string_with_escapes() {
        let (_heap, v) = read_one("\"a\\nb\"");
        match v {
            Value::Str(s) => assert_eq!(s.content, "a\nb"),
            _ => panic!("expected a string"),
        }
    }

    #[test]
    fn test_read_quote_sugar() {
        let (heap, v) = read_one("'x");
        let pair = v.as_pair().expect("quote should read as a pair");
        assert_eq!(pair.car.as_symbol().unwrap().name, "quote");
        let inner = pair.cdr.as_pair().unwrap().car;
        assert_eq!(inner.as_symbol().unwrap().name, "x");
        let _ = heap;
    }

    #[test]
    fn test_read_dotted_pair() {
        let (heap, v) = read_one("(1 . 2)");
        let pair = v.as_pair().unwrap();
        assert_eq!(pair.car.as_number().unwrap().value, 1.0);
        assert_eq!(pair.cdr.as_number().unwrap().value, 2.0);
        let _ = heap;
    }

    #[test]
    fn test_read_proper_list() {
        let (heap, v) = read_one("(1 2 3)");
        let p1 = v.as_pair().unwrap();
        assert_eq!(p1.car.as_number().unwrap().value, 1.0);
        let p2 = p1.cdr.as_pair().unwrap();
        assert_eq!(p2.car.as_number().unwrap().value, 2.0);
        let p3 = p2.cdr.as_pair().unwrap();
        assert_eq!(p3.car.as_number().unwrap().value, 3.0);
        assert!(p3.cdr.is_nil(heap.nil));
    }

    #[test]
    fn test_read_character_literal() {
        let (_heap, v) = read_one("#\\a");
        match v {
            Value::Char(c) => assert_eq!(c.value, 'a'),
            _ => panic!("expected a character"),
        }
        let (_heap, v) = read_one("#\\space");
        match v {
            Value::Char(c) => assert_eq!(c.value, ' '),
            _ => panic!("expected a character"),
        }
    }

    #[test]
    fn test_read_vector() {
        let (heap, v) = read_one("[1 2]");
        match v {
            Value::Vector(vec) => {
                assert_eq!(vec.elems.len(), 2);
                assert_eq!(vec.elems[0].as_number().unwrap().value, 1.0);
            }
            _ => panic!("expected a vector"),
        }
        let _ = heap;
    }

    #[test]
    fn test_read_map() {
        let (heap, v) = read_one("{a 1 b 2}");
        match v {
            Value::Map(m) => assert_eq!(m.table.len(), 2),
            _ => panic!("expected a map"),
        }
        let _ = heap;
    }

    #[test]
    fn test_bracket_is_not_swallowed_into_a_symbol() {
        let (heap, v) = read_one("[x]");
        match v {
            Value::Vector(vec) => {
                assert_eq!(vec.elems.len(), 1);
                assert_eq!(vec.elems[0].as_symbol().unwrap().name, "x");
            }
            _ => panic!("expected a vector"),
        }
        let _ = heap;
    }

    #[test]
    fn test_comment_is_skipped() {
        let (heap, v) = read_one("; a comment\n42");
        assert_eq!(v.as_number().unwrap().value, 42.0);
        let _ = heap;
    }
}
