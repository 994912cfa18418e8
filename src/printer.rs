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

//! Turning `Value`s back into text: `princ` (human-readable, no quoting),
//! `prin1` (read syntax — a `prin1`'d string round-trips through the
//! reader), and `describe` (an object's header fields plus one level of
//! its symbol slots). Grounded on `original_source/printer.c`'s
//! `s_*`/`to_string`/`describe_ob` family; the original's raw hex dump
//! (`xdump.c`) has no Rust-heap equivalent and is dropped, per spec.md §1.

use std::fmt::Write as _;

use crate::heap::Heap;
use crate::object::{FunctionKind, PortKind, SignalKind, Value};

/// Whether to print in human-readable (`princ`) or read (`prin1`) style.
/// Mirrors the `PRINT`/`READ` flags of `original_source/printer.c`,
/// generalized to an enum since the two are mutually exclusive in this
/// crate (the original's `BRIEF` flag becomes `describe`'s separate
/// function rather than a third style bit here).
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Style {
    Princ,
    Prin1,
}

/// Formats `v` as `princ` would: strings and characters print their raw
/// content, with no quoting or escaping.
pub fn princ(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    write_value(heap, v, Style::Princ, &mut out);
    out
}

/// Formats `v` as `prin1` would: the result reads back as the same value.
pub fn prin1(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    write_value(heap, v, Style::Prin1, &mut out);
    out
}

fn write_value(heap: &Heap, v: Value, style: Style, out: &mut String) {
    match v {
        Value::Unbound => out.push_str("#<unbound>"),
        Value::Symbol(s) => out.push_str(&s.name),
        Value::Pair(_) => write_list(heap, v, style, out),
        Value::Number(n) => {
            if n.is_int {
                let _ = write!(out, "{}", n.value as i64);
            } else {
                let _ = write!(out, "{}", n.value);
            }
        }
        Value::Str(s) => {
            if style == Style::Prin1 {
                out.push('"');
                for c in s.content.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            } else {
                out.push_str(&s.content);
            }
        }
        Value::Char(c) => {
            if style == Style::Prin1 {
                out.push_str("#\\");
                match c.value {
                    ' ' => out.push_str("space"),
                    '\n' => out.push_str("newline"),
                    '\t' => out.push_str("tab"),
                    '\r' => out.push_str("return"),
                    other => out.push(other),
                }
            } else {
                out.push(c.value);
            }
        }
        Value::Port(p) => {
            let kind = match p.kind {
                PortKind::Stdin => "stdin",
                PortKind::Stdout => "stdout",
                PortKind::Stderr => "stderr",
                PortKind::StringOut(_) => "string-output",
                PortKind::StringIn { .. } => "string-input",
            };
            let _ = write!(out, "#<port {} {}>", kind, p.name);
        }
        Value::Vector(vec) => {
            out.push('[');
            for (i, e) in vec.elems.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(heap, *e, style, out);
            }
            out.push(']');
        }
        Value::Map(m) => {
            out.push('{');
            let mut first = true;
            for (k, v) in m.table.iter() {
                if !first {
                    out.push(' ');
                }
                first = false;
                write_value(heap, k.0, style, out);
                out.push(' ');
                write_value(heap, *v, style, out);
            }
            out.push('}');
        }
        Value::StrBuf(b) => {
            if style == Style::Prin1 {
                let _ = write!(out, "#<strbuf \"{}\">", b.buf);
            } else {
                out.push_str(&b.buf);
            }
        }
        Value::Signal(sig) => {
            // `#<sig-KIND:CODE,MESSAGE>`, per spec.md §4.4. Distinct from
            // `print_error`'s "Error: ..." rendering below, which is what
            // `errset`/the REPL/file loader show for an escaped error.
            let kind = match sig.kind {
                SignalKind::Error => "ERROR",
                SignalKind::UserError => "USER-ERROR",
                SignalKind::Message => "MESSAGE",
                SignalKind::Throw => "THROW",
            };
            let _ = write!(out, "#<sig-{}:{},", kind, sig.code.code_name());
            write_value(heap, sig.message, Style::Princ, out);
            if !matches!(sig.data, Value::Unbound) {
                out.push(',');
                write_value(heap, sig.data, Style::Princ, out);
            }
            out.push('>');
        }
        Value::Function(f) => {
            let name = f.name.clone().unwrap_or_else(|| "anonymous".to_string());
            match f.kind {
                FunctionKind::Builtin(_) => {
                    let _ = write!(out, "#<builtin {}>", name);
                }
                FunctionKind::Form { .. } => {
                    let _ = write!(out, "#<function {}>", name);
                }
                FunctionKind::Autoload(ref file) => {
                    let _ = write!(out, "#<autoload {} from {}>", name, file);
                }
            }
        }
    }
}

fn write_list(heap: &Heap, v: Value, style: Style, out: &mut String) {
    out.push('(');
    let mut cur = v;
    let mut first = true;
    loop {
        match cur {
            Value::Pair(p) => {
                if !first {
                    out.push(' ');
                }
                first = false;
                write_value(heap, p.car, style, out);
                cur = p.cdr;
            }
            Value::Symbol(s) if s == heap.nil => break,
            other => {
                out.push_str(" . ");
                write_value(heap, other, style, out);
                break;
            }
        }
    }
    out.push(')');
}

/// Renders an error signal the way `print_error` does in
/// `original_source/signals.c`: `"Error: " + code.message() + "; " +
/// message [+ ": " + data]`. Distinct from the `#<sig-KIND:CODE,MESSAGE>`
/// literal `write_value` produces for a signal encountered as an ordinary
/// value — this is what `errset`, the REPL, and file loading show for an
/// error that actually escaped.
pub fn print_error(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    match v {
        Value::Signal(sig) => {
            out.push_str("Error: ");
            out.push_str(sig.code.message());
            out.push_str("; ");
            out.push_str(&princ(heap, sig.message));
            if !matches!(sig.data, Value::Unbound) {
                out.push_str(": ");
                out.push_str(&princ(heap, sig.data));
            }
        }
        other => out.push_str(&princ(heap, other)),
    }
    out
}

/// Describes an object's header fields — type, and the mark/immutable bits
/// that matter for this crate's encoding — and recurses one level into a
/// symbol's value/function/props slots. Mirrors `describe_ob`/`describe` in
/// `original_source/printer.c`, minus the raw hex dump (`xdump`), which has
/// no counterpart in a Rust heap.
pub fn describe(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    match v {
        Value::Symbol(s) => {
            let _ = writeln!(out, "SYMBOL \"{}\" [immutable={}]", s.name, s.immutable);
            let _ = write!(out, "  value:    ");
            out.push_str(&prin1(heap, s.value));
            out.push('\n');
            let _ = write!(out, "  function: ");
            out.push_str(&prin1(heap, s.function));
            out.push('\n');
            let _ = write!(out, "  props:    ");
            out.push_str(&prin1(heap, s.props));
            out.push('\n');
        }
        Value::Pair(p) => {
            let _ = writeln!(out, "PAIR");
            let _ = write!(out, "  car: ");
            out.push_str(&prin1(heap, p.car));
            out.push('\n');
            let _ = write!(out, "  cdr: ");
            out.push_str(&prin1(heap, p.cdr));
            out.push('\n');
        }
        Value::Number(n) => {
            let _ = writeln!(out, "NUMBER {} [is_int={}]", n.value, n.is_int);
        }
        Value::Str(s) => {
            let _ = writeln!(out, "STRING \"{}\" [len={}]", s.content, s.content.chars().count());
        }
        Value::Char(c) => {
            let _ = writeln!(out, "CHAR {:?}", c.value);
        }
        Value::Vector(vec) => {
            let _ = writeln!(out, "VECTOR [len={}]", vec.elems.len());
        }
        Value::Map(m) => {
            let _ = writeln!(out, "MAP [len={}, weak_keys={}]", m.table.len(), m.weak_keys);
        }
        Value::StrBuf(b) => {
            let _ = writeln!(out, "STRBUF [len={}]", b.buf.chars().count());
        }
        Value::Port(p) => {
            let _ = writeln!(out, "PORT \"{}\" [closed={}]", p.name, p.closed);
        }
        Value::Signal(sig) => {
            let _ = writeln!(out, "SIGNAL {:?} code={:?}", sig.kind, sig.code);
        }
        Value::Function(f) => {
            let _ = writeln!(
                out,
                "FUNCTION {:?} [minargs={} maxargs={} special={}]",
                f.name, f.minargs, f.maxargs, f.is_special
            );
        }
        Value::Unbound => {
            let _ = writeln!(out, "UNBOUND");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn test_princ_string_has_no_quotes() {
        let mut heap = Heap::new();
        let mut s = heap.allocate_str();
        s.content = "hi".to_string();
        assert_eq!(princ(&heap, Value::Str(s)), "hi");
    }

    #[test]
    fn test_prin1_string_is_quoted_and_escaped() {
        let mut heap = Heap::new();
        let mut s = heap.allocate_str();
        s.content = "a\"b".to_string();
        assert_eq!(prin1(&heap, Value::Str(s)), "\"a\\\"b\"");
    }

    #[test]
    fn test_prin1_list() {
        let mut heap = Heap::new();
        let mut p2 = heap.allocate_pair();
        p2.car = Value::Symbol(heap.intern("b"));
        p2.cdr = Value::Symbol(heap.nil);
        let mut p1 = heap.allocate_pair();
        p1.car = Value::Symbol(heap.intern("a"));
        p1.cdr = Value::Pair(p2);
        assert_eq!(prin1(&heap, Value::Pair(p1)), "(a b)");
    }

    #[test]
    fn test_prin1_dotted_pair() {
        let mut heap = Heap::new();
        let mut p = heap.allocate_pair();
        p.car = Value::Symbol(heap.intern("a"));
        p.cdr = Value::Symbol(heap.intern("b"));
        assert_eq!(prin1(&heap, Value::Pair(p)), "(a . b)");
    }

    #[test]
    fn test_describe_symbol_recurses_one_level() {
        let mut heap = Heap::new();
        let mut sym = heap.intern("x");
        sym.value = Value::Symbol(heap.nil);
        let desc = describe(&heap, Value::Symbol(sym));
        assert!(desc.contains("SYMBOL \"x\""));
        assert!(desc.contains("value:"));
    }
}
