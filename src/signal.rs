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

//! Construction helpers for the four kinds of signal a `Signal` object can
//! carry: an internal error, a user `(error ...)` call, a `(message ...)`
//! notice, and a `(throw ...)` non-local exit.
//!
//! Errors are propagated by value, not by `Result`: `eval`/`apply` check the
//! return of every sub-evaluation with [`is_exit`] and bail out early when
//! it's set, mirroring the `CHECK_ERROR` macro in
//! `original_source/signals.h`. This is deliberate — `catch`/`errset`/
//! `unwind-protect` are Lisp-level control flow that a caller can choose to
//! intercept, not a Rust-level failure the type system should force every
//! caller to handle.

pub use crate::object::{ErrorCode, Signal, SignalKind, SignalPtr};
use crate::heap::Heap;
use crate::object::Value;

/// The name of the global symbol every thrown error updates, mirroring
/// `throw_error`'s write to `*last-error*` in `original_source/signals.c`.
pub const LAST_ERROR_NAME: &str = "*last-error*";

/// True for a signal that should unwind the stack all the way out: an
/// internal error or a `throw`. Mirrors `IS_EXIT`.
pub fn is_exit(v: Value) -> bool {
    match v.as_signal_kind() {
        Some(SignalKind::Error) | Some(SignalKind::Throw) => true,
        _ => false,
    }
}

/// True only for an internal error signal. Mirrors `IS_ERROR`.
pub fn is_error(v: Value) -> bool {
    matches!(v.as_signal_kind(), Some(SignalKind::Error))
}

trait AsSignalKind {
    fn as_signal_kind(&self) -> Option<SignalKind>;
}

impl AsSignalKind for Value {
    fn as_signal_kind(&self) -> Option<SignalKind> {
        match *self {
            Value::Signal(s) => Some(s.kind),
            _ => None,
        }
    }
}

/// Build a raw signal object. Mirrors `new_signal`.
pub fn new_signal(heap: &mut Heap, kind: SignalKind, code: ErrorCode, data: Value, message: Value) -> SignalPtr {
    let mut s = heap.allocate_signal();
    s.kind = kind;
    s.code = code;
    s.data = data;
    s.message = message;
    s
}

/// Build and register an internal error, updating `*last-error*` the way
/// `throw_error` does. The message string itself (formatting the
/// human-readable text) is the caller's job, built with `printer::princ`
/// over `data` where useful — this just wraps it up as a `Signal` and files
/// it in `*last-error*`.
pub fn throw_error(heap: &mut Heap, code: ErrorCode, data: Value, message: StrArg) -> Value {
    let message_val = match message {
        StrArg::Owned(s) => {
            let mut sp = heap.allocate_str();
            sp.content = s;
            Value::Str(sp)
        }
        StrArg::Value(v) => v,
    };
    let error = new_signal(heap, SignalKind::Error, code, data, message_val);
    let last_error = new_signal(heap, SignalKind::UserError, code, data, message_val);
    let mut last_error_sym = heap.intern(LAST_ERROR_NAME);
    last_error_sym.value = Value::Signal(last_error);
    Value::Signal(error)
}

/// Either an owned `String` to be turned into a heap `Str`, or an
/// already-allocated `Value` (typically a `Str`) to use as-is.
pub enum StrArg {
    Owned(String),
    Value(Value),
}

impl From<&str> for StrArg {
    fn from(s: &str) -> StrArg {
        StrArg::Owned(s.to_string())
    }
}

impl From<String> for StrArg {
    fn from(s: String) -> StrArg {
        StrArg::Owned(s)
    }
}

/// Build a `(message ...)` notice: informational, doesn't unwind.
pub fn new_message(heap: &mut Heap, text: &str) -> Value {
    let mut sp = heap.allocate_str();
    sp.content = text.to_string();
    let sig = new_signal(heap, SignalKind::Message, ErrorCode::Intern, Value::Unbound, Value::Str(sp));
    Value::Signal(sig)
}

/// Build a `(throw tag value)` non-local exit.
pub fn new_throw(heap: &mut Heap, tag: Value, value: Value) -> Value {
    let sig = new_signal(heap, SignalKind::Throw, ErrorCode::Intern, tag, value);
    Value::Signal(sig)
}

/// Build a user-level `(error ...)` call's signal (doesn't touch
/// `*last-error*`; only genuine internal errors do, per
/// `original_source/signals.c`).
pub fn new_user_error(heap: &mut Heap, data: Value, message: &str) -> Value {
    let mut sp = heap.allocate_str();
    sp.content = message.to_string();
    let sig = new_signal(heap, SignalKind::UserError, ErrorCode::Intern, data, Value::Str(sp));
    Value::Signal(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throw_error_sets_last_error() {
        let mut heap = Heap::new();
        let result = throw_error(&mut heap, ErrorCode::NoList, Value::Unbound, "car of non-list".into());
        assert!(is_exit(result));
        assert!(is_error(result));
        let sym = heap.intern(LAST_ERROR_NAME);
        assert!(matches!(sym.value, Value::Signal(_)));
    }

    #[test]
    fn test_message_does_not_exit() {
        let mut heap = Heap::new();
        let msg = new_message(&mut heap, "hello");
        assert!(!is_exit(msg));
    }
}
