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

//! The heap-allocated object types and the `Value` union that refers to
//! them.
//!
//! Every object carries its own payload only; there is no generic object
//! header struct the way the C original has one (`type`, `size`, `next`,
//! mark bit, etc. packed into `struct Lobject`). The arena a `GcPtr<T>`
//! points into already encodes the type tag, and the arena's `BitVec`
//! already encodes the mark bit, so a Rust object only needs to carry the
//! fields particular to its type plus the rare per-instance flag (symbol
//! immutability; map weak-key-ness) that the original keeps in the shared
//! header.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::heap::{GcPtr, GcThing, IterGcThing, ToGcThing, Trace};

pub type SymbolPtr = GcPtr<Symbol>;
pub type PairPtr = GcPtr<Pair>;
pub type NumberPtr = GcPtr<Number>;
pub type StrPtr = GcPtr<Str>;
pub type CharPtr = GcPtr<CharObj>;
pub type PortPtr = GcPtr<Port>;
pub type VectorPtr = GcPtr<Vector>;
pub type MapPtr = GcPtr<Map>;
pub type StrBufPtr = GcPtr<StrBuf>;
pub type SignalPtr = GcPtr<Signal>;
pub type FunctionPtr = GcPtr<Function>;

/// The tagged union of every value a Lisp expression can evaluate to. Every
/// variant but `Unbound` carries a pointer into one of the heap's arenas.
///
/// `Unbound` plays double duty: it is the zero-initialized arena filler
/// (`Value::default()`) that a freshly allocated or just-swept slot holds
/// before anything writes a real value into it, *and* it is the sentinel a
/// symbol's `value`/`function` slot holds when that symbol has never been
/// bound. Evaluating a symbol whose slot is `Unbound` is exactly the
/// "undefined (null slot)" case spec'd as `ERR_EVAL`.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Value {
    Unbound,
    Symbol(SymbolPtr),
    Pair(PairPtr),
    Number(NumberPtr),
    Str(StrPtr),
    Char(CharPtr),
    Port(PortPtr),
    Vector(VectorPtr),
    Map(MapPtr),
    StrBuf(StrBufPtr),
    Signal(SignalPtr),
    Function(FunctionPtr),
}

impl Default for Value {
    fn default() -> Value {
        Value::Unbound
    }
}

impl Value {
    pub fn is_nil(&self, nil: SymbolPtr) -> bool {
        matches!(*self, Value::Symbol(s) if s == nil)
    }

    pub fn is_pair(&self) -> bool {
        matches!(*self, Value::Pair(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(*self, Value::Symbol(_))
    }

    pub fn is_unbound(&self) -> bool {
        matches!(*self, Value::Unbound)
    }

    pub fn as_pair(&self) -> Option<PairPtr> {
        match *self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<SymbolPtr> {
        match *self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<NumberPtr> {
        match *self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<StrPtr> {
        match *self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_gc_thing(&self) -> Option<GcThing> {
        match *self {
            Value::Unbound => None,
            Value::Symbol(p) => Some(GcThing::Symbol(p)),
            Value::Pair(p) => Some(GcThing::Pair(p)),
            Value::Number(p) => Some(GcThing::Number(p)),
            Value::Str(p) => Some(GcThing::Str(p)),
            Value::Char(p) => Some(GcThing::Char(p)),
            Value::Port(p) => Some(GcThing::Port(p)),
            Value::Vector(p) => Some(GcThing::Vector(p)),
            Value::Map(p) => Some(GcThing::Map(p)),
            Value::StrBuf(p) => Some(GcThing::StrBuf(p)),
            Value::Signal(p) => Some(GcThing::Signal(p)),
            Value::Function(p) => Some(GcThing::Function(p)),
        }
    }
}

impl ToGcThing for Value {
    fn to_gc_thing(&self) -> Option<GcThing> {
        Value::to_gc_thing(self)
    }
}

macro_rules! impl_to_gc_thing_for_ptr {
    ($ptr:ty, $variant:ident) => {
        impl ToGcThing for $ptr {
            fn to_gc_thing(&self) -> Option<GcThing> {
                Some(GcThing::$variant(*self))
            }
        }
    };
}

impl_to_gc_thing_for_ptr!(SymbolPtr, Symbol);
impl_to_gc_thing_for_ptr!(PairPtr, Pair);
impl_to_gc_thing_for_ptr!(NumberPtr, Number);
impl_to_gc_thing_for_ptr!(StrPtr, Str);
impl_to_gc_thing_for_ptr!(CharPtr, Char);
impl_to_gc_thing_for_ptr!(PortPtr, Port);
impl_to_gc_thing_for_ptr!(VectorPtr, Vector);
impl_to_gc_thing_for_ptr!(MapPtr, Map);
impl_to_gc_thing_for_ptr!(StrBufPtr, StrBuf);
impl_to_gc_thing_for_ptr!(SignalPtr, Signal);
impl_to_gc_thing_for_ptr!(FunctionPtr, Function);

impl ToGcThing for GcThing {
    fn to_gc_thing(&self) -> Option<GcThing> {
        Some(*self)
    }
}

fn one(thing: Option<GcThing>) -> IterGcThing {
    thing.into_iter().collect::<Vec<_>>().into_iter()
}

fn many(things: Vec<GcThing>) -> IterGcThing {
    things.into_iter()
}

// -- Symbol ---------------------------------------------------------------

/// An interned name, its global (dynamically-scoped) value and function
/// slots, and its property list. `nil` and `t` are ordinary symbols that
/// happen to be self-bound and marked immutable.
#[derive(Clone, Default)]
pub struct Symbol {
    pub name: String,
    pub value: Value,
    pub function: Value,
    pub props: Value,
    pub immutable: bool,
}

impl Trace for Symbol {
    fn trace(&self) -> IterGcThing {
        many(vec![self.value.to_gc_thing(), self.function.to_gc_thing(), self.props.to_gc_thing()]
            .into_iter()
            .flatten()
            .collect())
    }
}

// -- Pair -------------------------------------------------------------------

#[derive(Copy, Clone, Default)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

impl Trace for Pair {
    fn trace(&self) -> IterGcThing {
        many(
            vec![self.car.to_gc_thing(), self.cdr.to_gc_thing()]
                .into_iter()
                .flatten()
                .collect(),
        )
    }
}

// -- Number -----------------------------------------------------------------

/// A single numeric type carrying a flag for whether it should print and
/// behave as an integer. Coercion rules between the two live in
/// `builtins.rs`, out of scope for this module.
#[derive(Copy, Clone, Default, PartialEq)]
pub struct Number {
    pub value: f64,
    pub is_int: bool,
}

impl Trace for Number {
    fn trace(&self) -> IterGcThing {
        one(None)
    }
}

// -- Str ----------------------------------------------------------------

/// An immutable string object. `eql` compares these by content, not
/// identity (spec.md §3's `eq_is_eqv` bit).
#[derive(Clone, Default, PartialEq)]
pub struct Str {
    pub content: String,
}

impl Trace for Str {
    fn trace(&self) -> IterGcThing {
        one(None)
    }
}

// -- Char -------------------------------------------------------------------

#[derive(Copy, Clone, Default, PartialEq)]
pub struct CharObj {
    pub value: char,
}

impl Trace for CharObj {
    fn trace(&self) -> IterGcThing {
        one(None)
    }
}

// -- Port ---------------------------------------------------------------

#[derive(Clone)]
pub enum PortKind {
    Stdin,
    Stdout,
    Stderr,
    StringOut(String),
    StringIn { data: Vec<char>, pos: usize },
}

impl Default for PortKind {
    fn default() -> PortKind {
        PortKind::StringOut(String::new())
    }
}

#[derive(Clone, Default)]
pub struct Port {
    pub name: String,
    pub kind: PortKind,
    pub readable: bool,
    pub writable: bool,
    pub closed: bool,
    pub pushback: Option<char>,
}

impl Trace for Port {
    fn trace(&self) -> IterGcThing {
        one(None)
    }
}

// -- Vector -------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Vector {
    pub elems: Vec<Value>,
}

impl Trace for Vector {
    fn trace(&self) -> IterGcThing {
        many(self.elems.iter().filter_map(|v| v.to_gc_thing()).collect())
    }
}

// -- Map ------------------------------------------------------------------

/// A key wrapper giving `HashMap` `eql`-based equality and hashing instead
/// of the derived identity-based ones `GcPtr` provides.
#[derive(Clone, Copy)]
pub struct MapKey(pub Value);

impl PartialEq for MapKey {
    fn eq(&self, other: &MapKey) -> bool {
        eql(self.0, other.0)
    }
}
impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

#[derive(Clone, Default)]
pub struct Map {
    pub table: HashMap<MapKey, Value>,
    /// Accepted and stored, per spec.md §5's Non-goals, but not honored:
    /// `trace` below always walks through every key regardless of this
    /// flag, matching what the original actually does despite documenting
    /// weak-key semantics.
    pub weak_keys: bool,
}

impl Trace for Map {
    fn trace(&self) -> IterGcThing {
        let mut things = vec![];
        for (k, v) in self.table.iter() {
            if let Some(g) = k.0.to_gc_thing() {
                things.push(g);
            }
            if let Some(g) = v.to_gc_thing() {
                things.push(g);
            }
        }
        many(things)
    }
}

// -- StrBuf -------------------------------------------------------------

/// A mutable, growable string, distinct from the immutable `Str`.
#[derive(Clone, Default)]
pub struct StrBuf {
    pub buf: String,
}

impl Trace for StrBuf {
    fn trace(&self) -> IterGcThing {
        one(None)
    }
}

// -- Signal -----------------------------------------------------------------

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SignalKind {
    Error,
    UserError,
    Message,
    Throw,
}

impl Default for SignalKind {
    fn default() -> SignalKind {
        SignalKind::Message
    }
}

/// Mirrors the `ERR_*` catalog of `original_source/signals.h`, in the same
/// order.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorCode {
    RSyntax,
    ReadEof,
    Eval,
    NoFunc,
    NoArgs,
    NoList,
    NoSymbol,
    InvArg,
    System,
    ClPort,
    Intern,
    Memory,
    Io,
    LetArgs,
    Immutbl,
    NoAutol,
}

impl Default for ErrorCode {
    fn default() -> ErrorCode {
        ErrorCode::Intern
    }
}

impl ErrorCode {
    /// Mirrors `error_string` in `original_source/signals.c`.
    pub fn message(&self) -> &'static str {
        match *self {
            ErrorCode::RSyntax => "reader syntax error",
            ErrorCode::ReadEof => "preliminary EOF in reader",
            ErrorCode::Eval => "eval error",
            ErrorCode::NoFunc => "not a function",
            ErrorCode::NoArgs => "invalid argument count",
            ErrorCode::NoList => "list operation on non-list",
            ErrorCode::NoSymbol => "not a symbol",
            ErrorCode::InvArg => "invalid argument",
            ErrorCode::System => "system call error",
            ErrorCode::ClPort => "port is not open",
            ErrorCode::Intern => "internal error",
            ErrorCode::Memory => "unexpected memory shortage",
            ErrorCode::Io => "I/O error",
            ErrorCode::LetArgs => "invalid let arguments list",
            ErrorCode::Immutbl => "object is immutable",
            ErrorCode::NoAutol => "autoload failed to define function",
        }
    }

    /// The bare `ERR_*` macro suffix from `original_source/signals.h`,
    /// used as the `CODE` field of the `#<sig-KIND:CODE,MESSAGE>` printer
    /// grammar (spec.md §4.4).
    pub fn code_name(&self) -> &'static str {
        match *self {
            ErrorCode::RSyntax => "RSYNTAX",
            ErrorCode::ReadEof => "READEOF",
            ErrorCode::Eval => "EVAL",
            ErrorCode::NoFunc => "NOFUNC",
            ErrorCode::NoArgs => "NOARGS",
            ErrorCode::NoList => "NOLIST",
            ErrorCode::NoSymbol => "NOSYMBOL",
            ErrorCode::InvArg => "INVARG",
            ErrorCode::System => "SYSTEM",
            ErrorCode::ClPort => "CLPORT",
            ErrorCode::Intern => "INTERN",
            ErrorCode::Memory => "MEMORY",
            ErrorCode::Io => "IO",
            ErrorCode::LetArgs => "LETARGS",
            ErrorCode::Immutbl => "IMMUTBL",
            ErrorCode::NoAutol => "NOAUTOL",
        }
    }
}

/// A condition in flight: an error, a user `(error ...)`, a `(message ...)`
/// notice, or a `(throw ...)` non-local exit. Checked for after every
/// evaluation step rather than threaded through Rust's `Result`, since
/// `catch`/`unwind-protect`/`errset` semantics are Lisp-level control flow,
/// not Rust error propagation.
#[derive(Copy, Clone, Default)]
pub struct Signal {
    pub kind: SignalKind,
    pub code: ErrorCode,
    pub data: Value,
    pub message: Value,
}

impl Trace for Signal {
    fn trace(&self) -> IterGcThing {
        many(
            vec![self.data.to_gc_thing(), self.message.to_gc_thing()]
                .into_iter()
                .flatten()
                .collect(),
        )
    }
}

// -- Function -----------------------------------------------------------

pub type BuiltinFn = fn(&mut crate::interp::Interpreter, Value, &mut crate::session::Session) -> Value;

#[derive(Clone)]
pub enum FunctionKind {
    /// A Rust-native builtin. `is_special` on the owning `Function`
    /// decides whether it receives its argument list raw or pre-evaluated.
    Builtin(BuiltinFn),
    /// A `(lambda params . body)` closure: the formal parameter list
    /// (possibly dotted, for a rest parameter) and the body forms.
    /// Dynamic scoping means there is no captured environment to carry
    /// alongside it — free variables in the body resolve against whatever
    /// is dynamically bound at call time.
    Form { params: Value, body: Value },
    /// Not yet loaded; `autoload` replaces this with the real definition
    /// the first time it's called, per spec.md §4.3.
    Autoload(String),
}

impl Default for FunctionKind {
    fn default() -> FunctionKind {
        FunctionKind::Autoload(String::new())
    }
}

#[derive(Clone, Default)]
pub struct Function {
    pub name: Option<String>,
    pub minargs: i32,
    /// -1 means unbounded.
    pub maxargs: i32,
    pub is_special: bool,
    pub kind: FunctionKind,
    /// Set by `(trace-function name)`: when true, every call to this
    /// function prints its own entry/exit trace line even if the global
    /// `-t`/`(trace)` flag is off. Per-function override, spec.md §3/§4.3.
    pub trace: bool,
}

impl Trace for Function {
    fn trace(&self) -> IterGcThing {
        match self.kind {
            FunctionKind::Form { params, body } => many(
                vec![params.to_gc_thing(), body.to_gc_thing()]
                    .into_iter()
                    .flatten()
                    .collect(),
            ),
            _ => one(None),
        }
    }
}

// -- structural equality (`eql`) -----------------------------------------

/// `eq`-or-value equality: identity for most types, but content equality
/// for `Number` and `Str`, per spec.md §3's `eq_is_eqv` bit.
pub fn eql(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Unbound, Value::Unbound) => true,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Pair(x), Value::Pair(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.is_int == y.is_int && x.value == y.value,
        (Value::Str(x), Value::Str(y)) => x.content == y.content,
        (Value::Char(x), Value::Char(y)) => x.value == y.value,
        (Value::Port(x), Value::Port(y)) => x == y,
        (Value::Vector(x), Value::Vector(y)) => x == y,
        (Value::Map(x), Value::Map(y)) => x == y,
        (Value::StrBuf(x), Value::StrBuf(y)) => x == y,
        (Value::Signal(x), Value::Signal(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => x == y,
        _ => false,
    }
}

fn hash_value<H: Hasher>(v: &Value, state: &mut H) {
    match *v {
        Value::Unbound => 0u8.hash(state),
        Value::Symbol(p) => p.hash(state),
        Value::Pair(p) => p.hash(state),
        Value::Number(p) => {
            p.value.to_bits().hash(state);
            p.is_int.hash(state);
        }
        Value::Str(p) => p.content.hash(state),
        Value::Char(p) => p.value.hash(state),
        Value::Port(p) => p.hash(state),
        Value::Vector(p) => p.hash(state),
        Value::Map(p) => p.hash(state),
        Value::StrBuf(p) => p.hash(state),
        Value::Signal(p) => p.hash(state),
        Value::Function(p) => p.hash(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn test_eql_numbers_by_value() {
        let mut heap = Heap::new();
        let mut a = heap.allocate_number();
        a.value = 1.0;
        a.is_int = true;
        let mut b = heap.allocate_number();
        b.value = 1.0;
        b.is_int = true;
        assert!(eql(Value::Number(a), Value::Number(b)));
    }

    #[test]
    fn test_eql_pairs_by_identity() {
        let mut heap = Heap::new();
        let a = heap.allocate_pair();
        let b = heap.allocate_pair();
        assert!(!eql(Value::Pair(a), Value::Pair(b)));
        assert!(eql(Value::Pair(a), Value::Pair(a)));
    }

    #[test]
    fn test_value_default_is_unbound() {
        assert!(Value::default().is_unbound());
    }
}
