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

//! Memory management for the interpreter.
//!
//! Every Lisp value that needs to outlive a single expression is allocated
//! from an `Arena`: a pre-allocated object pool plus a free list of unused
//! slot indices. Allocating pops an index off the free list; if every arena
//! of that type is full, a fresh one is pushed onto the type's `ArenaSet`.
//! Objects never move once allocated, so a `GcPtr` stays valid for the
//! arena's lifetime.
//!
//! Collection is mark-and-sweep. Marking starts from the root set (the
//! symbol table, every live `Rooted<T>`, and whatever extra roots the
//! caller supplies for in-flight evaluator state) and walks the `Trace`
//! graph. Sweeping rebuilds each arena's free list from the complement of
//! the marked set and clears the marks for the next cycle.
//!
//! A Rust local holding a bare `GcPtr<T>`/`Value` across a call that may
//! allocate is a dangling-pointer bug waiting to happen, since the
//! collector has no way to see a plain local. `Rooted<T>` is the fix: it
//! adds its referent to the heap's explicit root list on construction and
//! removes it again on drop, so a collection in between still sees the
//! referent as reachable. This is precise rooting through an explicit,
//! session-owned root list rather than scanning the machine stack for
//! interior pointers.

use std::cmp;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::vec::IntoIter;

use bit_vec::BitVec;

use crate::object::{
    CharObj, CharPtr, Function, FunctionPtr, Map, MapPtr, Number, NumberPtr, Pair, PairPtr, Port,
    PortPtr, Signal, SignalPtr, Str, StrBuf, StrBufPtr, StrPtr, Symbol, SymbolPtr, Value, Vector,
    VectorPtr,
};

/// Allocations tolerated between collections. Mirrors `GC_OBJ_COUNT` from
/// the original's `tunables.h`.
pub const DEFAULT_GC_THRESHOLD: usize = 10_000;

/// Objects of each type per arena.
pub const DEFAULT_ARENA_CAPACITY: usize = 1 << 10;

/// Types that need type-specific cleanup before their storage is reused.
/// Most have nothing to do; ports and containers release what they hold so
/// a reused slot doesn't keep the old value's heap allocations alive.
pub trait Finalize {
    fn finalize(&mut self) {}
}

impl Finalize for Symbol {}
impl Finalize for Pair {}
impl Finalize for Number {}
impl Finalize for Str {}
impl Finalize for CharObj {}
impl Finalize for Function {}
impl Finalize for Signal {}

impl Finalize for Port {
    fn finalize(&mut self) {
        self.closed = true;
    }
}

impl Finalize for Vector {
    fn finalize(&mut self) {
        self.elems.clear();
    }
}

impl Finalize for Map {
    fn finalize(&mut self) {
        self.table.clear();
    }
}

impl Finalize for StrBuf {
    fn finalize(&mut self) {
        self.buf.clear();
    }
}

/// An arena from which `T` instances are allocated.
pub struct Arena<T> {
    pool: Vec<T>,
    /// Indices into `pool` available for allocation.
    free: Vec<usize>,
    /// Bit `n` is set while the nth slot is known reachable this cycle.
    marked: BitVec,
}

impl<T: Default + Finalize> Arena<T> {
    pub fn new(capacity: usize) -> Box<Arena<T>> {
        assert!(capacity > 0);
        let mut pool = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            pool.push(T::default());
        }
        Box::new(Arena {
            pool,
            free: (0..capacity).collect(),
            marked: BitVec::from_elem(capacity, false),
        })
    }

    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == self.capacity()
    }

    pub fn allocate(&mut self) -> GcPtr<T> {
        let idx = self
            .free
            .pop()
            .expect("Arena::allocate called on a full arena");
        let self_ptr: *mut Arena<T> = self;
        GcPtr::new(self_ptr, idx)
    }

    /// Reclaim every unmarked slot and reset the marks for the next cycle.
    pub fn sweep(&mut self) {
        let capacity = self.capacity();
        for i in 0..capacity {
            if !self.marked[i] {
                self.pool[i].finalize();
                self.pool[i] = T::default();
            }
        }
        self.free = (0..capacity).filter(|&n| !self.marked[n]).collect();
        self.marked.clear();
        self.marked.grow(capacity, false);
    }
}

/// A set of same-typed arenas, grown on demand and shrunk after a sweep
/// leaves one completely empty.
pub struct ArenaSet<T> {
    capacity: usize,
    arenas: Vec<Box<Arena<T>>>,
}

impl<T: Default + Finalize> ArenaSet<T> {
    pub fn new(capacity: usize) -> ArenaSet<T> {
        ArenaSet {
            capacity,
            arenas: vec![],
        }
    }

    pub fn sweep(&mut self) {
        for arena in self.arenas.iter_mut() {
            arena.sweep();
        }
        self.arenas.retain(|a| !a.is_empty());
    }

    pub fn allocate(&mut self) -> GcPtr<T> {
        for arena in self.arenas.iter_mut() {
            if !arena.is_full() {
                return arena.allocate();
            }
        }
        let mut new_arena = Arena::new(self.capacity);
        let result = new_arena.allocate();
        self.arenas.push(new_arena);
        result
    }
}

/// A pointer to a `T` instance inside one of its type's arenas.
pub struct GcPtr<T> {
    arena: *mut Arena<T>,
    index: usize,
}

impl<T> Clone for GcPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for GcPtr<T> {}

impl<T: Default + Finalize> GcPtr<T> {
    fn new(arena: *mut Arena<T>, index: usize) -> GcPtr<T> {
        unsafe {
            let arena_ref = arena
                .as_ref()
                .expect("GcPtr::new should always be given a live Arena");
            assert!(index < arena_ref.capacity());
        }
        GcPtr { arena, index }
    }

    /// Mark this pointer's referent reachable for the current collection.
    pub(crate) fn mark(&self) {
        unsafe {
            let arena = self
                .arena
                .as_mut()
                .expect("GcPtr should always have a live Arena");
            arena.marked.set(self.index, true);
        }
    }

    pub(crate) fn is_marked(&self) -> bool {
        unsafe {
            let arena = self
                .arena
                .as_ref()
                .expect("GcPtr should always have a live Arena");
            arena.marked[self.index]
        }
    }
}

impl<T: Default + Finalize> Deref for GcPtr<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe {
            let arena = self
                .arena
                .as_ref()
                .expect("GcPtr::deref should always have a live Arena");
            &arena.pool[self.index]
        }
    }
}

impl<T: Default + Finalize> DerefMut for GcPtr<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe {
            let arena = self
                .arena
                .as_mut()
                .expect("GcPtr::deref_mut should always have a live Arena");
            &mut arena.pool[self.index]
        }
    }
}

impl<T> fmt::Debug for GcPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GcPtr({:p}, {})", self.arena, self.index)
    }
}

/// Identity comparison (Lisp `eq`), not structural comparison. Structural
/// comparison for the types that want it (`eql`) lives in `object::eql`.
impl<T> cmp::PartialEq for GcPtr<T> {
    fn eq(&self, other: &GcPtr<T>) -> bool {
        self.index == other.index && self.arena == other.arena
    }
}
impl<T> cmp::Eq for GcPtr<T> {}

impl<T> Hash for GcPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.arena as usize).hash(state);
        self.index.hash(state);
    }
}

/// Coerces a reference-bearing value to the `GcThing` that represents it to
/// the collector, or `None` if it refers to nothing heap-allocated.
pub trait ToGcThing {
    fn to_gc_thing(&self) -> Option<GcThing>;
}

/// A smart pointer that roots its referent for as long as it is in scope.
/// See the module documentation for why this matters.
pub struct Rooted<T> {
    heap: *mut Heap,
    ptr: T,
}

impl<T: ToGcThing + Copy> Rooted<T> {
    pub fn new(heap: &mut Heap, ptr: T) -> Rooted<T> {
        let mut r = Rooted { heap, ptr };
        r.add_root();
        r
    }

    /// The wrapped value, detached from this particular rooting (e.g. to
    /// store into a container whose own reachability will keep it alive).
    pub fn get(&self) -> T {
        self.ptr
    }

    fn add_root(&mut self) {
        if let Some(thing) = self.ptr.to_gc_thing() {
            unsafe {
                let heap = self
                    .heap
                    .as_mut()
                    .expect("Rooted should always have a live Heap");
                heap.add_root(thing);
            }
        }
    }

    fn drop_root(&mut self) {
        if let Some(thing) = self.ptr.to_gc_thing() {
            unsafe {
                let heap = self
                    .heap
                    .as_mut()
                    .expect("Rooted should always have a live Heap");
                heap.drop_root(thing);
            }
        }
    }
}

impl<T> Deref for Rooted<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.ptr
    }
}

impl<T> DerefMut for Rooted<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.ptr
    }
}

impl<T: ToGcThing + Copy> Drop for Rooted<T> {
    fn drop(&mut self) {
        self.drop_root();
    }
}

impl<T: ToGcThing + Copy> Clone for Rooted<T> {
    fn clone(&self) -> Self {
        unsafe {
            let heap = self
                .heap
                .as_mut()
                .expect("Rooted::clone should always have a live Heap");
            Rooted::new(heap, self.ptr)
        }
    }
}

/// An iterable of the `GcThing`s one object refers to.
pub type IterGcThing = IntoIter<GcThing>;

/// Implemented by every GC participant to tell the collector what it holds
/// references to.
pub trait Trace {
    fn trace(&self) -> IterGcThing;
}

/// The union of every heap-allocated Lisp object type, used by the
/// collector to mark and sweep without needing to know about `Value`'s own
/// encoding.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum GcThing {
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

impl GcThing {
    fn mark(&self) {
        match *self {
            GcThing::Symbol(p) => p.mark(),
            GcThing::Pair(p) => p.mark(),
            GcThing::Number(p) => p.mark(),
            GcThing::Str(p) => p.mark(),
            GcThing::Char(p) => p.mark(),
            GcThing::Port(p) => p.mark(),
            GcThing::Vector(p) => p.mark(),
            GcThing::Map(p) => p.mark(),
            GcThing::StrBuf(p) => p.mark(),
            GcThing::Signal(p) => p.mark(),
            GcThing::Function(p) => p.mark(),
        }
    }

    fn is_marked(&self) -> bool {
        match *self {
            GcThing::Symbol(p) => p.is_marked(),
            GcThing::Pair(p) => p.is_marked(),
            GcThing::Number(p) => p.is_marked(),
            GcThing::Str(p) => p.is_marked(),
            GcThing::Char(p) => p.is_marked(),
            GcThing::Port(p) => p.is_marked(),
            GcThing::Vector(p) => p.is_marked(),
            GcThing::Map(p) => p.is_marked(),
            GcThing::StrBuf(p) => p.is_marked(),
            GcThing::Signal(p) => p.is_marked(),
            GcThing::Function(p) => p.is_marked(),
        }
    }

    fn trace(&self) -> IterGcThing {
        match *self {
            GcThing::Symbol(p) => p.trace(),
            GcThing::Pair(p) => p.trace(),
            GcThing::Number(p) => p.trace(),
            GcThing::Str(p) => p.trace(),
            GcThing::Char(p) => p.trace(),
            GcThing::Port(p) => p.trace(),
            GcThing::Vector(p) => p.trace(),
            GcThing::Map(p) => p.trace(),
            GcThing::StrBuf(p) => p.trace(),
            GcThing::Signal(p) => p.trace(),
            GcThing::Function(p) => p.trace(),
        }
    }
}

/// The heap: every arena, the symbol table, the two self-bound singleton
/// symbols, and the explicit GC root list.
pub struct Heap {
    symbols: ArenaSet<Symbol>,
    pairs: ArenaSet<Pair>,
    numbers: ArenaSet<Number>,
    strs: ArenaSet<Str>,
    chars: ArenaSet<CharObj>,
    ports: ArenaSet<Port>,
    vectors: ArenaSet<Vector>,
    maps: ArenaSet<Map>,
    strbufs: ArenaSet<StrBuf>,
    signals: ArenaSet<Signal>,
    functions: ArenaSet<Function>,

    symbol_table: HashMap<String, SymbolPtr>,

    /// The unique empty-list / false value. Self-bound, immutable.
    pub nil: SymbolPtr,
    /// The canonical true value. Self-bound, immutable.
    pub t: SymbolPtr,

    /// Explicit GC roots with reference counts, so rooting the same thing
    /// through two different `Rooted`s doesn't unroot it prematurely.
    roots: Vec<(GcThing, usize)>,

    allocations: usize,
    allocations_threshold: usize,
    /// Lifetime count of allocations, never reset by a collection. Backs
    /// the `measure` special form's `objects` counter.
    total_allocations: u64,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::with_capacity(DEFAULT_ARENA_CAPACITY, DEFAULT_GC_THRESHOLD)
    }

    pub fn with_capacity(arena_capacity: usize, gc_threshold: usize) -> Heap {
        let mut symbols = ArenaSet::new(arena_capacity);
        let mut nil = symbols.allocate();
        nil.name = "nil".to_string();
        nil.immutable = true;
        let mut t = symbols.allocate();
        t.name = "t".to_string();
        t.immutable = true;

        let mut heap = Heap {
            symbols,
            pairs: ArenaSet::new(arena_capacity),
            numbers: ArenaSet::new(arena_capacity),
            strs: ArenaSet::new(arena_capacity),
            chars: ArenaSet::new(arena_capacity),
            ports: ArenaSet::new(arena_capacity),
            vectors: ArenaSet::new(arena_capacity),
            maps: ArenaSet::new(arena_capacity),
            strbufs: ArenaSet::new(arena_capacity),
            signals: ArenaSet::new(arena_capacity),
            functions: ArenaSet::new(arena_capacity),

            symbol_table: HashMap::new(),
            nil,
            t,
            roots: vec![],
            allocations: 0,
            allocations_threshold: gc_threshold,
            total_allocations: 0,
        };

        heap.nil.value = Value::Symbol(heap.nil);
        heap.t.value = Value::Symbol(heap.t);
        heap.symbol_table.insert("nil".to_string(), heap.nil);
        heap.symbol_table.insert("t".to_string(), heap.t);

        heap
    }

    pub fn allocate_symbol(&mut self) -> SymbolPtr {
        self.on_allocation();
        self.symbols.allocate()
    }

    pub fn allocate_pair(&mut self) -> PairPtr {
        self.on_allocation();
        self.pairs.allocate()
    }

    pub fn allocate_number(&mut self) -> NumberPtr {
        self.on_allocation();
        self.numbers.allocate()
    }

    pub fn allocate_str(&mut self) -> StrPtr {
        self.on_allocation();
        self.strs.allocate()
    }

    pub fn allocate_char(&mut self) -> CharPtr {
        self.on_allocation();
        self.chars.allocate()
    }

    pub fn allocate_port(&mut self) -> PortPtr {
        self.on_allocation();
        self.ports.allocate()
    }

    pub fn allocate_vector(&mut self) -> VectorPtr {
        self.on_allocation();
        self.vectors.allocate()
    }

    pub fn allocate_map(&mut self) -> MapPtr {
        self.on_allocation();
        self.maps.allocate()
    }

    pub fn allocate_strbuf(&mut self) -> StrBufPtr {
        self.on_allocation();
        self.strbufs.allocate()
    }

    pub fn allocate_signal(&mut self) -> SignalPtr {
        self.on_allocation();
        self.signals.allocate()
    }

    pub fn allocate_function(&mut self) -> FunctionPtr {
        self.on_allocation();
        self.functions.allocate()
    }

    /// Look up or create the interned symbol with the given name.
    pub fn intern(&mut self, name: &str) -> SymbolPtr {
        if let Some(sym) = self.symbol_table.get(name) {
            return *sym;
        }
        let mut sym = self.allocate_symbol();
        sym.name = name.to_string();
        self.symbol_table.insert(name.to_string(), sym);
        sym
    }

    pub fn find_symbol(&self, name: &str) -> Option<SymbolPtr> {
        self.symbol_table.get(name).copied()
    }

    /// Every currently-interned symbol name, in arbitrary order. Backs
    /// `symbols` and `apropos`.
    pub fn symbol_names(&self) -> Vec<String> {
        self.symbol_table.keys().cloned().collect()
    }

    fn on_allocation(&mut self) {
        self.allocations += 1;
        self.total_allocations += 1;
    }

    /// Whether enough allocations have accumulated since the last sweep to
    /// warrant another one. The heap itself can't act on this: it has no
    /// way to reach the dynamic-binding pushdown's roots (`interp.rs`'s
    /// `BindingStack`, which lives outside the heap), so the actual
    /// collection is triggered by `Interpreter::maybe_collect_garbage` at a
    /// point where those roots are in scope, rather than by `Heap` calling
    /// `collect_garbage(&[])` on itself and missing them.
    pub fn needs_gc(&self) -> bool {
        self.allocations > self.allocations_threshold
    }

    pub fn total_allocations(&self) -> u64 {
        self.total_allocations
    }

    /// Run a full mark-sweep collection. `extra_roots` lets callers (the
    /// evaluator) contribute roots living outside the heap itself, such as
    /// the dynamic-binding pushdown's saved values.
    pub fn collect_garbage(&mut self, extra_roots: &[GcThing]) {
        self.allocations = 0;

        let mut pending: Vec<GcThing> = self
            .symbol_table
            .values()
            .map(|s| GcThing::Symbol(*s))
            .collect();
        pending.extend(self.roots.iter().map(|(thing, _)| *thing));
        pending.extend(extra_roots.iter().copied());

        while let Some(thing) = pending.pop() {
            if !thing.is_marked() {
                thing.mark();
                pending.extend(thing.trace());
            }
        }

        self.symbols.sweep();
        self.pairs.sweep();
        self.numbers.sweep();
        self.strs.sweep();
        self.chars.sweep();
        self.ports.sweep();
        self.vectors.sweep();
        self.maps.sweep();
        self.strbufs.sweep();
        self.signals.sweep();
        self.functions.sweep();
    }

    pub fn add_root(&mut self, root: GcThing) {
        for (r, count) in self.roots.iter_mut() {
            if *r == root {
                *count += 1;
                return;
            }
        }
        self.roots.push((root, 1));
    }

    pub fn drop_root(&mut self, root: GcThing) {
        if let Some(pos) = self.roots.iter().position(|(r, _)| *r == root) {
            self.roots[pos].1 -= 1;
            if self.roots[pos].1 == 0 {
                self.roots.remove(pos);
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Heap {
        Heap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_allocate_tons() {
        let mut heap = Heap::with_capacity(8, 1_000_000);
        let mut ptrs = vec![];
        for _ in 0..1000 {
            let mut p = heap.allocate_pair();
            p.car = Value::Symbol(heap.nil);
            ptrs.push(p);
        }
        assert_eq!(ptrs.len(), 1000);
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut heap = Heap::new();
        let a = heap.intern("foo");
        let b = heap.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn test_nil_and_t_are_self_bound() {
        let heap = Heap::new();
        assert_eq!(heap.nil.value, Value::Symbol(heap.nil));
        assert_eq!(heap.t.value, Value::Symbol(heap.t));
    }

    #[test]
    fn test_collect_garbage_reclaims_unrooted() {
        let mut heap = Heap::with_capacity(4, 1_000_000);
        {
            let p = heap.allocate_pair();
            let _root = Rooted::new(&mut heap, GcThing::Pair(p));
            heap.collect_garbage(&[]);
        }
        heap.collect_garbage(&[]);
    }
}
