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

//! A tree-walking interpreter for a small Lisp-family language: mark-sweep
//! GC over arena-backed heaps, a recursive-descent reader, an evaluator
//! with dynamic scoping and autoload, and a REPL/script-running CLI.
//!
//! The library is exposed separately from the `hsl` binary so integration
//! tests can drive a `Session`/`Interpreter` pair directly.

pub mod builtins;
pub mod cli;
pub mod eval;
pub mod heap;
pub mod interp;
pub mod object;
pub mod printer;
pub mod reader;
pub mod session;
pub mod signal;
