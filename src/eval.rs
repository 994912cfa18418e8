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

//! `eval`/`apply`, grounded on `original_source/eval.c`.
//!
//! Functions and special forms are dispatched the same way: both are
//! `Function` objects bound to a symbol's *function* slot (a separate
//! namespace from its *value* slot — this is a Lisp-2, matching the
//! original's separate `AS(sym, SYMBOL)->value` / `->function` fields).
//! The only difference is the `is_special` flag: a special form's builtin
//! receives its argument list unevaluated and decides for itself what (and
//! whether) to evaluate, exactly like `bf_if`/`bf_cond`/`bf_let` do in
//! `original_source/builtins.c`; an ordinary function's builtin receives a
//! list already evaluated left to right. This is why `eval.rs` itself
//! barely grows as special forms are added — `if`, `cond`, `let`, `setq`,
//! and the rest all live as ordinary (if special-cased) entries in
//! `builtins.rs`'s registration table.

use std::fs;

use crate::heap::{Heap, Rooted};
use crate::interp::{BindingGuard, Interpreter};
use crate::object::{ErrorCode, Function, FunctionKind, Value};
use crate::reader;
use crate::session::Session;
use crate::signal::{self, StrArg};

fn cons(heap: &mut Heap, car: Value, cdr: Value) -> Value {
    let mut p = heap.allocate_pair();
    p.car = car;
    p.cdr = cdr;
    Value::Pair(p)
}

/// Evaluate one expression. Self-evaluating objects (numbers, strings,
/// characters, vectors, maps, ports, functions, signals, and the self-bound
/// `nil`/`t`) return themselves; a symbol looks up its value slot; a pair
/// is a call.
pub fn eval(interp: &mut Interpreter, expr: Value, session: &mut Session) -> Value {
    interp.counters.evals += 1;
    interp.maybe_collect_garbage();
    let depth = interp.depth;
    if interp.traceflag {
        trace_line(interp, session, depth, "eval", expr);
    }
    let result = match expr {
        Value::Symbol(s) => {
            if s.value.is_unbound() {
                signal::throw_error(
                    &mut interp.heap,
                    ErrorCode::Eval,
                    expr,
                    StrArg::Owned(format!("unbound variable: {}", s.name)),
                )
            } else {
                s.value
            }
        }
        Value::Pair(p) => eval_call(interp, p.car, p.cdr, session),
        other => other,
    };
    if interp.traceflag {
        trace_line(interp, session, depth, "value", result);
    }
    result
}

/// Prints an entry/exit trace line to stdout (the REPL/file loader's own
/// output, not the `tracing` crate's operational log): `-t` is a
/// user-facing evaluator feature, distinct from the GC/autoload logging
/// that goes through `tracing`.
fn trace_line(interp: &mut Interpreter, _session: &mut Session, depth: u32, label: &str, v: Value) {
    let indent = "  ".repeat(depth as usize);
    let text = crate::printer::prin1(&interp.heap, v);
    println!("{}{}: {}", indent, label, text);
}

/// Resolve `op` to the `Function` value that should handle a call, loading
/// it via `autoload` if its symbol's function slot says to. Mirrors the
/// lookup-then-`autoload` sequence at the top of `evalfun` in
/// `original_source/eval.c`.
fn resolve_operator(interp: &mut Interpreter, op: Value, session: &mut Session) -> Value {
    let sym = match op.as_symbol() {
        Some(s) => s,
        None => return eval(interp, op, session),
    };
    match sym.function {
        Value::Function(f) => {
            if let FunctionKind::Autoload(ref file) = f.kind {
                let file = file.clone();
                let loaded = autoload(interp, &file, session);
                if signal::is_exit(loaded) {
                    return loaded;
                }
                return match sym.function {
                    Value::Function(_) => sym.function,
                    _ => signal::throw_error(
                        &mut interp.heap,
                        ErrorCode::NoAutol,
                        op,
                        StrArg::Owned(format!("autoload of {} did not define it", sym.name)),
                    ),
                };
            }
            sym.function
        }
        Value::Unbound => signal::throw_error(
            &mut interp.heap,
            ErrorCode::NoFunc,
            op,
            StrArg::Owned(format!("unbound function: {}", sym.name)),
        ),
        _ => signal::throw_error(
            &mut interp.heap,
            ErrorCode::NoFunc,
            op,
            StrArg::Owned(format!("not a function: {}", sym.name)),
        ),
    }
}

fn eval_call(interp: &mut Interpreter, op: Value, rest: Value, session: &mut Session) -> Value {
    let func = resolve_operator(interp, op, session);
    if signal::is_exit(func) {
        return func;
    }
    // `func` may be a just-constructed, not-yet-bound closure (an
    // immediately-invoked `(lambda ...)` in operator position), so it
    // isn't necessarily reachable through the symbol table yet; root it
    // for the call's duration rather than assume it is.
    let rooted_func = Rooted::new(&mut interp.heap, func);
    let f = match rooted_func.get().as_function() {
        Some(f) => f,
        None => {
            return signal::throw_error(
                &mut interp.heap,
                ErrorCode::NoFunc,
                op,
                StrArg::Owned("not a function".to_string()),
            )
        }
    };
    let args = if f.is_special {
        rest
    } else {
        let evaluated = eval_list(interp, rest, session);
        if signal::is_exit(evaluated) {
            return evaluated;
        }
        evaluated
    };
    // Likewise root the argument list for the call: a special form's
    // builtin walks its raw (unevaluated) `args` across several more
    // `eval` calls of its own, any of which can trigger a collection.
    let rooted_args = Rooted::new(&mut interp.heap, args);
    apply(interp, rooted_func.get(), rooted_args.get(), session)
}

/// Evaluate each element of a list left to right, short-circuiting on the
/// first signal that should exit. Each evaluated value is rooted as it's
/// produced: it's reachable only from this Rust stack frame until the
/// final `cons` chain is built, and evaluating a later argument can
/// allocate (and so can trigger a collection) before that happens.
fn eval_list(interp: &mut Interpreter, mut list: Value, session: &mut Session) -> Value {
    let mut items: Vec<Rooted<Value>> = vec![];
    loop {
        match list {
            Value::Pair(p) => {
                let v = eval(interp, p.car, session);
                if signal::is_exit(v) {
                    return v;
                }
                items.push(Rooted::new(&mut interp.heap, v));
                list = p.cdr;
            }
            _ => break,
        }
    }
    let mut result = Rooted::new(&mut interp.heap, Value::Symbol(interp.heap.nil));
    for item in items.into_iter().rev() {
        let pair = cons(&mut interp.heap, item.get(), result.get());
        result = Rooted::new(&mut interp.heap, pair);
    }
    result.get()
}

pub fn list_len(v: Value) -> i32 {
    let mut n = 0;
    let mut cur = v;
    while let Value::Pair(p) = cur {
        n += 1;
        cur = p.cdr;
    }
    n
}

/// Apply a resolved function value to an argument list (already evaluated
/// unless the function is special). Mirrors `apply` in
/// `original_source/eval.c`, including its argument-count check.
pub fn apply(interp: &mut Interpreter, func: Value, args: Value, session: &mut Session) -> Value {
    interp.counters.applys += 1;
    let f = match func.as_function() {
        Some(f) => f,
        None => {
            return signal::throw_error(
                &mut interp.heap,
                ErrorCode::NoFunc,
                func,
                StrArg::Owned("not a function".to_string()),
            )
        }
    };

    // Global `-t`/`(trace)` traces every call; `(trace-function name)`
    // marks a single function to get the same indented entry/exit lines
    // even with `-t` off.
    let traced = interp.traceflag || f.trace;
    let depth = interp.depth;
    if traced {
        trace_line(interp, session, depth, "enter", func);
    }
    interp.depth += 1;

    let result = apply_inner(interp, func, f, args, session);

    interp.depth -= 1;
    if traced {
        trace_line(interp, session, depth, "return", result);
    }
    result
}

fn apply_inner(
    interp: &mut Interpreter,
    func: Value,
    f: Function,
    args: Value,
    session: &mut Session,
) -> Value {
    // `call_builtin` in `original_source/eval.c` checks the argument count
    // for every builtin, special form or not — `is_special` only decides
    // whether `eval_call` pre-evaluates the arguments, not whether they're
    // counted.
    let n = list_len(args);
    if n < f.minargs || (f.maxargs >= 0 && n > f.maxargs) {
        let name = f.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        return signal::throw_error(
            &mut interp.heap,
            ErrorCode::NoArgs,
            func,
            StrArg::Owned(format!(
                "wrong number of arguments to {}: got {}, expected {}..{}",
                name,
                n,
                f.minargs,
                if f.maxargs < 0 { "*".to_string() } else { f.maxargs.to_string() }
            )),
        );
    }

    match f.kind {
        FunctionKind::Builtin(bf) => bf(interp, args, session),
        FunctionKind::Form { params, body } => apply_form(interp, params, body, args, session),
        FunctionKind::Autoload(_) => signal::throw_error(
            &mut interp.heap,
            ErrorCode::NoAutol,
            func,
            StrArg::Owned("function is still unresolved autoload".to_string()),
        ),
    }
}

/// Bind `params` (a proper or dotted parameter list) to `args` via the
/// dynamic-scoping pushdown stack, evaluate `body` as an implicit `progn`,
/// then unconditionally restore the shadowed bindings. Mirrors
/// `make_bindings` + the lambda-application path of `evalfun`, plus
/// `restore_bindings` on the way out — via `BindingGuard` instead of a
/// hand-paired push/pop, so an early return through a signal still
/// restores correctly.
fn apply_form(interp: &mut Interpreter, params: Value, body: Value, args: Value, session: &mut Session) -> Value {
    let guard = BindingGuard::new(interp);

    let mut p = params;
    let mut a = args;
    loop {
        match p {
            Value::Pair(pp) => {
                let param_sym = match pp.car.as_symbol() {
                    Some(s) => s,
                    None => {
                        guard.release(interp);
                        return signal::throw_error(
                            &mut interp.heap,
                            ErrorCode::InvArg,
                            pp.car,
                            StrArg::Owned("parameter list entry is not a symbol".to_string()),
                        );
                    }
                };
                let (argval, rest) = match a {
                    Value::Pair(ap) => (ap.car, ap.cdr),
                    other => (Value::Symbol(interp.heap.nil), other),
                };
                interp.counters.bindings += 1;
                interp.bindings.bind(param_sym, argval);
                p = pp.cdr;
                a = rest;
            }
            Value::Symbol(s) if s != interp.heap.nil => {
                interp.counters.bindings += 1;
                interp.bindings.bind(s, a);
                break;
            }
            _ => break,
        }
    }

    let result = eval_body(interp, body, session);
    guard.release(interp);
    result
}

/// Evaluate a list of forms in sequence, returning the last value (`nil`
/// for an empty body), short-circuiting on a signal that should exit.
pub fn eval_body(interp: &mut Interpreter, mut body: Value, session: &mut Session) -> Value {
    let mut result = Value::Symbol(interp.heap.nil);
    loop {
        match body {
            Value::Pair(p) => {
                result = eval(interp, p.car, session);
                if signal::is_exit(result) {
                    return result;
                }
                body = p.cdr;
            }
            _ => break,
        }
    }
    result
}

/// Load and evaluate every form in `file`, used both by autoload and by
/// `cli::run` for file arguments. Mirrors `autoload` in
/// `original_source/eval.c`.
pub fn autoload(interp: &mut Interpreter, file: &str, session: &mut Session) -> Value {
    tracing::debug!(target: "autoload", file, "loading");
    let source = match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            return signal::throw_error(
                &mut interp.heap,
                ErrorCode::System,
                Value::Unbound,
                StrArg::Owned(format!("autoload: could not read {}: {}", file, e)),
            )
        }
    };
    eval_source(interp, file, &source, session)
}

/// Read and evaluate every top-level form of `source`, returning the value
/// of the last one (or `nil` if it contained none).
pub fn eval_source(interp: &mut Interpreter, name: &str, source: &str, _outer_session: &mut Session) -> Value {
    let mut inner = Session::from_str(name, source);
    let mut result = Value::Symbol(interp.heap.nil);
    loop {
        let parsed = reader::read_expr(&mut interp.heap, &mut inner);
        match parsed {
            Ok(Some(expr)) => {
                result = eval(interp, expr, &mut inner);
                if signal::is_exit(result) {
                    return result;
                }
            }
            Ok(None) => break,
            Err(sig) => return sig,
        }
    }
    result
}

impl Value {
    pub fn as_function(&self) -> Option<Function> {
        match *self {
            Value::Function(f) => Some((*f).clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    fn fresh() -> Interpreter {
        let mut interp = Interpreter::new();
        builtins::install(&mut interp);
        interp
    }

    fn eval_str(interp: &mut Interpreter, src: &str) -> Value {
        let mut session = Session::from_str("*test*", src);
        let expr = reader::read_expr(&mut interp.heap, &mut session).unwrap().unwrap();
        eval(interp, expr, &mut session)
    }

    #[test]
    fn test_self_evaluating_number() {
        let mut interp = fresh();
        let v = eval_str(&mut interp, "42");
        assert_eq!(v.as_number().unwrap().value, 42.0);
    }

    #[test]
    fn test_quote_does_not_evaluate() {
        let mut interp = fresh();
        let v = eval_str(&mut interp, "(quote (a b))");
        let pair = v.as_pair().unwrap();
        assert_eq!(pair.car.as_symbol().unwrap().name, "a");
    }

    #[test]
    fn test_unbound_variable_errors() {
        let mut interp = fresh();
        let v = eval_str(&mut interp, "undefined-var-xyz");
        assert!(signal::is_exit(v));
    }

    #[test]
    fn test_if_evaluates_correct_branch() {
        let mut interp = fresh();
        let v = eval_str(&mut interp, "(if t 1 2)");
        assert_eq!(v.as_number().unwrap().value, 1.0);
        let v = eval_str(&mut interp, "(if nil 1 2)");
        assert_eq!(v.as_number().unwrap().value, 2.0);
    }

    #[test]
    fn test_lambda_and_apply_with_dynamic_scoping() {
        let mut interp = fresh();
        eval_str(&mut interp, "(setq add1 (lambda (x) (+ x 1)))");
        let v = eval_str(&mut interp, "(add1 41)");
        assert_eq!(v.as_number().unwrap().value, 42.0);
        // The parameter is not visible after the call returns.
        let after = eval_str(&mut interp, "x");
        assert!(signal::is_exit(after));
    }

    #[test]
    fn test_let_is_parallel_binding() {
        let mut interp = fresh();
        eval_str(&mut interp, "(setq x 1)");
        let v = eval_str(&mut interp, "(let ((x 2) (y x)) y)");
        // y should see the *outer* x (1), not the new x (2): parallel let.
        assert_eq!(v.as_number().unwrap().value, 1.0);
    }

    #[test]
    fn test_let_star_is_sequential_binding() {
        let mut interp = fresh();
        eval_str(&mut interp, "(setq x 1)");
        let v = eval_str(&mut interp, "(let* ((x 2) (y x)) y)");
        assert_eq!(v.as_number().unwrap().value, 2.0);
    }

    #[test]
    fn test_trace_function_sets_per_function_flag() {
        let mut interp = fresh();
        eval_str(&mut interp, "(defun add1 (x) (+ x 1))");
        eval_str(&mut interp, "(trace-function 'add1)");
        let sym = interp.heap.find_symbol("add1").unwrap();
        let f = sym.function.as_function().unwrap();
        assert!(f.trace);

        eval_str(&mut interp, "(trace-function 'add1 nil)");
        let sym = interp.heap.find_symbol("add1").unwrap();
        let f = sym.function.as_function().unwrap();
        assert!(!f.trace);
    }

    #[test]
    fn test_call_depth_returns_to_zero_after_nested_calls() {
        let mut interp = fresh();
        assert_eq!(interp.depth, 0);
        eval_str(&mut interp, "(defun id (x) x)");
        eval_str(&mut interp, "(id (id 1))");
        assert_eq!(interp.depth, 0);
    }
}
