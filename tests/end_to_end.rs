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

//! End-to-end source-level scenarios, driving a fresh `Interpreter` +
//! `Session` the way `cli::run` does, without going through the CLI
//! itself.

use hsl::builtins;
use hsl::eval;
use hsl::interp::Interpreter;
use hsl::object::Value;
use hsl::reader;
use hsl::session::Session;
use hsl::signal;

fn run(src: &str) -> (Interpreter, Value) {
    let mut interp = Interpreter::new();
    builtins::install(&mut interp);
    let mut session = Session::from_str("*test*", src);
    let mut last = Value::Symbol(interp.heap.nil);
    loop {
        match reader::read_expr(&mut interp.heap, &mut session) {
            Ok(Some(expr)) => {
                last = eval::eval(&mut interp, expr, &mut session);
                assert!(!signal::is_error(last), "unexpected error: {}", hsl::printer::princ(&interp.heap, last));
            }
            Ok(None) => break,
            Err(e) => panic!("reader error: {}", hsl::printer::princ(&interp.heap, e)),
        }
    }
    (interp, last)
}

#[test]
fn recursive_factorial() {
    let (interp, v) = run(
        r#"
        (defun factorial (n)
          (if (< n 2)
              1
            (* n (factorial (- n 1)))))
        (factorial 10)
        "#,
    );
    assert_eq!(v.as_number().unwrap().value, 3628800.0);
    let _ = interp;
}

#[test]
fn closures_are_dynamically_scoped() {
    // With dynamic scoping a function sees the caller's bindings of a free
    // variable, not the bindings in effect where it was defined.
    let (interp, v) = run(
        r#"
        (defun see-x () x)
        (defun call-with-x (x) (see-x))
        (call-with-x 99)
        "#,
    );
    assert_eq!(v.as_number().unwrap().value, 99.0);
    let _ = interp;
}

#[test]
fn let_is_parallel_letrec_is_sequential() {
    let (interp, v) = run("(let ((a 1)) (let ((a 2) (b a)) (list a b)))");
    let p = v.as_pair().unwrap();
    assert_eq!(p.car.as_number().unwrap().value, 2.0);
    let b = p.cdr.as_pair().unwrap().car;
    // Parallel `let`: `b`'s init form sees the *outer* `a` (1), not the
    // sibling binding being installed in this same `let`.
    assert_eq!(b.as_number().unwrap().value, 1.0);

    let (interp2, v2) = run("(letrec ((a 1) (b (+ a 1))) (list a b))");
    let p2 = v2.as_pair().unwrap();
    assert_eq!(p2.car.as_number().unwrap().value, 1.0);
    let b2 = p2.cdr.as_pair().unwrap().car;
    assert_eq!(b2.as_number().unwrap().value, 2.0);
    let _ = (interp, interp2);
}

#[test]
fn unbound_variable_raises_eval_error() {
    let (interp, v) = run("(errset totally-unbound-name)");
    assert!(v.as_str().is_some());
    let _ = interp;
}

#[test]
fn gc_survives_many_allocations_with_live_roots() {
    let (interp, v) = run(
        r#"
        (defun build (n acc)
          (if (= n 0)
              acc
            (build (- n 1) (cons n acc))))
        (length (build 500 nil))
        "#,
    );
    assert_eq!(v.as_number().unwrap().value, 500.0);
    let _ = interp;
}

#[test]
fn prin1_round_trips_through_the_reader() {
    let (mut interp, _) = run("(quote (1 \"a\\\"b\" foo))");
    let mut session = Session::from_str("*test*", "(1 \"a\\\"b\" foo)");
    let original = reader::read_expr(&mut interp.heap, &mut session).unwrap().unwrap();
    let text = hsl::printer::prin1(&interp.heap, original);
    let mut reparsed_session = Session::from_str("*test*", &text);
    let reparsed = reader::read_expr(&mut interp.heap, &mut reparsed_session).unwrap().unwrap();
    assert_eq!(hsl::printer::prin1(&interp.heap, reparsed), text);
}

#[test]
fn measure_reports_an_evals_counter() {
    let (interp, v) = run("(measure (+ 1 2 3))");
    let p = v.as_pair().unwrap();
    assert_eq!(p.car.as_number().unwrap().value, 6.0);
    assert_eq!(eval::list_len(p.cdr), 5);
    let _ = interp;
}

#[test]
fn autoload_defers_until_first_call() {
    let (mut interp, _) = run("(autoload 'undefined-until-called \"demos/autoload-greeting.scm\")");
    let sym = interp.heap.intern("undefined-until-called");
    let f = sym.function.as_function().expect("autoload stub should be a function");
    assert!(matches!(f.kind, hsl::object::FunctionKind::Autoload(_)));
}

#[test]
fn load_reads_forms_from_a_real_file_on_disk() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("greeting.scm");
    std::fs::write(&path, "(defun shout (s) (length s))\n(shout \"hi\")\n").expect("write temp file");

    let mut interp = Interpreter::new();
    builtins::install(&mut interp);
    let mut session = Session::from_str("*test*", "");
    let v = eval::autoload(&mut interp, path.to_str().unwrap(), &mut session);

    assert!(!signal::is_error(v), "unexpected error: {}", hsl::printer::princ(&interp.heap, v));
    assert_eq!(v.as_number().unwrap().value, 2.0);
}
