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

//! Argument parsing and the REPL. Kept thin: every piece of language
//! behavior lives in `eval`/`builtins`, not here. Flags mirror the
//! original driver's `-i` (force interactive after loading files), `-t`
//! (start with tracing on), and `-h`.

use std::path::PathBuf;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builtins;
use crate::interp::Interpreter;
use crate::printer;
use crate::session::Session;
use crate::signal;

#[derive(Parser, Debug)]
#[command(name = "hsl", about = "A small Lisp-family interpreter", version)]
pub struct Args {
    /// Source files to load before starting (or in place of) the REPL.
    pub files: Vec<PathBuf>,

    /// Drop into the REPL even after loading files.
    #[arg(short = 'i', long = "interactive")]
    pub interactive: bool,

    /// Start with evaluator tracing switched on.
    #[arg(short = 't', long = "trace")]
    pub trace: bool,
}

/// Failures at the CLI/process boundary — never a `Signal`, since those
/// stay internal to the language and are reported through `*last-error*`
/// and the REPL's own printer, not `std::process::exit`.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("readline error: {0}")]
    Readline(#[from] ReadlineError),
}

/// Parse `argv`, load any files named on the command line, then either
/// start the REPL (no files, or `-i`) or exit.
pub fn run(args: Args) -> Result<(), CliError> {
    let mut interp = Interpreter::new();
    builtins::install(&mut interp);
    interp.traceflag = args.trace;

    let mut ran_file = false;
    for path in &args.files {
        info!(path = %path.display(), "loading file");
        let source = std::fs::read_to_string(path).map_err(|source| CliError::ReadFile {
            path: path.clone(),
            source,
        })?;
        let name = path.display().to_string();
        let mut session = Session::from_str(&name, &source);
        let result = eval_all(&mut interp, &mut session);
        if signal::is_error(result) {
            let text = printer::print_error(&interp.heap, result);
            eprintln!("{}: {}", name, text);
        }
        ran_file = true;
    }

    if !ran_file || args.interactive {
        repl(&mut interp)?;
    }
    Ok(())
}

/// Evaluate every top-level form in `session` in sequence, returning the
/// last result (or an error signal, if one escaped and stopped the loop
/// early).
fn eval_all(interp: &mut Interpreter, session: &mut Session) -> crate::object::Value {
    let mut last = crate::object::Value::Symbol(interp.heap.nil);
    loop {
        match crate::reader::read_expr(&mut interp.heap, session) {
            Ok(Some(expr)) => {
                last = crate::eval::eval(interp, expr, session);
                if signal::is_error(last) {
                    return last;
                }
            }
            Ok(None) => return last,
            Err(sig) => return sig,
        }
    }
}

/// The interactive read-eval-print loop, using `rustyline` for line
/// editing/history instead of a hand-rolled stdin reader.
fn repl(interp: &mut Interpreter) -> Result<(), CliError> {
    let mut editor = DefaultEditor::new()?;
    let mut session = Session::interactive("*repl*");

    loop {
        let line = match editor.readline("hsl> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => return Err(CliError::Readline(e)),
        };
        if line.trim().is_empty() {
            continue;
        }
        editor.add_history_entry(line.as_str()).ok();
        session.feed(&line);

        loop {
            match crate::reader::read_expr(&mut interp.heap, &mut session) {
                Ok(Some(expr)) => {
                    let result = crate::eval::eval(interp, expr, &mut session);
                    if signal::is_error(result) {
                        warn!("evaluation raised an error");
                        println!("{}", printer::print_error(&interp.heap, result));
                    } else {
                        println!("{}", printer::prin1(&interp.heap, result));
                    }
                }
                Ok(None) => break,
                Err(sig) => {
                    // A line that doesn't hold a complete, well-formed form
                    // (unbalanced parens, EOF mid-string, ...) is reported
                    // and discarded rather than held open for continuation
                    // on the next line.
                    debug!("reader error, discarding the rest of this line");
                    println!("{}", printer::print_error(&interp.heap, sig));
                    break;
                }
            }
        }
    }
    Ok(())
}
