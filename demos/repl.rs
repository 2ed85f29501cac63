use amalgam::Error;
use amalgam::ast::{Node, Number, Value};
use amalgam::engine::{Engine, Reply};
use amalgam::environment::Environment;
use amalgam::primordials::Arity;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Enable with `RUST_LOG=amalgam=debug` or `RUST_LOG=amalgam=trace`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

fn main() {
    init_tracing();
    let mut engine = Engine::new();
    engine.register_primordial("exit", Arity::Range(0, 1), |args: &[Node]| {
        let code = exit_code(args)?;
        println!("Goodbye!");
        process::exit(code)
    });

    // Files given on the command line run first, into the same environment
    for path in std::env::args().skip(1) {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("cannot read {path}: {err}");
                process::exit(1);
            }
        };
        if let Err(signal) = engine.parse_and_run(&text, &path) {
            eprint!("{}", engine.report(&signal));
            process::exit(1);
        }
    }

    if let Err(err) = run_repl(&mut engine) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

/// Status for `(exit [code])`; zero when no code is given
fn exit_code(args: &[Node]) -> Result<i32, Error> {
    match args.first().map(|node| &node.value) {
        None => Ok(0),
        Some(Value::Numeric(Number::Int(code))) => i32::try_from(*code)
            .map_err(|_| Error::EvalError(format!("`exit`: status {code} is out of range"))),
        Some(other) => Err(Error::wrong_type(format!(
            "`exit` expects an integer, got {} `{other}`",
            other.type_name()
        ))),
    }
}

fn run_repl(engine: &mut Engine) -> Result<(), ReadlineError> {
    println!("Amalgam");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let prompt = if engine.is_pending() { "| " } else { "> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if !engine.is_pending() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(engine.environment());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                let _ = rl.add_history_entry(line.as_str());

                match engine.feed(&line) {
                    Reply::Incomplete => {}
                    Reply::Values(values) => {
                        for value in values {
                            println!("{value}");
                        }
                    }
                    Reply::Failed(signal) => eprint!("{}", engine.report(&signal)),
                }
            }
            // Ctrl+C abandons a half-typed form; on an empty prompt it exits
            Err(ReadlineError::Interrupted) if engine.is_pending() => engine.reset_input(),
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter (also `(exit [code])`)");
    println!("  Ctrl+C     - Abandon a multi-line entry");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Forms:");
    println!("  Values:      42, 2.5, \"text\", :ATOM, [1 2 3], 'quoted");
    println!("  Binding:     (setn x 1), (setr 'x 2), (let [[a 1] [b 2]] (+ a b))");
    println!("  Functions:   (fn [x] (* x x)), (mkfn sq [x] (* x x)), (return v)");
    println!("  Macros:      (macro name [args] body), (eval 'code), (unquote 'code)");
    println!("  Control:     (if c a b), (when c body), (cond [c1 a] [c2 b]), (do a b)");
    println!("  Loops:       (loop body...), (break value)");
    println!();
    println!("Examples:");
    println!("  (mkfn fact [n] (if (< n 2) 1 (* n (fact (- n 1)))))");
    println!("  (setn square (fn [x] (* x x)))");
    println!("  (square 12)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, node) in bindings {
        match node.value {
            Value::Primordial(_) | Value::SpecialForm(_) => builtins.push(name),
            _ => user_defined.push((name, node)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in callables ({}):", builtins.len());
        for row in builtins.chunks(4) {
            let line: String = row.iter().map(|name| format!("  {name:<15}")).collect();
            println!("{}", line.trim_end());
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, node) in user_defined {
            println!("  {name} = {node}");
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use amalgam::ast::val;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&[]).unwrap(), 0);
        assert_eq!(exit_code(&[val(3)]).unwrap(), 3);
        assert!(matches!(exit_code(&[val("x")]), Err(Error::WrongType(_))));
        assert!(matches!(exit_code(&[val(1.5)]), Err(Error::WrongType(_))));
        assert!(matches!(exit_code(&[val(i64::MAX)]), Err(Error::EvalError(_))));
    }
}
