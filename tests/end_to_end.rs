//! Whole programs run through the engine, the way the REPL and script runner use it.

#![expect(clippy::unwrap_used)] // test code OK

use amalgam::ast::{Node, nil, quoted, sym, val};
use amalgam::engine::{Engine, EngineConfig, Reply};
use amalgam::evaluator::EvalConfig;
use amalgam::parser::ParseConfig;
use amalgam::{Error, Signal};
use pretty_assertions::assert_eq;

fn run(program: &str) -> Result<Node, Signal> {
    Engine::new().parse_and_run(program, "program.am")
}

fn error_of(program: &str) -> Error {
    let signal = run(program).unwrap_err();
    Error::from(signal)
}

const FOR_EACH: &str = r"
(macro for-each [name items body]
  (do
    (setn source (eval items))
    (setn results [])
    (setn index 0)
    (loop
      (if (= index (len source)) (break))
      (setr name (at index source))
      (setn results (snoc results (eval body)))
      (setn index (+ index 1)))
    results))
";

#[test]
fn test_macro_built_iteration() {
    let mut engine = Engine::new();
    engine.parse_and_run(FOR_EACH, "for-each.am").unwrap();

    let squares = engine.parse_and_run("(for-each n [1 2 3] (* n n))", "use.am").unwrap();
    assert_eq!(squares, val([1, 4, 9]));

    // the loop variable lives in the macro's frame, not the caller's
    assert!(!engine.environment().contains("n"));
    assert!(!engine.environment().contains("results"));

    let words = engine
        .parse_and_run("(for-each w [\"a\" \"b\"] (concat w w))", "use.am")
        .unwrap();
    assert_eq!(words, val(["aa", "bb"]));
}

#[test]
fn test_loop_runs_body_until_break() {
    let program = r"
(setn count 0)
(setn i 0)
(loop
  (setn i (+ i 1))
  (setn count (+ count 2))
  (when (= i 10) (break count)))
";
    assert_eq!(run(program).unwrap(), val(20));

    let nested = r"
(setn total 0)
(setn i 0)
(loop
  (when (= i 3) (break total))
  (setn j 0)
  (loop
    (when (= j 4) (break))
    (setn total (+ total 1))
    (setn j (+ j 1)))
  (setn i (+ i 1)))
";
    assert_eq!(run(nested).unwrap(), val(12));
}

#[test]
fn test_closures_capture_their_defining_frame() {
    let program = r"
(setn adder (fn [n] (fn [x] (+ x n))))
(setn add2 (adder 2))
(setn add10 (adder 10))
[(add2 1) (add10 1) ((adder 100) 1)]
";
    assert_eq!(run(program).unwrap(), val([3, 11, 101]));

    let recursive = r"
(mkfn fact [n] (if (< n 2) 1 (* n (fact (- n 1)))))
(fact 10)
";
    assert_eq!(run(recursive).unwrap(), val(3_628_800));

    let early_exit = r"
(mkfn find-first [pred items]
  (do
    (setn i 0)
    (loop
      (when (= i (len items)) (return :NIL))
      (when (pred (at i items)) (return (at i items)))
      (setn i (+ i 1)))))
[(find-first (fn [x] (> x 3)) [1 5 7]) (find-first (fn [x] (> x 9)) [1 2])]
";
    assert_eq!(run(early_exit).unwrap(), val(vec![val(5), nil()]));
}

#[test]
fn test_setn_and_setr() {
    let program = r"
(setn target 'answer)
(setr target 42)
(setr 'other (+ answer 1))
[answer other]
";
    assert_eq!(run(program).unwrap(), val([42, 43]));

    // bindings inside a call stay in the call's frame
    let mut engine = Engine::new();
    engine.parse_and_run("((fn [] (setn inner 1)))", "t").unwrap();
    assert!(!engine.environment().contains("inner"));
}

#[test]
fn test_code_as_data() {
    let program = r"
(setn code '(+ 1 2))
(setn twice '(* 2 (eval code)))
[(eval code) (unquote code) (eval twice)]
";
    assert_eq!(run(program).unwrap(), val([3, 3, 6]));

    assert_eq!(run("(eval '(* 6 7))").unwrap(), val(42));
    assert_eq!(run("(setn q ''x) q").unwrap(), quoted(quoted(sym("x"))));
}

#[test]
fn test_maps() {
    let program = r"
(setn m [:a 1 :b 2])
(setn m (map-up m :c 3))
[(is-map m) (map-in m :c) (map-at m :b) (len m)]
";
    assert_eq!(
        run(program).unwrap(),
        val(vec![val(true), val(true), val(2), val(6)])
    );
    assert!(matches!(error_of("(map-at [:a 1 :a 2] :a)"), Error::DuplicateKey(_)));
}

#[test]
fn test_failures_are_reported_not_raised() {
    assert_eq!(error_of("(break)"), Error::BreakOutsideLoop);
    assert_eq!(error_of("(return 1)"), Error::ReturnOutsideClosure);
    assert_eq!(error_of("(/ 1 0)"), Error::EvalError("division by zero".into()));
    assert!(matches!(error_of("(nope 1)"), Error::UnboundName(_)));
    assert!(matches!(error_of("(1 2)"), Error::NotCallable(_)));
    assert!(matches!(error_of("(+ 1"), Error::Parse(_)));

    let mut engine = Engine::new();
    let signal = engine
        .parse_and_run("(mkfn f [x] (len x))\n(f 5)", "calls.am")
        .unwrap_err();
    let report = engine.report(&signal);
    assert!(report.starts_with("error[WrongType]"), "{report}");
    assert!(report.contains("--> calls.am:1:13"), "{report}");
    assert!(report.contains("= note: propagated through calls.am:2:1"), "{report}");
}

#[test]
fn test_programs_are_isolated_per_engine() {
    let mut first = Engine::new();
    first.parse_and_run("(setn shared 1)", "a").unwrap();

    let mut second = Engine::new();
    assert!(matches!(
        second.parse_and_run("shared", "b").map_err(Error::from),
        Err(Error::UnboundName(_))
    ));
}

#[test]
fn test_limits() {
    let mut engine = Engine::with_config(EngineConfig {
        eval: EvalConfig {
            step_budget: Some(1_000),
            ..EvalConfig::default()
        },
        parse: ParseConfig {
            max_depth: 8,
            ..ParseConfig::default()
        },
    });

    let signal = engine.parse_and_run("(loop (setn x 1))", "spin").unwrap_err();
    assert_eq!(Error::from(signal), Error::BudgetExhausted(1_000));

    let signal = engine.parse_and_run("[[[[[[[[[[[[1]]]]]]]]]]]]", "deep").unwrap_err();
    assert!(engine.report(&signal).starts_with("error[TooDeeplyNested]"));

    let mut shallow = Engine::with_config(EngineConfig {
        eval: EvalConfig {
            max_depth: 64,
            ..EvalConfig::default()
        },
        ..EngineConfig::default()
    });
    let signal = shallow
        .parse_and_run("(mkfn down [] (down)) (down)", "recurse")
        .unwrap_err();
    assert_eq!(Error::from(signal), Error::DepthExceeded(64));
}

#[test]
fn test_unbounded_recursion_stops_at_depth_limit_on_small_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let mut engine = Engine::new();
            let plain = engine
                .parse_and_run("(mkfn down [] (down)) (down)", "recurse")
                .map_err(Error::from);
            let nested = engine
                .parse_and_run("(mkfn deep [n] (let [[m (+ n 1)]] (do (deep m)))) (deep 0)", "nested")
                .map_err(Error::from);
            assert_eq!(plain, Err(Error::DepthExceeded(amalgam::MAX_EVAL_DEPTH)));
            assert_eq!(nested, Err(Error::DepthExceeded(amalgam::MAX_EVAL_DEPTH)));
        })
        .unwrap();

    handle.join().unwrap();
}

#[test]
fn test_let_binds_in_order() {
    assert_eq!(run("(let [[a 1] [b (+ a 1)] [c (* b 10)]] [a b c])").unwrap(), val([1, 2, 20]));
    assert_eq!(run("(setn a 10) (let [[a 1] [b a]] b)").unwrap(), val(1));
}

#[test]
fn test_interactive_session() {
    let mut engine = Engine::new();
    let mut transcript = Vec::new();

    for line in ["(+ 42 42)", "(+ 1", "2 3)", "[1 2 3 4]", "[4 3", "2 1]", "(/", " 1", " 0", ")"] {
        match engine.feed(line) {
            Reply::Incomplete => {}
            Reply::Values(values) => {
                transcript.extend(values.iter().map(ToString::to_string));
            }
            Reply::Failed(signal) => transcript.push(Error::from(signal).to_string()),
        }
    }

    assert_eq!(
        transcript,
        vec!["84", "6", "[1 2 3 4]", "[4 3 2 1]", "division by zero"]
    );
}
