#![cfg(feature = "reader")]
#![expect(clippy::unwrap_used)] // test code OK

use framelisp::{EvalConfig, Error, run_program};
use pretty_assertions::assert_eq;

/// Expected outcome of running a whole program
#[derive(Debug)]
enum ProgramResult {
    Prints(&'static str),                   // Program succeeds with exactly this output
    FailsAfter(&'static str, &'static str), // Output so far, then an error containing the text
}
use ProgramResult::*;

fn run_program_tests(test_cases: Vec<(&str, ProgramResult)>) {
    for (i, (source, expected)) in test_cases.into_iter().enumerate() {
        let test_id = format!("Program #{}", i + 1);
        let mut out = Vec::new();
        let result = run_program(source, EvalConfig::default(), &mut out);
        let printed = String::from_utf8(out).unwrap();

        match (result, expected) {
            (Ok(()), Prints(expected_out)) => {
                assert_eq!(printed, expected_out, "{test_id}: {source}")
            }
            (Err(err), FailsAfter(expected_out, expected_err)) => {
                assert_eq!(printed, expected_out, "{test_id}: {source}");
                let msg = format!("{err}");
                assert!(
                    msg.contains(expected_err),
                    "{test_id}: error should contain '{expected_err}', got: {msg}"
                );
            }
            (Ok(()), FailsAfter(_, expected_err)) => {
                panic!("{test_id}: expected error containing '{expected_err}', printed {printed:?}")
            }
            (Err(err), Prints(_)) => panic!("{test_id}: unexpected error {err:?}"),
        }
    }
}

#[test]
fn test_end_to_end_scenarios() {
    run_program_tests(vec![
        ("(define x 5) (+ x 3)", Prints("8.000000\n")),
        ("(let ((a 1) (b 2)) (+ a b))", Prints("3.000000\n")),
        (
            "(define add5 (lambda (x) (+ x 5))) (add5 10)",
            Prints("15.000000\n"),
        ),
        ("(if (> 3 2) \"yes\" \"no\")", Prints("\"yes\"\n")),
        ("(let* ((a 1) (b (+ a 1))) b)", Prints("2.000000\n")),
        (
            "(set! y 10) (+ 1 2)",
            FailsAfter("", "set! must modify an existing binding: y"),
        ),
    ]);
}

#[test]
fn test_programs() {
    run_program_tests(vec![
        // Void results print nothing
        ("(cond (#f 1))", Prints("")),
        ("(define z 1) (set! z 2) z", Prints("2\n")),
        // Integers print plainly, arithmetic results as doubles
        ("7 (+ 7) (modulo 7 4)", Prints("7\n7.000000\n3\n")),
        ("(/ 1 4) 2.5", Prints("0.250000\n2.500000\n")),
        // Lists and pairs
        ("'(a (b c) ())", Prints("(a (b c) ())\n")),
        ("(cons 'a (cons 'b 'c))", Prints("(a b . c)\n")),
        ("(cdr '(1))", Prints("()\n")),
        // Procedures print opaquely
        ("(lambda () 1) +", Prints("#<procedure>\n#<primitive:+>\n")),
        // Booleans and strings
        ("(and #t #f) (or #f #t) \"a\\\"b\"", Prints("#f\n#t\n\"a\\\"b\"\n")),
        // Higher-order procedures and recursion
        (
            "; map over a list
             (define map (lambda (f l)
               (if (null? l) '() (cons (f (car l)) (map f (cdr l))))))
             (map (lambda (x) (* x x)) '(1 2 3))",
            Prints("(1.000000 4.000000 9.000000)\n"),
        ),
        (
            "(define fib (lambda (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))
             (fib 10)",
            Prints("55.000000\n"),
        ),
        (
            "(define make-counter (lambda ()
               (let ((count 0))
                 (lambda () (set! count (+ count 1)) count))))
             (define c1 (make-counter))
             (define c2 (make-counter))
             (c1) (c1) (c2)",
            Prints("1.000000\n2.000000\n1.000000\n"),
        ),
        (
            "(define len (lambda (l) (cond ((null? l) 0) (else (+ 1 (len (cdr l)))))))
             (len '(a b c d))",
            Prints("4.000000\n"),
        ),
        // Errors are fatal and stop later forms
        (
            "1 (car 5) 2",
            FailsAfter("1\n", "car requires a non-empty pair"),
        ),
        ("\"ok\" (if 1 2 3) 4", FailsAfter("\"ok\"\n", "if condition must be a boolean")),
        ("(let ((a 1) (b a)) b)", FailsAfter("", "Unbound variable: a")),
        // let* computes every value inside its own scope
        (
            "(define q 0) (let* ((a (begin (define q 1) q))) a) q",
            Prints("1\n0\n"),
        ),
        (
            "(let* ((a (begin (define q 1) q))) a) q",
            FailsAfter("1\n", "Unbound variable: q"),
        ),
        ("(define f 'g) (f 1)", FailsAfter("", "Not a recognized procedure: g")),
        ("(+ 1 2) (car '(1) '(2))", FailsAfter("3.000000\n", "ArityError")),
        // A syntax error prevents every form from running
        ("(+ 1 2) (+ 3", FailsAfter("", "ParseError")),
    ]);
}

#[test]
fn test_depth_limit_is_configurable() {
    let source = "(define down (lambda (n) (if (= n 0) 'done (down (- n 1))))) (down 200)";

    let mut out = Vec::new();
    run_program(source, EvalConfig::default(), &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "done\n");

    let mut out = Vec::new();
    let result = run_program(source, EvalConfig { max_depth: 100 }, &mut out);
    assert_eq!(result, Err(Error::DepthExceeded(100)));
}
