//! Special-form handlers.
//!
//! Each handler receives its operands unevaluated, already checked against
//! the arity recorded in the builtin registry, and decides itself what to
//! evaluate and in which frame.

use super::{Environment, Evaluator};
use crate::Error;
use crate::ast::{Closure, Value};
use std::rc::Rc;

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _evaluator: &Evaluator,
    args: &[Value],
    _env: &Environment,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            match evaluator.eval_with_depth_tracking(condition_expr, env, depth + 1)? {
                Value::Bool(true) => evaluator.eval_with_depth_tracking(then_expr, env, depth + 1),
                Value::Bool(false) => {
                    evaluator.eval_with_depth_tracking(else_expr, env, depth + 1)
                }
                other => Err(Error::TypeError(format!(
                    "if condition must be a boolean, got {} {other}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// Evaluate cond special form.
///
/// Every clause is `(condition body)`; the literal symbol `else` always matches.
pub(crate) fn eval_cond(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    for clause in args {
        let (test, body) = match clause.list_items().as_deref() {
            Some([test, body]) => (test.clone(), body.clone()),
            _ => {
                return Err(Error::EvalError(format!(
                    "cond clause must hold a condition and exactly one body expression, got {clause}"
                )));
            }
        };

        if matches!(&test, Value::Symbol(name) if name == "else") {
            return evaluator.eval_with_depth_tracking(&body, env, depth + 1);
        }

        match evaluator.eval_with_depth_tracking(&test, env, depth + 1)? {
            Value::Bool(true) => return evaluator.eval_with_depth_tracking(&body, env, depth + 1),
            Value::Bool(false) => {}
            other => {
                return Err(Error::TypeError(format!(
                    "cond condition must be a boolean, got {} {other}",
                    other.type_name()
                )));
            }
        }
    }

    Ok(Value::Void)
}

macro_rules! boolean_logic_op {
    ($name:ident, $op_name:expr, $short_circuit:literal, $default:literal) => {
        pub(crate) fn $name(
            evaluator: &Evaluator,
            args: &[Value],
            env: &Environment,
            depth: usize,
        ) -> Result<Value, Error> {
            // Evaluate left to right, stopping at the deciding operand
            for arg in args {
                match evaluator.eval_with_depth_tracking(arg, env, depth + 1)? {
                    Value::Bool($short_circuit) => return Ok(Value::Bool($short_circuit)),
                    Value::Bool(_) => continue,
                    other => {
                        return Err(Error::TypeError(format!(
                            "'{}' requires boolean arguments (no truthiness), got {} {other}",
                            $op_name,
                            other.type_name()
                        )));
                    }
                }
            }

            Ok(Value::Bool($default))
        }
    };
}

// Generate boolean logic functions
boolean_logic_op!(eval_and, "and", false, true);
boolean_logic_op!(eval_or, "or", true, false);

/// Evaluate begin special form
pub(crate) fn eval_begin(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::arity_error(1, 0));
    }
    evaluator.eval_sequence(args, env, depth)
}

/// Evaluate define special form
pub(crate) fn eval_define(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = evaluator.eval_with_depth_tracking(expr, env, depth + 1)?;
            env.define(name.clone(), value);
            Ok(Value::Void)
        }
        [target, _] => Err(Error::TypeError(format!(
            "define requires a symbol, got {} {target}",
            target.type_name()
        ))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate set! special form
pub(crate) fn eval_set(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = evaluator.eval_with_depth_tracking(expr, env, depth + 1)?;
            env.set(name, value)?;
            Ok(Value::Void)
        }
        [target, _] => Err(Error::TypeError(format!(
            "set! requires a symbol, got {} {target}",
            target.type_name()
        ))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    _evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    _depth: usize,
) -> Result<Value, Error> {
    let [param_list, body @ ..] = args else {
        return Err(Error::arity_error(2, args.len()));
    };
    if body.is_empty() {
        return Err(Error::arity_error(2, args.len()));
    }

    // Fixed arity only: neither `(lambda args ...)` nor dotted rest parameters
    let Some(param_items) = param_list.list_items() else {
        return Err(Error::TypeError(format!(
            "lambda parameters must be a list, got {param_list}"
        )));
    };

    let mut params: Vec<String> = Vec::with_capacity(param_items.len());
    for param in param_items {
        match param {
            Value::Symbol(name) => {
                if params.contains(&name) {
                    return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
                }
                params.push(name);
            }
            other => {
                return Err(Error::TypeError(format!(
                    "lambda parameters must be symbols, got {other}"
                )));
            }
        }
    }

    Ok(Value::Closure(Rc::new(Closure {
        params,
        body: body.to_vec(),
        env: env.clone(),
    })))
}

/// Validate a `((name expr) ...)` binding list
fn binding_pairs(form: &str, bindings: &Value) -> Result<Vec<(String, Value)>, Error> {
    let items = bindings.list_items().ok_or_else(|| {
        Error::EvalError(format!("{form}: bindings must be a list, got {bindings}"))
    })?;
    if items.is_empty() {
        return Err(Error::EvalError(format!(
            "{form}: binding list must not be empty"
        )));
    }

    items
        .iter()
        .map(|binding| match binding.list_items().as_deref() {
            Some([Value::Symbol(name), expr]) => Ok((name.clone(), expr.clone())),
            _ => Err(Error::EvalError(format!(
                "{form}: malformed binding {binding}, expected (name value)"
            ))),
        })
        .collect()
}

/// Split operands into the binding list and the body form whose value is returned.
/// Earlier body forms are skipped, not evaluated.
fn split_let_form<'a>(form: &str, args: &'a [Value]) -> Result<(&'a Value, &'a Value), Error> {
    match args {
        [bindings, .., last] => Ok((bindings, last)),
        _ => Err(Error::arity_error_with_expr(2, args.len(), form.to_owned())),
    }
}

/// Evaluate let special form: every value is computed in the enclosing frame
pub(crate) fn eval_let(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let (bindings, body) = split_let_form("let", args)?;

    let mut values = Vec::new();
    for (name, expr) in binding_pairs("let", bindings)? {
        values.push((name, evaluator.eval_with_depth_tracking(&expr, env, depth + 1)?));
    }

    let frame = Environment::with_parent(env);
    for (name, value) in values {
        frame.define(name, value);
    }

    evaluator.eval_with_depth_tracking(body, &frame, depth + 1)
}

/// Evaluate let* special form: one chained frame per binding
pub(crate) fn eval_let_star(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let (bindings, body) = split_let_form("let*", args)?;

    // Each value is computed in the frame that will hold its binding
    let mut frame = Environment::with_parent(env);
    for (name, expr) in binding_pairs("let*", bindings)? {
        let value = evaluator.eval_with_depth_tracking(&expr, &frame, depth + 1)?;
        frame.define(name, value);
        frame = Environment::with_parent(&frame);
    }

    evaluator.eval_with_depth_tracking(body, &frame, depth + 1)
}

/// Evaluate letrec special form.
///
/// Values are computed in a growing chain of frames below `env`, but each
/// binding is recorded in `env` itself, so the names stay visible after the
/// form returns.
pub(crate) fn eval_letrec(
    evaluator: &Evaluator,
    args: &[Value],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let (bindings, body) = split_let_form("letrec", args)?;

    let mut frame = Environment::with_parent(env);
    for (name, expr) in binding_pairs("letrec", bindings)? {
        let value = evaluator.eval_with_depth_tracking(&expr, &frame, depth + 1)?;
        env.define(name, value);
        frame = Environment::with_parent(&frame);
    }

    evaluator.eval_with_depth_tracking(body, &frame, depth + 1)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, sym, val};
    use crate::evaluator::create_global_env;
    use pretty_assertions::assert_eq;

    fn run(
        handler: crate::builtinops::SpecialFormFn,
        args: Vec<Value>,
        env: &Environment,
    ) -> Result<Value, Error> {
        handler(&Evaluator::default(), &args, env, 0)
    }

    #[test]
    fn test_handlers_called_directly() {
        let env = create_global_env();

        assert_eq!(
            run(eval_quote, vec![list(vec![sym("a"), val(1)])], &env).unwrap(),
            list(vec![sym("a"), val(1)])
        );
        assert_eq!(
            run(eval_if, vec![val(false), val(1), val(2)], &env).unwrap(),
            val(2)
        );
        assert_eq!(
            run(eval_if, vec![val(true), val(1)], &env),
            Err(Error::arity_error(3, 2))
        );
        assert_eq!(run(eval_and, vec![], &env).unwrap(), val(true));
        assert_eq!(run(eval_or, vec![], &env).unwrap(), val(false));
        assert!(run(eval_begin, vec![], &env).is_err());
    }

    #[test]
    fn test_define_and_set_return_void() {
        let env = create_global_env();
        let defined = run(eval_define, vec![sym("x"), val(1)], &env).unwrap();
        assert!(defined.is_void());

        let set = run(eval_set, vec![sym("x"), val(2)], &env).unwrap();
        assert!(set.is_void());
        assert_eq!(env.lookup("x").unwrap(), val(2));

        assert_eq!(
            run(eval_set, vec![sym("nope"), val(2)], &env),
            Err(Error::UndefinedMutation("nope".to_owned()))
        );
    }

    #[test]
    fn test_lambda_captures_current_frame() {
        let global = create_global_env();
        let inner = Environment::with_parent(&global);

        let closure = run(
            eval_lambda,
            vec![list(vec![sym("a"), sym("b")]), sym("a"), sym("b")],
            &inner,
        )
        .unwrap();

        match closure {
            Value::Closure(closure) => {
                assert_eq!(closure.params, vec!["a".to_owned(), "b".to_owned()]);
                assert_eq!(closure.body, vec![sym("a"), sym("b")]);
                assert_eq!(closure.env, inner);
            }
            other => panic!("expected closure, got {other:?}"),
        }
    }

    #[test]
    fn test_binding_list_validation() {
        let cases = vec![
            (val([list(vec![sym("x"), val(1)])]), true),
            (val([list(vec![sym("x"), val(1)]), list(vec![sym("y"), sym("x")])]), true),
            (Value::Empty, false),
            (sym("x"), false),
            (val([list(vec![sym("x")])]), false),
            (val([list(vec![sym("x"), val(1), val(2)])]), false),
            (val([list(vec![val(1), val(1)])]), false),
            (val([sym("x")]), false),
        ];

        for (i, (bindings, ok)) in cases.into_iter().enumerate() {
            assert_eq!(
                binding_pairs("let", &bindings).is_ok(),
                ok,
                "binding case #{} ({bindings})",
                i + 1
            );
        }
    }

    #[test]
    fn test_letrec_writes_into_enclosing_frame() {
        let global = create_global_env();
        let outer = Environment::with_parent(&global);

        let result = run(
            eval_letrec,
            vec![val([list(vec![sym("r"), val(9)])]), sym("r")],
            &outer,
        )
        .unwrap();

        assert_eq!(result, val(9));
        assert_eq!(outer.get("r"), Some(val(9)));
        assert_eq!(global.get("r"), None);
    }

    #[test]
    fn test_let_does_not_touch_enclosing_frame() {
        let env = create_global_env();
        let result = run(
            eval_let,
            vec![val([list(vec![sym("t"), val(3)])]), sym("t")],
            &env,
        )
        .unwrap();

        assert_eq!(result, val(3));
        assert_eq!(env.get("t"), None);
    }

    #[test]
    fn test_let_star_defines_stay_in_binding_frames() {
        let env = create_global_env();
        env.define("q", val(0));

        // (let* ((a (begin (define q 1) q))) a)
        let first_value = list(vec![
            sym("begin"),
            list(vec![sym("define"), sym("q"), val(1)]),
            sym("q"),
        ]);
        let result = run(
            eval_let_star,
            vec![val([list(vec![sym("a"), first_value])]), sym("a")],
            &env,
        )
        .unwrap();

        assert_eq!(result, val(1));
        assert_eq!(env.get("q"), Some(val(0)));
        assert_eq!(env.get("a"), None);
    }
}
