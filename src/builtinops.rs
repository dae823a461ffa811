//! Built-in operations registry: primitive procedures and special forms.
//!
//! ## Functions vs Special Forms
//!
//! - **Primitives**: receive their fully evaluated argument list as one list
//!   value (e.g. `+`, `car`, `cons`). They are bound in the global frame and
//!   can be passed around like any other value.
//! - **Special Forms**: receive their operands unevaluated and control
//!   evaluation themselves (e.g. `if`, `let`, `set!`). They are recognized by
//!   keyword before the head of an application is looked up, so a user binding
//!   named `if` can never shadow the `if` form.
//!
//! ## Error Handling
//!
//! Argument counts are checked against the registry arity before a primitive
//! runs; each primitive then validates its operand types. Violations are
//! reported with the operation's name:
//!
//! - **Type Safety**: `(+ 1 "a")` and `(car 5)` are errors
//! - **Arity Checking**: `(- 1 2 3)` and `(car '(1) '(2))` are errors
//! - **Floating Results**: `+`, `-`, `*` and `/` always produce doubles,
//!   even for all-integer input
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature `fn(args: &Value) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its Scheme identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::{IntegerType, PrimitiveFn, Value, cons};
use crate::evaluator::Environment;
use crate::evaluator::Evaluator;
use crate::evaluator::specialforms::{
    eval_and, eval_begin, eval_cond, eval_define, eval_if, eval_lambda, eval_let, eval_let_star,
    eval_letrec, eval_or, eval_quote, eval_set,
};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Signature of a special-form handler: unevaluated operands, the current
/// frame and the current evaluation depth.
pub type SpecialFormFn = fn(&Evaluator, &[Value], &Environment, usize) -> Result<Value, Error>;

/// Expected number of arguments for an operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid
    pub fn validate(&self, arg_count: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(n) if arg_count != n => Err(Error::arity_error(n, arg_count)),
            Arity::AtLeast(n) if arg_count < n => Err(Error::arity_error(n, arg_count)),
            _ => Ok(()),
        }
    }

    /// Like [`Arity::validate`], naming the operation in the error
    pub(crate) fn validate_for(&self, id: &str, arg_count: usize) -> Result<(), Error> {
        self.validate(arg_count).map_err(|err| match err {
            Error::ArityError { expected, got, .. } => {
                Error::arity_error_with_expr(expected, got, id.to_owned())
            }
            other => other,
        })
    }
}

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Procedure applied to the evaluated argument list
    Primitive(PrimitiveFn),
    /// Syntax handler given the unevaluated operands
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Primitive(_) => write!(f, "Primitive(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The identifier this operation is bound to or recognized by
    pub scheme_id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments (operands, for special forms)
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    /// Check an argument (or operand) count against the registered arity
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate_for(self.scheme_id, arg_count)
    }
}

//
// Argument validation helpers
//

/// Split an evaluated argument list into exactly `N` values
fn exact_args<const N: usize>(id: &str, args: &Value) -> Result<[Value; N], Error> {
    let items = argument_items(id, args)?;
    let got = items.len();
    <[Value; N]>::try_from(items).map_err(|_| Error::arity_error_with_expr(N, got, id.to_owned()))
}

fn argument_items(id: &str, args: &Value) -> Result<Vec<Value>, Error> {
    args.list_items()
        .ok_or_else(|| Error::EvalError(format!("{id}: argument list is not a proper list")))
}

/// Promote an integer or double operand to a double
fn numeric_operand(id: &str, value: &Value) -> Result<f64, Error> {
    match value {
        Value::Integer(n) => Ok(*n as f64),
        Value::Double(d) => Ok(*d),
        other => Err(Error::TypeError(format!(
            "{id} requires numeric arguments, got {} {other}",
            other.type_name()
        ))),
    }
}

fn integer_operand(id: &str, value: &Value) -> Result<IntegerType, Error> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(Error::TypeError(format!(
            "{id} requires integer arguments, got {} {other}",
            other.type_name()
        ))),
    }
}

//
// Primitive implementations
//

// Folding arithmetic over any number of operands; the result is always a double
macro_rules! numeric_fold {
    ($name:ident, $op_str:expr, $identity:expr, $op:tt) => {
        fn $name(args: &Value) -> Result<Value, Error> {
            let mut total: f64 = $identity;
            for arg in argument_items($op_str, args)?.iter() {
                total = total $op numeric_operand($op_str, arg)?;
            }
            Ok(Value::Double(total))
        }
    };
}

numeric_fold!(builtin_add, "+", 0.0, +);
numeric_fold!(builtin_mul, "*", 1.0, *);

// Binary arithmetic on exactly two operands, producing a double
macro_rules! numeric_binary {
    ($name:ident, $op_str:expr, $op:tt) => {
        fn $name(args: &Value) -> Result<Value, Error> {
            let [first, second] = exact_args::<2>($op_str, args)?;
            let a = numeric_operand($op_str, &first)?;
            let b = numeric_operand($op_str, &second)?;
            Ok(Value::Double(a $op b))
        }
    };
}

numeric_binary!(builtin_sub, "-", -);
numeric_binary!(builtin_div, "/", /);

// Comparisons on exactly two numeric operands, done in floating point
macro_rules! numeric_comparison {
    ($name:ident, $op_str:expr, $op:tt) => {
        fn $name(args: &Value) -> Result<Value, Error> {
            let [first, second] = exact_args::<2>($op_str, args)?;
            let a = numeric_operand($op_str, &first)?;
            let b = numeric_operand($op_str, &second)?;
            Ok(Value::Bool(a $op b))
        }
    };
}

numeric_comparison!(builtin_gt, ">", >);
numeric_comparison!(builtin_lt, "<", <);
numeric_comparison!(builtin_eq, "=", ==);

fn builtin_modulo(args: &Value) -> Result<Value, Error> {
    let [first, second] = exact_args::<2>("modulo", args)?;
    let a = integer_operand("modulo", &first)?;
    let b = integer_operand("modulo", &second)?;
    if b == 0 {
        return Err(Error::EvalError("modulo by zero".to_owned()));
    }
    // Truncated remainder: the sign follows the dividend
    Ok(Value::Integer(a.wrapping_rem(b)))
}

fn builtin_null(args: &Value) -> Result<Value, Error> {
    let [value] = exact_args::<1>("null?", args)?;
    // Look through nested one-element wrappers down to the innermost head
    let mut innermost = &value;
    while let Value::Pair(pair) = innermost {
        innermost = &pair.head;
    }
    Ok(Value::Bool(innermost.is_empty_list()))
}

fn builtin_car(args: &Value) -> Result<Value, Error> {
    match exact_args::<1>("car", args)? {
        [Value::Pair(pair)] => Ok(pair.head.clone()),
        [other] => Err(Error::TypeError(format!(
            "car requires a non-empty pair, got {} {other}",
            other.type_name()
        ))),
    }
}

fn builtin_cdr(args: &Value) -> Result<Value, Error> {
    match exact_args::<1>("cdr", args)? {
        [Value::Pair(pair)] => Ok(pair.tail.clone()),
        [other] => Err(Error::TypeError(format!(
            "cdr requires a non-empty pair, got {} {other}",
            other.type_name()
        ))),
    }
}

fn builtin_cons(args: &Value) -> Result<Value, Error> {
    let [head, tail] = exact_args::<2>("cons", args)?;
    Ok(cons(head, tail))
}

/// Global registry of all built-in operations.
///
/// Kept as a single contiguous collection for ease of auditing; the lookup
/// maps below are derived from it once at initialization time.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn primitive(scheme_id: &'static str, func: PrimitiveFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::Primitive(func),
            arity,
        }
    }

    fn special_form(scheme_id: &'static str, handler: SpecialFormFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::SpecialForm(handler),
            arity,
        }
    }

    vec![
        // Arithmetic operations
        primitive("+", builtin_add, Arity::Any),
        primitive("-", builtin_sub, Arity::Exact(2)),
        primitive("*", builtin_mul, Arity::Any),
        primitive("/", builtin_div, Arity::Exact(2)),
        primitive("modulo", builtin_modulo, Arity::Exact(2)),
        // Comparison operations
        primitive(">", builtin_gt, Arity::Exact(2)),
        primitive("<", builtin_lt, Arity::Exact(2)),
        primitive("=", builtin_eq, Arity::Exact(2)),
        // List operations
        primitive("null?", builtin_null, Arity::Exact(1)),
        primitive("car", builtin_car, Arity::Exact(1)),
        primitive("cdr", builtin_cdr, Arity::Exact(1)),
        primitive("cons", builtin_cons, Arity::Exact(2)),
        // Control flow
        special_form("if", eval_if, Arity::Exact(3)),
        special_form("cond", eval_cond, Arity::Any),
        special_form("and", eval_and, Arity::Any),
        special_form("or", eval_or, Arity::Any),
        special_form("begin", eval_begin, Arity::AtLeast(1)),
        // Binding forms
        special_form("let", eval_let, Arity::AtLeast(2)),
        special_form("let*", eval_let_star, Arity::AtLeast(2)),
        special_form("letrec", eval_letrec, Arity::AtLeast(2)),
        // Definition, mutation and procedures
        special_form("define", eval_define, Arity::Exact(2)),
        special_form("set!", eval_set, Arity::Exact(2)),
        special_form("lambda", eval_lambda, Arity::AtLeast(2)),
        special_form("quote", eval_quote, Arity::Exact(1)),
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use the find_* functions)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Resolve a reserved keyword to its special-form handler and operand arity
pub(crate) fn find_special_form(id: &str) -> Option<(SpecialFormFn, Arity)> {
    match find_scheme_op(id) {
        Some(BuiltinOp {
            op_kind: OpKind::SpecialForm(handler),
            arity,
            ..
        }) => Some((*handler, *arity)),
        _ => None,
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, nil, sym, val};
    use pretty_assertions::assert_eq;

    /// Invoke a primitive through the registry with the given (already evaluated) arguments
    fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, Error> {
        let op = find_scheme_op(name).expect("builtin not found");
        match op.op_kind {
            OpKind::Primitive(func) => {
                op.validate_arity(args.len())?;
                func(&list(args))
            }
            OpKind::SpecialForm(_) => {
                panic!("expected primitive in tests, got special form: {name}")
            }
        }
    }

    /// Micro-helper for success cases
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    fn is_special_form(op: &BuiltinOp) -> bool {
        matches!(op.op_kind, OpKind::SpecialForm(_))
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_scheme_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        assert!(!is_special_form(add_op));

        let if_op = find_scheme_op("if").unwrap();
        assert!(is_special_form(if_op));
        assert_eq!(if_op.arity, Arity::Exact(3));

        for keyword in [
            "if", "let", "let*", "letrec", "quote", "define", "lambda", "begin", "set!", "and",
            "or", "cond",
        ] {
            assert!(
                find_special_form(keyword).is_some(),
                "{keyword} should be a special form"
            );
        }
        assert_eq!(
            get_builtin_ops()
                .iter()
                .filter(|op| is_special_form(op))
                .count(),
            12
        );

        // Primitives are not special forms
        assert!(find_special_form("car").is_none());
        assert!(find_scheme_op("unknown").is_none());
    }

    #[test]
    fn test_arity_validate() {
        assert!(Arity::Exact(2).validate(2).is_ok());
        assert_eq!(Arity::Exact(2).validate(3), Err(Error::arity_error(2, 3)));
        assert!(Arity::AtLeast(1).validate(4).is_ok());
        assert_eq!(Arity::AtLeast(1).validate(0), Err(Error::arity_error(1, 0)));
        assert!(Arity::Any.validate(0).is_ok());
    }

    #[test]
    fn test_registry_arity_names_the_operation() {
        let car = find_scheme_op("car").unwrap();
        assert!(car.validate_arity(1).is_ok());
        assert_eq!(
            car.validate_arity(2),
            Err(Error::arity_error_with_expr(1, 2, "car".to_owned()))
        );

        let cons_op = find_scheme_op("cons").unwrap();
        assert_eq!(
            cons_op.validate_arity(0),
            Err(Error::arity_error_with_expr(2, 0, "cons".to_owned()))
        );

        let lambda = find_scheme_op("lambda").unwrap();
        assert_eq!(
            lambda.validate_arity(1),
            Err(Error::arity_error_with_expr(2, 1, "lambda".to_owned()))
        );
        assert!(find_scheme_op("+").unwrap().validate_arity(7).is_ok());
        assert!(Arity::Any.validate_for("and", 0).is_ok());
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let test_cases: Vec<TestCase> = vec![
            // Addition and multiplication always return doubles
            test!("+", vec![], success(0.0)),
            test!("+", vec![val(3), val(4)], success(7.0)),
            test!("+", vec![val(1), val(2.5), val(3)], success(6.5)),
            test!("+", vec![val("a")], None),
            test!("*", vec![], success(1.0)),
            test!("*", vec![val(2), val(3)], success(6.0)),
            test!("*", vec![val(2), val(true)], None),
            // Subtraction and division take exactly two operands
            test!("-", vec![val(10), val(4)], success(6.0)),
            test!("-", vec![val(1.5), val(2)], success(-0.5)),
            test!("-", vec![val(5)], None),
            test!("-", vec![val(1), val(2), val(3)], None),
            test!("/", vec![val(7), val(2)], success(3.5)),
            test!("/", vec![val(1), val("x")], None),
            test!("/", vec![val(1)], None),
            // Comparisons
            test!(">", vec![val(3), val(2)], success(true)),
            test!(">", vec![val(2), val(3.5)], success(false)),
            test!("<", vec![val(2), val(3)], success(true)),
            test!("=", vec![val(2), val(2.0)], success(true)),
            test!("=", vec![val(2), val(3)], success(false)),
            test!("=", vec![val("a"), val("a")], None),
            test!("<", vec![val(1)], None),
            // modulo is integer-only and keeps integer results
            test!("modulo", vec![val(7), val(3)], success(1)),
            test!("modulo", vec![val(-7), val(2)], success(-1)),
            test!("modulo", vec![val(7.0), val(3)], None),
            test!("modulo", vec![val(7), val(0)], None),
            test!("modulo", vec![val(7)], None),
            // null? looks through one-element wrappers
            test!("null?", vec![nil()], success(true)),
            test!("null?", vec![val(0)], success(false)),
            test!("null?", vec![val([1, 2])], success(false)),
            test!("null?", vec![list(vec![nil()])], success(true)),
            test!("null?", vec![list(vec![nil(), val(1)])], success(true)),
            test!("null?", vec![], None),
            test!("null?", vec![nil(), nil()], None),
            // car / cdr require exactly one non-empty pair
            test!("car", vec![val([1, 2, 3])], success(1)),
            test!("cdr", vec![val([1, 2, 3])], success([2, 3])),
            test!("cdr", vec![val([1])], Some(nil())),
            test!("car", vec![nil()], None),
            test!("cdr", vec![val(5)], None),
            test!("car", vec![val([1]), val([2])], None),
            test!("car", vec![], None),
            // cons builds a pair of its two arguments
            test!("cons", vec![val(1), nil()], success([1])),
            test!("cons", vec![sym("a"), val([2, 3])], Some(list(vec![sym("a"), val(2), val(3)]))),
            test!("cons", vec![val(1), val(2)], Some(cons(val(1), val(2)))),
            test!("cons", vec![val(1)], None),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            match (actual, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "case #{} ({name})", i + 1)
                }
                (Err(_), None) => {}
                (Ok(actual), None) => {
                    panic!("case #{} ({name}): expected error, got {actual:?}", i + 1)
                }
                (Err(err), Some(expected)) => panic!(
                    "case #{} ({name}): expected {expected:?}, got error {err:?}",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_primitive_error_kinds() {
        assert!(matches!(
            call_builtin("car", vec![val([1]), val([2])]),
            Err(Error::ArityError {
                expected: 1,
                got: 2,
                ..
            })
        ));
        assert!(matches!(
            call_builtin("car", vec![val(5)]),
            Err(Error::TypeError(_))
        ));
        let err = call_builtin("+", vec![val(1), val("hello")]).unwrap_err();
        assert!(format!("{err}").contains("+ requires numeric arguments"));
    }
}
