//! This module defines the runtime value model shared by the reader and the
//! evaluator. The main enum, [`Value`], is both the parse-tree node type and the
//! result of evaluation: numbers, strings, booleans, symbols, the empty list,
//! pairs, closures, primitive procedures and the "no value" marker produced by
//! side-effecting forms. Lists are chains of [`Pair`]s terminated by
//! [`Value::Empty`].
//!
//! Ergonomic helpers such as [`val`], [`sym`], [`nil`] and [`list`] are
//! provided for building trees in code and tests. The [`Display`](std::fmt::Display)
//! implementation is the printer used by the top-level driver.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::Environment;

/// Type alias for integer values in the interpreter
pub(crate) type IntegerType = i64;

/// Canonical signature of a primitive procedure: the fully evaluated argument
/// list arrives as one list value.
pub type PrimitiveFn = fn(&Value) -> Result<Value, Error>;

/// Core value type of the interpreter.
///
/// To build a tree, use the helper functions:
/// - `val(42)`, `val(2.5)`, `val("text")`, `val(true)` for atoms
/// - `sym("name")` for symbols, `nil()` for the empty list
/// - `val([1, 2, 3])` or `list(vec![sym("op"), val(42)])` for lists
#[derive(Clone)]
pub enum Value {
    Integer(IntegerType),
    Double(f64),
    Bool(bool),
    String(String),
    Symbol(String),
    /// The empty list, a valid value in its own right
    Empty,
    /// Two-slot structural cell; the only composite type
    Pair(Rc<Pair>),
    /// User procedure created by `lambda`
    Closure(Rc<Closure>),
    /// Built-in procedure; compared by id, not by function pointer
    Primitive { id: &'static str, func: PrimitiveFn },
    /// Result of side-effecting forms with no useful value (define, set!, cond without match)
    /// Void never equals itself or any other value
    Void,
}

/// A cons cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub head: Value,
    pub tail: Value,
}

/// A procedure value: parameters, body forms and the frame it was created in.
pub struct Closure {
    pub params: Vec<String>,
    pub body: Vec<Value>,
    /// Captured by reference at creation time
    pub env: Environment,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured frame usually contains this closure, so it is not printed
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Double(d) => write!(f, "Double({d:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Empty => write!(f, "Empty"),
            Value::Pair(pair) => write!(f, "Pair({:?}, {:?})", pair.head, pair.tail),
            Value::Closure(closure) => {
                write!(
                    f,
                    "Closure(params={:?}, body={:?})",
                    closure.params, closure.body
                )
            }
            Value::Primitive { id, .. } => write!(f, "Primitive({id})"),
            Value::Void => write!(f, "Void"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as IntegerType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        list(arr.into_iter().map(Into::into))
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        list(slice.iter().cloned().map(Into::into))
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        list(iter)
    }
}

/// Build a new pair from a head and a tail
pub fn cons(head: Value, tail: Value) -> Value {
    Value::Pair(Rc::new(Pair { head, tail }))
}

/// Build a proper list (Pair chain terminated by Empty) from the given items
pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
    let items: Vec<Value> = items.into_iter().collect();
    items
        .into_iter()
        .rev()
        .fold(Value::Empty, |tail, head| cons(head, tail))
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from Rust literals
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
pub fn nil() -> Value {
    Value::Empty
}

/// Iterator over the heads of a Pair chain.
///
/// Iteration stops at the first non-pair tail; [`ListIter::rest`] then reports
/// what terminated the chain (Empty for proper lists).
pub struct ListIter<'a> {
    current: &'a Value,
}

impl<'a> ListIter<'a> {
    /// What remains of the chain: Empty once a proper list is exhausted
    pub fn rest(&self) -> &'a Value {
        self.current
    }
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current {
            Value::Pair(pair) => {
                self.current = &pair.tail;
                Some(&pair.head)
            }
            _ => None,
        }
    }
}

impl Value {
    /// Iterate over the heads of this value viewed as a list
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { current: self }
    }

    /// Collect the elements of a proper list, or None if the chain does not end in Empty
    pub fn list_items(&self) -> Option<Vec<Value>> {
        let mut iter = self.iter();
        let items: Vec<Value> = iter.by_ref().cloned().collect();
        match iter.rest() {
            Value::Empty => Some(items),
            _ => None,
        }
    }

    /// Check if a value is the empty list
    pub fn is_empty_list(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Short name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Empty => "empty list",
            Value::Pair(_) => "pair",
            Value::Closure(_) => "procedure",
            Value::Primitive { .. } => "primitive",
            Value::Void => "void",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            // Six fractional digits, the way C's %f renders doubles
            Value::Double(d) => write!(f, "{d:.6}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Empty => write!(f, "()"),
            Value::Pair(_) => {
                write!(f, "(")?;
                let mut elements = self.iter();
                if let Some(first) = elements.next() {
                    write!(f, "{first}")?;
                }
                for elem in elements.by_ref() {
                    write!(f, " {elem}")?;
                }
                match elements.rest() {
                    Value::Empty => {}
                    improper => write!(f, " . {improper}")?,
                }
                write!(f, ")")
            }
            Value::Closure(_) => write!(f, "#<procedure>"),
            Value::Primitive { id, .. } => write!(f, "#<primitive:{id}>"),
            Value::Void => write!(f, "#<void>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Empty, Value::Empty) => true,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b) || a == b,
            // Closures are equal only to themselves
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Primitive { id: id1, .. }, Value::Primitive { id: id2, .. }) => id1 == id2,
            (Value::Void, _) | (_, Value::Void) => false,
            _ => false, // Different variants are never equal
        }
    }
}
