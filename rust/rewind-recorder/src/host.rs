//! The recorder's view of the host runtime.
//!
//! The host owns every object. The recorder only ever sees an opaque,
//! `Copy` handle for the duration of a single hook call, asks the host for
//! the handle's current heap address and for its [`Shape`], and never keeps
//! the handle afterwards.
//!
//! Object categories form a closed set. A host binding that meets an object
//! it cannot describe reports it as [`Shape::Opaque`] and the recorder logs a
//! placeholder instead of failing.

use num_bigint::BigInt;
use std::fmt;

/// Raw heap address of a host object at the moment it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub usize);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Object model of the traced runtime.
pub trait Host {
    /// Non-owning handle to a live host object.
    type Object: Copy;

    /// Current heap address of `obj`. Addresses may be reused after the host
    /// reports a deallocation.
    fn address(&self, obj: Self::Object) -> Address;

    /// Category and contents of `obj`, in the host's native iteration order.
    fn shape(&self, obj: Self::Object) -> Shape<Self::Object>;

    /// Category name of `obj`, as [`Shape::category`]. Hosts that can tell
    /// the category without materializing contents should override this.
    fn category(&self, obj: Self::Object) -> &'static str {
        self.shape(obj).category()
    }

    /// Whether two handles denote the same object.
    fn same_object(&self, a: Self::Object, b: Self::Object) -> bool {
        self.address(a) == self.address(b)
    }
}

/// A value as seen at a hook site.
///
/// `None`, `Bool`, `Int`, `BigInt` and `Float` are value types: they are
/// always written as literals and never receive an identity token.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<O> {
    None,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Object(O),
}

impl<O: Copy> Value<O> {
    /// The object handle, if this is not a value type.
    pub fn as_object(&self) -> Option<O> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn is_value_type(&self) -> bool {
        !matches!(self, Value::Object(_))
    }
}

impl<O> From<bool> for Value<O> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<O> From<i64> for Value<O> {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl<O> From<f64> for Value<O> {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<O> From<BigInt> for Value<O> {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

/// Category and contents of a host object.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<O> {
    /// Mutable sequence.
    List(Vec<Value<O>>),
    /// Immutable sequence.
    Tuple(Vec<Value<O>>),
    Set(Vec<Value<O>>),
    /// Associative mapping. `subtype` names a user subclass of the builtin
    /// mapping type, if any.
    Dict {
        subtype: Option<String>,
        entries: Vec<(Value<O>, Value<O>)>,
    },
    Str(String),
    /// Object with fields. Field values live in `attributes`, the object's
    /// attribute dictionary, which is tracked as an object of its own.
    Instance {
        type_name: String,
        class: O,
        attributes: Option<O>,
    },
    Module {
        name: String,
    },
    /// Closure cell; `None` when the cell is empty.
    Cell {
        contents: Option<Value<O>>,
    },
    Code(CodeInfo),
    Function {
        qualname: String,
        code: Option<O>,
    },
    /// Anything the host binding cannot describe.
    Opaque {
        type_name: String,
    },
}

impl<O> Shape<O> {
    /// Short category name, used in diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Shape::List(_) => "list",
            Shape::Tuple(_) => "tuple",
            Shape::Set(_) => "set",
            Shape::Dict { .. } => "dict",
            Shape::Str(_) => "str",
            Shape::Instance { .. } => "object",
            Shape::Module { .. } => "module",
            Shape::Cell { .. } => "cell",
            Shape::Code(_) => "code",
            Shape::Function { .. } => "function",
            Shape::Opaque { .. } => "opaque",
        }
    }
}

/// Static metadata of a code object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeInfo {
    pub filename: String,
    pub name: String,
    pub first_line: u32,
    pub varnames: Vec<String>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
}

/// A call frame at entry or exit.
#[derive(Debug, Clone)]
pub struct FrameView<'a, O> {
    /// The frame's code object.
    pub code: O,
    /// Source file of the code, used for scope filtering.
    pub filename: &'a str,
    /// Global namespace the frame executes in.
    pub globals: O,
    /// Parameter, cell and free variable slots, in that order. `None` marks
    /// a slot that is not bound yet.
    pub slots: &'a [Option<Value<O>>],
}

/// Free-form instrumentation point.
#[derive(Debug, Clone)]
pub struct Diagnostic<O> {
    pub label: String,
    /// Current source line of the executing frame.
    pub line: u32,
    pub values: Vec<Value<O>>,
}

impl<O> Diagnostic<O> {
    pub fn new(label: impl Into<String>, line: u32) -> Self {
        Diagnostic {
            label: label.into(),
            line,
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: Value<O>) -> Self {
        self.values.push(value);
        self
    }
}

/// Slice bounds of a subscript assignment or deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceBounds {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_types_are_not_objects() {
        let values: Vec<Value<u32>> = vec![
            Value::None,
            true.into(),
            7i64.into(),
            1.5f64.into(),
            BigInt::from(10).pow(30).into(),
        ];
        assert!(values.iter().all(Value::is_value_type));
        assert!(values.iter().all(|v| v.as_object().is_none()));
        assert_eq!(Value::Object(3u32).as_object(), Some(3));
    }

    #[test]
    fn address_displays_as_hex() {
        assert_eq!(Address(255).to_string(), "0xff");
    }
}
