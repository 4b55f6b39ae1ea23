//! Trace encoder: turns host values into record arguments, emitting a
//! definition record the first time each object is mentioned.
//!
//! Definitions follow register-then-populate: an object's token is bound in
//! the [`IdentityRegistry`] *before* its children are walked, so a cycle back
//! to the object resolves to a plain reference instead of recursing forever.
//! Children are defined depth-first in the host's native order and the
//! parent's own `NEW_*` record is appended after all of them. The only
//! forward references the log therefore contains point at an ancestor whose
//! definition closes the same group.

use crate::host::{Address, Host, Shape, Value};
use crate::registry::{IdentityRegistry, Token};
use crate::trace::record::{Arg, Record};
use tracing::{debug, warn};

/// Nesting depth beyond which children are logged as placeholders.
pub const MAX_DEFINE_DEPTH: usize = 256;

#[derive(Debug, Default)]
pub struct Encoder {
    registry: IdentityRegistry,
    pending: Vec<Record>,
    definitions: u64,
    placeholders: u64,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Argument form of `value`: a literal for value types, otherwise a
    /// reference to the object's token (defining it first if needed).
    pub fn reference<H: Host>(&mut self, host: &H, value: &Value<H::Object>) -> Arg {
        self.reference_at(host, value, 0)
    }

    /// Token of `obj`, defining it first if it has no live token.
    pub fn define<H: Host>(&mut self, host: &H, obj: H::Object) -> Token {
        self.define_at(host, obj, 0)
    }

    /// Shorthand for `Arg::Ref(self.define(host, obj))`.
    pub fn object<H: Host>(&mut self, host: &H, obj: H::Object) -> Arg {
        Arg::Ref(self.define(host, obj))
    }

    /// Queue an event record behind any definitions already pending.
    pub fn emit(&mut self, record: Record) {
        self.pending.push(record);
    }

    /// Drain the pending record group.
    pub fn take_group(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Retire the token bound to `addr`, if any.
    pub fn forget(&mut self, addr: Address) -> Option<Token> {
        self.registry.forget(addr)
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Definition records produced so far, placeholders included.
    pub fn definitions(&self) -> u64 {
        self.definitions
    }

    pub fn placeholders(&self) -> u64 {
        self.placeholders
    }

    fn reference_at<H: Host>(&mut self, host: &H, value: &Value<H::Object>, depth: usize) -> Arg {
        match value {
            Value::None => Arg::None,
            Value::Bool(b) => Arg::Bool(*b),
            Value::Int(n) => Arg::Int(*n),
            Value::BigInt(n) => Arg::BigInt(n.clone()),
            Value::Float(x) => Arg::Float(*x),
            Value::Object(obj) => Arg::Ref(self.define_at(host, *obj, depth)),
        }
    }

    fn references<H: Host>(
        &mut self,
        host: &H,
        values: &[Value<H::Object>],
        depth: usize,
    ) -> Vec<Arg> {
        values
            .iter()
            .map(|v| self.reference_at(host, v, depth))
            .collect()
    }

    fn define_at<H: Host>(&mut self, host: &H, obj: H::Object, depth: usize) -> Token {
        let addr = host.address(obj);
        if let Some(token) = self.registry.lookup(addr) {
            return token;
        }
        if depth >= MAX_DEFINE_DEPTH {
            return self.placeholder(host, obj, depth);
        }

        let token = self.registry.mark_defined(addr);
        let child = depth + 1;
        let record = match host.shape(obj) {
            Shape::List(items) => Record::new("NEW_LIST")
                .token(token)
                .args(self.references(host, &items, child)),
            Shape::Tuple(items) => Record::new("NEW_TUPLE")
                .token(token)
                .args(self.references(host, &items, child)),
            Shape::Set(items) => Record::new("NEW_SET")
                .token(token)
                .args(self.references(host, &items, child)),
            Shape::Dict { subtype, entries } => {
                let mut args = Vec::with_capacity(entries.len() * 2);
                for (key, value) in &entries {
                    args.push(self.reference_at(host, key, child));
                    args.push(self.reference_at(host, value, child));
                }
                match subtype {
                    Some(type_name) => Record::new("NEW_DERIVED_DICT")
                        .token(token)
                        .str(type_name)
                        .args(args),
                    None => Record::new("NEW_DICT").token(token).args(args),
                }
            }
            Shape::Str(text) => Record::new("NEW_STRING").token(token).str(text),
            Shape::Instance {
                type_name,
                class,
                attributes,
            } => {
                let attributes = attributes.map(|dict| Arg::Ref(self.define_at(host, dict, child)));
                let class = self.define_at(host, class, child);
                Record::new("NEW_OBJECT")
                    .token(token)
                    .str(type_name)
                    .reference(class)
                    .args(attributes)
            }
            Shape::Module { name } => Record::new("NEW_MODULE").token(token).str(name),
            Shape::Cell { contents } => {
                let contents = match contents {
                    Some(value) => self.reference_at(host, &value, child),
                    None => Arg::None,
                };
                Record::new("NEW_CELL").token(token).arg(contents)
            }
            Shape::Code(info) => Record::new("NEW_CODE")
                .token(token)
                .str(info.filename)
                .str(info.name)
                .int(i64::from(info.first_line))
                .names(&info.varnames)
                .names(&info.cellvars)
                .names(&info.freevars),
            Shape::Function { qualname, code } => {
                let code = match code {
                    Some(code) => Arg::Ref(self.define_at(host, code, child)),
                    None => Arg::None,
                };
                Record::new("NEW_FUNCTION").token(token).str(qualname).arg(code)
            }
            Shape::Opaque { type_name } => {
                debug!(%addr, %type_name, "object category not describable, logging placeholder");
                Record::new("NEW_OPAQUE").token(token).str(type_name)
            }
        };
        self.definitions += 1;
        self.pending.push(record);
        token
    }

    /// Stand-in for an object nested too deeply to walk. The token is not
    /// bound to the object's address, so the object is defined for real the
    /// next time it is reached from a shallower point.
    fn placeholder<H: Host>(&mut self, host: &H, obj: H::Object, depth: usize) -> Token {
        let category = host.category(obj);
        warn!(depth, category, "definition depth limit reached, logging placeholder");
        let token = self.registry.issue_detached();
        self.definitions += 1;
        self.placeholders += 1;
        self.pending
            .push(Record::new("NEW_OPAQUE").token(token).str(category));
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CodeInfo;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Minimal heap: handles are addresses.
    #[derive(Default)]
    struct Heap {
        objects: HashMap<usize, Shape<usize>>,
        shapes_read: Cell<usize>,
    }

    impl Heap {
        fn put(&mut self, addr: usize, shape: Shape<usize>) -> usize {
            self.objects.insert(addr, shape);
            addr
        }
    }

    impl Host for Heap {
        type Object = usize;

        fn address(&self, obj: usize) -> Address {
            Address(obj)
        }

        fn shape(&self, obj: usize) -> Shape<usize> {
            self.shapes_read.set(self.shapes_read.get() + 1);
            self.objects.get(&obj).cloned().unwrap_or(Shape::Opaque {
                type_name: "missing".into(),
            })
        }

        fn category(&self, obj: usize) -> &'static str {
            self.objects.get(&obj).map_or("missing", Shape::category)
        }
    }

    fn lines(records: &[Record]) -> Vec<String> {
        records.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn value_types_are_literals_and_never_registered() {
        let heap = Heap::default();
        let mut enc = Encoder::new();
        assert_eq!(enc.reference(&heap, &Value::Int(5)), Arg::Int(5));
        assert_eq!(enc.reference(&heap, &Value::Int(5)), Arg::Int(5));
        assert_eq!(enc.reference(&heap, &Value::None), Arg::None);
        assert_eq!(enc.reference(&heap, &Value::Bool(true)), Arg::Bool(true));
        assert!(enc.registry().is_empty());
        assert!(!enc.has_pending());
    }

    #[test]
    fn second_mention_is_a_plain_reference() {
        let mut heap = Heap::default();
        let list = heap.put(0x10, Shape::List(vec![Value::Int(1), Value::Int(2)]));
        let mut enc = Encoder::new();

        let first = enc.reference(&heap, &Value::Object(list));
        let second = enc.reference(&heap, &Value::Object(list));
        assert_eq!(first, second);
        assert_eq!(lines(&enc.take_group()), vec!["NEW_LIST(1, 1, 2)"]);
        assert_eq!(enc.definitions(), 1);
    }

    #[test]
    fn children_are_defined_before_parent() {
        let mut heap = Heap::default();
        let key = heap.put(0x20, Shape::Str("k".into()));
        let inner = heap.put(0x30, Shape::Tuple(vec![Value::Float(0.5)]));
        let dict = heap.put(
            0x40,
            Shape::Dict {
                subtype: None,
                entries: vec![(Value::Object(key), Value::Object(inner))],
            },
        );
        let mut enc = Encoder::new();
        enc.define(&heap, dict);
        assert_eq!(
            lines(&enc.take_group()),
            vec![
                r#"NEW_STRING(2, "k")"#,
                "NEW_TUPLE(3, 0.5)",
                "NEW_DICT(1, *2, *3)",
            ]
        );
    }

    #[test]
    fn self_referencing_list_terminates() {
        let mut heap = Heap::default();
        let list = heap.put(0x50, Shape::List(vec![Value::Int(0), Value::Object(0x50)]));
        let mut enc = Encoder::new();
        enc.define(&heap, list);
        assert_eq!(lines(&enc.take_group()), vec!["NEW_LIST(1, 0, *1)"]);
    }

    #[test]
    fn instance_defines_attributes_and_class() {
        let mut heap = Heap::default();
        let class = heap.put(0x60, Shape::Opaque { type_name: "type".into() });
        let name = heap.put(0x61, Shape::Str("x".into()));
        let attrs = heap.put(
            0x62,
            Shape::Dict {
                subtype: None,
                entries: vec![(Value::Object(name), Value::Object(0x63))],
            },
        );
        heap.put(
            0x63,
            Shape::Instance {
                type_name: "Point".into(),
                class,
                attributes: Some(attrs),
            },
        );
        let mut enc = Encoder::new();
        enc.define(&heap, 0x63);
        assert_eq!(
            lines(&enc.take_group()),
            vec![
                r#"NEW_STRING(3, "x")"#,
                "NEW_DICT(2, *3, *1)",
                r#"NEW_OPAQUE(4, "type")"#,
                r#"NEW_OBJECT(1, "Point", *4, *2)"#,
            ]
        );
    }

    #[test]
    fn code_cells_and_functions() {
        let mut heap = Heap::default();
        let code = heap.put(
            0x70,
            Shape::Code(CodeInfo {
                filename: "/src/app.py".into(),
                name: "f".into(),
                first_line: 3,
                varnames: vec!["a".into()],
                cellvars: vec![],
                freevars: vec!["z".into()],
            }),
        );
        let func = heap.put(
            0x71,
            Shape::Function {
                qualname: "f".into(),
                code: Some(code),
            },
        );
        let cell = heap.put(0x72, Shape::Cell { contents: Some(Value::Object(func)) });
        let empty = heap.put(0x73, Shape::Cell { contents: None });
        let module = heap.put(0x74, Shape::Module { name: "app".into() });

        let mut enc = Encoder::new();
        enc.define(&heap, cell);
        enc.define(&heap, empty);
        enc.define(&heap, module);
        assert_eq!(
            lines(&enc.take_group()),
            vec![
                r#"NEW_CODE(3, "/src/app.py", "f", 3, 1, "a", 0, 1, "z")"#,
                r#"NEW_FUNCTION(2, "f", *3)"#,
                "NEW_CELL(1, *2)",
                "NEW_CELL(4, None)",
                r#"NEW_MODULE(5, "app")"#,
            ]
        );
    }

    #[test]
    fn derived_dict_names_its_type() {
        let mut heap = Heap::default();
        let dict = heap.put(
            0x80,
            Shape::Dict {
                subtype: Some("Counter".into()),
                entries: vec![(Value::Int(1), Value::Int(2))],
            },
        );
        let mut enc = Encoder::new();
        enc.define(&heap, dict);
        assert_eq!(
            lines(&enc.take_group()),
            vec![r#"NEW_DERIVED_DICT(1, "Counter", 1, 2)"#]
        );
    }

    #[test]
    fn forgotten_address_is_redefined_under_new_token() {
        let mut heap = Heap::default();
        let s = heap.put(0x90, Shape::Str("a".into()));
        let mut enc = Encoder::new();
        assert_eq!(enc.define(&heap, s), Token(1));
        assert_eq!(enc.forget(Address(0x90)), Some(Token(1)));
        heap.put(0x90, Shape::Str("b".into()));
        assert_eq!(enc.define(&heap, s), Token(2));
        assert_eq!(
            lines(&enc.take_group()),
            vec![r#"NEW_STRING(1, "a")"#, r#"NEW_STRING(2, "b")"#]
        );
    }

    #[test]
    fn deep_nesting_is_cut_with_placeholder() {
        let mut heap = Heap::default();
        let depth = MAX_DEFINE_DEPTH + 3;
        for i in 0..depth {
            let next = if i + 1 < depth {
                vec![Value::Object(i + 1)]
            } else {
                vec![]
            };
            heap.put(i, Shape::List(next));
        }
        let mut enc = Encoder::new();
        enc.define(&heap, 0);
        let group = enc.take_group();
        assert_eq!(enc.placeholders(), 1);
        // Only the objects actually defined had their contents read.
        assert_eq!(heap.shapes_read.get(), MAX_DEFINE_DEPTH);
        assert_eq!(group.len(), MAX_DEFINE_DEPTH + 1);
        assert_eq!(group[0].name(), "NEW_OPAQUE");
        assert_eq!(group[0].arguments()[1], Arg::str("list"));
        // The cut-off object is still unregistered.
        assert!(!enc.registry().is_defined(Address(MAX_DEFINE_DEPTH)));
    }
}
