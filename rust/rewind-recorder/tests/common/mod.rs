//! In-memory host used by the integration tests.
//!
//! Handles index an arena; addresses come from a separate allocator that
//! hands freed addresses back out first, so tests can reproduce address
//! reuse deterministically.

#![allow(dead_code)]

use rewind_recorder::{Address, CodeInfo, FrameView, Host, Shape, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obj(pub usize);

#[derive(Default)]
pub struct Heap {
    objects: Vec<(Address, Shape<Obj>)>,
    free: Vec<usize>,
    next_addr: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, shape: Shape<Obj>) -> Obj {
        let addr = match self.free.pop() {
            Some(addr) => addr,
            None => {
                self.next_addr += 0x10;
                0x7f00_0000 + self.next_addr
            }
        };
        self.objects.push((Address(addr), shape));
        Obj(self.objects.len() - 1)
    }

    /// Release `obj`'s address for reuse by the next allocation.
    pub fn free(&mut self, obj: Obj) {
        self.free.push(self.objects[obj.0].0 .0);
    }

    pub fn set(&mut self, obj: Obj, shape: Shape<Obj>) {
        self.objects[obj.0].1 = shape;
    }

    pub fn list(&mut self, items: Vec<Value<Obj>>) -> Obj {
        self.alloc(Shape::List(items))
    }

    pub fn dict(&mut self, entries: Vec<(Value<Obj>, Value<Obj>)>) -> Obj {
        self.alloc(Shape::Dict {
            subtype: None,
            entries,
        })
    }

    pub fn str(&mut self, text: &str) -> Obj {
        self.alloc(Shape::Str(text.to_string()))
    }

    pub fn code(&mut self, filename: &str, name: &str) -> Obj {
        self.alloc(Shape::Code(CodeInfo {
            filename: filename.to_string(),
            name: name.to_string(),
            first_line: 1,
            ..CodeInfo::default()
        }))
    }
}

impl Host for Heap {
    type Object = Obj;

    fn address(&self, obj: Obj) -> Address {
        self.objects[obj.0].0
    }

    fn shape(&self, obj: Obj) -> Shape<Obj> {
        self.objects[obj.0].1.clone()
    }
}

/// Code object and globals of one function, plus its filename.
pub struct Func {
    pub code: Obj,
    pub globals: Obj,
    pub filename: String,
}

impl Func {
    pub fn new(heap: &mut Heap, filename: &str, name: &str) -> Self {
        Func {
            code: heap.code(filename, name),
            globals: heap.dict(vec![]),
            filename: filename.to_string(),
        }
    }

    pub fn frame<'a>(&'a self, slots: &'a [Option<Value<Obj>>]) -> FrameView<'a, Obj> {
        FrameView {
            code: self.code,
            filename: &self.filename,
            globals: self.globals,
            slots,
        }
    }
}

pub fn obj(o: Obj) -> Value<Obj> {
    Value::Object(o)
}

pub fn ints(values: &[i64]) -> Vec<Value<Obj>> {
    values.iter().map(|n| Value::Int(*n)).collect()
}

pub fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
