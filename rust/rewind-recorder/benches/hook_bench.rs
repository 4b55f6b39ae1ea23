use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rewind_recorder::{Address, CodeInfo, FrameView, Host, Recorder, Shape, Value};
use std::io;

/// Fixed heap: handle 0 is a code object, 1 the globals, 2.. short lists.
struct Fixture;

impl Host for Fixture {
    type Object = usize;

    fn address(&self, obj: usize) -> Address {
        Address(0x1000 + obj * 0x10)
    }

    fn shape(&self, obj: usize) -> Shape<usize> {
        match obj {
            0 => Shape::Code(CodeInfo {
                filename: "/app/main.py".into(),
                name: "<module>".into(),
                first_line: 1,
                ..CodeInfo::default()
            }),
            1 => Shape::Dict {
                subtype: None,
                entries: vec![],
            },
            n => Shape::List((0..8).map(|i| Value::Int(i + n as i64)).collect()),
        }
    }
}

fn hook_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("hooks");
    let host = Fixture;
    let frame = FrameView {
        code: 0,
        filename: "/app/main.py",
        globals: 1,
        slots: &[],
    };

    for (name, base_dir) in [("traced", None), ("out_of_scope", Some("/srv"))] {
        group.bench_with_input(BenchmarkId::new("store_local", name), &base_dir, |b, base| {
            let mut rec = Recorder::with_writer(io::sink(), base.map(Into::into));
            rec.push_frame(&host, &frame);
            let value = Value::Object(2);
            b.iter(|| rec.store_local(&host, black_box(0), black_box(&value)));
        });
    }

    group.bench_function("inactive/store_local", |b| {
        let mut rec: Recorder<io::Sink> = Recorder::inactive();
        let value = Value::Int(7);
        b.iter(|| rec.store_local(&host, black_box(0), black_box(&value)));
    });

    group.finish();
}

criterion_group!(benches, hook_benchmark);
criterion_main!(benches);
