//! Benchmarks for the compile-and-run pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ekjit::{compile_and_execute, EntryInvoker, JitEngine, ModuleCompiler};
use inkwell::context::Context;

const LOOP_SUM: &str = r#"
define i32 @run() {
entry:
  br label %loop

loop:
  %i = phi i32 [ 1, %entry ], [ %next, %loop ]
  %acc = phi i32 [ 0, %entry ], [ %sum, %loop ]
  %sum = add i32 %acc, %i
  %next = add i32 %i, 1
  %done = icmp sgt i32 %next, 1000
  br i1 %done, label %exit, label %loop

exit:
  ret i32 %sum
}
"#;

/// Benchmark a full cycle on a fresh engine, with and without the pipeline
fn bench_compile_and_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_and_execute");

    for optimize in [false, true] {
        let label = if optimize { "optimized" } else { "plain" };
        group.bench_function(label, |b| {
            b.iter(|| black_box(compile_and_execute(LOOP_SUM, optimize)))
        });
    }

    group.finish();
}

/// Benchmark re-invoking an already finalized entry point
fn bench_invoke(c: &mut Criterion) {
    let context = Context::create();
    let mut engine = JitEngine::new(&context).unwrap();
    let mut compiled = ModuleCompiler::new()
        .log_pass_changes(false)
        .compile(&mut engine, LOOP_SUM, true)
        .unwrap();
    let mut invoker = EntryInvoker::new();

    c.bench_function("invoke_loop_sum", |b| {
        b.iter(|| black_box(invoker.invoke(&engine, &mut compiled)))
    });
}

criterion_group!(benches, bench_compile_and_execute, bench_invoke);
criterion_main!(benches);
