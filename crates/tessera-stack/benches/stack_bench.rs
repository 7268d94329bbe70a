//! Benchmarks for Tessera stack reads

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tessera_core::Settings;
use tessera_stack::{Component, Stack};

fn populated_stack(size: i32) -> tessera_stack::VersionAwareStack {
    let stack = Stack::version_aware("bench");
    for i in 0..size {
        stack.push(
            Component::int64()
                .named(format!("f{}", i))
                .added(i % 5)
                .removed(i % 5 + 3)
                .shared(),
        );
    }
    stack
}

fn bench_stack_get_matching(c: &mut Criterion) {
    let stack = populated_stack(64);
    let settings = Settings::new().with_version(3);

    c.bench_function("stack_get_matching_64", |b| {
        b.iter(|| black_box(stack.get_matching(black_box(&settings))))
    });
}

fn bench_stack_get_unversioned(c: &mut Criterion) {
    let stack = populated_stack(64);
    let settings = Settings::new();

    c.bench_function("stack_get_unversioned", |b| {
        b.iter(|| black_box(stack.get(black_box(32), &settings)))
    });
}

fn bench_stack_push_pop(c: &mut Criterion) {
    let stack = Stack::new("bench");

    c.bench_function("stack_push_pop", |b| {
        b.iter(|| {
            stack.push(Component::int8().named("x").shared());
            black_box(stack.pop(None).ok())
        })
    });
}

criterion_group!(
    benches,
    bench_stack_get_matching,
    bench_stack_get_unversioned,
    bench_stack_push_pop,
);

criterion_main!(benches);
