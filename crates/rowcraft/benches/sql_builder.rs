use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rowcraft::dialect::postgres::Postgres;
use rowcraft::{Condition, DynValue};

/// Build a condition with `n` equality checks:
/// col0 = $1 AND col1 = $2 AND ...
fn build_eq_chain(n: usize) -> Condition {
    let mut cond = Condition::new();
    for i in 0..n {
        cond = cond.eq(format!("col{i}"), DynValue::I64(i as i64));
    }
    cond
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/compile");

    for n in [1, 5, 10, 50, 100] {
        let cond = build_eq_chain(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &cond, |b, cond| {
            b.iter(|| black_box(cond.compile(&Postgres)));
        });
    }

    group.finish();
}

fn bench_build_and_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/build_and_compile");

    for n in [1, 5, 10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let cond = build_eq_chain(n);
                black_box(cond.compile(&Postgres));
            });
        });
    }

    group.finish();
}

fn bench_in_list_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/in_list_expansion");

    for n in [5, 20, 100, 500] {
        let values: Vec<DynValue> = (0..n).map(DynValue::I64).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                let cond = Condition::new().fragment("id IN (?)", vec![DynValue::Array(values.clone())]);
                black_box(cond.compile(&Postgres));
            });
        });
    }

    group.finish();
}

fn bench_or_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/or_composition");

    for n in [1, 5, 10, 50] {
        let alternatives: Vec<Condition> = (0..n).map(|i| Condition::new().eq(format!("col{i}"), DynValue::I64(i as i64))).collect();

        group.bench_with_input(BenchmarkId::from_parameter(n), &alternatives, |b, alts| {
            b.iter(|| {
                let cond = Condition::new().or(alts.clone());
                black_box(cond.compile(&Postgres));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_build_and_compile, bench_in_list_expansion, bench_or_composition);
criterion_main!(benches);
