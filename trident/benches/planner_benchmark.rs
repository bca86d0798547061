/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate criterion;
extern crate trident;

use criterion::*;
use shared::terms::TriplePattern;
use shared::triple::Triple;
use trident::dataset::Dataset;
use trident::exec::Executor;
use trident::optimizer::JoinOrderOptimizer;
use trident::storage::SixIndices;

fn synthetic_triples(n: usize) -> Vec<Triple> {
    (0..n)
        .map(|i| {
            Triple::new(
                format!("http://example.org/employee{}", i % (n / 10).max(1)),
                format!("http://example.org/p{}", i % 12),
                format!("value{}", i % 97),
            )
        })
        .collect()
}

fn setup_dataset(n: usize) -> Dataset {
    let mut dataset = Dataset::default();
    dataset.default_graph_mut().begin_bulk_load().ok();
    for triple in synthetic_triples(n) {
        dataset.add_triple(&triple).ok();
    }
    dataset.build().ok();
    dataset
}

fn star(size: usize) -> Vec<TriplePattern> {
    (0..size)
        .map(|p| TriplePattern::parse("?e", &format!("http://example.org/p{}", p), &format!("?v{}", p)))
        .collect()
}

fn chain(size: usize) -> Vec<TriplePattern> {
    (0..size)
        .map(|p| {
            TriplePattern::parse(
                &format!("?x{}", p),
                &format!("http://example.org/p{}", p % 12),
                &format!("?x{}", p + 1),
            )
        })
        .collect()
}

fn bulk_build_benchmark(c: &mut Criterion) {
    let triples = synthetic_triples(50_000);
    c.bench_function("bulk build 50K triples", |b| {
        b.iter(|| {
            let mut store = SixIndices::in_memory();
            store.begin_bulk_load().ok();
            for triple in &triples {
                store.add(triple.clone()).ok();
            }
            store.build().ok();
            black_box(store.len())
        })
    });
}

fn planner_benchmark(c: &mut Criterion) {
    let dataset = setup_dataset(50_000);
    let optimizer = match JoinOrderOptimizer::new(&dataset) {
        Ok(optimizer) => optimizer,
        Err(err) => panic!("cannot create optimizer: {}", err),
    };

    c.bench_function("plan 5-pattern star (dynamic programming)", |b| {
        let patterns = star(5);
        b.iter(|| black_box(optimizer.optimize(&patterns).map(|p| p.plan.cost())))
    });

    c.bench_function("plan 12-pattern star (heuristics)", |b| {
        let patterns = star(12);
        b.iter(|| black_box(optimizer.optimize(&patterns).map(|p| p.plan.cost())))
    });

    c.bench_function("plan 10-pattern chain (heuristics)", |b| {
        let patterns = chain(10);
        b.iter(|| black_box(optimizer.optimize(&patterns).map(|p| p.plan.cost())))
    });
}

fn execution_benchmark(c: &mut Criterion) {
    let dataset = setup_dataset(50_000);
    let optimizer = match JoinOrderOptimizer::new(&dataset) {
        Ok(optimizer) => optimizer,
        Err(err) => panic!("cannot create optimizer: {}", err),
    };
    let executor = Executor::new(&dataset);
    let plan = match optimizer.optimize(&star(3)) {
        Ok(plan) => plan,
        Err(err) => panic!("cannot plan benchmark query: {}", err),
    };

    c.bench_function("execute 3-pattern star", |b| {
        b.iter(|| black_box(executor.execute(&plan.operators).map(|rows| rows.len())))
    });
}

criterion_group!(benches, bulk_build_benchmark, planner_benchmark, execution_benchmark);
criterion_main!(benches);
