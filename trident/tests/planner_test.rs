/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate trident;
use shared::collation::CollationOrder;
use shared::literal::Literal;
use shared::terms::{Bindings, GraphConstraint, TriplePattern};
use shared::triple::Triple;
use std::collections::BTreeSet;
use std::sync::Arc;
use trident::config::OptimizerConfig;
use trident::dataset::Dataset;
use trident::exec::Executor;
use trident::index_scan::{IndexScan, VariableBounds};
use trident::operator::{JoinKind, Operator};
use trident::optimizer::{InnerPlan, JoinOrderOptimizer, Plan, PlanningStrategy};
use trident::TridentError;

#[cfg(test)]
mod tests {
    use super::*;

    fn social_dataset() -> Dataset {
        let mut dataset = Dataset::default();
        let people = ["alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi"];
        for (i, person) in people.iter().enumerate() {
            dataset.add(person, "knows", people[(i + 1) % people.len()]).unwrap();
            dataset.add(person, "knows", people[(i + 3) % people.len()]).unwrap();
            dataset.add(person, "age", &format!("{}", 20 + i * 3)).unwrap();
            dataset.add(person, "city", ["berlin", "ghent", "leuven"][i % 3]).unwrap();
        }
        for (city, country) in [("berlin", "de"), ("ghent", "be"), ("leuven", "be")] {
            dataset.add(city, "country", country).unwrap();
        }
        dataset.build().unwrap();
        dataset
    }

    fn chain_dataset() -> Dataset {
        let mut dataset = Dataset::default();
        for i in 0..30 {
            dataset.add(&format!("x{:02}", i), "p1", &format!("y{:02}", i % 6)).unwrap();
            dataset.add(&format!("y{:02}", i % 6), "p2", &format!("z{:02}", i % 4)).unwrap();
            dataset.add(&format!("a{:02}", i % 5), "p2", &format!("b{:02}", i % 3)).unwrap();
        }
        dataset.build().unwrap();
        dataset
    }

    fn compatible(a: &Bindings, b: &Bindings) -> bool {
        a.iter().all(|(k, v)| b.get(k).map_or(true, |w| w == v))
    }

    /// Nested-loop evaluation over the default graph.
    fn naive(dataset: &Dataset, patterns: &[TriplePattern]) -> Vec<Bindings> {
        let triples: Vec<&Triple> = dataset.default_graph().index(CollationOrder::Spo).iter().collect();
        let mut solutions = vec![Bindings::new()];
        for pattern in patterns {
            let mut next = Vec::new();
            for solution in &solutions {
                for triple in triples.iter().filter(|t| pattern.matches(t)) {
                    let row = pattern.bind(triple);
                    if compatible(solution, &row) {
                        let mut merged = solution.clone();
                        merged.extend(row);
                        next.push(merged);
                    }
                }
            }
            solutions = next;
        }
        solutions.sort();
        solutions
    }

    fn run(dataset: &Dataset, graph: &trident::OperatorGraph) -> Vec<Bindings> {
        let mut rows = Executor::new(dataset).execute(graph).unwrap();
        rows.sort();
        rows
    }

    fn check_invariants(plan: &Plan) {
        if let Plan::Inner(inner) = plan {
            let union: BTreeSet<String> = inner.left.variables().union(inner.right.variables()).cloned().collect();
            let intersection: BTreeSet<String> =
                inner.left.variables().intersection(inner.right.variables()).cloned().collect();
            assert_eq!(inner.variables, union);
            assert_eq!(inner.join_partner, intersection);
            let children = inner.left.cartesian_products() + inner.right.cartesian_products();
            if inner.join_partner.is_empty() {
                assert_eq!(inner.cartesian_products, children + 1);
            } else {
                assert_eq!(inner.cartesian_products, children);
            }
            check_invariants(&inner.left);
            check_invariants(&inner.right);
        }
    }

    fn leaf_indices(plan: &Plan) -> Vec<usize> {
        let mut indices: Vec<usize> = plan.leaves().iter().map(|l| l.index).collect();
        indices.sort_unstable();
        indices
    }

    #[test]
    fn test_two_pattern_chain_uses_merge_join_on_shared_variable() {
        let dataset = chain_dataset();
        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let patterns = [TriplePattern::parse("?x", "p1", "?y"), TriplePattern::parse("?y", "p2", "?z")];
        let result = optimizer.optimize(&patterns).unwrap();

        let Plan::Inner(inner) = result.plan.as_ref() else {
            panic!("expected a join");
        };
        assert!(inner.merge_join);
        assert_eq!(inner.join_partner, BTreeSet::from(["y".to_string()]));
        assert_eq!(result.plan.cartesian_products(), 0);
        assert_eq!(result.operators.count_joins(JoinKind::Merge), 1);
        for (_, scan) in result.operators.scans() {
            assert_eq!(scan.sort_variables()[0], "y");
        }
        assert_eq!(run(&dataset, &result.operators), naive(&dataset, &patterns));
    }

    #[test]
    fn test_disjoint_patterns_get_one_cartesian_product() {
        let dataset = chain_dataset();
        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let patterns = [TriplePattern::parse("?x", "p1", "?y"), TriplePattern::parse("?a", "p2", "?b")];
        let result = optimizer.optimize(&patterns).unwrap();
        assert_eq!(result.plan.cartesian_products(), 1);
        assert_eq!(result.operators.count_joins(JoinKind::CrossProduct), 1);
        assert!(result.plan.cost().is_infinite());
        assert_eq!(run(&dataset, &result.operators).len(), naive(&dataset, &patterns).len());
    }

    #[test]
    fn test_large_star_uses_heuristics_and_keeps_every_pattern() {
        let mut dataset = Dataset::default();
        for s in 0..10 {
            for p in 0..8 {
                dataset.add(&format!("s{}", s), &format!("p{}", p), &format!("o{}", (s + p) % 4)).unwrap();
            }
        }
        dataset.build().unwrap();
        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let patterns: Vec<TriplePattern> = (0..8)
            .map(|p| TriplePattern::parse("?s", &format!("p{}", p), &format!("?o{}", p)))
            .collect();
        let result = optimizer.optimize(&patterns).unwrap();

        assert!(!result.used(|s| matches!(s, PlanningStrategy::DynamicProgramming { .. })));
        assert!(result.used(|s| matches!(s, PlanningStrategy::StarClusters { .. })));
        assert_eq!(leaf_indices(&result.plan), (0..8).collect::<Vec<_>>());
        let expected: BTreeSet<String> = patterns.iter().flat_map(|p| p.all_variables()).collect();
        assert_eq!(result.plan.variables(), &expected);
        assert_eq!(result.operators.scans().len(), 8);
        assert_eq!(run(&dataset, &result.operators), naive(&dataset, &patterns));
    }

    #[test]
    fn test_bounded_object_scan_stays_in_range() {
        let mut dataset = Dataset::default();
        for o in ["a", "b", "c", "k", "m", "n", "z"] {
            dataset.add("s1", "p", o).unwrap();
            dataset.add("s2", "p", o).unwrap();
        }
        dataset.add("s1", "q", "c").unwrap();
        dataset.build().unwrap();

        let scan = IndexScan::new(&dataset);
        let pattern = TriplePattern::parse("?s", "p", "?o");
        let bounds = VariableBounds::new().with_min("o", "b").with_max("o", "m");
        let order = IndexScan::scan_order(&pattern, None, &bounds);
        assert_eq!(order, CollationOrder::Pos);
        let objects: Vec<String> = scan
            .scan(&pattern, order, None, &bounds)
            .unwrap()
            .map(|(_, t)| t.object.as_str().to_string())
            .collect();
        assert_eq!(objects, vec!["b", "b", "c", "c", "k", "k", "m", "m"]);

        // bounds behind a wildcard are still enforced
        let objects: Vec<String> = scan
            .scan(&pattern, CollationOrder::Pso, None, &bounds)
            .unwrap()
            .map(|(_, t)| t.object.as_str().to_string())
            .collect();
        assert_eq!(objects.len(), 8);
        assert!(objects.iter().all(|o| o.as_str() >= "b" && o.as_str() <= "m"));
    }

    #[test]
    fn test_caller_bounds_flow_into_the_plan() {
        let dataset = social_dataset();
        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let patterns = [TriplePattern::parse("?p", "knows", "?q"), TriplePattern::parse("?q", "city", "?c")];
        let bounds = VariableBounds::new().with_min("q", "c").with_max("q", "f");
        let result = optimizer.optimize_with(&patterns, None, &bounds).unwrap();
        let rows = run(&dataset, &result.operators);
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| {
            let q = r["q"].as_str();
            ("c"..="f").contains(&q)
        }));
        let expected: Vec<Bindings> = naive(&dataset, &patterns)
            .into_iter()
            .filter(|r| bounds.admits("q", &r["q"]))
            .collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_plans_satisfy_structural_invariants() {
        let dataset = social_dataset();
        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let patterns = [
            TriplePattern::parse("?a", "knows", "?b"),
            TriplePattern::parse("?b", "knows", "?c"),
            TriplePattern::parse("?c", "city", "?city"),
            TriplePattern::parse("?city", "country", "?country"),
            TriplePattern::parse("?a", "age", "?age"),
            TriplePattern::parse("?x", "city", "?y"),
        ];
        let result = optimizer.optimize(&patterns).unwrap();
        check_invariants(&result.plan);
        assert_eq!(leaf_indices(&result.plan), (0..6).collect::<Vec<_>>());
        // the last pattern shares nothing with the rest
        assert_eq!(result.plan.cartesian_products(), 1);
        assert_eq!(result.trace[0], PlanningStrategy::CartesianSplit { components: 2 });
    }

    #[test]
    fn test_executed_plans_match_naive_evaluation() {
        let dataset = social_dataset();
        let queries: Vec<Vec<TriplePattern>> = vec![
            vec![
                TriplePattern::parse("?a", "knows", "?b"),
                TriplePattern::parse("?b", "knows", "?c"),
                TriplePattern::parse("?c", "city", "?city"),
            ],
            vec![
                TriplePattern::parse("?p", "city", "?city"),
                TriplePattern::parse("?city", "country", "be"),
                TriplePattern::parse("?p", "age", "?age"),
                TriplePattern::parse("?p", "knows", "?q"),
            ],
            vec![TriplePattern::parse("?p", "knows", "?p")],
        ];
        for config in [
            OptimizerConfig::default(),
            OptimizerConfig {
                dp_threshold: 1,
                concurrency_budget: 2,
                ..OptimizerConfig::default()
            },
        ] {
            let optimizer = JoinOrderOptimizer::with_config(&dataset, config).unwrap();
            for patterns in &queries {
                let result = optimizer.optimize(patterns).unwrap();
                check_invariants(&result.plan);
                assert_eq!(run(&dataset, &result.operators), naive(&dataset, patterns), "query {:?}", patterns);
            }
        }
    }

    #[test]
    fn test_graph_variable_spans_named_graphs() {
        let mut dataset = Dataset::default();
        dataset.add_to_graph("g1", "alice", "knows", "bob").unwrap();
        dataset.add_to_graph("g2", "bob", "knows", "carol").unwrap();
        dataset.add_to_graph("g2", "alice", "knows", "dave").unwrap();
        dataset.add("alice", "knows", "erin").unwrap();
        dataset.build().unwrap();

        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let pattern = TriplePattern::parse("?s", "knows", "?o").in_graph(GraphConstraint::Variable("g".to_string()));
        let result = optimizer.optimize(&[pattern]).unwrap();
        let rows = Executor::new(&dataset).execute(&result.operators).unwrap();
        let graphs: Vec<&str> = rows.iter().map(|r| r["g"].as_str()).collect();
        // merged in subject order across the named graphs only
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["s"], Literal::from("alice"));
        assert!(graphs.contains(&"g1") && graphs.contains(&"g2"));
    }

    #[test]
    fn test_empty_pattern_short_circuits() {
        let dataset = social_dataset();
        let optimizer = JoinOrderOptimizer::new(&dataset).unwrap();
        let patterns = [TriplePattern::parse("?a", "knows", "?b"), TriplePattern::parse("?b", "likes", "?c")];
        let result = optimizer.optimize(&patterns).unwrap();
        assert!(result.is_provably_empty());
        assert!(Executor::new(&dataset).execute(&result.operators).unwrap().is_empty());
    }

    fn synthetic(cartesian_products: usize, merge_joins: usize, joins: usize, cost: f64) -> Plan {
        let leaf = |index: usize| {
            let pattern = TriplePattern::parse(&format!("?v{}", index), "p", "?w");
            Arc::new(Plan::Leaf(trident::optimizer::LeafPlan {
                index,
                variables: pattern.all_variables(),
                pattern,
                buckets: Default::default(),
                cardinality: 1.0,
                cost: 1.0,
            }))
        };
        Plan::Inner(InnerPlan {
            left: leaf(0),
            right: leaf(1),
            join_partner: BTreeSet::from(["w".to_string()]),
            variables: BTreeSet::new(),
            buckets: Default::default(),
            cardinality: 1.0,
            cost,
            merge_join: merge_joins > 0,
            ordering: Vec::new(),
            merge_joins,
            cartesian_products,
            joins,
            patterns: BTreeSet::from([0, 1]),
        })
    }

    #[test]
    fn test_ranking_prefers_structure_over_cost() {
        let cheap_with_product = synthetic(1, 3, 3, 1.0);
        let costly_without = synthetic(0, 0, 3, 1e12);
        assert!(costly_without.is_better_than(&cheap_with_product));

        let cheap_few_merges = synthetic(0, 1, 3, 1.0);
        let costly_many_merges = synthetic(0, 2, 3, 1e12);
        assert!(costly_many_merges.is_better_than(&cheap_few_merges));

        let fewer_joins = synthetic(0, 1, 2, 1e12);
        assert!(fewer_joins.is_better_than(&cheap_few_merges));

        let cheaper = synthetic(0, 1, 3, 0.5);
        assert!(cheaper.is_better_than(&cheap_few_merges));
        assert!(!cheap_few_merges.is_better_than(&cheap_few_merges));
    }

    #[test]
    fn test_legacy_join_evaluates_like_naive() {
        let dataset = social_dataset();
        let scan = IndexScan::new(&dataset);
        let patterns = [
            TriplePattern::parse("?a", "knows", "?b"),
            TriplePattern::parse("?b", "city", "?c"),
            TriplePattern::parse("?c", "country", "?d"),
        ];
        let graph = scan.binary_join(&patterns).unwrap();
        assert_eq!(graph.scans().len(), 3);
        assert_eq!(run(&dataset, &graph), naive(&dataset, &patterns));
        let Some(Operator::Join(root)) = graph.root().and_then(|r| graph.operator(r)) else {
            panic!("root must be a join");
        };
        assert_eq!(root.output_variables.len(), 4);
    }

    #[test]
    fn test_multi_pattern_scan_is_rejected() {
        let dataset = social_dataset();
        let scan = IndexScan::new(&dataset);
        let mut node = trident::operator::ScanNode::new(TriplePattern::parse("?a", "knows", "?b"), CollationOrder::Pso);
        node.patterns.push(TriplePattern::parse("?b", "age", "?c"));
        assert!(matches!(scan.evaluate(&node, None), Err(TridentError::InvalidArgument(_))));
    }
}
