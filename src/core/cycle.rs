//! Cycle detection for the build-after graph
//!
//! A build order containing a cycle cannot be linearized, so any cycle
//! is fatal. Enumeration is capped because simple cycles explode
//! combinatorially on dense graphs; only the shortest few are rendered
//! with their requirement chains.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use petgraph::graphmap::DiGraphMap;

use crate::config::defaults::{MAX_ENUMERATED_CYCLES, MAX_REPORTED_CYCLES};
use crate::core::graph::{explanation_lines, BuildOrder};
use crate::error::GraphError;

/// Validate that the build-after graph is acyclic.
///
/// A batch of exactly one package is always accepted: a self-loop from
/// a package to its own prior build carries no ordering constraint.
/// Otherwise any cycle fails the batch, and the error carries a report
/// covering the shortest cycles found.
pub fn check_cycles(order: &BuildOrder) -> Result<(), GraphError> {
    if order.build_after.len() <= 1 {
        return Ok(());
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in order.build_after.keys() {
        graph.add_node(name.as_str());
    }
    for (package, after) in &order.build_after {
        for dep in after {
            graph.add_edge(package.as_str(), dep.as_str(), ());
        }
    }

    let mut cycles = enumerate_simple_cycles(&graph, MAX_ENUMERATED_CYCLES);
    if cycles.is_empty() {
        return Ok(());
    }
    cycles.sort_by_key(Vec::len);

    let mut report = String::new();
    for cycle in cycles.iter().take(MAX_REPORTED_CYCLES) {
        report.push_str("Found cycle\n");
        for (i, x) in cycle.iter().enumerate() {
            let y = &cycle[(i + 1) % cycle.len()];
            let _ = writeln!(report, "    {x} \u{21d2} {y}");
            let first_provider = order
                .details
                .get(x)
                .and_then(|deps| deps.get(y))
                .and_then(|providers| providers.first());
            let explanation = first_provider.and_then(|p| p.explanation.as_deref());
            for line in explanation_lines(explanation, x) {
                let _ = writeln!(report, "        {line}");
            }
        }
        report.push('\n');
    }
    if cycles.len() > MAX_REPORTED_CYCLES {
        let _ = writeln!(
            report,
            "More than {MAX_REPORTED_CYCLES} cycles found, ignoring additional cycles"
        );
    }

    tracing::error!(cycles = cycles.len(), "build order is not acyclic");
    Err(GraphError::CyclicBuildOrder { report })
}

/// Enumerate up to `cap` simple cycles of `graph`.
///
/// Each cycle is reported once, rooted at its lexicographically
/// smallest node: the search from a root only walks nodes ordered
/// after it.
fn enumerate_simple_cycles(graph: &DiGraphMap<&str, ()>, cap: usize) -> Vec<Vec<String>> {
    let mut nodes: Vec<&str> = graph.nodes().collect();
    nodes.sort_unstable();
    let rank: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut cycles = Vec::new();
    for (root_rank, &root) in nodes.iter().enumerate() {
        if cycles.len() >= cap {
            break;
        }
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        walk(
            graph, &rank, root, root_rank, root, &mut path, &mut on_path, &mut cycles, cap,
        );
    }
    cycles
}

#[allow(clippy::too_many_arguments)]
fn walk<'g>(
    graph: &DiGraphMap<&'g str, ()>,
    rank: &HashMap<&'g str, usize>,
    root: &'g str,
    root_rank: usize,
    node: &'g str,
    path: &mut Vec<&'g str>,
    on_path: &mut HashSet<&'g str>,
    cycles: &mut Vec<Vec<String>>,
    cap: usize,
) {
    path.push(node);
    on_path.insert(node);
    for next in graph.neighbors(node) {
        if cycles.len() >= cap {
            break;
        }
        if next == root {
            cycles.push(path.iter().map(|n| (*n).to_string()).collect());
        } else if rank[next] > root_rank && !on_path.contains(next) {
            walk(graph, rank, root, root_rank, next, path, on_path, cycles, cap);
        }
    }
    path.pop();
    on_path.remove(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn order_from_edges(edges: &[(&str, &[&str])]) -> BuildOrder {
        let mut order = BuildOrder::default();
        for (package, after) in edges {
            order.build_after.insert(
                (*package).to_string(),
                after.iter().map(|d| (*d).to_string()).collect::<BTreeSet<_>>(),
            );
            order
                .details
                .insert((*package).to_string(), BTreeMap::new());
        }
        order
    }

    #[test]
    fn test_acyclic_graph_passes() {
        let order = order_from_edges(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(check_cycles(&order).is_ok());
    }

    #[test]
    fn test_two_item_cycle_is_fatal() {
        let order = order_from_edges(&[("a", &["b"]), ("b", &["a"])]);
        let err = check_cycles(&order).unwrap_err();
        match err {
            GraphError::CyclicBuildOrder { report } => {
                assert!(report.contains("Found cycle"));
                assert!(report.contains('\u{21d2}'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_single_item_self_loop_is_exempt() {
        let order = order_from_edges(&[("a", &["a"])]);
        assert!(check_cycles(&order).is_ok());
    }

    #[test]
    fn test_self_loop_in_larger_batch_is_reported() {
        let order = order_from_edges(&[("a", &["a"]), ("b", &[])]);
        assert!(check_cycles(&order).is_err());
    }

    #[test]
    fn test_each_cycle_reported_once() {
        let order = order_from_edges(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let graph = {
            let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
            for (package, after) in &order.build_after {
                g.add_node(package.as_str());
                for dep in after {
                    g.add_edge(package.as_str(), dep.as_str(), ());
                }
            }
            g
        };
        let cycles = enumerate_simple_cycles(&graph, 25);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
    }

    #[test]
    fn test_enumeration_respects_the_cap() {
        // Complete digraph on 6 nodes has far more than 3 simple cycles.
        let names = ["a", "b", "c", "d", "e", "f"];
        let mut edges: Vec<(&str, Vec<&str>)> = Vec::new();
        for x in names {
            edges.push((x, names.iter().copied().filter(|y| *y != x).collect()));
        }
        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (x, after) in &edges {
            for y in after {
                g.add_edge(*x, *y, ());
            }
        }
        let cycles = enumerate_simple_cycles(&g, 3);
        assert_eq!(cycles.len(), 3);
    }

    #[test]
    fn test_report_includes_explanations() {
        let mut order = order_from_edges(&[("a", &["b"]), ("b", &["a"])]);
        order.details.get_mut("a").unwrap().insert(
            "b".to_string(),
            vec![crate::infra::resolver::Provider {
                name: "b-1.0-1".to_string(),
                explanation: Some(vec!["b-devel".to_string(), "b-devel-1.0-1".to_string()]),
            }],
        );
        let err = check_cycles(&order).unwrap_err();
        let GraphError::CyclicBuildOrder { report } = err else {
            panic!("expected cycle error");
        };
        assert!(report.contains("a build-requires b-devel, provided by b-devel-1.0-1"));
        assert!(report.contains("<in input>"));
    }
}
