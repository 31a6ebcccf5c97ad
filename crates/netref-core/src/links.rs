//! Cross-link validation over the `related` graph of concept cards.
//!
//! Validation is advisory: it reports `missing` targets and `cycles` next
//! to a successful compile and never fails it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Slug → related slugs, built from stored cards plus pending compiles.
pub type Adjacency = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub slug: String,
    /// Direct related slugs that are neither stored nor compilable.
    pub missing: Vec<String>,
    /// Each cycle as a path that ends where it starts, e.g. `[a, b, a]`.
    pub cycles: Vec<Vec<String>>,
    pub ok: bool,
}

/// Validate the links of `root`.
///
/// `resolvable` decides whether a related slug exists or could be compiled.
pub fn validate_links<F>(root: &str, adjacency: &Adjacency, resolvable: F) -> LinkReport
where
    F: Fn(&str) -> bool,
{
    let mut missing: Vec<String> = adjacency
        .get(root)
        .map(|rel| rel.iter().filter(|r| !resolvable(r)).cloned().collect())
        .unwrap_or_default();
    missing.sort();
    missing.dedup();

    let cycles = find_cycles(root, adjacency);
    let ok = missing.is_empty() && cycles.is_empty();
    LinkReport {
        slug: root.to_string(),
        missing,
        cycles,
        ok,
    }
}

/// Cycles reachable from `root`, found by depth-first search with a visited
/// set and an in-path marker set.
///
/// Each back edge seen during the walk yields one cycle. Finished nodes are
/// not re-entered, so a graph with overlapping cycles may list only some of
/// them; at least one is always reported when any exists. Cycles are rotated to start at their smallest slug and deduplicated, so
/// the result is deterministic for a given graph.
pub fn find_cycles(root: &str, adjacency: &Adjacency) -> Vec<Vec<String>> {
    let mut visited = BTreeSet::new();
    let mut path: Vec<String> = Vec::new();
    let mut found: BTreeSet<Vec<String>> = BTreeSet::new();
    dfs(root, adjacency, &mut visited, &mut path, &mut found);
    found.into_iter().collect()
}

fn dfs(
    node: &str,
    adjacency: &Adjacency,
    visited: &mut BTreeSet<String>,
    path: &mut Vec<String>,
    found: &mut BTreeSet<Vec<String>>,
) {
    visited.insert(node.to_string());
    path.push(node.to_string());

    if let Some(next) = adjacency.get(node) {
        let mut next: Vec<&String> = next.iter().collect();
        next.sort();
        next.dedup();
        for n in next {
            if let Some(start) = path.iter().position(|p| p == n) {
                found.insert(canonical_cycle(&path[start..]));
            } else if !visited.contains(n.as_str()) {
                dfs(n, adjacency, visited, path, found);
            }
        }
    }

    path.pop();
}

/// Rotate a cycle to begin at its smallest member and close it.
fn canonical_cycle(members: &[String]) -> Vec<String> {
    let min = members
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut cycle: Vec<String> = members[min..]
        .iter()
        .chain(members[..min].iter())
        .cloned()
        .collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}
