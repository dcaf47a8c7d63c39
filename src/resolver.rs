//! # Dependency Resolution and Level Partitioning
//!
//! This module turns a selected set of generator descriptors into an
//! executable plan: a deterministic flattened ordering plus a partition into
//! dependency levels of mutually independent generators.
//!
//! ## Process
//!
//! 1.  **Provider Index**: Each capability token maps to the ordered list of
//!     selected descriptors that provide it (order = selection order, which
//!     follows registration order, for determinism).
//!
//! 2.  **Edge Resolution**: For each descriptor `G` and each token in
//!     `G.requires`, an edge `G -> provider` is added for the *first*
//!     selected provider of that token. A requirement no selected generator
//!     provides is recorded as a warning and left unresolved; the generator
//!     still runs, simply without an enforced ordering edge for that token,
//!     because many generators degrade gracefully without an optional
//!     capability.
//!
//! 3.  **Topological Sort**: Kahn's algorithm with a deterministic
//!     tie-break: when several nodes are eligible simultaneously, the one
//!     with the lowest `(order, name)` is emitted first. The same selection
//!     therefore always yields the same ordering, regardless of registration
//!     order.
//!
//! 4.  **Cycle Handling**: If nodes remain after no more removals are
//!     possible, exactly those nodes form a cycle and resolution fails with
//!     [`Error::CycleDetected`] naming the set. There is no fallback
//!     ordering; executing a broken plan under a misleading order is worse
//!     than refusing to plan.
//!
//! Level partitioning runs the same removal process, except all currently
//! eligible nodes are emitted together as one level before in-degrees are
//! recomputed. Every generator in level *k* has all of its resolved
//! dependencies in levels `< k`, and generators within a level are mutually
//! independent and safe to run concurrently.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::error::{Error, Result};
use crate::generator::Descriptor;

/// An ordered sequence of execution levels plus the flattened ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Canonical flattened execution order (generator names).
    pub ordered: Vec<String>,
    /// Level partition; each level is a set of mutually independent
    /// generators, sorted by `(order, name)` for stable presentation.
    pub levels: Vec<Vec<String>>,
}

/// The outcome of dependency resolution over a selection.
#[derive(Debug)]
pub struct Resolution {
    pub plan: ExecutionPlan,
    /// Unsatisfied-requirement warnings; non-fatal by design.
    pub warnings: Vec<String>,
}

/// Resolve a selected list of descriptors into an execution plan.
///
/// The selection is typically "all applicable" generators, optionally
/// narrowed by the caller. Duplicate names in the selection are not
/// expected; the registry enforces name uniqueness upstream.
pub fn resolve(selected: &[Descriptor]) -> Result<Resolution> {
    let mut warnings = Vec::new();
    let deps = resolve_edges(selected, &mut warnings);

    let ordered = topological_order(selected, &deps)?;
    let levels = partition_levels(selected, &deps);

    Ok(Resolution {
        plan: ExecutionPlan { ordered, levels },
        warnings,
    })
}

/// Build the dependency edge set: `deps[i]` holds the indices `i` depends on.
///
/// Edges follow first-provider-wins: for each required token, the earliest
/// selected descriptor providing it becomes the satisfying provider.
/// Self-provided tokens never create an edge.
fn resolve_edges(selected: &[Descriptor], warnings: &mut Vec<String>) -> Vec<BTreeSet<usize>> {
    // Provider index in selection order
    let mut providers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, descriptor) in selected.iter().enumerate() {
        for token in &descriptor.provides {
            providers.entry(token.as_str()).or_default().push(idx);
        }
    }

    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); selected.len()];
    for (idx, descriptor) in selected.iter().enumerate() {
        for token in &descriptor.requires {
            let provider = providers
                .get(token.as_str())
                .and_then(|list| list.iter().copied().find(|&p| p != idx));
            match provider {
                Some(provider) => {
                    deps[idx].insert(provider);
                }
                None => {
                    if !descriptor.provides.contains(token) {
                        warnings.push(format!(
                            "generator '{}' requires '{}' but no selected generator provides it",
                            descriptor.name, token
                        ));
                    }
                }
            }
        }
    }
    deps
}

/// Deterministic Kahn's algorithm over the resolved edges.
fn topological_order(selected: &[Descriptor], deps: &[BTreeSet<usize>]) -> Result<Vec<String>> {
    let mut indegree: Vec<usize> = deps.iter().map(|d| d.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); selected.len()];
    for (idx, dep_set) in deps.iter().enumerate() {
        for &dep in dep_set {
            dependents[dep].push(idx);
        }
    }

    // Min-heap keyed by (order, name) so simultaneous eligibility always
    // breaks ties the same way.
    let mut eligible: BinaryHeap<Reverse<(i32, &str, usize)>> = BinaryHeap::new();
    for (idx, descriptor) in selected.iter().enumerate() {
        if indegree[idx] == 0 {
            eligible.push(Reverse((descriptor.order, descriptor.name.as_str(), idx)));
        }
    }

    let mut ordered = Vec::with_capacity(selected.len());
    while let Some(Reverse((_, name, idx))) = eligible.pop() {
        ordered.push(name.to_string());
        for &dependent in &dependents[idx] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                let d = &selected[dependent];
                eligible.push(Reverse((d.order, d.name.as_str(), dependent)));
            }
        }
    }

    if ordered.len() < selected.len() {
        // Exactly the nodes still carrying in-degree form the cycle
        let mut cyclic: Vec<&str> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg > 0)
            .map(|(idx, _)| selected[idx].name.as_str())
            .collect();
        cyclic.sort_unstable();
        return Err(Error::CycleDetected {
            cycle: cyclic.join(", "),
        });
    }

    Ok(ordered)
}

/// Partition the selection into execution levels.
///
/// Same removal process as the topological sort, but every currently
/// eligible node is emitted in the same round. Callers detect cycles via
/// [`topological_order`] first; remaining cyclic nodes are simply not
/// emitted here.
fn partition_levels(selected: &[Descriptor], deps: &[BTreeSet<usize>]) -> Vec<Vec<String>> {
    let mut remaining: BTreeSet<usize> = (0..selected.len()).collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let mut current: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&idx| deps[idx].iter().all(|dep| !remaining.contains(dep)))
            .collect();
        if current.is_empty() {
            break;
        }
        current.sort_by_key(|&idx| (selected[idx].order, selected[idx].name.clone()));
        for &idx in &current {
            remaining.remove(&idx);
        }
        levels.push(
            current
                .into_iter()
                .map(|idx| selected[idx].name.clone())
                .collect(),
        );
    }

    levels
}
