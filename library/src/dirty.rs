//! Dirty propagation and the dependency relation it walks.
//!
//! A plug's dependents are: its parent (a dirtied child dirties the compound
//! holding it), its children when it is an output compound, every plug
//! connected downstream of it, and whatever its node's `affects` names.

use std::collections::HashSet;

use log::{debug, warn};

use crate::graph::{GraphState, NodeEntry};
use crate::plug::{PlugDirection, PlugRef};

/// Plugs on the same node reached from `index` in one step.
fn node_local_dependents(entry: &NodeEntry, index: usize, out: &mut Vec<usize>) {
    let plug = &entry.plugs[index];
    if let Some(parent) = plug.parent {
        out.push(parent);
    }
    if plug.direction == PlugDirection::Output {
        out.extend(plug.children.iter().copied());
    }
    for name in entry.node.affects(&plug.name) {
        match entry.index(name) {
            Some(affected) if affected != index => out.push(affected),
            Some(_) => {}
            None => warn!(
                "{} ({}): affects({}) names unknown plug '{}'",
                entry.name,
                entry.node.type_name(),
                plug.name,
                name
            ),
        }
    }
}

pub(crate) fn dependents(state: &GraphState, plug: PlugRef, out: &mut Vec<PlugRef>) {
    let Some(entry) = state.nodes.get(&plug.node) else {
        return;
    };
    let mut local = Vec::new();
    node_local_dependents(entry, plug.index, &mut local);
    out.extend(local.into_iter().map(|index| PlugRef::new(plug.node, index)));
    if let Some(destinations) = state.outputs.get(&plug) {
        out.extend(destinations.iter().copied());
    }
}

/// Dirties `seeds` and everything downstream of them.
///
/// Depth-first; each plug is visited once per pass. Returns the dirtied
/// plugs in visit order. Observers are notified by the caller once every
/// count has been bumped.
pub(crate) fn propagate(state: &mut GraphState, seeds: &[PlugRef]) -> Vec<PlugRef> {
    let mut visited: HashSet<PlugRef> = HashSet::new();
    let mut dirtied = Vec::new();
    let mut stack: Vec<PlugRef> = seeds.iter().rev().copied().collect();
    let mut next = Vec::new();

    while let Some(plug) = stack.pop() {
        if !visited.insert(plug) {
            continue;
        }
        let Some(state_plug) = state.plug_mut(plug) else {
            continue;
        };
        state_plug.dirty_count += 1;
        dirtied.push(plug);

        next.clear();
        dependents(state, plug, &mut next);
        // Reversed so dependents are visited in declaration order.
        stack.extend(next.iter().rev().copied().filter(|p| !visited.contains(p)));
    }

    debug!("Dirty propagation touched {} plugs", dirtied.len());
    dirtied
}

/// True if connecting `source` into `destination` would close a loop, i.e.
/// `source` is already reachable from `destination`.
pub(crate) fn would_create_cycle(state: &GraphState, source: PlugRef, destination: PlugRef) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![destination];
    let mut next = Vec::new();

    while let Some(plug) = stack.pop() {
        if plug == source {
            return true;
        }
        if !visited.insert(plug) {
            continue;
        }
        next.clear();
        dependents(state, plug, &mut next);
        stack.extend(next.iter().copied());
    }
    false
}

/// Every plug of `entry` transitively influenced by plug `index` through the
/// node's own `affects` declarations and compound relations.
pub(crate) fn affects_closure(entry: &NodeEntry, index: usize) -> HashSet<usize> {
    let mut reached = HashSet::new();
    let mut stack = vec![index];
    let mut next = Vec::new();

    while let Some(current) = stack.pop() {
        if !reached.insert(current) {
            continue;
        }
        next.clear();
        node_local_dependents(entry, current, &mut next);
        stack.extend(next.iter().copied());
    }
    reached
}
