//! The node graph.
//!
//! [`Graph`] owns every node and plug. Connections are stored as plain
//! references (`PlugRef`) on the destination plug plus a reverse index, so
//! nodes can be removed without any ownership cycles to break.
//!
//! Structure and authored values live behind one `RwLock`. Edits take the
//! write lock and run dirty propagation before releasing it, so no reader
//! ever sees a half-dirtied graph. Evaluation requests take the read lock
//! once per request and share the value cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use log::{Level, debug, warn};
use rayon::prelude::*;

use crate::cache::CacheStats;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::dirty;
use crate::error::GraphError;
use crate::eval::{Caches, Evaluation};
use crate::hash::Hash;
use crate::node::{Node, NodeId};
use crate::plug::{PlugDefinition, PlugDirection, PlugId, PlugRef, PlugState, flatten_definitions};
use crate::registry::NodeRegistry;
use crate::signal::{self, Observers, PlugEvent, SubscriptionId};
use crate::util::sync::{lock, read, write};
use crate::util::timing::measure_lazy;
use crate::value::{Value, ValueType};

/// A node instance and its plug table.
pub(crate) struct NodeEntry {
    pub name: String,
    pub node: Box<dyn Node>,
    pub plugs: Vec<PlugState>,
    by_name: HashMap<String, usize>,
}

impl NodeEntry {
    fn new(name: &str, node: Box<dyn Node>) -> Result<Self, GraphError> {
        let definitions = node.plugs();
        let mut entry = Self {
            name: name.to_string(),
            node,
            plugs: Vec::new(),
            by_name: HashMap::new(),
        };
        entry.add_plugs(&definitions)?;
        Ok(entry)
    }

    /// Appends plugs, rejecting malformed or duplicate names. Returns the
    /// indices of the new plugs.
    fn add_plugs(&mut self, definitions: &[PlugDefinition]) -> Result<Vec<usize>, GraphError> {
        validate_names(definitions)?;
        let mut preview = Vec::new();
        flatten_definitions(definitions, None, "", &mut preview);
        let mut seen = HashSet::new();
        for plug in &preview {
            if self.by_name.contains_key(&plug.name) || !seen.insert(plug.name.as_str()) {
                return Err(GraphError::invalid_argument(format!(
                    "{} already has a plug named '{}'",
                    self.name, plug.name
                )));
            }
        }

        let start = self.plugs.len();
        // Flatten again straight into the table so parent/child indices are absolute.
        flatten_definitions(definitions, None, "", &mut self.plugs);
        for index in start..self.plugs.len() {
            self.by_name.insert(self.plugs[index].name.clone(), index);
        }
        Ok((start..self.plugs.len()).collect())
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

fn validate_names(definitions: &[PlugDefinition]) -> Result<(), GraphError> {
    for definition in definitions {
        if definition.name.is_empty() || definition.name.contains('.') {
            return Err(GraphError::invalid_argument(format!(
                "invalid plug name '{}'",
                definition.name
            )));
        }
        validate_names(&definition.children)?;
    }
    Ok(())
}

/// Last segment of a dotted plug path.
pub(crate) fn leaf_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

#[derive(Default)]
pub(crate) struct GraphState {
    pub nodes: HashMap<NodeId, NodeEntry>,
    /// Reverse connection index: source plug → destination plugs
    pub outputs: HashMap<PlugRef, Vec<PlugRef>>,
}

impl GraphState {
    pub fn entry(&self, id: NodeId) -> Result<&NodeEntry, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn plug(&self, plug: PlugRef) -> Result<&PlugState, GraphError> {
        self.nodes
            .get(&plug.node)
            .and_then(|entry| entry.plugs.get(plug.index))
            .ok_or_else(|| GraphError::PlugNotFound(format!("{}[{}]", plug.node, plug.index)))
    }

    pub fn plug_mut(&mut self, plug: PlugRef) -> Option<&mut PlugState> {
        self.nodes
            .get_mut(&plug.node)
            .and_then(|entry| entry.plugs.get_mut(plug.index))
    }

    pub fn resolve(&self, id: &PlugId) -> Result<PlugRef, GraphError> {
        let entry = self.entry(id.node_id)?;
        entry
            .index(&id.name)
            .map(|index| PlugRef::new(id.node_id, index))
            .ok_or_else(|| GraphError::PlugNotFound(format!("{}.{}", entry.name, id.name)))
    }

    pub fn plug_id(&self, plug: PlugRef) -> PlugId {
        let name = self
            .plug(plug)
            .map(|p| p.name.clone())
            .unwrap_or_else(|_| format!("[{}]", plug.index));
        PlugId {
            node_id: plug.node,
            name,
        }
    }

    /// `node_name.plug.path`, for messages.
    pub fn display_name(&self, plug: PlugRef) -> String {
        match self.nodes.get(&plug.node) {
            Some(entry) => match entry.plugs.get(plug.index) {
                Some(p) => format!("{}.{}", entry.name, p.name),
                None => format!("{}[{}]", entry.name, plug.index),
            },
            None => format!("{}[{}]", plug.node, plug.index),
        }
    }

    /// Follows input connections upstream to the plug that actually provides
    /// the value.
    pub fn source(&self, plug: PlugRef) -> PlugRef {
        let mut current = plug;
        loop {
            match self.plug(current).ok().and_then(|p| p.input) {
                Some(input) => current = input,
                None => return current,
            }
        }
    }

    fn descendants(&self, plug: PlugRef, out: &mut Vec<PlugRef>) {
        if let Ok(state_plug) = self.plug(plug) {
            for &child in &state_plug.children {
                let child = PlugRef::new(plug.node, child);
                out.push(child);
                self.descendants(child, out);
            }
        }
    }
}

/// A batch of graph edits applied under one exclusive lock.
///
/// Dirty propagation for everything in the batch runs once, after the batch
/// closure returns. Each operation validates before it changes anything, so a
/// failing operation leaves the graph as the previous operations left it.
pub struct Edit<'g> {
    state: &'g mut GraphState,
    dirtied: Vec<PlugRef>,
    events: Vec<PlugEvent>,
}

impl<'g> Edit<'g> {
    fn new(state: &'g mut GraphState) -> Self {
        Self {
            state,
            dirtied: Vec::new(),
            events: Vec::new(),
        }
    }

    fn finish(self) -> (Vec<PlugRef>, Vec<PlugEvent>) {
        (self.dirtied, self.events)
    }

    pub fn add_node(&mut self, name: &str, node: Box<dyn Node>) -> Result<NodeId, GraphError> {
        let id = NodeId::new();
        let entry = NodeEntry::new(name, node)?;
        debug!(
            "Added node {} ({}) with {} plugs",
            name,
            entry.node.type_name(),
            entry.plugs.len()
        );
        self.state.nodes.insert(id, entry);
        Ok(id)
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let plug_count = self.state.entry(id)?.plugs.len();
        for index in 0..plug_count {
            let plug = PlugRef::new(id, index);
            let destinations = self.state.outputs.get(&plug).cloned().unwrap_or_default();
            for destination in destinations {
                if destination.node != id {
                    self.set_input(destination, None);
                }
            }
            self.unlink(plug);
        }
        self.state.outputs.retain(|source, _| source.node != id);
        if let Some(entry) = self.state.nodes.remove(&id) {
            debug!("Removed node {} ({})", entry.name, entry.node.type_name());
        }
        self.dirtied.retain(|plug| plug.node != id);
        self.events.retain(|event| event.plug().node_id != id);
        Ok(())
    }

    /// Adds a top-level plug to an existing node.
    pub fn add_plug(&mut self, node: NodeId, definition: PlugDefinition) -> Result<PlugId, GraphError> {
        let entry = self
            .state
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?;
        let indices = entry.add_plugs(std::slice::from_ref(&definition))?;
        let first = indices
            .first()
            .map(|index| PlugRef::new(node, *index))
            .ok_or_else(|| GraphError::invalid_argument("plug definition produced no plugs"))?;
        // The node may already declare outputs that depend on the new plug.
        self.dirtied.push(first);
        Ok(self.state.plug_id(first))
    }

    pub fn set_value(&mut self, plug: &PlugId, value: impl Into<Value>) -> Result<(), GraphError> {
        let target = self.state.resolve(plug)?;
        let mut assignments = Vec::new();
        self.collect_assignments(target, value.into(), &mut assignments)?;

        for (index, value) in assignments {
            let leaf = PlugRef::new(target.node, index);
            let Some(state_plug) = self.state.plug_mut(leaf) else {
                continue;
            };
            if state_plug.effective_value().is_some_and(|current| current.identical(&value)) {
                continue;
            }
            state_plug.value = Some(Arc::new(value));
            self.events.push(PlugEvent::Set(self.state.plug_id(leaf)));
            self.dirtied.push(leaf);
        }
        Ok(())
    }

    pub fn set_to_default(&mut self, plug: &PlugId) -> Result<(), GraphError> {
        let target = self.state.resolve(plug)?;
        let mut leaves = Vec::new();
        self.collect_settable_leaves(target, &mut leaves)?;

        for leaf in leaves {
            let Some(state_plug) = self.state.plug_mut(leaf) else {
                continue;
            };
            let Some(previous) = state_plug.value.take() else {
                continue;
            };
            if state_plug
                .default_value
                .as_deref()
                .is_some_and(|default| default.identical(&previous))
            {
                continue;
            }
            self.events.push(PlugEvent::Set(self.state.plug_id(leaf)));
            self.dirtied.push(leaf);
        }
        Ok(())
    }

    pub fn connect(&mut self, source: &PlugId, destination: &PlugId) -> Result<(), GraphError> {
        let src = self.state.resolve(source)?;
        let dst = self.state.resolve(destination)?;
        if src == dst {
            return Err(GraphError::InvalidConnection(format!(
                "cannot connect {} to itself",
                self.state.display_name(dst)
            )));
        }

        let mut pairs = Vec::new();
        self.match_plugs(src, dst, &mut pairs)?;
        for &(s, d) in &pairs {
            if dirty::would_create_cycle(self.state, s, d) {
                return Err(GraphError::Cycle {
                    from: source.clone(),
                    to: destination.clone(),
                });
            }
        }

        if self.state.plug(dst)?.input == Some(src) {
            return Ok(());
        }
        self.detach_ancestors(dst);
        for (s, d) in pairs {
            self.set_input(d, Some(s));
        }
        debug!(
            "Connected {} -> {}",
            self.state.display_name(src),
            self.state.display_name(dst)
        );
        Ok(())
    }

    pub fn disconnect(&mut self, destination: &PlugId) -> Result<(), GraphError> {
        let dst = self.state.resolve(destination)?;
        if self.state.plug(dst)?.direction != PlugDirection::Input {
            return Err(GraphError::InvalidConnection(format!(
                "{} is not an input",
                self.state.display_name(dst)
            )));
        }
        let mut targets = vec![dst];
        self.state.descendants(dst, &mut targets);
        self.detach_ancestors(dst);
        for target in targets {
            self.set_input(target, None);
        }
        Ok(())
    }

    fn collect_assignments(
        &self,
        plug: PlugRef,
        value: Value,
        out: &mut Vec<(usize, Value)>,
    ) -> Result<(), GraphError> {
        let state_plug = self.check_settable(plug)?;

        if state_plug.is_compound() {
            let actual = value.value_type();
            let Value::Map(mut values) = value else {
                return Err(GraphError::TypeMismatch {
                    plug: self.state.display_name(plug),
                    expected: ValueType::Map,
                    actual,
                });
            };
            for &child in &state_plug.children {
                let child_name = leaf_name(&self.state.plug(PlugRef::new(plug.node, child))?.name);
                if let Some(child_value) = values.remove(child_name) {
                    self.collect_assignments(PlugRef::new(plug.node, child), child_value, out)?;
                }
            }
            if let Some(unknown) = values.keys().next() {
                return Err(GraphError::invalid_argument(format!(
                    "{} has no child plug '{}'",
                    self.state.display_name(plug),
                    unknown
                )));
            }
            return Ok(());
        }

        if !state_plug.value_type.accepts(value.value_type()) {
            return Err(GraphError::TypeMismatch {
                plug: self.state.display_name(plug),
                expected: state_plug.value_type,
                actual: value.value_type(),
            });
        }
        out.push((plug.index, value));
        Ok(())
    }

    fn collect_settable_leaves(&self, plug: PlugRef, out: &mut Vec<PlugRef>) -> Result<(), GraphError> {
        let state_plug = self.check_settable(plug)?;
        if state_plug.is_compound() {
            for &child in &state_plug.children {
                self.collect_settable_leaves(PlugRef::new(plug.node, child), out)?;
            }
        } else {
            out.push(plug);
        }
        Ok(())
    }

    fn check_settable(&self, plug: PlugRef) -> Result<&PlugState, GraphError> {
        let state_plug = self.state.plug(plug)?;
        if state_plug.direction == PlugDirection::Output {
            return Err(GraphError::invalid_argument(format!(
                "{} is a computed output and cannot be set",
                self.state.display_name(plug)
            )));
        }
        if state_plug.input.is_some() {
            return Err(GraphError::invalid_argument(format!(
                "{} has an input connection and cannot be set",
                self.state.display_name(plug)
            )));
        }
        Ok(state_plug)
    }

    /// Pairs up `src` and `dst` (recursively for compounds), checking
    /// direction, structure and types.
    fn match_plugs(
        &self,
        src: PlugRef,
        dst: PlugRef,
        pairs: &mut Vec<(PlugRef, PlugRef)>,
    ) -> Result<(), GraphError> {
        let s = self.state.plug(src)?;
        let d = self.state.plug(dst)?;
        if d.direction != PlugDirection::Input {
            return Err(GraphError::InvalidConnection(format!(
                "{} is not an input",
                self.state.display_name(dst)
            )));
        }

        match (s.is_compound(), d.is_compound()) {
            (false, false) => {
                if !d.value_type.accepts(s.value_type) {
                    return Err(GraphError::TypeMismatch {
                        plug: self.state.display_name(dst),
                        expected: d.value_type,
                        actual: s.value_type,
                    });
                }
            }
            (true, true) => {
                if s.children.len() != d.children.len() {
                    return Err(GraphError::InvalidConnection(format!(
                        "{} and {} have different children",
                        self.state.display_name(src),
                        self.state.display_name(dst)
                    )));
                }
                for (&sc, &dc) in s.children.iter().zip(&d.children) {
                    let sc = PlugRef::new(src.node, sc);
                    let dc = PlugRef::new(dst.node, dc);
                    if leaf_name(&self.state.plug(sc)?.name) != leaf_name(&self.state.plug(dc)?.name) {
                        return Err(GraphError::InvalidConnection(format!(
                            "{} and {} have different children",
                            self.state.display_name(src),
                            self.state.display_name(dst)
                        )));
                    }
                    self.match_plugs(sc, dc, pairs)?;
                }
            }
            _ => {
                return Err(GraphError::InvalidConnection(format!(
                    "cannot connect {} to {}: compound and leaf plugs",
                    self.state.display_name(src),
                    self.state.display_name(dst)
                )));
            }
        }
        pairs.push((src, dst));
        Ok(())
    }

    /// Clears whole-compound connections on the ancestors of `plug`, leaving
    /// their children's individual connections in place.
    fn detach_ancestors(&mut self, plug: PlugRef) {
        let mut current = self.state.plug(plug).ok().and_then(|p| p.parent);
        while let Some(index) = current {
            let ancestor = PlugRef::new(plug.node, index);
            self.set_input(ancestor, None);
            current = self.state.plug(ancestor).ok().and_then(|p| p.parent);
        }
    }

    fn set_input(&mut self, destination: PlugRef, input: Option<PlugRef>) {
        let previous = match self.state.plug(destination) {
            Ok(p) => p.input,
            Err(_) => return,
        };
        if previous == input {
            return;
        }
        self.unlink(destination);
        if let Some(state_plug) = self.state.plug_mut(destination) {
            state_plug.input = input;
        }
        if let Some(source) = input {
            self.state.outputs.entry(source).or_default().push(destination);
        }
        self.events
            .push(PlugEvent::InputChanged(self.state.plug_id(destination)));
        self.dirtied.push(destination);
    }

    /// Removes `destination`'s connection without recording events.
    fn unlink(&mut self, destination: PlugRef) {
        let Some(state_plug) = self.state.plug_mut(destination) else {
            return;
        };
        let Some(source) = state_plug.input.take() else {
            return;
        };
        if let Some(destinations) = self.state.outputs.get_mut(&source) {
            destinations.retain(|d| *d != destination);
            if destinations.is_empty() {
                self.state.outputs.remove(&source);
            }
        }
    }
}

/// A node graph with its evaluation caches.
pub struct Graph {
    state: RwLock<GraphState>,
    caches: Caches,
    observers: Mutex<Observers>,
    pool: Option<rayon::ThreadPool>,
    config: EngineConfig,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Graph {
    pub fn new(config: EngineConfig) -> Self {
        let pool = match config.evaluation.threads {
            0 => None,
            threads => match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("nodegraph-eval-{}", i))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Failed to build evaluation pool, using the global pool: {}", e);
                    None
                }
            },
        };
        Self {
            state: RwLock::new(GraphState::default()),
            caches: Caches::new(&config),
            observers: Mutex::new(Observers::default()),
            pool,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies a batch of edits, then propagates dirtiness once.
    ///
    /// Observers run only after every dirty count has been bumped, so a
    /// panicking observer cannot leave stale cache keys behind. `Set` and
    /// `InputChanged` events for the whole batch are delivered before the
    /// `Dirtied` events of the propagation pass. Propagation also runs for
    /// operations that succeeded before an error.
    pub fn edit<R, F>(&self, f: F) -> Result<R, GraphError>
    where
        F: FnOnce(&mut Edit<'_>) -> Result<R, GraphError>,
    {
        let mut state = write(&self.state);
        let mut edit = Edit::new(&mut state);
        let result = f(&mut edit);
        let (seeds, events) = edit.finish();

        if !seeds.is_empty() || !events.is_empty() {
            let dirtied = measure_lazy(
                Level::Debug,
                || format!("Dirty propagation from {} plugs", seeds.len()),
                || dirty::propagate(&mut state, &seeds),
            );
            let observers = lock(&self.observers).snapshot();
            if !observers.is_empty() {
                let dirtied = dirtied
                    .into_iter()
                    .map(|plug| PlugEvent::Dirtied(state.plug_id(plug)));
                for event in events.into_iter().chain(dirtied) {
                    signal::notify(&observers, &event);
                }
            }
        }
        result
    }

    pub fn add_node(&self, name: &str, node: Box<dyn Node>) -> Result<NodeId, GraphError> {
        self.edit(|e| e.add_node(name, node))
    }

    pub fn create_node(
        &self,
        registry: &NodeRegistry,
        type_name: &str,
        name: &str,
    ) -> Result<NodeId, GraphError> {
        let node = registry.create(type_name)?;
        self.add_node(name, node)
    }

    pub fn remove_node(&self, id: NodeId) -> Result<(), GraphError> {
        self.edit(|e| e.remove_node(id))
    }

    pub fn add_plug(&self, node: NodeId, definition: PlugDefinition) -> Result<PlugId, GraphError> {
        self.edit(|e| e.add_plug(node, definition))
    }

    pub fn set_value(&self, plug: &PlugId, value: impl Into<Value>) -> Result<(), GraphError> {
        let value = value.into();
        self.edit(|e| e.set_value(plug, value))
    }

    pub fn set_to_default(&self, plug: &PlugId) -> Result<(), GraphError> {
        self.edit(|e| e.set_to_default(plug))
    }

    pub fn connect(&self, source: &PlugId, destination: &PlugId) -> Result<(), GraphError> {
        self.edit(|e| e.connect(source, destination))
    }

    pub fn disconnect(&self, destination: &PlugId) -> Result<(), GraphError> {
        self.edit(|e| e.disconnect(destination))
    }

    /// Looks up a plug by name, checking that it exists.
    pub fn plug(&self, node: NodeId, name: &str) -> Result<PlugId, GraphError> {
        let state = read(&self.state);
        let plug = state.resolve(&PlugId::new(node, name))?;
        Ok(state.plug_id(plug))
    }

    pub fn plugs(&self, node: NodeId) -> Result<Vec<PlugId>, GraphError> {
        let state = read(&self.state);
        let entry = state.entry(node)?;
        Ok(entry
            .plugs
            .iter()
            .map(|p| PlugId::new(node, &p.name))
            .collect())
    }

    /// Node ids in a stable (sorted) order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = read(&self.state).nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn node_name(&self, node: NodeId) -> Result<String, GraphError> {
        Ok(read(&self.state).entry(node)?.name.clone())
    }

    pub fn node_type(&self, node: NodeId) -> Result<&'static str, GraphError> {
        Ok(read(&self.state).entry(node)?.node.type_name())
    }

    pub fn direction(&self, plug: &PlugId) -> Result<PlugDirection, GraphError> {
        let state = read(&self.state);
        Ok(state.plug(state.resolve(plug)?)?.direction)
    }

    pub fn value_type(&self, plug: &PlugId) -> Result<ValueType, GraphError> {
        let state = read(&self.state);
        Ok(state.plug(state.resolve(plug)?)?.value_type)
    }

    pub fn input(&self, plug: &PlugId) -> Result<Option<PlugId>, GraphError> {
        let state = read(&self.state);
        let input = state.plug(state.resolve(plug)?)?.input;
        Ok(input.map(|input| state.plug_id(input)))
    }

    pub fn outputs(&self, plug: &PlugId) -> Result<Vec<PlugId>, GraphError> {
        let state = read(&self.state);
        let plug = state.resolve(plug)?;
        Ok(state
            .outputs
            .get(&plug)
            .map(|destinations| destinations.iter().map(|d| state.plug_id(*d)).collect())
            .unwrap_or_default())
    }

    /// The plug that ultimately provides `plug`'s value.
    pub fn source(&self, plug: &PlugId) -> Result<PlugId, GraphError> {
        let state = read(&self.state);
        let plug = state.resolve(plug)?;
        Ok(state.plug_id(state.source(plug)))
    }

    pub fn dirty_count(&self, plug: &PlugId) -> Result<u64, GraphError> {
        let state = read(&self.state);
        Ok(state.plug(state.resolve(plug)?)?.dirty_count)
    }

    /// Content hash of `plug` in `context`, without computing its value.
    pub fn hash(&self, plug: &PlugId, context: &Context) -> Result<Hash, GraphError> {
        let state = read(&self.state);
        let plug = state.resolve(plug)?;
        Ok(Evaluation::new(&state, &self.caches).hash(plug, context)?.hash)
    }

    pub fn get_value(&self, plug: &PlugId, context: &Context) -> Result<Arc<Value>, GraphError> {
        let state = read(&self.state);
        let plug = state.resolve(plug)?;
        Evaluation::new(&state, &self.caches).value(plug, context)
    }

    /// Evaluates in the context made current with
    /// [`ContextScope`](crate::context::ContextScope).
    pub fn get_value_current(&self, plug: &PlugId) -> Result<Arc<Value>, GraphError> {
        self.get_value(plug, &Context::current())
    }

    /// Evaluates many requests in parallel. Results are in request order.
    pub fn get_values(&self, requests: &[(PlugId, Context)]) -> Vec<Result<Arc<Value>, GraphError>> {
        let guard = read(&self.state);
        let state: &GraphState = &guard;
        let caches = &self.caches;
        let evaluate = || -> Vec<Result<Arc<Value>, GraphError>> {
            requests
                .par_iter()
                .map(|(plug, context)| {
                    let plug = state.resolve(plug)?;
                    Evaluation::new(state, caches).value(plug, context)
                })
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(evaluate),
            None => evaluate(),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&PlugEvent) + Send + Sync + 'static,
    {
        lock(&self.observers).subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.observers).unsubscribe(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.caches.values.stats()
    }

    /// Drops all cached values and hashes. Never needed for correctness.
    pub fn clear_cache(&self) {
        self.caches.values.clear();
        self.caches.hashes.clear();
    }
}
