use crate::error::ResolveError;
use modsync_types::manifest::{Manifest, ModuleFlags};
use modsync_types::report::OrderedModule;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Index of a node inside its owning [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Install,
    Update,
    Demo,
}

impl Flag {
    /// Flag a descendant receives when this one is set on an ancestor.
    fn inherited(self) -> Flag {
        match self {
            Flag::Install | Flag::Update => Flag::Update,
            Flag::Demo => Flag::Demo,
        }
    }

    fn get(self, flags: &ModuleFlags) -> bool {
        match self {
            Flag::Install => flags.install,
            Flag::Update => flags.update,
            Flag::Demo => flags.demo,
        }
    }

    fn set(self, flags: &mut ModuleFlags) {
        match self {
            Flag::Install => flags.install = true,
            Flag::Update => flags.update = true,
            Flag::Demo => flags.demo = true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub depth: u32,
    pub parents: Vec<NodeId>,
    /// Modules depending on this one, sorted by name.
    pub children: Vec<NodeId>,
    pub flags: ModuleFlags,
}

/// Module dependency DAG.
///
/// Nodes live in an arena and are interned by name. Edges point from a dependency (parent) to
/// the module that depends on it (child).
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: BTreeMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.id(name).map(|id| self.node(id))
    }

    /// Return the node for `name`, creating a root node (depth 0) if absent.
    pub fn intern(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.id(name) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            depth: 0,
            parents: vec![],
            children: vec![],
            flags: ModuleFlags::default(),
        });
        self.index.insert(name.to_string(), id);
        id
    }

    /// Connect `parent -> child`.
    ///
    /// The child ends up at least one level below the parent (the increase is pushed to its
    /// descendants) and inherits the parent's current flags.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), ResolveError> {
        if self.nodes[parent.0].children.contains(&child) {
            return Ok(());
        }
        if parent == child || self.reaches(child, parent) {
            return Err(ResolveError::Cycle {
                parent: self.nodes[parent.0].name.clone(),
                child: self.nodes[child.0].name.clone(),
            });
        }

        self.nodes[child.0].parents.push(parent);
        let mut children = std::mem::take(&mut self.nodes[parent.0].children);
        children.push(child);
        children.sort_by(|a, b| self.nodes[a.0].name.cmp(&self.nodes[b.0].name));
        self.nodes[parent.0].children = children;

        self.raise_depth(child, self.nodes[parent.0].depth + 1);

        let inherited = self.nodes[parent.0].flags;
        for flag in [Flag::Install, Flag::Update, Flag::Demo] {
            if flag.get(&inherited) {
                self.set_flag(child, flag.inherited());
            }
        }
        Ok(())
    }

    /// Set `flag` on `id` and propagate its inherited form to every descendant.
    pub fn set_flag(&mut self, id: NodeId, flag: Flag) {
        flag.set(&mut self.nodes[id.0].flags);

        let inherited = flag.inherited();
        let mut visited = BTreeSet::from([id]);
        let mut queue: VecDeque<NodeId> = self.nodes[id.0].children.iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            inherited.set(&mut self.nodes[next.0].flags);
            queue.extend(self.nodes[next.0].children.iter().copied());
        }
    }

    /// Nodes in application order: depth ascending, then name.
    pub fn order(&self) -> Vec<&Node> {
        let mut out: Vec<&Node> = self.nodes.iter().collect();
        out.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));
        out
    }

    pub fn ordered_modules(&self) -> Vec<OrderedModule> {
        self.order()
            .into_iter()
            .map(|n| OrderedModule {
                name: n.name.clone(),
                depth: n.depth,
                flags: n.flags,
            })
            .collect()
    }

    fn raise_depth(&mut self, id: NodeId, depth: u32) {
        if self.nodes[id.0].depth >= depth {
            return;
        }
        self.nodes[id.0].depth = depth;

        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            let below = self.nodes[next.0].depth + 1;
            for child in self.nodes[next.0].children.clone() {
                if self.nodes[child.0].depth < below {
                    self.nodes[child.0].depth = below;
                    queue.push_back(child);
                }
            }
        }
    }

    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(next) = stack.pop() {
            if next == to {
                return true;
            }
            if visited.insert(next) {
                stack.extend(self.nodes[next.0].children.iter().copied());
            }
        }
        false
    }
}

/// Explicitly requested work for one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub install: BTreeSet<String>,
    pub update: BTreeSet<String>,
    pub install_all: bool,
    pub update_all: bool,
    pub demo: bool,
}

/// Build the dependency graph for `manifests`.
///
/// Manifests are admitted in name order, each once all of its dependencies are present.
/// A scan that admits nothing means the rest can never be satisfied.
pub fn resolve(manifests: &[Manifest], request: &UpdateRequest) -> Result<Graph, ResolveError> {
    let mut pending: Vec<&Manifest> = manifests.iter().collect();
    pending.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = pending.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(ResolveError::Duplicate {
            name: pair[0].name.clone(),
        });
    }

    let mut graph = Graph::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::with_capacity(before);
        for manifest in pending {
            if manifest.depends.iter().all(|d| graph.id(d).is_some()) {
                admit(&mut graph, manifest, request)?;
            } else {
                waiting.push(manifest);
            }
        }
        pending = waiting;

        if pending.len() == before {
            return Err(unresolved(&pending, manifests));
        }
    }

    Ok(graph)
}

fn admit(graph: &mut Graph, manifest: &Manifest, request: &UpdateRequest) -> Result<(), ResolveError> {
    let id = graph.intern(&manifest.name);
    for dep in &manifest.depends {
        if let Some(parent) = graph.id(dep) {
            graph.add_edge(parent, id)?;
        }
    }

    if request.install_all || request.install.contains(&manifest.name) {
        graph.set_flag(id, Flag::Install);
    }
    if request.update_all || request.update.contains(&manifest.name) {
        graph.set_flag(id, Flag::Update);
    }
    if request.demo && graph.node(id).flags.install {
        graph.set_flag(id, Flag::Demo);
    }

    let node = graph.node(id);
    debug!(module = %node.name, depth = node.depth, "admitted module");
    Ok(())
}

fn unresolved(pending: &[&Manifest], all: &[Manifest]) -> ResolveError {
    let known: BTreeSet<&str> = all.iter().map(|m| m.name.as_str()).collect();
    let unresolved: BTreeSet<String> = pending.iter().map(|m| m.name.clone()).collect();
    let missing: BTreeSet<String> = pending
        .iter()
        .flat_map(|m| m.depends.iter())
        .filter(|d| !known.contains(d.as_str()))
        .cloned()
        .collect();

    ResolveError::Unresolved {
        unresolved: unresolved.into_iter().collect(),
        missing: missing.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn m(name: &str, depends: &[&str]) -> Manifest {
        Manifest::new(name).with_depends(depends.iter().copied())
    }

    fn names(graph: &Graph) -> Vec<String> {
        graph.order().into_iter().map(|n| n.name.clone()).collect()
    }

    #[test]
    fn orders_by_depth_then_name() {
        let manifests = vec![
            m("sale", &["base", "product"]),
            m("product", &["base"]),
            m("base", &[]),
            m("account", &["base"]),
        ];
        let graph = resolve(&manifests, &UpdateRequest::default()).unwrap();
        assert_eq!(names(&graph), vec!["base", "account", "product", "sale"]);
        assert_eq!(graph.get("sale").unwrap().depth, 2);
    }

    #[test]
    fn cycle_names_both_modules() {
        let manifests = vec![m("a", &["b"]), m("b", &["a"])];
        let err = resolve(&manifests, &UpdateRequest::default()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Unresolved {
                unresolved: vec!["a".into(), "b".into()],
                missing: vec![],
            }
        );
    }

    #[test]
    fn missing_dependency_is_named() {
        let manifests = vec![m("base", &[]), m("a", &["ghost"])];
        let err = resolve(&manifests, &UpdateRequest::default()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Unresolved {
                unresolved: vec!["a".into()],
                missing: vec!["ghost".into()],
            }
        );
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let manifests = vec![m("base", &[]), m("base", &[])];
        let err = resolve(&manifests, &UpdateRequest::default()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Duplicate {
                name: "base".into()
            }
        );
    }

    #[test]
    fn install_propagates_as_update_to_dependents() {
        let manifests = vec![m("base", &[]), m("sale", &["base"]), m("crm", &[])];
        let request = UpdateRequest {
            install: BTreeSet::from(["base".to_string()]),
            demo: true,
            ..Default::default()
        };
        let graph = resolve(&manifests, &request).unwrap();

        let base = graph.get("base").unwrap().flags;
        assert!(base.install && base.demo);

        let sale = graph.get("sale").unwrap().flags;
        assert!(!sale.install);
        assert!(sale.update);
        assert!(sale.demo);

        assert!(!graph.get("crm").unwrap().flags.is_pending());
    }

    #[test]
    fn flag_set_after_edges_reaches_descendants() {
        let mut graph = Graph::new();
        let a = graph.intern("a");
        let b = graph.intern("b");
        let c = graph.intern("c");
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, c).unwrap();

        graph.set_flag(a, Flag::Update);

        assert!(graph.node(b).flags.update);
        assert!(graph.node(c).flags.update);
    }

    #[test]
    fn raising_depth_is_pushed_to_descendants() {
        let mut graph = Graph::new();
        let a = graph.intern("a");
        let b = graph.intern("b");
        let c = graph.intern("c");
        let d = graph.intern("d");
        graph.add_edge(b, c).unwrap();
        graph.add_edge(c, d).unwrap();
        assert_eq!(graph.node(d).depth, 2);

        graph.add_edge(a, b).unwrap();
        assert_eq!(graph.node(b).depth, 1);
        assert_eq!(graph.node(c).depth, 2);
        assert_eq!(graph.node(d).depth, 3);
    }

    #[test]
    fn add_edge_rejects_cycles() {
        let mut graph = Graph::new();
        let a = graph.intern("a");
        let b = graph.intern("b");
        graph.add_edge(a, b).unwrap();
        assert!(matches!(
            graph.add_edge(b, a),
            Err(ResolveError::Cycle { .. })
        ));
    }

    #[test]
    fn children_are_sorted_by_name() {
        let manifests = vec![m("base", &[]), m("zeta", &["base"]), m("alpha", &["base"])];
        let graph = resolve(&manifests, &UpdateRequest::default()).unwrap();
        let base = graph.get("base").unwrap();
        let children: Vec<_> = base
            .children
            .iter()
            .map(|id| graph.node(*id).name.as_str())
            .collect();
        assert_eq!(children, vec!["alpha", "zeta"]);
    }
}
