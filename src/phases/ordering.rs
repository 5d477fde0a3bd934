//! Phase 2: Determining Merge Order
//!
//! This is the second phase of the compose pipeline. Its main responsibility
//! is to decide in which order packages are merged. Because the first writer
//! of a path wins, this order decides most conflicts.
//!
//! ## Process
//!
//! 1.  **Graph Construction**: Packages are registered in discovery order. A
//!     synthetic root points at every package that no other package lists as
//!     a child, and each recorded parent→child edge becomes a graph edge.
//!
//! 2.  **Topological Sort**: Kahn's algorithm. Whenever several nodes are
//!     ready, the one registered first is emitted first, so siblings keep
//!     their declaration order.
//!
//! 3.  **Validation**: Nodes that never become ready form a cycle, reported
//!     as `CycleDetected`.
//!
//! Parents come before their children, so a package's files win over the
//! files of the packages it depends on.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use log::warn;

use crate::error::{Error, Result};
use crate::manifest::Package;

const ROOT: usize = 0;

/// Adjacency-list graph of package names with a synthetic root.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Node names, index 0 is the synthetic root.
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            names: vec![String::new()],
            index: HashMap::new(),
            edges: vec![Vec::new()],
        }
    }

    /// Registers `name` and returns its node. Registering twice is a no-op.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&node) = self.index.get(name) {
            return node;
        }
        let node = self.names.len();
        self.names.push(name.to_string());
        self.edges.push(Vec::new());
        self.index.insert(name.to_string(), node);
        node
    }

    /// Adds an edge from `parent` to `child`, registering both.
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        let from = self.add_node(parent);
        let to = self.add_node(child);
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    /// Connects the synthetic root to `name`.
    pub fn add_root_edge(&mut self, name: &str) {
        let to = self.add_node(name);
        if !self.edges[ROOT].contains(&to) {
            self.edges[ROOT].push(to);
        }
    }

    /// Number of package nodes.
    pub fn len(&self) -> usize {
        self.names.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Package names in topological order, ties broken by registration
    /// order. The synthetic root is not part of the result.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree = vec![0usize; self.names.len()];
        for targets in &self.edges {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(n, _)| n)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        let mut visited = 0;
        while let Some(node) = ready.pop_first() {
            visited += 1;
            if node != ROOT {
                order.push(self.names[node].clone());
            }
            for &to in &self.edges[node] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if visited < self.names.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|&(n, &d)| n != ROOT && d > 0)
                .map(|(n, _)| self.names[n].as_str())
                .collect();
            return Err(Error::CycleDetected {
                cycle: stuck.join(", "),
            });
        }

        Ok(order)
    }
}

/// Builds the graph for resolved packages.
pub fn build_graph(packages: &[Package]) -> DependencyGraph {
    let mut sorted: Vec<&Package> = packages.iter().collect();
    sorted.sort_by_key(|p| p.ordinal());

    let mut graph = DependencyGraph::new();
    for package in &sorted {
        graph.add_node(package.name());
    }

    for package in &sorted {
        for child in package.dependencies() {
            graph.add_edge(package.name(), child);
        }
    }

    let children: Vec<&str> = sorted
        .iter()
        .flat_map(|p| p.dependencies().iter().map(String::as_str))
        .collect();
    for package in &sorted {
        if !children.contains(&package.name()) {
            graph.add_root_edge(package.name());
        }
    }

    graph
}

/// Execute Phase 2: order packages for merging.
///
/// Packages declared more than once are merged once, using the declaration
/// discovered first.
pub fn execute(packages: &[Package]) -> Result<Vec<Package>> {
    let mut first: HashMap<&str, &Package> = HashMap::new();
    for package in packages {
        match first.entry(package.name()) {
            Entry::Vacant(slot) => {
                slot.insert(package);
            }
            Entry::Occupied(mut slot) => {
                if package.ordinal() < slot.get().ordinal() {
                    slot.insert(package);
                }
                warn!(
                    "package '{}' is declared more than once, using '{}'",
                    package.name(),
                    slot.get().identifier()
                );
            }
        }
    }

    let order = build_graph(packages).topological_order()?;
    Ok(order
        .iter()
        .filter_map(|name| first.get(name.as_str()).map(|p| (*p).clone()))
        .collect())
}
