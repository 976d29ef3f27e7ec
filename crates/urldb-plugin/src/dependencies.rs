//! Plugin dependency graph built from `@dependencies` headers.
//!
//! Used to order a batch load so that every plugin starts after the plugins
//! it depends on, and to find the dependents that block a disable.

use std::collections::{HashMap, HashSet};

/// Directed graph `plugin -> dependencies`, remembering insertion order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
}

/// Topological order of a graph plus the cycles that were left out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOrder {
    /// Plugins, each after all of its dependencies in the graph.
    pub order: Vec<String>,
    /// Each cycle as a closed path, e.g. `[a, b, a]`.
    pub cycles: Vec<Vec<String>>,
}

impl LoadOrder {
    /// The cycle `plugin` is part of, if any.
    pub fn cycle_of(&self, plugin: &str) -> Option<&[String]> {
        self.cycles
            .iter()
            .find(|c| c.iter().any(|p| p == plugin))
            .map(Vec::as_slice)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `plugin` with its declared dependencies. Adding a plugin twice
    /// replaces its edges but keeps its first position.
    pub fn add(&mut self, plugin: &str, dependencies: &[String]) {
        if !self.edges.contains_key(plugin) {
            self.order.push(plugin.to_string());
        }
        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        self.edges.insert(plugin.to_string(), deps);
    }

    /// Whether `plugin` is a node of the graph.
    pub fn contains(&self, plugin: &str) -> bool {
        self.edges.contains_key(plugin)
    }

    /// Direct dependencies of `plugin`.
    pub fn dependencies(&self, plugin: &str) -> &[String] {
        self.edges.get(plugin).map(Vec::as_slice).unwrap_or_default()
    }

    /// Plugins that depend directly on `plugin`, in insertion order.
    pub fn dependents(&self, plugin: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|p| self.dependencies(p).iter().any(|d| d == plugin))
            .cloned()
            .collect()
    }

    /// Depth-first topological sort.
    ///
    /// Ties keep insertion order. Dependencies that are not nodes of the
    /// graph are ignored here; they are checked when the plugin is enabled.
    /// Plugins on a cycle are left out of `order` and reported in `cycles`.
    pub fn load_order(&self) -> LoadOrder {
        let cycles = self.cycles();
        let cyclic: HashSet<&str> = cycles
            .iter()
            .flat_map(|c| c.iter().map(String::as_str))
            .collect();

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.order.len());
        for plugin in &self.order {
            if !cyclic.contains(plugin.as_str()) {
                self.place(plugin, &cyclic, &mut marks, &mut order);
            }
        }
        LoadOrder { order, cycles }
    }

    fn place<'a>(
        &'a self,
        plugin: &'a str,
        cyclic: &HashSet<&str>,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) {
        if marks.contains_key(plugin) {
            return;
        }
        marks.insert(plugin, Mark::Visiting);
        for dep in self.dependencies(plugin) {
            if self.contains(dep) && !cyclic.contains(dep.as_str()) {
                self.place(dep, cyclic, marks, order);
            }
        }
        marks.insert(plugin, Mark::Done);
        order.push(plugin.to_string());
    }

    /// Every cycle reachable in the graph, each reported once.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();
        let mut cycles = Vec::new();
        for plugin in &self.order {
            if !marks.contains_key(plugin.as_str()) {
                self.walk(plugin, &mut marks, &mut path, &mut cycles);
            }
        }
        cycles
    }

    fn walk<'a>(
        &'a self,
        plugin: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        marks.insert(plugin, Mark::Visiting);
        path.push(plugin);

        for dep in self.dependencies(plugin) {
            if !self.contains(dep) {
                continue;
            }
            match marks.get(dep.as_str()) {
                None => self.walk(dep, marks, path, cycles),
                Some(Mark::Visiting) => {
                    if let Some(start) = path.iter().position(|p| *p == dep.as_str()) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|p| p.to_string()).collect();
                        cycle.push(dep.clone());
                        cycles.push(cycle);
                    }
                }
                Some(Mark::Done) => {}
            }
        }

        path.pop();
        marks.insert(plugin, Mark::Done);
    }
}
