//! Mission tree validation (spec §3 invariants i-iv, §4.5 "Validation on
//! ingest"): unique names, resolvable parents, no cycles, exactly one
//! kind, non-empty route waypoints, `root` not redeclared.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::domain::{MissionNode, NodeKind, ROOT};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("duplicate node name: {0}")]
    DuplicateName(String),
    #[error("node {0} redeclares the implicit root")]
    RootRedeclared(String),
    #[error("node {node} has unresolvable parent {parent}")]
    UnresolvedParent { node: String, parent: String },
    #[error("mission tree contains a cycle or is disconnected from root")]
    CycleOrDisconnected,
    #[error("route node {0} has no waypoints")]
    EmptyWaypoints(String),
}

/// A validated, immutable tree: node table plus declared child order per
/// parent (including the implicit `root` sequence).
#[derive(Debug, Clone)]
pub struct ValidatedTree {
    pub nodes: HashMap<String, MissionNode>,
    pub children: HashMap<String, Vec<String>>,
}

impl ValidatedTree {
    pub fn node(&self, name: &str) -> Option<&MissionNode> {
        self.nodes.get(name)
    }

    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        if name == ROOT {
            None
        } else {
            self.nodes.get(name).map(|n| n.parent.as_str())
        }
    }
}

/// Assigns missing names to their declaration index, as spec §3 invariant
/// (i) requires, before validation proper runs.
pub fn assign_default_names(tree: &mut [MissionNodeInput]) {
    for (idx, node) in tree.iter_mut().enumerate() {
        if node.name.is_none() {
            node.name = Some(idx.to_string());
        }
        if node.parent.is_none() {
            node.parent = Some(ROOT.to_string());
        }
    }
}

/// Raw, pre-validation representation of a mission node as ingested from
/// the Object Store (name/parent optional; `root` implicit).
#[derive(Debug, Clone)]
pub struct MissionNodeInput {
    pub name: Option<String>,
    pub parent: Option<String>,
    pub kind: NodeKind,
}

pub fn validate(tree: Vec<MissionNodeInput>) -> Result<ValidatedTree, ValidationError> {
    let mut tree = tree;
    assign_default_names(&mut tree);

    let mut nodes: HashMap<String, MissionNode> = HashMap::new();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    children.insert(ROOT.to_string(), Vec::new());

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(ROOT.to_string());

    for input in tree {
        let name = input.name.expect("assigned above");
        let parent = input.parent.expect("assigned above");

        if name == ROOT {
            return Err(ValidationError::RootRedeclared(name));
        }
        if !seen.insert(name.clone()) {
            return Err(ValidationError::DuplicateName(name));
        }
        if let NodeKind::Route { waypoints } = &input.kind {
            if waypoints.is_empty() {
                return Err(ValidationError::EmptyWaypoints(name));
            }
        }

        children.entry(parent.clone()).or_default().push(name.clone());
        nodes.insert(name.clone(), MissionNode { name, parent, kind: input.kind });
    }

    // Every non-root parent reference must resolve to a declared node or root.
    for node in nodes.values() {
        if node.parent != ROOT && !nodes.contains_key(&node.parent) {
            return Err(ValidationError::UnresolvedParent {
                node: node.name.clone(),
                parent: node.parent.clone(),
            });
        }
    }

    // Connectivity/cycle check: every declared node must be reachable from
    // root by walking `children`. If the graph has a cycle, not every node
    // will be visited (cycles can't be reached by a parent-rooted walk
    // that never revisits).
    let mut reached: HashSet<String> = HashSet::new();
    let mut stack = vec![ROOT.to_string()];
    while let Some(current) = stack.pop() {
        if !reached.insert(current.clone()) {
            continue;
        }
        for child in children.get(&current).map(Vec::as_slice).unwrap_or(&[]) {
            stack.push(child.clone());
        }
    }
    if reached.len() != nodes.len() + 1 {
        return Err(ValidationError::CycleOrDisconnected);
    }

    Ok(ValidatedTree { nodes, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pose;
    use pretty_assertions::assert_eq;

    fn route(waypoints: Vec<Pose>) -> NodeKind {
        NodeKind::Route { waypoints }
    }

    fn wp(x: f64) -> Pose {
        Pose { x, y: 0.0, theta: 0.0, map_id: "map".into() }
    }

    #[test]
    fn single_route_under_implicit_root() {
        let tree = vec![MissionNodeInput { name: None, parent: None, kind: route(vec![wp(1.0)]) }];
        let validated = validate(tree).unwrap();
        assert_eq!(validated.children_of(ROOT), &["0".to_string()]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let tree = vec![
            MissionNodeInput { name: Some("a".into()), parent: None, kind: route(vec![wp(1.0)]) },
            MissionNodeInput { name: Some("a".into()), parent: None, kind: route(vec![wp(2.0)]) },
        ];
        assert_eq!(validate(tree).unwrap_err(), ValidationError::DuplicateName("a".into()));
    }

    #[test]
    fn rejects_unresolved_parent() {
        let tree = vec![MissionNodeInput { name: Some("a".into()), parent: Some("missing".into()), kind: route(vec![wp(1.0)]) }];
        assert!(matches!(validate(tree).unwrap_err(), ValidationError::UnresolvedParent { .. }));
    }

    #[test]
    fn rejects_empty_waypoints() {
        let tree = vec![MissionNodeInput { name: Some("a".into()), parent: None, kind: route(vec![]) }];
        assert_eq!(validate(tree).unwrap_err(), ValidationError::EmptyWaypoints("a".into()));
    }

    #[test]
    fn rejects_redeclared_root() {
        let tree = vec![MissionNodeInput { name: Some(ROOT.into()), parent: None, kind: NodeKind::Sequence }];
        assert_eq!(validate(tree).unwrap_err(), ValidationError::RootRedeclared(ROOT.into()));
    }

    #[test]
    fn rejects_a_cycle() {
        // b's parent is c, c's parent is b: neither reachable from root.
        let tree = vec![
            MissionNodeInput { name: Some("b".into()), parent: Some("c".into()), kind: NodeKind::Sequence },
            MissionNodeInput { name: Some("c".into()), parent: Some("b".into()), kind: NodeKind::Sequence },
        ];
        assert_eq!(validate(tree).unwrap_err(), ValidationError::CycleOrDisconnected);
    }
}
