//! Behavior-tree traversal (C5, spec §4.5): pre-order, left-to-right,
//! declared-child-order descent with per-composite cursor state. Sequence
//! nodes advance on SUCCESS and fail immediately on FAILURE; selector
//! nodes succeed immediately on SUCCESS and advance on FAILURE.

use std::collections::HashMap;

use crate::domain::{MissionNode, NodeKind, TraversalState, ROOT};
use crate::validate::ValidatedTree;

/// What the controller should do after a traversal step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Drive this leaf node next (dispatch its route/action).
    RunLeaf(String),
    /// The whole tree has resolved; `root`'s own outcome.
    Done(TraversalState),
}

/// Traversal state for one in-flight mission: a cursor into each
/// composite's declared child list, plus the last-known traversal state of
/// every node (composite and leaf) for status reporting (spec §3's
/// `MissionStatus.node_status`).
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    cursor: HashMap<String, usize>,
    states: HashMap<String, TraversalState>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, node: &str) -> TraversalState {
        self.states.get(node).copied().unwrap_or(TraversalState::Idle)
    }

    pub fn states(&self) -> &HashMap<String, TraversalState> {
        &self.states
    }

    /// Begins (or resumes) traversal from `root`, descending to the first
    /// leaf that needs to run.
    pub fn start(&mut self, tree: &ValidatedTree) -> StepOutcome {
        self.states.insert(ROOT.to_string(), TraversalState::Running);
        self.descend(tree, ROOT)
    }

    /// Reports the outcome of the leaf the controller was told to run, and
    /// returns the next step.
    pub fn complete(&mut self, tree: &ValidatedTree, leaf: &str, result: TraversalState) -> StepOutcome {
        self.states.insert(leaf.to_string(), result);
        self.propagate(tree, leaf, result)
    }

    /// Walks from `node_name` down to the next leaf to run, initializing
    /// cursors for any composite entered for the first time.
    fn descend(&mut self, tree: &ValidatedTree, node_name: &str) -> StepOutcome {
        let children = tree.children_of(node_name);
        let idx = *self.cursor.entry(node_name.to_string()).or_insert(0);

        let Some(child_name) = children.get(idx) else {
            // A composite with no children is vacuously successful.
            return self.finish_composite(tree, node_name, TraversalState::Success);
        };

        let child = tree.node(child_name).expect("validated tree is internally consistent");
        if child.kind.is_composite() {
            self.states.insert(child_name.clone(), TraversalState::Running);
            self.descend(tree, child_name)
        } else {
            self.states.insert(child_name.clone(), TraversalState::Running);
            StepOutcome::RunLeaf(child_name.clone())
        }
    }

    /// Applies `result` at `node_name` and bubbles the consequence up
    /// through its ancestors per sequence/selector semantics.
    fn propagate(&mut self, tree: &ValidatedTree, node_name: &str, result: TraversalState) -> StepOutcome {
        let Some(parent_name) = tree.parent_of(node_name) else {
            // node_name is root itself.
            return StepOutcome::Done(result);
        };
        let parent_name = parent_name.to_string();
        let parent = tree.node(&parent_name);
        let is_sequence = match parent {
            Some(MissionNode { kind: NodeKind::Sequence, .. }) => true,
            Some(MissionNode { kind: NodeKind::Selector, .. }) => false,
            None => {
                // parent is the implicit root, which behaves as a sequence.
                true
            }
            _ => unreachable!("composite parent must be Sequence or Selector"),
        };

        let short_circuits = if is_sequence {
            result == TraversalState::Failure
        } else {
            result == TraversalState::Success
        };

        if short_circuits {
            self.finish_composite(tree, &parent_name, result)
        } else {
            let idx = self.cursor.entry(parent_name.clone()).or_insert(0);
            *idx += 1;
            self.descend(tree, &parent_name)
        }
    }

    fn finish_composite(&mut self, tree: &ValidatedTree, node_name: &str, result: TraversalState) -> StepOutcome {
        self.states.insert(node_name.to_string(), result);
        if node_name == ROOT {
            StepOutcome::Done(result)
        } else {
            self.propagate(tree, node_name, result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pose;
    use crate::validate::{validate, MissionNodeInput};

    fn waypoint() -> Vec<Pose> {
        vec![Pose { x: 0.0, y: 0.0, theta: 0.0, map_id: "map".into() }]
    }

    /// root (implicit sequence) -> [seq(a,b)]; a and b are actions.
    fn sequence_tree() -> ValidatedTree {
        validate(vec![
            MissionNodeInput { name: Some("seq".into()), parent: None, kind: NodeKind::Sequence },
            MissionNodeInput {
                name: Some("a".into()),
                parent: Some("seq".into()),
                kind: NodeKind::Action { action_type: "pick".into(), action_parameters: serde_json::json!({}) },
            },
            MissionNodeInput {
                name: Some("b".into()),
                parent: Some("seq".into()),
                kind: NodeKind::Action { action_type: "drop".into(), action_parameters: serde_json::json!({}) },
            },
        ])
        .unwrap()
    }

    #[test]
    fn sequence_runs_children_in_order_and_fails_fast() {
        let tree = sequence_tree();
        let mut interp = Interpreter::new();

        assert_eq!(interp.start(&tree), StepOutcome::RunLeaf("a".into()));
        // a fails: sequence should fail immediately without running b.
        let outcome = interp.complete(&tree, "a", TraversalState::Failure);
        assert_eq!(outcome, StepOutcome::Done(TraversalState::Failure));
        assert_eq!(interp.state_of("seq"), TraversalState::Failure);
        assert_eq!(interp.state_of("b"), TraversalState::Idle);
    }

    #[test]
    fn sequence_advances_on_success_and_completes() {
        let tree = sequence_tree();
        let mut interp = Interpreter::new();

        assert_eq!(interp.start(&tree), StepOutcome::RunLeaf("a".into()));
        assert_eq!(interp.complete(&tree, "a", TraversalState::Success), StepOutcome::RunLeaf("b".into()));
        assert_eq!(interp.complete(&tree, "b", TraversalState::Success), StepOutcome::Done(TraversalState::Success));
    }

    /// root -> selector(route_primary, route_fallback); mirrors spec
    /// scenario S3: the selector (and thus the mission) succeeds via its
    /// fallback child even though the primary route node failed, and the
    /// selector's own node_status must read SUCCESS.
    #[test]
    fn selector_falls_back_and_reports_success_on_its_own_node() {
        let tree = validate(vec![
            MissionNodeInput { name: Some("route_fallback".into()), parent: None, kind: NodeKind::Selector },
            MissionNodeInput {
                name: Some("route_primary".into()),
                parent: Some("route_fallback".into()),
                kind: NodeKind::Route { waypoints: waypoint() },
            },
            MissionNodeInput {
                name: Some("route_backup".into()),
                parent: Some("route_fallback".into()),
                kind: NodeKind::Route { waypoints: waypoint() },
            },
        ])
        .unwrap();
        let mut interp = Interpreter::new();

        assert_eq!(interp.start(&tree), StepOutcome::RunLeaf("route_primary".into()));
        assert_eq!(
            interp.complete(&tree, "route_primary", TraversalState::Failure),
            StepOutcome::RunLeaf("route_backup".into())
        );
        assert_eq!(
            interp.complete(&tree, "route_backup", TraversalState::Success),
            StepOutcome::Done(TraversalState::Success)
        );
        assert_eq!(interp.state_of("route_fallback"), TraversalState::Success);
    }

    #[test]
    fn nested_composites_descend_left_to_right() {
        // root -> seq(inner_selector(a,b), c)
        let tree = validate(vec![
            MissionNodeInput { name: Some("seq".into()), parent: None, kind: NodeKind::Sequence },
            MissionNodeInput { name: Some("inner".into()), parent: Some("seq".into()), kind: NodeKind::Selector },
            MissionNodeInput {
                name: Some("a".into()),
                parent: Some("inner".into()),
                kind: NodeKind::Action { action_type: "noop".into(), action_parameters: serde_json::json!({}) },
            },
            MissionNodeInput {
                name: Some("b".into()),
                parent: Some("inner".into()),
                kind: NodeKind::Action { action_type: "noop".into(), action_parameters: serde_json::json!({}) },
            },
            MissionNodeInput {
                name: Some("c".into()),
                parent: Some("seq".into()),
                kind: NodeKind::Action { action_type: "noop".into(), action_parameters: serde_json::json!({}) },
            },
        ])
        .unwrap();
        let mut interp = Interpreter::new();

        assert_eq!(interp.start(&tree), StepOutcome::RunLeaf("a".into()));
        // inner selector short-circuits on a's success; seq advances to c.
        assert_eq!(interp.complete(&tree, "a", TraversalState::Success), StepOutcome::RunLeaf("c".into()));
        assert_eq!(interp.state_of("inner"), TraversalState::Success);
        assert_eq!(interp.complete(&tree, "c", TraversalState::Success), StepOutcome::Done(TraversalState::Success));
    }
}
