//! Bidirectional call graph built from profile samples.
//!
//! Every sample of `n` frames contributes `n + 1` calls: an entry call from
//! the virtual root into the outermost frame, one call per adjacent frame
//! pair, and an exit call out of the innermost frame. Their depths run
//! `0..=n`. Each call is indexed twice, under its caller's outgoing list and
//! under its callee's incoming list, with [`NodeKey::Root`] standing in for
//! the missing side of entry and exit calls.

use crate::{FunctionId, Profile, Result};
use std::collections::{HashMap, HashSet};

/// Index of a [`Call`] inside its [`CallGraph`].
pub type CallId = usize;

/// Key of a call graph node: the virtual root or a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Root,
    Function(FunctionId),
}

impl From<Option<FunctionId>> for NodeKey {
    fn from(func: Option<FunctionId>) -> Self {
        match func {
            Some(id) => NodeKey::Function(id),
            None => NodeKey::Root,
        }
    }
}

/// One frame transition within one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Calling function; `None` for the entry call.
    pub caller: Option<FunctionId>,
    /// Called function; `None` for the exit call.
    pub callee: Option<FunctionId>,
    /// Line executing in the caller; 0 for the entry call.
    pub line: i64,
    /// Position of this transition in its sample's stack.
    pub depth: usize,
    /// Index of the owning sample in [`Profile::samples`].
    pub sample: usize,
}

impl Call {
    /// Cost of this call under the given metric.
    pub fn cost(&self, profile: &Profile, metric: usize) -> i64 {
        profile.samples[self.sample].value[metric]
    }
}

#[derive(Debug, Clone, Default)]
struct Edges {
    outgoing: Vec<CallId>,
    incoming: Vec<CallId>,
}

/// Calls of a profile, indexed by caller and by callee.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    calls: Vec<Call>,
    edges: HashMap<NodeKey, Edges>,
    groups: HashMap<String, usize>,
}

impl CallGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph for `profile`, skipping samples that touch `ignored`.
    pub fn build(profile: &Profile, ignored: &HashSet<FunctionId>) -> Result<Self> {
        let mut graph = Self::new();
        graph.rebuild(profile, ignored)?;
        Ok(graph)
    }

    /// Replace all calls with those of `profile`, skipping samples that touch `ignored`.
    ///
    /// File groups assigned by earlier builds are kept. On error the graph is
    /// left unchanged.
    pub fn rebuild(&mut self, profile: &Profile, ignored: &HashSet<FunctionId>) -> Result<()> {
        let mut calls = Vec::new();
        let mut edges: HashMap<NodeKey, Edges> = HashMap::new();
        let mut groups = self.groups.clone();
        let mut skipped = 0;

        for (index, sample) in profile.samples.iter().enumerate() {
            let frames = profile.resolve_frames(index, sample)?;

            if frames.iter().any(|f| ignored.contains(&f.function)) {
                skipped += 1;
                continue;
            }

            for frame in &frames {
                if let Some(function) = profile.function(frame.function) {
                    let next = groups.len();
                    groups.entry(function.filename.clone()).or_insert(next);
                }
            }

            let mut caller: Option<FunctionId> = None;
            let mut line = 0;
            for depth in 0..=frames.len() {
                let callee = frames.get(depth).map(|f| f.function);
                let id = calls.len();
                calls.push(Call {
                    caller,
                    callee,
                    line,
                    depth,
                    sample: index,
                });
                edges.entry(caller.into()).or_default().outgoing.push(id);
                edges.entry(callee.into()).or_default().incoming.push(id);

                if let Some(frame) = frames.get(depth) {
                    caller = Some(frame.function);
                    line = frame.line;
                }
            }
        }

        log::debug!(
            "call graph rebuilt: {} calls over {} nodes, {} of {} samples ignored",
            calls.len(),
            edges.len(),
            skipped,
            profile.samples.len()
        );

        self.calls = calls;
        self.edges = edges;
        self.groups = groups;
        Ok(())
    }

    /// Look up a call by id.
    pub fn call(&self, id: CallId) -> &Call {
        &self.calls[id]
    }

    /// All calls in creation order.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Outgoing calls of a node, in insertion order.
    pub fn calls_from(&self, key: NodeKey) -> &[CallId] {
        self.edges
            .get(&key)
            .map(|e| e.outgoing.as_slice())
            .unwrap_or(&[])
    }

    /// Incoming calls of a node, in insertion order.
    pub fn calls_to(&self, key: NodeKey) -> &[CallId] {
        self.edges
            .get(&key)
            .map(|e| e.incoming.as_slice())
            .unwrap_or(&[])
    }

    /// Calls out of the virtual root: the outermost frame of every sample.
    pub fn entries(&self) -> &[CallId] {
        self.calls_from(NodeKey::Root)
    }

    /// Calls into the virtual root: the innermost frame of every sample.
    pub fn exits(&self) -> &[CallId] {
        self.calls_to(NodeKey::Root)
    }

    /// Whether any call touches the function.
    pub fn contains(&self, func: FunctionId) -> bool {
        self.edges.contains_key(&NodeKey::Function(func))
    }

    /// Color group of a source file, in first-encounter order.
    pub fn group(&self, filename: &str) -> Option<usize> {
        self.groups.get(filename).copied()
    }

    /// Color group of the file defining `func`.
    pub fn function_group(&self, profile: &Profile, func: FunctionId) -> Option<usize> {
        profile
            .function(func)
            .and_then(|function| self.group(&function.filename))
    }

    /// Sum of `metric` over the given calls.
    pub fn cost(&self, profile: &Profile, metric: usize, calls: &[CallId]) -> i64 {
        calls
            .iter()
            .map(|&id| self.calls[id].cost(profile, metric))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::fixtures::profile;

    #[test]
    fn sample_calls_form_a_depth_chain() {
        let profile = profile(&[(&[1, 2, 3], 10)]);
        let graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        assert_eq!(graph.len(), 4);
        let chain: Vec<_> = graph
            .calls()
            .iter()
            .map(|c| (c.caller, c.callee, c.depth))
            .collect();
        assert_eq!(
            chain,
            vec![
                (None, Some(1), 0),
                (Some(1), Some(2), 1),
                (Some(2), Some(3), 2),
                (Some(3), None, 3),
            ]
        );
    }

    #[test]
    fn call_lines_come_from_the_caller_frame() {
        let profile = profile(&[(&[1, 2], 10)]);
        let graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        let lines: Vec<_> = graph.calls().iter().map(|c| c.line).collect();
        assert_eq!(lines, vec![0, 11, 21]);
    }

    #[test]
    fn calls_are_indexed_both_ways() {
        let profile = profile(&[(&[1, 2], 10), (&[1, 3], 5)]);
        let graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        assert_eq!(graph.entries().len(), 2);
        assert_eq!(graph.exits().len(), 2);

        let from_one: Vec<_> = graph
            .calls_from(NodeKey::Function(1))
            .iter()
            .map(|&id| graph.call(id).callee)
            .collect();
        assert_eq!(from_one, vec![Some(2), Some(3)]);

        let to_two = graph.calls_to(NodeKey::Function(2));
        assert_eq!(to_two.len(), 1);
        assert_eq!(graph.call(to_two[0]).caller, Some(1));
    }

    #[test]
    fn unknown_function_yields_empty_lists() {
        let profile = profile(&[(&[1], 1)]);
        let graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        assert!(graph.calls_from(NodeKey::Function(99)).is_empty());
        assert!(graph.calls_to(NodeKey::Function(99)).is_empty());
        assert!(!graph.contains(99));
    }

    #[test]
    fn recursion_keeps_every_occurrence() {
        let profile = profile(&[(&[1, 2, 3, 2, 4], 10)]);
        let graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        let depths: Vec<_> = graph
            .calls_to(NodeKey::Function(2))
            .iter()
            .map(|&id| graph.call(id).depth)
            .collect();
        assert_eq!(depths, vec![1, 3]);
    }

    #[test]
    fn ignored_functions_drop_whole_samples() {
        let profile = profile(&[(&[1, 2, 3], 10), (&[1, 4], 5), (&[3], 1)]);
        let ignored: HashSet<_> = [3].into_iter().collect();
        let graph = CallGraph::build(&profile, &ignored).unwrap();

        assert!(
            graph
                .calls()
                .iter()
                .all(|c| c.caller != Some(3) && c.callee != Some(3))
        );
        assert!(!graph.contains(3));
        assert!(graph.calls().iter().all(|c| c.sample == 1));
        assert_eq!(graph.entries().len(), 1);
    }

    #[test]
    fn groups_follow_first_encounter_and_survive_rebuilds() {
        let profile = profile(&[(&[2, 1], 1)]);
        let mut graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        assert_eq!(graph.group("file0.go"), Some(0));
        assert_eq!(graph.group("file1.go"), Some(1));
        assert_eq!(graph.function_group(&profile, 1), Some(1));

        let ignored: HashSet<_> = [2].into_iter().collect();
        graph.rebuild(&profile, &ignored).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.group("file0.go"), Some(0));
    }

    #[test]
    fn malformed_profile_fails_fast() {
        let mut profile = profile(&[(&[1, 2], 1)]);
        profile.locations.remove(&2);

        let result = CallGraph::build(&profile, &HashSet::new());
        assert!(matches!(
            result,
            Err(Error::UnknownLocation {
                sample: 0,
                location: 2
            })
        ));
    }

    #[test]
    fn failed_rebuild_leaves_graph_intact() {
        let mut profile = profile(&[(&[1, 2], 1)]);
        let mut graph = CallGraph::build(&profile, &HashSet::new()).unwrap();

        profile.functions.remove(&2);
        assert!(graph.rebuild(&profile, &HashSet::new()).is_err());
        assert_eq!(graph.len(), 3);
    }
}
