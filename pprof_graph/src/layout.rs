//! Direction-aware partitioning of the call graph into flame graph boxes.
//!
//! A walk starts at a node (the virtual root or a function), sums the selected
//! metric over the calls reaching that node, and splits its horizontal extent
//! among the next callees (walking down) or callers (walking up) in the order
//! they were first seen. Each child only keeps the calls that continue the
//! exact stacks of its parent, matched by sample and depth, so a function
//! reached along several paths is never double counted.
//!
//! Walks are lazy: [`Walk`] yields boxes depth first, parent before children,
//! and can be dropped at any point.

use crate::call_graph::{CallGraph, CallId, NodeKey};
use crate::{FunctionId, Profile, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Box id of the virtual root and of stack entry markers.
pub const ROOT_ID: i64 = 0;

/// Box id of synthetic label boxes.
pub const LABEL_ID: i64 = -1;

/// Walk direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward callees.
    Down,
    /// Toward callers.
    Up,
}

impl Direction {
    /// Level (and depth) increment of one step.
    pub fn step(self) -> i64 {
        match self {
            Direction::Down => 1,
            Direction::Up => -1,
        }
    }
}

/// Horizontal alignment hint for a box label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Center,
}

/// An aggregated flame graph box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlameBox {
    pub label: String,
    /// Function id, [`ROOT_ID`] or [`LABEL_ID`].
    pub id: i64,
    #[serde(skip)]
    pub func: Option<FunctionId>,
    /// Distance from the walk origin; negative for ancestors.
    pub level: i64,
    pub group: Option<usize>,
    pub x1: f64,
    pub x2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    pub cost: i64,
    #[serde(skip)]
    pub calls: Vec<CallId>,
}

/// An undecorated node produced by [`Walk`].
#[derive(Debug, Clone, PartialEq)]
pub struct WalkNode {
    /// `None` for the root and for entry markers.
    pub func: Option<FunctionId>,
    pub level: i64,
    pub x1: f64,
    pub x2: f64,
    pub cost: i64,
    pub calls: Vec<CallId>,
    /// Whether this node marks a stack entry reached while walking up.
    pub frontier: bool,
}

/// Calls sharing one grouping key, with their summed cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Option<FunctionId>,
    pub calls: Vec<CallId>,
    pub cost: i64,
}

/// Group calls by callee (down) or caller (up), in first-encounter order.
pub fn partition(
    profile: &Profile,
    graph: &CallGraph,
    metric: usize,
    calls: &[CallId],
    direction: Direction,
) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<Option<FunctionId>, usize> = HashMap::new();

    for &id in calls {
        let call = graph.call(id);
        let key = match direction {
            Direction::Down => call.callee,
            Direction::Up => call.caller,
        };
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                key,
                calls: Vec::new(),
                cost: 0,
            });
            groups.len() - 1
        });
        groups[slot].calls.push(id);
        groups[slot].cost += call.cost(profile, metric);
    }

    groups
}

/// Extent of each group inside `[x1, x2]`, proportional to its share of `total`.
///
/// Returns no extents when `total` is not positive. Groups with a negative
/// cost get zero width, and no extent ever runs past `x2`.
pub fn extents(groups: &[Group], total: i64, x1: f64, x2: f64) -> Vec<(f64, f64)> {
    if total <= 0 {
        return Vec::new();
    }

    let width = x2 - x1;
    let mut running: i64 = 0;
    let mut start = x1;
    groups
        .iter()
        .map(|group| {
            running = running.saturating_add(group.cost.max(0)).min(total);
            let end = if running == total {
                x2
            } else {
                x1 + width * (running as f64 / total as f64)
            };
            let extent = (start, end);
            start = end;
            extent
        })
        .collect()
}

/// Keep only the shallowest call of each sample.
///
/// Applied to the calls into (or out of) a function before walking from it,
/// so recursive re-entries of the function do not show up as separate
/// branches.
pub fn first_calls(graph: &CallGraph, calls: &[CallId]) -> Vec<CallId> {
    let mut shallowest: HashMap<usize, usize> = HashMap::new();
    for &id in calls {
        let call = graph.call(id);
        shallowest
            .entry(call.sample)
            .and_modify(|depth| *depth = (*depth).min(call.depth))
            .or_insert(call.depth);
    }

    calls
        .iter()
        .copied()
        .filter(|&id| {
            let call = graph.call(id);
            shallowest.get(&call.sample) == Some(&call.depth)
        })
        .collect()
}

enum Target {
    Node {
        func: Option<FunctionId>,
        previous: Option<Vec<CallId>>,
    },
    Frontier {
        calls: Vec<CallId>,
        cost: i64,
    },
}

struct Pending {
    target: Target,
    level: i64,
    x1: f64,
    x2: f64,
}

/// Lazy depth-first walk over the call graph.
pub struct Walk<'a> {
    profile: &'a Profile,
    graph: &'a CallGraph,
    metric: usize,
    direction: Direction,
    pending: Vec<Pending>,
}

impl Walk<'_> {
    fn candidates(&self, func: Option<FunctionId>, previous: Option<&[CallId]>) -> Vec<CallId> {
        let calls = match (func, self.direction) {
            (None, _) => self.graph.entries(),
            (Some(id), Direction::Down) => self.graph.calls_from(NodeKey::Function(id)),
            (Some(id), Direction::Up) => self.graph.calls_to(NodeKey::Function(id)),
        };

        let Some(previous) = previous else {
            return calls.to_vec();
        };

        let step = self.direction.step() as isize;
        let continuations: HashSet<(usize, usize)> = previous
            .iter()
            .filter_map(|&id| {
                let call = self.graph.call(id);
                call.depth
                    .checked_add_signed(step)
                    .map(|depth| (call.sample, depth))
            })
            .collect();

        calls
            .iter()
            .copied()
            .filter(|&id| {
                let call = self.graph.call(id);
                continuations.contains(&(call.sample, call.depth))
            })
            .collect()
    }
}

impl Iterator for Walk<'_> {
    type Item = WalkNode;

    fn next(&mut self) -> Option<WalkNode> {
        let Pending {
            target,
            level,
            x1,
            x2,
        } = self.pending.pop()?;

        let (func, previous) = match target {
            Target::Frontier { calls, cost } => {
                return Some(WalkNode {
                    func: None,
                    level,
                    x1,
                    x2,
                    cost,
                    calls,
                    frontier: true,
                });
            }
            Target::Node { func, previous } => (func, previous),
        };

        let calls = self.candidates(func, previous.as_deref());
        let cost = self.graph.cost(self.profile, self.metric, &calls);

        let groups = partition(self.profile, self.graph, self.metric, &calls, self.direction);
        let bounds = extents(&groups, cost, x1, x2);
        let child_level = level + self.direction.step();

        let mut children = Vec::with_capacity(groups.len());
        for (group, (cx1, cx2)) in groups.into_iter().zip(bounds) {
            let target = match (group.key, self.direction) {
                (Some(key), _) => Target::Node {
                    func: Some(key),
                    previous: Some(group.calls),
                },
                (None, Direction::Up) => Target::Frontier {
                    calls: group.calls,
                    cost: group.cost,
                },
                // Stack exits carry self cost but have no box of their own
                (None, Direction::Down) => continue,
            };
            children.push(Pending {
                target,
                level: child_level,
                x1: cx1,
                x2: cx2,
            });
        }
        self.pending.extend(children.into_iter().rev());

        Some(WalkNode {
            func,
            level,
            x1,
            x2,
            cost,
            calls,
            frontier: false,
        })
    }
}

/// Flame graph layout of one call graph under one metric.
#[derive(Clone, Copy)]
pub struct Layout<'a> {
    profile: &'a Profile,
    graph: &'a CallGraph,
    metric: usize,
}

impl<'a> Layout<'a> {
    /// Create a layout, checking that `metric` names a sample type.
    pub fn new(profile: &'a Profile, graph: &'a CallGraph, metric: usize) -> Result<Self> {
        profile.check_metric(metric)?;
        Ok(Self {
            profile,
            graph,
            metric,
        })
    }

    /// Raw walk from `func` (or the root) seeded with the given geometry.
    ///
    /// `previous` restricts the first step to calls continuing those stacks.
    pub fn walk(
        &self,
        func: Option<FunctionId>,
        level: i64,
        x1: f64,
        x2: f64,
        previous: Option<Vec<CallId>>,
        direction: Direction,
    ) -> Walk<'a> {
        Walk {
            profile: self.profile,
            graph: self.graph,
            metric: self.metric,
            direction,
            pending: vec![Pending {
                target: Target::Node { func, previous },
                level,
                x1,
                x2,
            }],
        }
    }

    /// Boxes for `func` (or the root) and everything it calls.
    pub fn down(&self, func: Option<FunctionId>, level: i64) -> impl Iterator<Item = FlameBox> + 'a {
        let previous =
            func.map(|id| first_calls(self.graph, self.graph.calls_to(NodeKey::Function(id))));
        let (profile, graph) = (self.profile, self.graph);
        self.walk(func, level, 0.0, 1.0, previous, Direction::Down)
            .map(move |node| decorate(profile, graph, node))
    }

    /// Boxes for every caller of `func`, excluding `func` itself.
    ///
    /// Stack entry points show up as `root` boxes.
    pub fn up(&self, func: FunctionId, level: i64) -> impl Iterator<Item = FlameBox> + 'a {
        let previous = first_calls(self.graph, self.graph.calls_from(NodeKey::Function(func)));
        let (profile, graph) = (self.profile, self.graph);
        self.walk(Some(func), level, 0.0, 1.0, Some(previous), Direction::Up)
            .skip(1)
            .map(move |node| decorate(profile, graph, node))
    }

    /// Cost of `func` counted once per sample, as `down` reports it.
    pub fn cost(&self, func: Option<FunctionId>) -> i64 {
        self.down(func, 0).next().map_or(0, |root| root.cost)
    }
}

/// Display name of a function.
pub fn label(profile: &Profile, func: FunctionId) -> String {
    match profile.function(func) {
        Some(function) if !function.name.is_empty() => function.name.clone(),
        Some(function) if !function.system_name.is_empty() => function.system_name.clone(),
        _ => "(anonymous)".to_string(),
    }
}

fn decorate(profile: &Profile, graph: &CallGraph, node: WalkNode) -> FlameBox {
    let (label, id, group) = match node.func {
        Some(func) => (
            label(profile, func),
            // loaded profiles reject ids above i64::MAX
            i64::try_from(func).unwrap_or(i64::MAX),
            graph.function_group(profile, func),
        ),
        None => ("root".to_string(), ROOT_ID, None),
    };

    FlameBox {
        label,
        id,
        func: node.func,
        level: node.level,
        group,
        x1: node.x1,
        x2: node.x2,
        align: None,
        cost: node.cost,
        calls: node.calls,
    }
}
