//! Per-line cost breakdown of a function, for editor annotations.

use crate::call_graph::{CallGraph, NodeKey};
use crate::units::{self, UnitKind};
use crate::{Error, FunctionId, Profile, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Cost attributed to one source line of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineCost {
    pub function: FunctionId,
    /// Zero-based editor line.
    pub line: i64,
    pub value: String,
    pub unit: String,
    pub percent: String,
    pub cost: i64,
}

impl LineCost {
    fn new(kind: UnitKind, function: FunctionId, source_line: i64, cost: i64, total: i64) -> Self {
        let scaled = units::scale(kind, cost);
        LineCost {
            function,
            line: (source_line - 1).max(0),
            value: scaled.value,
            unit: scaled.unit.to_string(),
            percent: units::percent(cost, total),
            cost,
        }
    }
}

/// Break the cost of `func` down by the line executing in it.
///
/// The first row sits on the function's start line and carries its whole
/// cost; the rest follow in line order. Rows are not a plain sum over the
/// outgoing calls: a sample is counted at most once per row, so a recursive
/// function reports each stack once rather than once per re-entry. Lines the profile does not know
/// (zero or negative) only count toward the first row. Percentages are of
/// `total`.
pub fn line_costs(
    profile: &Profile,
    graph: &CallGraph,
    metric: usize,
    func: FunctionId,
    total: i64,
) -> Result<Vec<LineCost>> {
    let kind = profile
        .sample_types
        .get(metric)
        .ok_or(Error::MetricOutOfRange {
            index: metric,
            count: profile.sample_types.len(),
        })?
        .unit_kind()?;

    let calls = graph.calls_from(NodeKey::Function(func));
    if calls.is_empty() {
        return Ok(Vec::new());
    }

    let mut per_line: BTreeMap<i64, i64> = BTreeMap::new();
    let mut seen_lines: HashSet<(usize, i64)> = HashSet::new();
    let mut seen_samples: HashSet<usize> = HashSet::new();
    let mut own = 0;

    for &id in calls {
        let call = graph.call(id);
        let cost = call.cost(profile, metric);
        if seen_samples.insert(call.sample) {
            own += cost;
        }
        if call.line > 0 && seen_lines.insert((call.sample, call.line)) {
            *per_line.entry(call.line).or_default() += cost;
        }
    }

    let start_line = profile.function(func).map_or(0, |f| f.start_line);

    let mut rows = Vec::with_capacity(per_line.len() + 1);
    rows.push(LineCost::new(kind, func, start_line, own, total));
    rows.extend(
        per_line
            .into_iter()
            .map(|(line, cost)| LineCost::new(kind, func, line, cost, total)),
    );
    Ok(rows)
}
