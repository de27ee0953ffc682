//! View-model tying settings, call graph and derived caches together.
//!
//! Changing the ignore list rebuilds the call graph and drops every cache.
//! Changing the metric drops the total cost and the line tables. Changing the
//! focus only affects the next [`Session::boxes`] call.

use crate::call_graph::CallGraph;
use crate::layout::{Align, FlameBox, LABEL_ID, Layout};
use crate::lines::{self, LineCost};
use crate::units;
use crate::{FunctionId, Profile, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// User-controlled view settings, persisted by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Index of the selected sample type.
    #[serde(default)]
    pub sample: usize,
    /// Function the graph is focused on.
    #[serde(default)]
    pub focused: Option<FunctionId>,
    /// Functions whose samples are left out.
    #[serde(default)]
    pub ignored: Vec<FunctionId>,
}

impl Settings {
    /// Default settings for a profile: its default metric, no focus, nothing ignored.
    pub fn for_profile(profile: &Profile) -> Self {
        Settings {
            sample: profile.default_metric(),
            ..Settings::default()
        }
    }

    pub fn ignored_set(&self) -> HashSet<FunctionId> {
        self.ignored.iter().copied().collect()
    }
}

/// What a settings update invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    None,
    Focus,
    Metric,
    Ignored,
}

/// A profile being viewed, with its graph and caches.
pub struct Session {
    profile: Profile,
    graph: CallGraph,
    settings: Settings,
    total_cost: Option<i64>,
    line_data: HashMap<FunctionId, Vec<LineCost>>,
}

impl Session {
    pub fn new(profile: Profile, settings: Settings) -> Result<Self> {
        profile.check_metric(settings.sample)?;
        let graph = CallGraph::build(&profile, &settings.ignored_set())?;
        Ok(Session {
            profile,
            graph,
            settings,
            total_cost: None,
            line_data: HashMap::new(),
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn graph(&self) -> &CallGraph {
        &self.graph
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Swap in a new profile, keeping the current settings.
    pub fn set_profile(&mut self, profile: Profile) -> Result<()> {
        profile.check_metric(self.settings.sample)?;
        self.graph.rebuild(&profile, &self.settings.ignored_set())?;
        self.profile = profile;
        self.invalidate();
        Ok(())
    }

    /// Apply new settings, recomputing only what they affect.
    ///
    /// On error the previous settings stay in effect.
    pub fn update(&mut self, settings: Settings) -> Result<Change> {
        self.profile.check_metric(settings.sample)?;

        let ignored = settings.ignored_set();
        let change = if ignored != self.settings.ignored_set() {
            self.graph.rebuild(&self.profile, &ignored)?;
            self.invalidate();
            Change::Ignored
        } else if settings.sample != self.settings.sample {
            self.invalidate();
            Change::Metric
        } else if settings.focused != self.settings.focused {
            Change::Focus
        } else {
            Change::None
        };

        log::debug!("settings updated ({:?}): {:?}", change, settings);
        self.settings = settings;
        Ok(change)
    }

    /// Focus the graph on a function, or clear the focus.
    pub fn focus(&mut self, func: Option<FunctionId>) -> Result<Change> {
        let mut settings = self.settings.clone();
        settings.focused = func;
        self.update(settings)
    }

    /// Leave out every sample that passes through `func`.
    pub fn ignore(&mut self, func: FunctionId) -> Result<Change> {
        let mut settings = self.settings.clone();
        if !settings.ignored.contains(&func) {
            settings.ignored.push(func);
        }
        if settings.focused == Some(func) {
            settings.focused = None;
        }
        self.update(settings)
    }

    /// Bring back the samples of a previously ignored function.
    pub fn unignore(&mut self, func: FunctionId) -> Result<Change> {
        let mut settings = self.settings.clone();
        settings.ignored.retain(|&id| id != func);
        self.update(settings)
    }

    fn invalidate(&mut self) {
        self.total_cost = None;
        self.line_data.clear();
    }

    /// Total of the selected metric over every sample in the graph.
    pub fn total_cost(&mut self) -> i64 {
        if let Some(total) = self.total_cost {
            return total;
        }
        let total = self
            .graph
            .cost(&self.profile, self.settings.sample, self.graph.entries());
        self.total_cost = Some(total);
        total
    }

    /// Boxes for the current settings.
    ///
    /// With a focus, the focused function's callers come first at negative
    /// levels, then a label row with its share of the total at level 0, then
    /// the function and its callees from level 1.
    pub fn boxes(&mut self) -> Result<Vec<FlameBox>> {
        let total = self.total_cost();
        let layout = Layout::new(&self.profile, &self.graph, self.settings.sample)?;

        let focus = match self.settings.focused {
            Some(func) if self.graph.contains(func) => Some(func),
            Some(func) => {
                log::warn!("focused function {} is not in the call graph, showing everything", func);
                None
            }
            None => None,
        };

        let Some(func) = focus else {
            let boxes: Vec<_> = layout.down(None, 0).collect();
            log::debug!("laid out {} boxes", boxes.len());
            return Ok(boxes);
        };

        let mut boxes: Vec<FlameBox> = layout.up(func, 0).collect();
        let below: Vec<FlameBox> = layout.down(Some(func), 1).collect();
        let cost = below.first().map_or(0, |b| b.cost);
        boxes.push(self.focus_label(cost, total));
        boxes.extend(below);

        log::debug!("laid out {} boxes focused on function {}", boxes.len(), func);
        Ok(boxes)
    }

    fn focus_label(&self, cost: i64, total: i64) -> FlameBox {
        let sample_type = &self.profile.sample_types[self.settings.sample];
        let label = match sample_type.unit_kind() {
            Ok(kind) => units::format(kind, cost, total),
            Err(err) => {
                log::warn!("{} in sample type '{}', showing raw value", err, sample_type.name);
                format!("{} ({})", cost, units::percent(cost, total))
            }
        };

        FlameBox {
            label,
            id: LABEL_ID,
            func: None,
            level: 0,
            group: None,
            x1: 0.0,
            x2: 1.0,
            align: Some(Align::Center),
            cost,
            calls: Vec::new(),
        }
    }

    /// Line-cost table of a function under the selected metric.
    pub fn line_costs(&mut self, func: FunctionId) -> Result<&[LineCost]> {
        if !self.line_data.contains_key(&func) {
            let total = self.total_cost();
            let rows =
                lines::line_costs(&self.profile, &self.graph, self.settings.sample, func, total)?;
            self.line_data.insert(func, rows);
        }
        Ok(&self.line_data[&func])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::fixtures::{profile, profile_with_unit};
    use crate::layout::ROOT_ID;

    fn stacks() -> Profile {
        profile(&[(&[1, 2, 3], 10), (&[4, 3], 5), (&[1, 2], 7), (&[5], 20)])
    }

    #[test]
    fn unfocused_boxes_start_at_the_root() {
        let profile = stacks();
        let settings = Settings::for_profile(&profile);
        assert_eq!(settings.sample, 1);

        let mut session = Session::new(profile, settings).unwrap();
        let boxes = session.boxes().unwrap();

        assert_eq!(boxes[0].id, ROOT_ID);
        assert_eq!(boxes[0].level, 0);
        assert_eq!(boxes[0].cost, 42);
        assert_eq!(session.total_cost(), 42);
    }

    #[test]
    fn focus_shows_callers_label_and_callees() {
        let profile = stacks();
        let settings = Settings {
            focused: Some(3),
            ..Settings::for_profile(&profile)
        };
        let mut session = Session::new(profile, settings).unwrap();
        let boxes = session.boxes().unwrap();

        let order: Vec<_> = boxes.iter().map(|b| (b.id, b.level)).collect();
        assert_eq!(
            order,
            vec![
                (2, -1),
                (1, -2),
                (ROOT_ID, -3),
                (4, -1),
                (ROOT_ID, -2),
                (LABEL_ID, 0),
                (3, 1)
            ]
        );

        let callers: i64 = boxes.iter().filter(|b| b.level == -1).map(|b| b.cost).sum();
        assert_eq!(callers, 15);

        let label = &boxes[5];
        assert_eq!(label.label, "15.0 ns (36%)");
        assert_eq!(label.align, Some(Align::Center));
        assert_eq!((label.x1, label.x2), (0.0, 1.0));
        assert_eq!(boxes[6].cost, 15);
    }

    #[test]
    fn focused_cost_matches_stacks_through_the_function() {
        let profile = stacks();
        let all = Settings::for_profile(&profile);
        let mut everything = Session::new(profile.clone(), all.clone()).unwrap();
        let mut without = Session::new(
            profile.clone(),
            Settings {
                ignored: vec![3],
                ..all.clone()
            },
        )
        .unwrap();
        let mut focused = Session::new(
            profile,
            Settings {
                focused: Some(3),
                ..all
            },
        )
        .unwrap();

        let through = everything.total_cost() - without.total_cost();
        let boxes = focused.boxes().unwrap();
        let focus_box = boxes.iter().find(|b| b.id == 3).unwrap();
        assert_eq!(focus_box.cost, through);
    }

    #[test]
    fn focus_on_ignored_function_falls_back() {
        let profile = stacks();
        let settings = Settings {
            focused: Some(3),
            ignored: vec![3],
            ..Settings::for_profile(&profile)
        };
        let mut session = Session::new(profile, settings).unwrap();
        let boxes = session.boxes().unwrap();

        assert_eq!(boxes[0].id, ROOT_ID);
        assert_eq!(boxes[0].cost, 27);
        assert!(boxes.iter().all(|b| b.id != 3));
    }

    #[test]
    fn updates_invalidate_what_they_touch() {
        let profile = stacks();
        let settings = Settings::for_profile(&profile);
        let mut session = Session::new(profile, settings).unwrap();

        assert_eq!(session.line_costs(1).unwrap().len(), 2);
        assert!(session.total_cost.is_some());

        assert_eq!(session.focus(Some(2)).unwrap(), Change::Focus);
        assert!(!session.line_data.is_empty());

        let mut settings = session.settings().clone();
        assert_eq!(session.update(settings.clone()).unwrap(), Change::None);

        settings.sample = 0;
        assert_eq!(session.update(settings).unwrap(), Change::Metric);
        assert!(session.line_data.is_empty());
        assert!(session.total_cost.is_none());
        assert_eq!(session.total_cost(), 4);

        assert_eq!(session.ignore(5).unwrap(), Change::Ignored);
        assert!(!session.graph().contains(5));
        assert_eq!(session.total_cost(), 3);

        assert_eq!(session.unignore(5).unwrap(), Change::Ignored);
        assert!(session.graph().contains(5));
    }

    #[test]
    fn ignoring_the_focus_clears_it() {
        let profile = stacks();
        let settings = Settings {
            focused: Some(2),
            ..Settings::for_profile(&profile)
        };
        let mut session = Session::new(profile, settings).unwrap();

        session.ignore(2).unwrap();
        assert_eq!(session.settings().focused, None);
        assert_eq!(session.settings().ignored, vec![2]);
    }

    #[test]
    fn bad_metric_keeps_previous_settings() {
        let profile = stacks();
        let settings = Settings::for_profile(&profile);
        let mut session = Session::new(profile, settings.clone()).unwrap();

        let result = session.update(Settings {
            sample: 5,
            ..settings.clone()
        });
        assert!(matches!(result, Err(Error::MetricOutOfRange { index: 5, count: 2 })));
        assert_eq!(session.settings(), &settings);
    }

    #[test]
    fn unsupported_unit_only_affects_formatting() {
        let profile = profile_with_unit(&[(&[1, 2], 10)], "widgets");
        let settings = Settings {
            focused: Some(2),
            ..Settings::for_profile(&profile)
        };
        let mut session = Session::new(profile, settings).unwrap();

        let boxes = session.boxes().unwrap();
        let label = boxes.iter().find(|b| b.id == LABEL_ID).unwrap();
        assert_eq!(label.label, "10 (100%)");

        assert!(matches!(session.line_costs(2), Err(Error::UnsupportedUnit(_))));
    }

    #[test]
    fn new_profile_rebuilds_the_graph() {
        let mut session = Session::new(stacks(), Settings::for_profile(&stacks())).unwrap();
        assert_eq!(session.total_cost(), 42);

        session.set_profile(profile(&[(&[7], 3)])).unwrap();
        assert_eq!(session.total_cost(), 3);
        assert!(session.graph().contains(7));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"sample": 1, "focused": 3, "ignored": [2, 4]}"#).unwrap();
        assert_eq!(settings.sample, 1);
        assert_eq!(settings.focused, Some(3));
        assert_eq!(settings.ignored, vec![2, 4]);

        let settings: Settings = serde_json::from_str(r#"{"focused": null}"#).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
