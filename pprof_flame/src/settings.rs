//! Settings files and command-line overrides.
//!
//! A settings file holds the same `sample`, `focused` and `ignored` fields
//! the host persists. Missing fields fall back to the profile's defaults, and
//! anything given on the command line wins over the file.

use crate::{Error, Result};
use pprof_graph::{FunctionId, Profile, Settings};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Settings as stored on disk, every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub sample: Option<usize>,
    #[serde(default)]
    pub focused: Option<FunctionId>,
    #[serde(default)]
    pub ignored: Vec<FunctionId>,
}

impl SettingsFile {
    pub fn parse(path: &str, contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|source| Error::InvalidSettings {
            path: path.to_string(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::parse(&path.display().to_string(), &contents)
    }
}

/// Command-line overrides applied on top of a settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Sample type, by index or by name.
    pub sample: Option<String>,
    pub focus: Option<FunctionId>,
    /// Extra functions to ignore, added to the file's list.
    pub ignore: Vec<FunctionId>,
}

impl Overrides {
    /// Merge `file` and these overrides into settings for `profile`.
    pub fn apply(&self, file: SettingsFile, profile: &Profile) -> Result<Settings> {
        let mut settings = Settings::for_profile(profile);

        if let Some(sample) = file.sample {
            settings.sample = profile.check_metric(sample)?;
        }
        settings.focused = file.focused;
        settings.ignored = file.ignored;

        if let Some(selector) = &self.sample {
            settings.sample = profile.metric_index(selector)?;
        }
        if self.focus.is_some() {
            settings.focused = self.focus;
        }
        for &func in &self.ignore {
            if !settings.ignored.contains(&func) {
                settings.ignored.push(func);
            }
        }
        settings.sample = profile.check_metric(settings.sample)?;

        log::debug!(
            "effective settings: sample={} focused={:?} ignored={:?}",
            settings.sample,
            settings.focused,
            settings.ignored
        );
        Ok(settings)
    }
}
