//! Call-graph aggregation and flame graph layout for pprof profiles.
//!
//! This library takes an already-decoded pprof profile (sample types,
//! functions, locations and samples), builds a bidirectional call graph from
//! its stacks and lays that graph out as a list of proportionally sized flame
//! graph boxes.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use pprof_graph::{Profile, Session, Settings};
//!
//! let file = File::open("profile.json").unwrap();
//! let profile = Profile::parse(file).unwrap();
//! let settings = Settings::for_profile(&profile);
//!
//! let mut session = Session::new(profile, settings).unwrap();
//! for flame_box in session.boxes().unwrap() {
//!     println!("{} [{:.3}, {:.3}] level {}", flame_box.label, flame_box.x1, flame_box.x2, flame_box.level);
//! }
//! ```

pub mod call_graph;
pub mod layout;
pub mod lines;
pub mod output;
pub mod session;
pub mod units;

#[cfg(test)]
pub(crate) mod fixtures;

pub use call_graph::{Call, CallGraph, CallId, NodeKey};
pub use layout::{Align, Direction, FlameBox, Layout, LABEL_ID, ROOT_ID};
pub use lines::LineCost;
pub use output::{FlameWriter, WriteError};
pub use session::{Change, Session, Settings};
pub use units::UnitKind;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{BufReader, Read};
use thiserror::Error;

/// Errors raised while loading a profile or aggregating it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed profile: sample {sample} references non-existent location {location}")]
    UnknownLocation { sample: usize, location: u64 },

    #[error("malformed profile: location {location} references non-existent function {function}")]
    UnknownFunction { location: u64, function: u64 },

    #[error("malformed profile: duplicate function {0}")]
    DuplicateFunction(u64),

    #[error("malformed profile: duplicate location {0}")]
    DuplicateLocation(u64),

    #[error("malformed profile: sample {sample} has {found} values, expected {expected}")]
    ValueCountMismatch {
        sample: usize,
        found: usize,
        expected: usize,
    },

    #[error("malformed profile: sample {sample} has negative value {value} for sample type {index}")]
    NegativeValue {
        sample: usize,
        index: usize,
        value: i64,
    },

    #[error("malformed profile: no sample types declared")]
    NoSampleTypes,

    #[error("malformed profile: function id {0} does not fit in a box id")]
    FunctionIdOutOfRange(u64),

    #[error("unknown sample type '{0}'")]
    UnknownSampleType(String),

    #[error("sample type index {index} out of range ({count} sample types)")]
    MetricOutOfRange { index: usize, count: usize },

    #[error("unrecognized unit '{0}'")]
    UnsupportedUnit(String),
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::Json { source }
    }
}

/// Result type for profile loading and aggregation.
pub type Result<T> = std::result::Result<T, Error>;

pub type FunctionId = u64;
pub type LocationId = u64;

// ============================================================================
// Record types
// ============================================================================

/// Order of the location ids in a sample, and of the lines in a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrder {
    LeafToRoot,
    #[default]
    RootToLeaf,
}

/// One declared sample metric, e.g. `cpu`/`nanoseconds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SampleType {
    #[serde(rename = "Type")]
    pub name: String,
    pub unit: String,
}

impl SampleType {
    /// Parse the declared unit into one of the units the formatter knows.
    pub fn unit_kind(&self) -> Result<UnitKind> {
        self.unit.parse()
    }
}

/// A function referenced from location lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Function {
    #[serde(rename = "ID")]
    pub id: FunctionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub start_line: i64,
}

/// One (possibly inlined) call site within a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Line {
    pub function: FunctionId,
    #[serde(default)]
    pub line: i64,
}

/// A program location, expanding to one stack frame per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    #[serde(rename = "ID")]
    pub id: LocationId,
    #[serde(default)]
    pub line: Vec<Line>,
}

/// One captured stack with its values, aligned with the sample types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sample {
    pub location: Vec<LocationId>,
    pub value: Vec<i64>,
}

/// A resolved stack frame: the function and the line executing in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub function: FunctionId,
    pub line: i64,
}

/// Profile record as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProfile {
    #[serde(default)]
    sample_type: Vec<SampleType>,
    #[serde(default)]
    default_sample_type: Option<String>,
    #[serde(default)]
    frame_order: FrameOrder,
    #[serde(default)]
    function: Vec<Function>,
    #[serde(default)]
    location: Vec<Location>,
    #[serde(default)]
    sample: Vec<Sample>,
}

// ============================================================================
// Main Profile type
// ============================================================================

/// A decoded profile with id-keyed function and location tables.
#[derive(Debug, Clone)]
pub struct Profile {
    /// Declared sample metrics; every sample carries one value per entry.
    pub sample_types: Vec<SampleType>,
    /// Name of the sample type to show by default.
    pub default_sample_type: Option<String>,
    /// Ordering of location ids within samples.
    pub frame_order: FrameOrder,
    /// Function dictionary, keyed by function ID.
    pub functions: HashMap<FunctionId, Function>,
    /// Location dictionary, keyed by location ID.
    pub locations: HashMap<LocationId, Location>,
    /// Sample records in input order.
    pub samples: Vec<Sample>,
}

impl Profile {
    /// Parse a JSON-encoded profile from any `Read`-able source.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let raw: RawProfile = serde_json::from_reader(BufReader::new(reader))?;
        Self::from_raw(raw)
    }

    /// Parse a JSON-encoded profile held in memory.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawProfile = serde_json::from_slice(bytes)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawProfile) -> Result<Self> {
        let mut functions = HashMap::with_capacity(raw.function.len());
        for function in raw.function {
            match functions.entry(function.id) {
                Entry::Occupied(_) => return Err(Error::DuplicateFunction(function.id)),
                Entry::Vacant(slot) => {
                    slot.insert(function);
                }
            }
        }

        let mut locations = HashMap::with_capacity(raw.location.len());
        for location in raw.location {
            match locations.entry(location.id) {
                Entry::Occupied(_) => return Err(Error::DuplicateLocation(location.id)),
                Entry::Vacant(slot) => {
                    slot.insert(location);
                }
            }
        }

        let profile = Profile {
            sample_types: raw.sample_type,
            default_sample_type: raw.default_sample_type,
            frame_order: raw.frame_order,
            functions,
            locations,
            samples: raw.sample,
        };

        profile.validate()?;

        log::debug!(
            "loaded profile: {} sample types, {} functions, {} locations, {} samples",
            profile.sample_types.len(),
            profile.functions.len(),
            profile.locations.len(),
            profile.samples.len()
        );

        Ok(profile)
    }

    /// Check every cross-reference in the profile.
    pub fn validate(&self) -> Result<()> {
        if self.sample_types.is_empty() {
            return Err(Error::NoSampleTypes);
        }

        for &id in self.functions.keys() {
            if i64::try_from(id).is_err() {
                return Err(Error::FunctionIdOutOfRange(id));
            }
        }

        // Validate location function references
        for location in self.locations.values() {
            for line in &location.line {
                if !self.functions.contains_key(&line.function) {
                    return Err(Error::UnknownFunction {
                        location: location.id,
                        function: line.function,
                    });
                }
            }
        }

        // Validate sample location references and value alignment
        for (index, sample) in self.samples.iter().enumerate() {
            for &location in &sample.location {
                if !self.locations.contains_key(&location) {
                    return Err(Error::UnknownLocation {
                        sample: index,
                        location,
                    });
                }
            }
            if sample.value.len() != self.sample_types.len() {
                return Err(Error::ValueCountMismatch {
                    sample: index,
                    found: sample.value.len(),
                    expected: self.sample_types.len(),
                });
            }
            let negative = sample.value.iter().enumerate().find(|(_, v)| **v < 0);
            if let Some((metric, &value)) = negative {
                return Err(Error::NegativeValue {
                    sample: index,
                    index: metric,
                    value,
                });
            }
        }

        if let Some(name) = &self.default_sample_type {
            if !self.sample_types.iter().any(|t| &t.name == name) {
                return Err(Error::UnknownSampleType(name.clone()));
            }
        }

        Ok(())
    }

    /// Index of the sample type shown when nothing else was selected.
    ///
    /// Uses `DefaultSampleType` when present and falls back to the last
    /// declared sample type, as pprof does.
    pub fn default_metric(&self) -> usize {
        self.default_sample_type
            .as_deref()
            .and_then(|name| self.sample_types.iter().position(|t| t.name == name))
            .unwrap_or_else(|| self.sample_types.len().saturating_sub(1))
    }

    /// Resolve a metric selector given either as an index or a sample type name.
    pub fn metric_index(&self, selector: &str) -> Result<usize> {
        if let Some(index) = self.sample_types.iter().position(|t| t.name == selector) {
            return Ok(index);
        }
        match selector.parse::<usize>() {
            Ok(index) => self.check_metric(index),
            Err(_) => Err(Error::UnknownSampleType(selector.to_string())),
        }
    }

    /// Ensure `index` names a declared sample type.
    pub fn check_metric(&self, index: usize) -> Result<usize> {
        if index < self.sample_types.len() {
            Ok(index)
        } else {
            Err(Error::MetricOutOfRange {
                index,
                count: self.sample_types.len(),
            })
        }
    }

    /// Resolve a function ID to its Function record.
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(&id)
    }

    /// Expand a sample into its frames, outermost first.
    ///
    /// Each location contributes one frame per inlined line.
    pub fn resolve_frames(&self, index: usize, sample: &Sample) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(sample.location.len());

        for &location_id in &sample.location {
            let location = self
                .locations
                .get(&location_id)
                .ok_or(Error::UnknownLocation {
                    sample: index,
                    location: location_id,
                })?;

            for line in &location.line {
                if !self.functions.contains_key(&line.function) {
                    return Err(Error::UnknownFunction {
                        location: location_id,
                        function: line.function,
                    });
                }
                frames.push(Frame {
                    function: line.function,
                    line: line.line,
                });
            }
        }

        // Leaf-first input lists both locations and inlined lines innermost first
        if self.frame_order == FrameOrder::LeafToRoot {
            frames.reverse();
        }

        Ok(frames)
    }
}
