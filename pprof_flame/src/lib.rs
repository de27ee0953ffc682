//! Flame graph tooling for decoded pprof profiles.
//!
//! This crate wraps [`pprof_graph`] with what a command-line front end needs:
//! reading profiles that may be gzip or zstd compressed, and loading view
//! settings from JSON files with command-line overrides on top.
//!
//! # Example
//!
//! ```no_run
//! use pprof_flame::input::load_profile;
//! use pprof_flame::settings::{Overrides, SettingsFile};
//! use pprof_flame::pprof_graph::Session;
//!
//! let profile = load_profile("cpu.json.gz").unwrap();
//! let overrides = Overrides {
//!     focus: Some(42),
//!     ..Overrides::default()
//! };
//! let settings = overrides.apply(SettingsFile::default(), &profile).unwrap();
//!
//! let mut session = Session::new(profile, settings).unwrap();
//! println!("{} boxes", session.boxes().unwrap().len());
//! ```

pub mod input;
pub mod settings;

// Re-export pprof_graph for convenience
pub use pprof_graph;

use thiserror::Error;

/// Errors raised by the flame graph tools.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Profile(#[from] pprof_graph::Error),

    #[error("invalid settings file '{path}': {source}")]
    InvalidSettings {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("output error: {0}")]
    Write(#[from] pprof_graph::WriteError),
}

pub type Result<T> = std::result::Result<T, Error>;
