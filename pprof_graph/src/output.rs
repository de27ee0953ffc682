//! NDJSON output of flame graph boxes and line-cost tables.
//!
//! Each record is a single JSON object on its own line, tagged with a `type`
//! field: `box` for [`FlameBox`] records and `line` for [`LineCost`] rows.

use crate::layout::FlameBox;
use crate::lines::LineCost;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

/// Errors that can occur while writing records.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for writing operations.
pub type WriteResult<T> = std::result::Result<T, WriteError>;

/// Helper struct for writing typed records with "type" field.
#[derive(Serialize)]
struct TypedRecord<'a, T: Serialize> {
    #[serde(rename = "type")]
    record_type: &'a str,
    #[serde(flatten)]
    data: &'a T,
}

/// Writer for streaming records to the rendering side.
///
/// # Example
///
/// ```no_run
/// use pprof_graph::{FlameWriter, Profile, Session, Settings};
/// use std::fs::File;
///
/// let profile = Profile::parse(File::open("profile.json").unwrap()).unwrap();
/// let settings = Settings::for_profile(&profile);
/// let mut session = Session::new(profile, settings).unwrap();
///
/// let mut writer = FlameWriter::new(std::io::stdout());
/// writer.write_boxes(&session.boxes().unwrap()).unwrap();
/// ```
pub struct FlameWriter<W: Write> {
    writer: W,
}

impl<W: Write> FlameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_box(&mut self, flame_box: &FlameBox) -> WriteResult<()> {
        self.write_record("box", flame_box)
    }

    pub fn write_boxes(&mut self, boxes: &[FlameBox]) -> WriteResult<()> {
        for flame_box in boxes {
            self.write_box(flame_box)?;
        }
        Ok(())
    }

    pub fn write_line(&mut self, line: &LineCost) -> WriteResult<()> {
        self.write_record("line", line)
    }

    pub fn write_lines(&mut self, lines: &[LineCost]) -> WriteResult<()> {
        for line in lines {
            self.write_line(line)?;
        }
        Ok(())
    }

    fn write_record<T: Serialize>(&mut self, record_type: &str, data: &T) -> WriteResult<()> {
        let typed = TypedRecord { record_type, data };
        let json = serde_json::to_string(&typed)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    pub fn flush(&mut self) -> WriteResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Consume this writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
