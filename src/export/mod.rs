//! Export functionality for simulation data.
//!
//! Provides CSV time-series export and JSON frame export. Both plug into
//! the integrator through `FrameSink`.

mod csv_export;
mod json_export;

pub use csv_export::{CsvExporter, TimeSeriesRecord};
pub use json_export::{export_frame_json, export_frame_json_to, FrameExport, JsonFrameWriter};

use anyhow::Result;

use crate::state::FrameRecord;

/// Destination for frames saved during a run
pub trait FrameSink {
    fn write_frame(&mut self, record: &FrameRecord) -> Result<()>;
}

/// Keeps every frame in memory
impl FrameSink for Vec<FrameRecord> {
    fn write_frame(&mut self, record: &FrameRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}
