//! JSON export of full frames.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use serde::Serialize;

use super::FrameSink;
use crate::state::FrameRecord;

/// Frame export structure
#[derive(Debug, Clone, Serialize)]
pub struct FrameExport<'a> {
    /// Export timestamp
    pub exported_at: String,
    /// Export version for compatibility
    pub version: &'static str,
    pub frame: &'a FrameRecord,
}

impl<'a> FrameExport<'a> {
    fn new(frame: &'a FrameRecord) -> Self {
        Self {
            exported_at: Local::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            frame,
        }
    }
}

/// Export a frame to JSON in `dir`
///
/// Filename is auto-generated: `frame_NNNNN_YYYYMMDD_HHMMSS.json`
///
/// Returns the path to the saved JSON file.
pub fn export_frame_json<P: AsRef<Path>>(record: &FrameRecord, dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("frame_{:05}_{}.json", record.frame, timestamp));
    export_frame_json_to(record, &path)?;
    Ok(path)
}

/// Export a frame to a specific file
pub fn export_frame_json_to<P: AsRef<Path>>(record: &FrameRecord, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &FrameExport::new(record))?;
    log::debug!("JSON frame exported: {}", path.display());
    Ok(())
}

/// Writes each saved frame to its own JSON file
pub struct JsonFrameWriter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl JsonFrameWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FrameSink for JsonFrameWriter {
    fn write_frame(&mut self, record: &FrameRecord) -> Result<()> {
        let path = self.dir.join(format!("frame_{:05}.json", record.frame));
        export_frame_json_to(record, &path)?;
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Energy;

    #[test]
    fn test_frame_round_trips_through_json() {
        let record = FrameRecord {
            frame: 7,
            time: 1.25,
            energy: Energy::default(),
            mechanical_norm: 0.0,
            chemical_norm: 0.0,
            surface_area: 1.0,
            volume: 0.0,
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            velocities: vec![[0.0; 3]; 3],
            protein_density: vec![0.1, 0.2, 0.3],
            faces: vec![[0, 1, 2]],
        };
        let dir = std::env::temp_dir().join(format!("membrane_json_{}", std::process::id()));
        let mut writer = JsonFrameWriter::new(&dir).unwrap();
        writer.write_frame(&record).unwrap();

        let contents = std::fs::read_to_string(&writer.written()[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let parsed: FrameRecord = serde_json::from_value(value["frame"].clone()).unwrap();
        assert_eq!(parsed.frame, 7);
        assert_eq!(parsed.protein_density, record.protein_density);
        assert_eq!(parsed.faces, record.faces);
        std::fs::remove_dir_all(&dir).ok();
    }
}
