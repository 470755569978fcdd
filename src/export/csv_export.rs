//! CSV time-series export of scalar frame data.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use serde::Serialize;

use super::FrameSink;
use crate::state::FrameRecord;

/// Record for CSV time-series export
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeriesRecord {
    pub frame: usize,
    pub time: f64,
    pub bending_energy: f64,
    pub surface_energy: f64,
    pub pressure_energy: f64,
    pub adsorption_energy: f64,
    pub aggregation_energy: f64,
    pub dirichlet_energy: f64,
    pub interior_penalty_energy: f64,
    pub kinetic_energy: f64,
    pub potential_energy: f64,
    pub external_work: f64,
    pub total_energy: f64,
    pub mechanical_norm: f64,
    pub chemical_norm: f64,
    pub surface_area: f64,
    pub volume: f64,
}

impl From<&FrameRecord> for TimeSeriesRecord {
    fn from(r: &FrameRecord) -> Self {
        let e = &r.energy;
        Self {
            frame: r.frame,
            time: r.time,
            bending_energy: e.bending,
            surface_energy: e.surface,
            pressure_energy: e.pressure,
            adsorption_energy: e.adsorption,
            aggregation_energy: e.aggregation,
            dirichlet_energy: e.dirichlet,
            interior_penalty_energy: e.interior_penalty,
            kinetic_energy: e.kinetic,
            potential_energy: e.potential,
            external_work: e.external_work,
            total_energy: e.total,
            mechanical_norm: r.mechanical_norm,
            chemical_norm: r.chemical_norm,
            surface_area: r.surface_area,
            volume: r.volume,
        }
    }
}

/// CSV exporter for time-series data
pub struct CsvExporter {
    writer: csv::Writer<File>,
    /// Sample interval in simulation time
    sample_interval: f64,
    last_sample_time: f64,
    path: PathBuf,
}

impl CsvExporter {
    /// Create an exporter writing to `exports/`
    pub fn new(sample_interval: f64) -> Result<Self> {
        Self::in_dir("exports", sample_interval)
    }

    /// Create an exporter in `dir`
    ///
    /// Creates the directory if it doesn't exist.
    /// Filename is auto-generated with timestamp.
    pub fn in_dir<P: AsRef<Path>>(dir: P, sample_interval: f64) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("timeseries_{}.csv", timestamp));
        let writer = csv::Writer::from_writer(File::create(&path)?);

        log::info!("CSV export started: {}", path.display());

        Ok(Self {
            writer,
            sample_interval,
            // Ensure first sample is recorded
            last_sample_time: f64::NEG_INFINITY,
            path,
        })
    }

    /// Record a sample if the interval has elapsed
    pub fn maybe_record(&mut self, record: &FrameRecord) -> Result<bool> {
        if record.time - self.last_sample_time >= self.sample_interval {
            self.record(record)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Force record a sample regardless of interval
    pub fn record(&mut self, record: &FrameRecord) -> Result<()> {
        self.writer.serialize(TimeSeriesRecord::from(record))?;
        self.last_sample_time = record.time;
        Ok(())
    }

    /// Finish writing and return the output path
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        log::info!("CSV export completed: {}", self.path.display());
        Ok(self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for CsvExporter {
    fn write_frame(&mut self, record: &FrameRecord) -> Result<()> {
        self.maybe_record(record).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Energy;

    fn record(frame: usize, time: f64) -> FrameRecord {
        FrameRecord {
            frame,
            time,
            energy: Energy {
                bending: 1.5,
                ..Default::default()
            },
            mechanical_norm: 0.1,
            chemical_norm: 0.0,
            surface_area: 4.0,
            volume: 2.0,
            positions: vec![[0.0; 3]; 3],
            velocities: vec![[0.0; 3]; 3],
            protein_density: vec![0.5; 3],
            faces: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn test_sample_interval() {
        let dir = std::env::temp_dir().join(format!("membrane_csv_{}", std::process::id()));
        let mut exporter = CsvExporter::in_dir(&dir, 1.0).unwrap();
        assert!(exporter.maybe_record(&record(0, 0.0)).unwrap());
        assert!(!exporter.maybe_record(&record(1, 0.5)).unwrap());
        assert!(exporter.maybe_record(&record(2, 1.0)).unwrap());
        let path = exporter.finish().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "frame");
        assert_eq!(&headers[2], "bending_energy");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "2");
        std::fs::remove_dir_all(&dir).ok();
    }
}
