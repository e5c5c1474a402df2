use crate::error::CultureError;
use csv::Writer;
use culturelab_schemas::snapshot::CultureSnapshot;
use std::fs;

/// Appends one CSV row per completed tick.
pub struct TimeSeriesLogger {
    path: String,
    writer: Writer<fs::File>,
    rows: u64,
}

impl TimeSeriesLogger {
    pub fn new(path: &str) -> Result<Self, CultureError> {
        let writer =
            Writer::from_path(path).map_err(|e| CultureError::CsvError(path.to_string(), e))?;
        Ok(Self {
            path: path.to_string(),
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn log_snapshot(&mut self, snapshot: &CultureSnapshot) -> Result<(), CultureError> {
        self.writer
            .serialize(snapshot)
            .map_err(|e| CultureError::CsvError(self.path.clone(), e))?;
        self.writer
            .flush()
            .map_err(|e| CultureError::FileIO(self.path.clone(), e))?;
        self.rows += 1;
        Ok(())
    }
}

/// Reads back a time series written by `TimeSeriesLogger`.
pub fn read_snapshots(path: &str) -> Result<Vec<CultureSnapshot>, CultureError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| CultureError::CsvError(path.to_string(), e))?;
    reader
        .deserialize()
        .map(|row| row.map_err(|e| CultureError::CsvError(path.to_string(), e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_survive_a_round_trip_through_disk() {
        let path = std::env::temp_dir().join(format!("culturelab-log-{}.csv", std::process::id()));
        let path = path.to_str().unwrap();
        let mut logger = TimeSeriesLogger::new(path).unwrap();
        for tick in 0..3 {
            logger
                .log_snapshot(&CultureSnapshot {
                    tick,
                    biomass: 1e6 * (tick + 1) as f64,
                    ..CultureSnapshot::default()
                })
                .unwrap();
        }
        assert_eq!(logger.rows(), 3);

        let rows = read_snapshots(path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].tick, 2);
        assert_eq!(rows[2].biomass, 3e6);
        fs::remove_file(path).ok();
    }

    #[test]
    fn unwritable_path_is_reported() {
        let err = TimeSeriesLogger::new("/nonexistent-dir/series.csv").err().unwrap();
        assert!(matches!(err, CultureError::CsvError(..)));
    }
}
