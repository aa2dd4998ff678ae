use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use csv::{Writer, WriterBuilder};

use crate::{Result, summary::EpochRow};

/// The file holding the header of the epoch log.
pub const HEADER_FILE: &str = "log_4.csv";

/// The file epoch rows are appended to.
pub const ROWS_FILE: &str = "log_3.csv";

/// A CSV epoch log split in two files: the header is written once per run, truncating
/// `log_4.csv`, while rows are appended to `log_3.csv` across runs.
#[derive(Debug)]
pub struct CsvLog {
    header_path: PathBuf,
    rows_path: PathBuf,
}

impl CsvLog {
    /// Creates the output directory if needed and writes the header.
    ///
    /// # Arguments
    /// * `dir` - The directory both files live in.
    /// * `fieldnames` - The columns of the log.
    ///
    /// # Returns
    /// The log or an io error.
    pub fn create<S: AsRef<str>>(dir: impl AsRef<Path>, fieldnames: &[S]) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let log = Self {
            header_path: dir.join(HEADER_FILE),
            rows_path: dir.join(ROWS_FILE),
        };

        let mut header = Writer::from_path(&log.header_path)?;
        header.write_record(fieldnames.iter().map(AsRef::<str>::as_ref))?;
        header.flush()?;

        Ok(log)
    }

    /// Appends a row to the rows file.
    pub fn append(&self, row: &EpochRow) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.rows_path)?;

        let mut rows = WriterBuilder::new().has_headers(false).from_writer(file);
        rows.write_record(row.record())?;
        rows.flush()?;
        Ok(())
    }

    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    pub fn rows_path(&self) -> &Path {
        &self.rows_path
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("corrosion-logbook-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn header_is_truncated_and_rows_are_appended() {
        let dir = scratch("append");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(HEADER_FILE), "stale,header\nmore\n").unwrap();
        fs::write(dir.join(ROWS_FILE), "1,old\n").unwrap();

        let log = CsvLog::create(&dir, &["epoch", "Train_loss"]).unwrap();
        assert_eq!(fs::read_to_string(log.header_path()).unwrap(), "epoch,Train_loss\n");

        let metrics = machine_learning::metrics::MetricRegistry::new();
        let row = crate::summary::BatchSummary::new(&metrics).finish(4, (1.5, 2.0));
        log.append(&row).unwrap();

        assert_eq!(fs::read_to_string(log.rows_path()).unwrap(), "1,old\n4,1.5,2.0\n");
        fs::remove_dir_all(&dir).unwrap();
    }
}
