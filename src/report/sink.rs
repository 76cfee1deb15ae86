//! Report output: CSV files and JSON metadata dumps.

use anyhow::Context;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// CSV writer that lays down the header at creation time, so an empty
/// report still carries its column row.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvSink {
    pub fn create(path: &Path, header: &[&str]) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }

        let file = File::create(path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(header)
            .with_context(|| format!("writing header to {}", path.display()))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn append<R: Serialize>(&mut self, row: &R) -> anyhow::Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("writing row to {}", self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and return the report path.
    pub fn finish(mut self) -> anyhow::Result<PathBuf> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(self.path)
    }
}

/// Pretty-printed JSON dump, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
