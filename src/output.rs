use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Local};
use log::info;
use tokio::sync::Mutex;

use crate::{
    config::OutputFormat,
    error::ScrapeError,
    property::{CSV_COLUMNS, PropertyRecord},
};

/// `booking_properties[_single]_{destinations}_{timestamp}.{ext}`
pub fn output_file_name(
    destinations: &[String],
    single_worker: bool,
    format: OutputFormat,
    started_at: DateTime<Local>,
) -> String {
    let mode = if single_worker { "single_" } else { "" };
    let destinations = destinations.join("-").to_lowercase();
    let timestamp = started_at.format("%Y%m%d_%H%M%S");
    format!(
        "booking_properties_{mode}{destinations}_{timestamp}.{}",
        format.extension()
    )
}

/// Appends batches of records to one result file. Workers share a single
/// writer; appends are serialised.
#[derive(Debug)]
pub struct ResultsWriter {
    path: PathBuf,
    format: OutputFormat,
    lock: Mutex<()>,
}

impl ResultsWriter {
    pub fn new(path: PathBuf, format: OutputFormat) -> Self {
        Self {
            path,
            format,
            lock: Mutex::new(()),
        }
    }

    /// Creates the output directory if needed.
    pub async fn create(dir: &Path, file_name: &str, format: OutputFormat) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self::new(dir.join(file_name), format))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, records: &[PropertyRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let format = self.format;
        let batch = records.to_vec();
        let reason = match tokio::task::spawn_blocking(move || write_records(&path, format, &batch))
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(e) => Some(format!("writer task panicked: {e}")),
        };
        if let Some(reason) = reason {
            return Err(ScrapeError::OutputWrite {
                path: self.path.display().to_string(),
                reason,
            }
            .into());
        }
        info!("Saved {} properties to {}", records.len(), self.path.display());
        Ok(())
    }
}

fn write_records(
    path: &Path,
    format: OutputFormat,
    records: &[PropertyRecord],
) -> anyhow::Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    match format {
        OutputFormat::Csv => write_csv(file, is_new, records),
        OutputFormat::JsonLines => write_json_lines(file, records),
    }
}

fn write_csv(file: File, write_header: bool, records: &[PropertyRecord]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(file);
    if write_header {
        writer.write_record(CSV_COLUMNS)?;
    }
    for record in records {
        writer.write_record(record.to_csv_row())?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json_lines(mut file: File, records: &[PropertyRecord]) -> anyhow::Result<()> {
    for record in records {
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(())
}
