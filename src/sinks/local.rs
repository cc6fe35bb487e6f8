//! Local CSV file sink

use crate::core::Dataset;
use crate::sinks::{Sink, SinkError, TableName, WriteReceipt};
use async_trait::async_trait;
use std::path::PathBuf;

/// Writes each table to `<dir>/<schema>_<table>.csv`, replacing any previous file
pub struct LocalFileSink {
    dir: PathBuf,
}

impl LocalFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table: &TableName) -> PathBuf {
        self.dir.join(format!("{}.csv", table.flattened()))
    }
}

/// Render a dataset as CSV with a header row
pub fn to_csv(dataset: &Dataset) -> Result<Vec<u8>, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.column_names())?;
    for row in dataset.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| SinkError::Io(e.into_error()))
}

#[async_trait]
impl Sink for LocalFileSink {
    fn name(&self) -> &str {
        "local"
    }

    async fn write(&self, table: &TableName, dataset: &Dataset) -> Result<WriteReceipt, SinkError> {
        let bytes = to_csv(dataset)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(table);
        tokio::fs::write(&path, bytes).await?;

        Ok(WriteReceipt {
            location: path.display().to_string(),
            rows: dataset.len(),
        })
    }
}
