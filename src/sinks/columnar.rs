//! ClickHouse columnar sink over the HTTP interface

use crate::core::{DataType, Dataset};
use crate::sinks::{Sink, SinkError, TableName, WriteReceipt};
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

/// Appends rows with `INSERT ... FORMAT JSONEachRow`, creating a MergeTree
/// table from the dataset's columns when absent
pub struct ClickHouseSink {
    client: Client,
    endpoint: String,
}

impl ClickHouseSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn execute(&self, query: &str, body: String) -> Result<(), SinkError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SinkError::Rejected(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        url.query_pairs_mut().append_pair("query", query);

        debug!("ClickHouse: {}", query);
        let response = self.client.post(url).body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(SinkError::Rejected(format!("{}: {}", status, text.trim())))
        }
    }
}

fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "\\`"))
}

fn column_type(dtype: DataType) -> &'static str {
    match dtype {
        DataType::Bool => "Nullable(UInt8)",
        DataType::Int => "Nullable(Int64)",
        DataType::Float => "Nullable(Float64)",
        DataType::Null | DataType::Text => "Nullable(String)",
    }
}

/// Qualified, quoted target: `schema`.`table`
fn target(table: &TableName) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", quote(schema), quote(&table.name)),
        None => quote(&table.name),
    }
}

pub fn create_statement(table: &TableName, dataset: &Dataset) -> String {
    let columns: Vec<String> = dataset
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote(&c.name), column_type(c.dtype)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE = MergeTree ORDER BY tuple()",
        target(table),
        columns.join(", ")
    )
}

/// One JSON object per line
pub fn json_each_row(dataset: &Dataset) -> String {
    let mut body = String::new();
    for row in dataset.head(dataset.len()) {
        body.push_str(&serde_json::Value::Object(row).to_string());
        body.push('\n');
    }
    body
}

#[async_trait]
impl Sink for ClickHouseSink {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn write(&self, table: &TableName, dataset: &Dataset) -> Result<WriteReceipt, SinkError> {
        if dataset.columns().is_empty() {
            return Err(SinkError::Rejected("dataset has no columns".to_string()));
        }

        self.execute(&create_statement(table, dataset), String::new()).await?;
        if !dataset.is_empty() {
            let insert = format!("INSERT INTO {} FORMAT JSONEachRow", target(table));
            self.execute(&insert, json_each_row(dataset)).await?;
        }

        Ok(WriteReceipt {
            location: format!("clickhouse:{}", table),
            rows: dataset.len(),
        })
    }
}
