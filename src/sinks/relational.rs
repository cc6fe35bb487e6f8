//! SQLite relational sink

use crate::core::{DataType, Dataset, Value};
use crate::sinks::{Sink, SinkError, TableName, WriteReceipt};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Appends rows to a table, creating it from the dataset's columns when absent.
///
/// SQLite has no schemas, so `schema.table` is stored as `schema_table`.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, SinkError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_type(dtype: DataType) -> &'static str {
    match dtype {
        DataType::Bool | DataType::Int => "INTEGER",
        DataType::Float => "REAL",
        DataType::Null | DataType::Text => "TEXT",
    }
}

#[async_trait]
impl Sink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn write(&self, table: &TableName, dataset: &Dataset) -> Result<WriteReceipt, SinkError> {
        if dataset.columns().is_empty() {
            return Err(SinkError::Rejected("dataset has no columns".to_string()));
        }
        let target = quote(&table.flattened());

        let columns: Vec<String> = dataset
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), column_type(c.dtype)))
            .collect();
        let names: Vec<String> = dataset.columns().iter().map(|c| quote(&c.name)).collect();
        let placeholders = vec!["?"; names.len()].join(", ");

        let create = format!("CREATE TABLE IF NOT EXISTS {} ({})", target, columns.join(", "));
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            names.join(", "),
            placeholders
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&create).execute(&mut *tx).await?;
        for row in &dataset.rows() {
            let mut query = sqlx::query(&insert);
            for value in row {
                query = match value {
                    Value::Null => query.bind(None::<String>),
                    Value::Bool(b) => query.bind(*b),
                    Value::Int(i) => query.bind(*i),
                    Value::Float(f) => query.bind(*f),
                    Value::Text(s) => query.bind(s.clone()),
                };
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(WriteReceipt {
            location: format!("sqlite:{}", table.flattened()),
            rows: dataset.len(),
        })
    }
}
