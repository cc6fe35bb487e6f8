//! Sink writers
//!
//! Both operators write the context's output dataset: `result` when an
//! aggregate ran, otherwise the most recently written dataset.

use crate::core::{ExecutionContext, Operation, OperationKind, WriteParams};
use crate::operators::{Operator, OperatorEnv, OperatorError};
use crate::sinks::{Sink, SinkError, TableName};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

fn table_name(op: OperationKind, raw: &str) -> Result<TableName, OperatorError> {
    TableName::parse(raw).map_err(|reason| OperatorError::InvalidParameters {
        op: op.to_string(),
        reason,
    })
}

async fn write_output(
    sink: &Arc<dyn Sink>,
    table: &TableName,
    ctx: &ExecutionContext,
) -> Result<(), OperatorError> {
    let (name, dataset) = ctx.output_dataset()?;
    let receipt = sink
        .write(table, dataset)
        .await
        .map_err(|source| OperatorError::SinkIo {
            table: table.to_string(),
            source,
        })?;
    info!(
        "Wrote {} rows of '{}' to {} ({})",
        receipt.rows,
        name,
        receipt.location,
        sink.name()
    );
    Ok(())
}

/// `write_sink_relational`
///
/// Falls back to a local CSV file when no relational sink is available.
pub struct WriteRelational;

#[async_trait]
impl Operator for WriteRelational {
    fn kind(&self) -> OperationKind {
        OperationKind::WriteSinkRelational
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::WriteSinkRelational(WriteParams { table }) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };
        let table = table_name(self.kind(), table)?;

        let sink = match &env.sinks.relational {
            Some(sink) => sink,
            None => {
                warn!("No relational sink, writing {} to a local file", table);
                &env.sinks.fallback
            }
        };
        write_output(sink, &table, ctx).await
    }
}

/// `write_sink_columnar`
pub struct WriteColumnar;

#[async_trait]
impl Operator for WriteColumnar {
    fn kind(&self) -> OperationKind {
        OperationKind::WriteSinkColumnar
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::WriteSinkColumnar(WriteParams { table }) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };
        let table = table_name(self.kind(), table)?;

        let sink = env
            .sinks
            .columnar
            .as_ref()
            .ok_or_else(|| OperatorError::SinkIo {
                table: table.to_string(),
                source: SinkError::NotConfigured("columnar"),
            })?;
        write_output(sink, &table, ctx).await
    }
}
