//! Text field normalization

use crate::core::{Dataset, ExecutionContext, NormalizeParams, Operation, OperationKind};
use crate::operators::{Operator, OperatorEnv, OperatorError};
use async_trait::async_trait;
use polars::prelude::{DataType as FrameType, IntoSeries, PolarsResult, StringChunked};

/// Trim leading/trailing whitespace in every text column, in place
pub fn trim_text_columns(dataset: &mut Dataset) -> PolarsResult<()> {
    let text_columns: Vec<_> = dataset
        .frame()
        .get_columns()
        .iter()
        .filter(|c| c.dtype() == &FrameType::String)
        .map(|c| c.name().clone())
        .collect();

    for name in text_columns {
        let trimmed: StringChunked = dataset
            .frame()
            .column(name.as_str())?
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.map(str::trim))
            .collect();
        dataset
            .frame_mut()
            .with_column(trimmed.with_name(name).into_series())?;
    }
    Ok(())
}

/// `normalize_text_fields`
pub struct NormalizeTextFields;

#[async_trait]
impl Operator for NormalizeTextFields {
    fn kind(&self) -> OperationKind {
        OperationKind::NormalizeTextFields
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        _env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::NormalizeTextFields(NormalizeParams { input }) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };

        trim_text_columns(ctx.get_mut(input)?)
            .map_err(|source| OperatorError::frame(self.kind(), source))?;
        ctx.touch(input);
        Ok(())
    }
}
