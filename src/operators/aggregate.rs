//! Grouped aggregation

use crate::core::{AggregateParams, Dataset, ExecutionContext, Metric, Operation, OperationKind, RESULT};
use crate::operators::{Operator, OperatorEnv, OperatorError};
use async_trait::async_trait;
use polars::prelude::{
    col, DataFrame, IntoLazy, NamedFrom, PlSmallStr, PolarsError, Series, SortMultipleOptions,
};

/// Why an aggregation could not produce a dataset
#[derive(Debug)]
pub enum AggregateFailure {
    MissingColumn(String),
    Frame(PolarsError),
}

impl From<PolarsError> for AggregateFailure {
    fn from(e: PolarsError) -> Self {
        AggregateFailure::Frame(e)
    }
}

/// Average of `column` per distinct non-null value of `by`, in ascending key order.
///
/// Cells that are neither numbers nor numeric text count as missing; a group
/// with no numeric cell left averages to null.
pub fn group_average(
    dataset: &Dataset,
    by: &str,
    column: &str,
    alias: &str,
) -> Result<Dataset, AggregateFailure> {
    let keys = dataset
        .frame()
        .column(by)
        .map_err(|_| AggregateFailure::MissingColumn(by.to_string()))?
        .clone();
    let numbers: Vec<Option<f64>> = dataset
        .column_values(column)
        .ok_or_else(|| AggregateFailure::MissingColumn(column.to_string()))?
        .iter()
        .map(|v| v.as_f64())
        .collect();
    let numbers = Series::new(PlSmallStr::from(alias), numbers);

    let frame = DataFrame::new(vec![keys, numbers.into()])?
        .lazy()
        .filter(col(by).is_not_null())
        .group_by([col(by)])
        .agg([col(alias).mean()])
        .sort_by_exprs([col(by)], SortMultipleOptions::default())
        .collect()?;
    Ok(Dataset::from_frame(frame))
}

/// `aggregate`
pub struct Aggregate;

#[async_trait]
impl Operator for Aggregate {
    fn kind(&self) -> OperationKind {
        OperationKind::Aggregate
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        _env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::Aggregate(params) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };
        let AggregateParams { by, metric, column, .. } = params;

        let metric = Metric::parse(metric)
            .ok_or_else(|| OperatorError::UnsupportedMetric(metric.clone()))?;

        let source = params.source_name();
        let dataset = ctx.get(source)?;

        let result = match metric {
            Metric::Avg => group_average(dataset, by, column, &params.output_column()),
        }
        .map_err(|failure| match failure {
            AggregateFailure::MissingColumn(missing) => OperatorError::MissingColumn {
                column: missing,
                dataset: source.to_string(),
            },
            AggregateFailure::Frame(source) => OperatorError::frame(self.kind(), source),
        })?;

        ctx.insert(RESULT, result);
        Ok(())
    }
}
