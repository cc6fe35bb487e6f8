//! Left outer join

use crate::core::{DataType, Dataset, ExecutionContext, JoinParams, Operation, OperationKind, JOINED};
use crate::operators::{JoinSide, Operator, OperatorEnv, OperatorError};
use async_trait::async_trait;
use polars::prelude::{col, IntoLazy, JoinArgs, JoinType, PolarsError};
use tracing::debug;

/// Why a join could not produce a dataset
#[derive(Debug)]
pub enum JoinFailure {
    MissingKey(JoinSide),
    Frame(PolarsError),
}

impl From<PolarsError> for JoinFailure {
    fn from(e: PolarsError) -> Self {
        JoinFailure::Frame(e)
    }
}

/// Left outer join of `left` and `right` on the shared column `on`.
///
/// Unmatched left rows get nulls on the right side; a left row matching
/// several right rows is repeated once per match. Non-key columns present on
/// both sides are suffixed `_x` (left) and `_y` (right). Keys of different
/// types are compared after widening both sides to one type; null keys never
/// match.
pub fn left_join(left: &Dataset, right: &Dataset, on: &str) -> Result<Dataset, JoinFailure> {
    let left_type = left
        .column_type(on)
        .ok_or(JoinFailure::MissingKey(JoinSide::Left))?;
    let right_type = right
        .column_type(on)
        .ok_or(JoinFailure::MissingKey(JoinSide::Right))?;
    let key_type = match left_type.unify(right_type) {
        DataType::Null => DataType::Text,
        t => t,
    }
    .to_frame_type();

    let overlap: Vec<String> = right
        .column_names()
        .into_iter()
        .filter(|name| *name != on && left.column_index(name).is_some())
        .map(String::from)
        .collect();
    let suffixed = |suffix: &str| -> Vec<String> {
        overlap.iter().map(|name| format!("{}_{}", name, suffix)).collect()
    };

    let left_lf = left
        .frame()
        .clone()
        .lazy()
        .rename(&overlap, suffixed("x"), true)
        .with_column(col(on).cast(key_type.clone()));
    let right_lf = right
        .frame()
        .clone()
        .lazy()
        .rename(&overlap, suffixed("y"), true)
        .with_column(col(on).cast(key_type));

    let frame = left_lf
        .join(right_lf, [col(on)], [col(on)], JoinArgs::new(JoinType::Left))
        .collect()?;
    Ok(Dataset::from_frame(frame))
}

/// `join`
pub struct Join;

#[async_trait]
impl Operator for Join {
    fn kind(&self) -> OperationKind {
        OperationKind::Join
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        _env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::Join(JoinParams { left, right, on }) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };

        let left_ds = ctx.get(left)?;
        let right_ds = ctx.get(right)?;

        let joined = left_join(left_ds, right_ds, on).map_err(|failure| match failure {
            JoinFailure::MissingKey(side) => OperatorError::MissingJoinKey {
                key: on.clone(),
                side,
                dataset: match side {
                    JoinSide::Left => left.clone(),
                    JoinSide::Right => right.clone(),
                },
            },
            JoinFailure::Frame(source) => OperatorError::frame(self.kind(), source),
        })?;

        debug!(
            "Joined {} ({} rows) with {} ({} rows) on {}: {} rows",
            left,
            left_ds.len(),
            right,
            right_ds.len(),
            on,
            joined.len()
        );
        ctx.insert(JOINED, joined);
        Ok(())
    }
}
