//! Execution context - the named datasets of a single run

use crate::core::dataset::Dataset;
use crate::operators::OperatorError;
use std::collections::HashMap;

/// Name the join operator writes to
pub const JOINED: &str = "joined";

/// Name the aggregate operator writes to
pub const RESULT: &str = "result";

/// Per-run mapping of dataset name to in-memory table.
///
/// Created empty at run start and owned by exactly one run.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    datasets: HashMap<String, Dataset>,
    last_written: Option<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a name or fail with `UnresolvedReference`
    pub fn get(&self, name: &str) -> Result<&Dataset, OperatorError> {
        self.datasets
            .get(name)
            .ok_or_else(|| OperatorError::UnresolvedReference(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Dataset, OperatorError> {
        self.datasets
            .get_mut(name)
            .ok_or_else(|| OperatorError::UnresolvedReference(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    /// Add or overwrite a dataset; it becomes the most recently written one
    pub fn insert(&mut self, name: impl Into<String>, dataset: Dataset) {
        let name = name.into();
        self.datasets.insert(name.clone(), dataset);
        self.last_written = Some(name);
    }

    /// Mark an in-place update of an existing dataset
    pub fn touch(&mut self, name: &str) {
        if self.datasets.contains_key(name) {
            self.last_written = Some(name.to_string());
        }
    }

    pub fn last_written(&self) -> Option<&str> {
        self.last_written.as_deref()
    }

    /// Name of the dataset a sink or preview should use.
    ///
    /// `result` wins when present, otherwise the most recently written dataset.
    pub fn output_name(&self) -> Option<&str> {
        if self.datasets.contains_key(RESULT) {
            Some(RESULT)
        } else {
            self.last_written()
        }
    }

    /// The dataset selected by [`output_name`](Self::output_name)
    pub fn output_dataset(&self) -> Result<(&str, &Dataset), OperatorError> {
        let name = self
            .output_name()
            .ok_or_else(|| OperatorError::UnresolvedReference(RESULT.to_string()))?;
        Ok((name, self.get(name)?))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.datasets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
