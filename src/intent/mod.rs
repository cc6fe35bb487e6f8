//! Intent resolution: free text to a candidate step list
//!
//! Resolvers produce untrusted step lists. The interpreter validates every
//! step when it dispatches it, so resolvers never need to.

pub mod rules;

use crate::core::PipelinePlan;
use async_trait::async_trait;
use thiserror::Error;

pub use rules::{RuleBasedResolver, RuleDefaults};

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("intent text is empty")]
    Empty,

    #[error("intent resolver unavailable: {0}")]
    Unavailable(String),

    #[error("intent resolver returned an unusable plan: {0}")]
    InvalidPlan(String),
}

/// Turns an intent string into a pipeline plan
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, text: &str) -> Result<PipelinePlan, IntentError>;
}
