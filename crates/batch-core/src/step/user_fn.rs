//! The user's per-step transform (spec §6).

use async_trait::async_trait;
use serde_json::Value;

/// The function an [`super::aggregator::AggregatorStep`] invokes once its
/// buffer reaches (or is forced past) its aggregation quantity.
///
/// Takes the accumulated payloads in arrival order and produces the single
/// output value carried forward to the next step. The error variant is a
/// plain message: the engine wraps it in [`crate::errors::EngineError::UserStep`]
/// and never inspects it further.
#[async_trait]
pub trait StepFn: Send + Sync {
    async fn call(&self, payloads: Vec<Value>) -> Result<Value, String>;
}

/// Adapts a plain async closure to [`StepFn`], for the common case where a
/// step doesn't need its own type.
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F, Fut> StepFn for FnStep<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, String>> + Send,
{
    async fn call(&self, payloads: Vec<Value>) -> Result<Value, String> {
        (self.0)(payloads).await
    }
}
