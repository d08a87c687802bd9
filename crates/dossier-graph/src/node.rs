use std::future::Future;
use std::sync::Arc;

use dossier_core::config::RunConfig;
use dossier_core::error::Result;
use futures::future::BoxFuture;
use serde_json::Value;

type AsyncNodeFn = dyn Fn(Value, RunConfig) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// A graph node that wraps an async function from state to a partial patch.
pub struct NodeFn {
    name: String,
    func: Arc<AsyncNodeFn>,
}

impl NodeFn {
    pub fn new<F, Fut>(name: impl Into<String>, stage: F) -> Self
    where
        F: Fn(Value, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let func: Arc<AsyncNodeFn> = Arc::new(move |state, config| Box::pin(stage(state, config)));
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the stage on a copy of the state; returns its patch.
    pub async fn invoke(&self, state: Value, config: &RunConfig) -> Result<Value> {
        let fut = (self.func)(state, config.clone());
        fut.await
    }
}

impl Clone for NodeFn {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
        }
    }
}
