use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use soulbrowser_core_types::TargetId;
use thiserror::Error;

/// Code to run inside a page context.
#[derive(Clone, Debug, PartialEq)]
pub enum Script {
    /// An expression evaluated as-is; the completion value is returned.
    Source(String),
    /// A function declaration invoked with structured arguments bound by the page runtime.
    Call { function: String, args: Vec<Value> },
}

impl Script {
    pub fn source(code: impl Into<String>) -> Self {
        Script::Source(code.into())
    }

    pub fn call(function: impl Into<String>, args: Vec<Value>) -> Self {
        Script::Call {
            function: function.into(),
            args,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    /// The code ran and threw.
    #[error("{message}")]
    Exception {
        message: String,
        stack: Option<String>,
    },
    /// The code never reached the page.
    #[error("{0}")]
    Transport(String),
}

/// A page context that can evaluate code and return its result by value.
#[async_trait]
pub trait ScriptTarget: Send + Sync {
    fn id(&self) -> &TargetId;

    async fn evaluate(&self, script: Script) -> Result<Value, TargetError>;
}

pub type TargetHandle = Arc<dyn ScriptTarget>;

/// Looks up the page the panel is currently pointed at.
pub trait TargetResolver: Send + Sync {
    fn resolve(&self) -> Option<TargetHandle>;
}

/// Resolver for a fixed target, mainly for callers without a panel.
pub struct FixedTarget(pub Option<TargetHandle>);

impl TargetResolver for FixedTarget {
    fn resolve(&self) -> Option<TargetHandle> {
        self.0.clone()
    }
}
