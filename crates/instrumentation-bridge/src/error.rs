use thiserror::Error;

use crate::target::TargetError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("no active target")]
    NoTarget,
    #[error("execution failed: {message}")]
    Execution {
        message: String,
        stack: Option<String>,
    },
    #[error("decode failed: {0}")]
    Decode(String),
}

impl BridgeError {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NoTarget => "no_target",
            BridgeError::Execution { .. } => "execution",
            BridgeError::Decode(_) => "decode",
        }
    }
}

impl From<TargetError> for BridgeError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::Exception { message, stack } => BridgeError::Execution { message, stack },
            TargetError::Transport(message) => BridgeError::Execution {
                message: format!("transport: {message}"),
                stack: None,
            },
        }
    }
}
