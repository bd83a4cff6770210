use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("{call} request failed: {message}")]
    Transport { call: String, message: String },

    #[error("unexpected response for {context}: {message}")]
    Protocol { context: String, message: String },

    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("session expired again after re-authentication (department {department_id})")]
    SessionExpired { department_id: String },

    #[error("session cache error at {}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PollError {
    pub fn transport(call: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            call: call.into(),
            message: message.to_string(),
        }
    }

    pub fn protocol(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Protocol {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    pub fn cache(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Cache {
            path: path.into(),
            source,
        }
    }
}

pub type PollResult<T> = Result<T, PollError>;
