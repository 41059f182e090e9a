use std::time::Duration;
use thiserror::Error as ThisError;

/// Errors raised by the matrix controller and its transport.
#[derive(ThisError, Debug)]
pub enum MatrixError {
    /// Opening (or re-opening) the connection to the matrix failed.
    #[error("Failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    /// A single command exchange failed. Contained to one entity/operation.
    #[error("Command {command:?} failed: {reason}")]
    Command { command: String, reason: String },

    /// An output or input number outside 1..=8 was passed in.
    #[error("{kind} {value} is outside 1..={max}")]
    InvalidArgument {
        kind: &'static str,
        value: i32,
        max: u8,
    },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl MatrixError {
    pub fn command(command: &str, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timeout(command: &str, after: Duration) -> Self {
        Self::command(command, format!("timed out after {:?}", after))
    }

    pub fn is_command_error(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}

pub type Result<T> = std::result::Result<T, MatrixError>;

/// Lifecycle errors from setting up or tearing down a config entry.
#[derive(ThisError, Debug)]
pub enum SetupError {
    /// The first connect attempt failed; the runtime should retry later.
    #[error("Entry {entry_id} not ready: {source}")]
    NotReady {
        entry_id: String,
        #[source]
        source: MatrixError,
    },

    #[error("Entry {0} is already set up")]
    AlreadyLoaded(String),

    #[error("Unknown entry: {0}")]
    UnknownEntry(String),
}

/// Errors surfaced on the configuration form.
#[derive(ThisError, Debug)]
pub enum ConfigFlowError {
    /// Shown to the user as "cannot connect".
    #[error("cannot_connect: {0}")]
    CannotConnect(#[source] MatrixError),

    #[error("Host must not be empty")]
    InvalidHost,

    #[error("Device {0} is already configured")]
    AlreadyConfigured(String),
}

impl ConfigFlowError {
    /// Error key shown on the form, matching the host UI's translation keys.
    pub fn form_key(&self) -> &'static str {
        match self {
            Self::CannotConnect(_) => "cannot_connect",
            Self::InvalidHost => "invalid_host",
            Self::AlreadyConfigured(_) => "already_configured",
        }
    }
}
