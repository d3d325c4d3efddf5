use kube::runtime::finalizer;
use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("YamlSerializationError: {0}")]
    YamlSerializationError(#[source] serde_yaml::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidRelationData: {0}")]
    InvalidRelationData(String),

    #[error("RelationNotCreated: {0}")]
    RelationNotCreated(String),

    #[error("ExecError: `{command}` failed: {message}")]
    ExecError { command: String, message: String },

    #[error("ExecTimeout: `{command}` did not finish within {timeout:?}")]
    ExecTimeout { command: String, timeout: Duration },
}

impl StdError {
    pub fn metric_label(&self) -> String {
        let label = match self {
            StdError::JsonSerializationError(_) => "jsonserializationerror",
            StdError::YamlSerializationError(_) => "yamlserializationerror",
            StdError::KubeError(_) => "kubeerror",
            StdError::FinalizerError(_) => "finalizererror",
            StdError::MetadataMissing(_) => "metadatamissing",
            StdError::InvalidRelationData(_) => "invalidrelationdata",
            StdError::RelationNotCreated(_) => "relationnotcreated",
            StdError::ExecError { .. } => "execerror",
            StdError::ExecTimeout { .. } => "exectimeout",
        };
        label.to_string()
    }

    /// Failures of commands run inside the workload container.
    pub fn is_exec_failure(&self) -> bool {
        matches!(self, StdError::ExecError { .. } | StdError::ExecTimeout { .. })
    }
}

#[derive(Error, Debug)]
pub struct ErrorWithRequeue {
    pub duration: Duration,
    pub error: StdError,
}

impl ErrorWithRequeue {
    pub fn new(error: StdError, duration: Duration) -> ErrorWithRequeue {
        ErrorWithRequeue { error, duration }
    }

    pub fn metric_label(&self) -> String {
        self.error.metric_label()
    }
}

impl fmt::Display for ErrorWithRequeue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    #[error("Error With Requeue: {0}")]
    ErrorWithRequeue(#[source] ErrorWithRequeue),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::ErrorWithRequeue(e) => e.metric_label(),
        }
    }

    /// Retries failed workload commands after `duration` instead of the periodic check
    pub fn requeue_exec_failure(self, duration: Duration) -> Error {
        match self {
            Error::StdError(e) if e.is_exec_failure() => Error::ErrorWithRequeue(ErrorWithRequeue::new(e, duration)),
            other => other,
        }
    }

    /// Requeue delay carried by the error, looking through finalizer wrapping
    pub fn requeue_duration(&self) -> Option<Duration> {
        match self {
            Error::ErrorWithRequeue(e) => Some(e.duration),
            Error::StdError(StdError::FinalizerError(e)) => match e.as_ref() {
                finalizer::Error::ApplyFailed(e) | finalizer::Error::CleanupFailed(e) => e.requeue_duration(),
                _ => None,
            },
            Error::StdError(_) => None,
        }
    }
}

impl From<StdError> for Error {
    fn from(error: StdError) -> Self {
        Error::StdError(error)
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        Error::StdError(StdError::KubeError(error))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
