use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline has already been started
    #[error("Pipeline has already been started")]
    AlreadyStarted,

    /// Malformed topology; the pipeline never starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure raised by a plugin unit
    #[error("Plugin failure: {0}")]
    Plugin(String),

    /// Failure raised by a teardown hook during shutdown
    #[error("Teardown failure: {0}")]
    Teardown(String),

    /// A worker thread panicked
    #[error("Worker thread panicked: {0}")]
    ThreadPanic(String),
}
