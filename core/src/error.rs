use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("Invalid state: {what}")]
    InvalidState { what: String },

    #[error("Updatable '{updatable}' failed during update: {source}")]
    UpdateFault {
        updatable: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Scheduler is already running")]
    SchedulerAlreadyRunning,

    #[error("Scheduler thread panicked")]
    SchedulerPanicked,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument { what: what.into() }
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        Self::InvalidState { what: what.into() }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
