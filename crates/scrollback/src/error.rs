use snafu::Snafu;

use crate::history::HistoryError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ControllerError {
    #[snafu(display("failed to load older history on `{stage}`: {source}"))]
    FetchFailed {
        stage: &'static str,
        source: HistoryError,
    },
}

impl ControllerError {
    /// Reason suitable for the chat surface's error banner.
    pub fn user_message(&self) -> &str {
        match self {
            Self::FetchFailed { source, .. } => source.reason(),
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IdError {
    #[snafu(display("invalid {id_type} `{raw}` on `{stage}`"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
}

pub type IdResult<T> = Result<T, IdError>;
