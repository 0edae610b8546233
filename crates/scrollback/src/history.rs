use futures::future::LocalBoxFuture;
use snafu::Snafu;

use crate::message::Message;

/// One page of older messages, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

impl HistoryPage {
    pub fn new(messages: Vec<Message>, has_more: bool) -> Self {
        Self { messages, has_more }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HistoryError {
    #[snafu(display("history provider rejected the request on `{stage}`: {reason}"))]
    FetchRejected { stage: &'static str, reason: String },
}

impl HistoryError {
    /// Human-readable reason suitable for user-facing display.
    pub fn reason(&self) -> &str {
        match self {
            Self::FetchRejected { reason, .. } => reason,
        }
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Source of older messages; it tracks its own paging cursor.
pub trait HistoryProvider {
    fn fetch_older(&self) -> LocalBoxFuture<'_, HistoryResult<HistoryPage>>;
}
