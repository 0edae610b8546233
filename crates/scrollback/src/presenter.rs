use crate::ids::UserId;
use crate::message::{Message, MessageKind};

/// Per-row inputs shared by every presentation.
///
/// Everything here derives from the message and the session user, so a cached
/// render stays valid for as long as its cache key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentProps {
    pub current_user: Option<UserId>,
    /// `None` for system messages, which have no owner.
    pub is_mine: Option<bool>,
    /// Only set for AI messages.
    pub is_streaming: Option<bool>,
}

impl PresentProps {
    pub fn for_message(message: &Message, current_user: Option<UserId>) -> Self {
        let is_mine = (message.kind != MessageKind::System).then(|| message.is_from(current_user));
        let is_streaming = (message.kind == MessageKind::Ai).then_some(message.is_streaming);
        Self {
            current_user,
            is_mine,
            is_streaming,
        }
    }
}

/// Presentation layer keyed by message kind.
pub trait MessagePresenter {
    type Output;

    fn system(&self, message: &Message, props: &PresentProps) -> Self::Output;
    fn file(&self, message: &Message, props: &PresentProps) -> Self::Output;
    fn ai(&self, message: &Message, props: &PresentProps) -> Self::Output;
    fn user(&self, message: &Message, props: &PresentProps) -> Self::Output;

    fn present(&self, message: &Message, props: &PresentProps) -> Self::Output {
        match message.kind {
            MessageKind::System => self.system(message, props),
            MessageKind::File => self.file(message, props),
            MessageKind::Ai => self.ai(message, props),
            MessageKind::User => self.user(message, props),
        }
    }
}
