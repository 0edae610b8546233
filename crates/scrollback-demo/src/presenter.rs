use scrollback::{Message, MessagePresenter, PresentProps};

/// Renders each row as one line of plain text.
#[derive(Debug, Default)]
pub struct TextPresenter;

impl TextPresenter {
    fn author(message: &Message, props: &PresentProps) -> String {
        if props.is_mine == Some(true) {
            return "you".to_string();
        }
        message
            .sender
            .as_ref()
            .map(|sender| sender.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn stamp(message: &Message) -> String {
        message
            .timestamp
            .map(|timestamp| timestamp.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string())
    }
}

impl MessagePresenter for TextPresenter {
    type Output = String;

    fn system(&self, message: &Message, _props: &PresentProps) -> String {
        format!("{} -- {} --", Self::stamp(message), message.content)
    }

    fn file(&self, message: &Message, props: &PresentProps) -> String {
        let attachment = message
            .file
            .as_ref()
            .map(|file| format!("{} ({} bytes)", file.name, file.size_bytes))
            .unwrap_or_else(|| "missing attachment".to_string());
        format!(
            "{} {}: [file] {attachment}",
            Self::stamp(message),
            Self::author(message, props)
        )
    }

    fn ai(&self, message: &Message, props: &PresentProps) -> String {
        let cursor = if props.is_streaming == Some(true) { "▍" } else { "" };
        format!("{} assistant: {}{cursor}", Self::stamp(message), message.content)
    }

    fn user(&self, message: &Message, props: &PresentProps) -> String {
        let mut line = format!(
            "{} {}: {}",
            Self::stamp(message),
            Self::author(message, props),
            message.content
        );
        for (emoji, users) in &message.reactions {
            line.push_str(&format!(" {emoji}x{}", users.len()));
        }
        line
    }
}
