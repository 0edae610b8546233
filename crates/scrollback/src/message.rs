use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{MessageId, UserId};

/// Presentation family of a message; unknown wire kinds render as user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    File,
    Ai,
    #[default]
    #[serde(other)]
    User,
}

/// Author of a message. Decodes from `{"id": ..}`, `{"_id": ..}` or a bare id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireSender")]
pub struct Sender {
    pub id: UserId,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireSender {
    Bare(UserId),
    Record {
        #[serde(alias = "_id")]
        id: UserId,
        #[serde(default)]
        name: String,
    },
}

impl From<WireSender> for Sender {
    fn from(wire: WireSender) -> Self {
        match wire {
            WireSender::Bare(id) => Self::new(id, String::new()),
            WireSender::Record { id, name } => Self::new(id, name),
        }
    }
}

impl Sender {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// One chat entry as delivered by the message store or the streaming channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: MessageId,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub file: Option<FileAttachment>,
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<UserId>>,
    #[serde(default)]
    pub readers: Vec<UserId>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    pub fn new(id: MessageId, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id,
            timestamp: None,
            sender: None,
            kind,
            content: content.into(),
            file: None,
            reactions: BTreeMap::new(),
            readers: Vec::new(),
            is_streaming: false,
        }
    }

    pub fn user(sender: Sender, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageId::new_v7(), MessageKind::User, content)
            .with_sender(sender)
            .with_timestamp(timestamp)
    }

    pub fn system(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageId::new_v7(), MessageKind::System, content).with_timestamp(timestamp)
    }

    /// Creates an empty AI placeholder that grows while its stream is open.
    pub fn ai_streaming(id: MessageId, timestamp: DateTime<Utc>) -> Self {
        let mut message = Self::new(id, MessageKind::Ai, String::new()).with_timestamp(timestamp);
        message.is_streaming = true;
        message
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.kind = MessageKind::File;
        self.file = Some(file);
        self
    }

    /// Returns true when the message was sent by `user`.
    pub fn is_from(&self, user: Option<UserId>) -> bool {
        match (&self.sender, user) {
            (Some(sender), Some(user)) => sender.id == user,
            _ => false,
        }
    }

    /// Adds `user` to the reaction list of `emoji`; returns false if already present.
    pub fn add_reaction(&mut self, emoji: impl Into<String>, user: UserId) -> bool {
        let users = self.reactions.entry(emoji.into()).or_default();
        if users.contains(&user) {
            return false;
        }
        users.push(user);
        true
    }

    pub fn remove_reaction(&mut self, emoji: &str, user: UserId) -> bool {
        let Some(users) = self.reactions.get_mut(emoji) else {
            return false;
        };
        let before = users.len();
        users.retain(|existing| *existing != user);
        let removed = users.len() != before;
        if users.is_empty() {
            self.reactions.remove(emoji);
        }
        removed
    }

    pub fn mark_read(&mut self, user: UserId) -> bool {
        if self.readers.contains(&user) {
            return false;
        }
        self.readers.push(user);
        true
    }

    /// Hash over everything a presenter can show besides id and timestamp.
    pub fn render_revision(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        self.sender.hash(&mut hasher);
        hasher.write(self.content.as_bytes());
        self.file.hash(&mut hasher);
        self.reactions.hash(&mut hasher);
        self.readers.hash(&mut hasher);
        hasher.write_u8(u8::from(self.is_streaming));
        hasher.finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
    Other(IgnoredAny),
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<RawTimestamp>::deserialize(deserializer)? {
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc)),
        Some(RawTimestamp::Millis(millis)) => DateTime::from_timestamp_millis(millis),
        Some(RawTimestamp::Other(_)) | None => None,
    };
    Ok(parsed)
}

/// In-progress messages keyed by message id, kept in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingMessageSet {
    entries: IndexMap<MessageId, Message>,
}

impl StreamingMessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens or replaces the entry for `message.id`.
    pub fn begin(&mut self, mut message: Message) {
        message.is_streaming = true;
        self.entries.insert(message.id, message);
    }

    pub fn append_chunk(&mut self, id: MessageId, chunk: &str) -> bool {
        match self.entries.get_mut(&id) {
            Some(message) => {
                message.content.push_str(chunk);
                true
            }
            None => false,
        }
    }

    /// Removes the entry and returns it as an ordinary, finished message.
    pub fn finalize(&mut self, id: MessageId) -> Option<Message> {
        let mut message = self.entries.shift_remove(&id)?;
        message.is_streaming = false;
        Some(message)
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        self.entries.shift_remove(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.entries.get(&id)
    }

    pub fn values(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|(_, message)| message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Message> for StreamingMessageSet {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        let mut set = Self::new();
        for message in iter {
            set.begin(message);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn wire_messages_tolerate_malformed_timestamps_and_unknown_kinds() {
        let id = MessageId::new_v7();
        let payloads = [
            (r#""2024-03-01T10:00:00Z""#, true),
            ("1709287200000", true),
            (r#""yesterday-ish""#, false),
            ("null", false),
            (r#"{"nested": true}"#, false),
        ];

        for (raw_timestamp, expect_valid) in payloads {
            let json = format!(
                r#"{{"id":"{id}","timestamp":{raw_timestamp},"type":"sticker","content":"hi"}}"#
            );
            let message: Message = serde_json::from_str(&json).expect("message decodes");
            assert_eq!(message.timestamp.is_some(), expect_valid, "{raw_timestamp}");
            assert_eq!(message.kind, MessageKind::User);
        }

        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single();
        let message: Message =
            serde_json::from_str(&format!(r#"{{"id":"{id}","timestamp":1709287200000}}"#))
                .expect("message decodes");
        assert_eq!(message.timestamp, expected);
    }

    #[test]
    fn document_store_payloads_decode_with_every_sender_shape() {
        let alice: UserId = "65f1c2a9e4b0a1b2c3d4e5f7".parse().unwrap();
        let senders = [
            r#"{"_id":"65f1c2a9e4b0a1b2c3d4e5f7","name":"alice"}"#,
            r#"{"id":"65f1c2a9e4b0a1b2c3d4e5f7","name":"alice"}"#,
            r#""65f1c2a9e4b0a1b2c3d4e5f7""#,
        ];

        for sender in senders {
            let json = format!(
                r#"{{"_id":"65f1c2a9e4b0a1b2c3d4e5f6","type":"text","content":"hi","sender":{sender},"timestamp":"2024-03-01T10:00:00.000Z"}}"#
            );
            let message: Message = serde_json::from_str(&json).expect("message decodes");

            assert_eq!(message.id.to_string(), "65f1c2a9e4b0a1b2c3d4e5f6");
            assert_eq!(message.kind, MessageKind::User);
            assert!(message.timestamp.is_some());
            assert!(message.is_from(Some(alice)), "{sender}");
        }

        let named: Message = serde_json::from_str(
            r#"{"_id":"65f1c2a9e4b0a1b2c3d4e5f6","sender":{"_id":"65f1c2a9e4b0a1b2c3d4e5f7","name":"alice"}}"#,
        )
        .expect("message decodes");
        assert_eq!(named.sender.map(|sender| sender.name).as_deref(), Some("alice"));
    }

    #[test]
    fn reactions_and_receipts_change_render_revision() {
        let reader = UserId::new_v7();
        let mut message = Message::new(MessageId::new_v7(), MessageKind::User, "hello");
        let initial = message.render_revision();

        assert!(message.add_reaction("👍", reader));
        assert!(!message.add_reaction("👍", reader));
        let reacted = message.render_revision();
        assert_ne!(initial, reacted);

        assert!(message.mark_read(reader));
        assert_ne!(reacted, message.render_revision());

        assert!(message.remove_reaction("👍", reader));
        assert!(message.reactions.is_empty());
        assert!(!message.remove_reaction("👍", reader));
    }

    #[test]
    fn streaming_set_finalizes_in_place() {
        let now = Utc::now();
        let first = Message::ai_streaming(MessageId::new_v7(), now);
        let second = Message::ai_streaming(MessageId::new_v7(), now);
        let mut set: StreamingMessageSet = [first.clone(), second.clone()].into_iter().collect();

        assert!(set.append_chunk(first.id, "Hel"));
        assert!(set.append_chunk(first.id, "lo"));
        assert!(!set.append_chunk(MessageId::new_v7(), "lost"));
        assert_eq!(set.last().map(|message| message.id), Some(second.id));

        let done = set.finalize(first.id).expect("entry exists");
        assert_eq!(done.content, "Hello");
        assert!(!done.is_streaming);
        assert_eq!(set.len(), 1);
        assert!(set.finalize(first.id).is_none());
    }
}
