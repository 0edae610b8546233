use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{IdError, IdResult, InvalidIdSnafu};

const OBJECT_ID_LEN: usize = 12;

/// Wire forms an identifier may take: UUIDs minted locally, or the 12-byte
/// object ids a document store hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ChatIdRepr {
    Uuid(Uuid),
    Object([u8; OBJECT_ID_LEN]),
}

impl ChatIdRepr {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == OBJECT_ID_LEN * 2 && raw.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            let mut bytes = [0u8; OBJECT_ID_LEN];
            for (index, byte) in bytes.iter_mut().enumerate() {
                *byte = u8::from_str_radix(&raw[index * 2..index * 2 + 2], 16).ok()?;
            }
            return Some(Self::Object(bytes));
        }
        Uuid::parse_str(raw).ok().map(Self::Uuid)
    }
}

impl fmt::Display for ChatIdRepr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(formatter, "{uuid}"),
            Self::Object(bytes) => bytes
                .iter()
                .try_for_each(|byte| write!(formatter, "{byte:02x}")),
        }
    }
}

// All chat identifiers share one shape so wire decoding and cache keys stay uniform.
macro_rules! define_chat_id {
    ($name:ident, $id_type:literal) => {
        /// Opaque identifier; compared and hashed, never interpreted.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(ChatIdRepr);

        impl $name {
            pub const fn new(raw: Uuid) -> Self {
                Self(ChatIdRepr::Uuid(raw))
            }

            pub fn new_v7() -> Self {
                Self::new(Uuid::now_v7())
            }

            pub fn parse(raw: &str) -> IdResult<Self> {
                match ChatIdRepr::parse(raw) {
                    Some(repr) => Ok(Self(repr)),
                    None => InvalidIdSnafu {
                        stage: "parse-chat-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                    .fail(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, formatter)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Self::parse(raw)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(de::Error::custom)
            }
        }
    };
}

define_chat_id!(MessageId, "message_id");
define_chat_id!(UserId, "user_id");

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn uuid_and_object_ids_roundtrip_through_text() {
        let minted = MessageId::new_v7();
        assert_eq!(minted.to_string().parse::<MessageId>().unwrap(), minted);

        let stored = "65f1c2a9e4b0a1b2c3d4e5f6";
        let parsed: UserId = stored.parse().unwrap();
        assert_eq!(parsed.to_string(), stored);
        assert_eq!(
            serde_json::to_string(&parsed).unwrap(),
            format!(r#""{stored}""#)
        );
        assert_ne!(parsed, "65f1c2a9e4b0a1b2c3d4e5f7".parse::<UserId>().unwrap());
    }

    #[test]
    fn malformed_ids_report_type_and_input() {
        let error = "not-an-id".parse::<UserId>().unwrap_err();
        assert!(matches!(
            &error,
            IdError::InvalidId {
                id_type: "user_id",
                raw,
                ..
            } if raw == "not-an-id"
        ));

        let decoded = serde_json::from_str::<MessageId>(r#""65f1c2a9""#);
        assert!(decoded.is_err());
    }
}
