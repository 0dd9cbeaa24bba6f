use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::bson_datetime_as_chrono;

/// A chat between exactly two accounts: a student and their assigned teacher.
/// At most one chat per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub participants: Vec<ObjectId>,
    pub created_by: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, account_id: &ObjectId) -> bool {
        self.participants.contains(account_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub chat_id: ObjectId,
    pub sender_id: ObjectId,
    pub content: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    /// Account ids (hex): either just the other participant, or the full
    /// pair including the caller.
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatOut {
    pub id: String,
    pub participants: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<Chat> for ChatOut {
    fn from(chat: Chat) -> Self {
        ChatOut {
            id: chat.id.map(|id| id.to_hex()).unwrap_or_default(),
            participants: chat.participants.iter().map(|p| p.to_hex()).collect(),
            created_by: chat.created_by.to_hex(),
            created_at: chat.created_at,
        }
    }
}

/// Wire format of a delivered message (REST reads and socket fan-out).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageOut {
    pub id: String,
    pub chat: String,
    pub sender: String,
    pub sender_username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl MessageOut {
    pub fn from_message(message: Message, sender_username: String) -> Self {
        MessageOut {
            id: message.id.map(|id| id.to_hex()).unwrap_or_default(),
            chat: message.chat_id.to_hex(),
            sender: message.sender_id.to_hex(),
            sender_username,
            content: message.content,
            timestamp: message.timestamp,
            read: message.read,
        }
    }
}

/// Inbound socket frame: `{content, chat_id?}`. The chat id is required only
/// in "all" mode where one connection spans several chats.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub content: String,
    pub chat_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_parses_with_and_without_chat_id() {
        let single: InboundFrame = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(single.content, "hi");
        assert!(single.chat_id.is_none());

        let all: InboundFrame =
            serde_json::from_str(r#"{"content":"hi","chat_id":"64b0c0ffee0ddba11ca71e57"}"#)
                .unwrap();
        assert_eq!(all.chat_id.as_deref(), Some("64b0c0ffee0ddba11ca71e57"));
    }

    #[test]
    fn has_participant_checks_membership() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let chat = Chat {
            id: None,
            participants: vec![a, b],
            created_by: a,
            created_at: Utc::now(),
        };
        assert!(chat.has_participant(&a));
        assert!(chat.has_participant(&b));
        assert!(!chat.has_participant(&ObjectId::new()));
    }
}
