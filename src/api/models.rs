use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;

/// Lenient field decoders. WordPress hands back most numeric columns as
/// strings, so the wire types accept numbers, strings and booleans alike.
pub(crate) mod flex {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {n}"))),
            Value::String(s) => s.trim().parse().map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected integer, got {other}"))),
        }
    }

    pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        })
    }

    pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => matches!(s.trim(), "1" | "true" | "yes"),
            _ => false,
        })
    }

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(opt_float(d)?.unwrap_or_default())
    }

    pub fn opt_float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Agent,
    Visitor,
    #[default]
    #[serde(other)]
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Image,
    File,
    #[default]
    #[serde(other)]
    Text,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }
}

/// A chat message as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub conversation_id: String,
    #[serde(default)]
    pub sender_type: SenderType,
    #[serde(default, deserialize_with = "flex::text")]
    pub sender_id: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub message: String,
    #[serde(default, alias = "type")]
    pub message_type: MessageKind,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default, deserialize_with = "flex::boolean")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "flex::text")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default, deserialize_with = "flex::text")]
    pub agent_id: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub name: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub email: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Away,
    Offline,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 4] = [
        AgentStatus::Online,
        AgentStatus::Busy,
        AgentStatus::Away,
        AgentStatus::Offline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Busy => "busy",
            AgentStatus::Away => "away",
            AgentStatus::Offline => "offline",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentStatus::Online => "Online",
            AgentStatus::Busy => "Busy",
            AgentStatus::Away => "Away",
            AgentStatus::Offline => "Offline",
        }
    }
}

/// Entry of the agent pickers used by conversation transfer. The two
/// endpoints disagree on whether the key is `id` or `agent_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    #[serde(default, deserialize_with = "flex::text")]
    pub id: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub agent_id: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub name: String,
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

impl AgentSummary {
    pub fn key(&self) -> &str {
        if self.id.is_empty() { &self.agent_id } else { &self.id }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(deserialize_with = "flex::text")]
    pub id: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub visitor_name: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub visitor_email: String,
    #[serde(default)]
    pub visitor_phone: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    pub agent_id: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub status: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub last_message: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub last_message_at: String,
    #[serde(default, deserialize_with = "flex::opt_int")]
    pub unread_count: Option<u64>,
    #[serde(default, deserialize_with = "flex::text")]
    pub created_at: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub updated_at: String,
}

impl Conversation {
    pub fn title(&self) -> &str {
        if self.visitor_name.trim().is_empty() { "Visitor" } else { &self.visitor_name }
    }

    pub fn preview(&self) -> &str {
        if self.last_message.trim().is_empty() { "No messages yet" } else { &self.last_message }
    }

    /// Timestamp the list is sorted and labelled by.
    pub fn activity_at(&self) -> &str {
        if self.last_message_at.is_empty() { &self.created_at } else { &self.last_message_at }
    }

    pub fn unread(&self) -> u64 {
        self.unread_count.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    #[serde(default, deserialize_with = "flex::int")]
    pub page: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub limit: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub total: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub total_pages: u64,
}

impl Pagination {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// One page of a conversation's history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<ServerMessage>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferRecord {
    #[serde(default, deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub from_agent_name: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub to_agent_name: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferReceipt {
    #[serde(default, deserialize_with = "flex::text")]
    pub to_agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Notification {
    #[serde(default, deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, rename = "type", deserialize_with = "flex::text")]
    pub kind: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub title: String,
    #[serde(default, alias = "message", deserialize_with = "flex::text")]
    pub content: String,
    #[serde(default, deserialize_with = "flex::boolean")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "flex::text")]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Presence {
    pub online: bool,
    #[serde(default, rename = "lastSeen")]
    pub last_seen: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactPresence {
    #[serde(deserialize_with = "flex::text")]
    pub id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default, rename = "lastSeen")]
    pub last_seen: Option<i64>,
}

impl ContactPresence {
    /// Ids of the contacts currently online.
    pub fn online_ids(contacts: &[ContactPresence]) -> HashSet<String> {
        contacts.iter().filter(|c| c.online).map(|c| c.id.clone()).collect()
    }
}

/// The `message` key is a human readable string on failures and the stored
/// message on a successful send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeMessage {
    Sent(ServerMessage),
    Text(String),
    Other(Value),
}

/// Response wrapper shared by every `/agent/*` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "flex::boolean")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<EnvelopeMessage>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub agent: Option<Agent>,
    #[serde(default)]
    pub conversations: Option<Vec<Conversation>>,
    #[serde(default)]
    pub messages: Option<Vec<ServerMessage>>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Envelope {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Turn `success: false` into [`ApiError::Rejected`].
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.success {
            Ok(self)
        } else {
            Err(ApiError::Rejected(self.error_text().unwrap_or_default()))
        }
    }

    pub fn error_text(&self) -> Option<String> {
        match &self.message {
            Some(EnvelopeMessage::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn sent_message(&self) -> Option<&ServerMessage> {
        match &self.message {
            Some(EnvelopeMessage::Sent(msg)) => Some(msg),
            _ => None,
        }
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let data = self.data.clone().ok_or(ApiError::MissingField("data"))?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn into_page(self) -> MessagePage {
        MessagePage {
            messages: self.messages.unwrap_or_default(),
            pagination: self.pagination,
        }
    }
}
