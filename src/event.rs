//! Inbound events and outbound payloads
//!
//! Ids arrive as strings or as integers depending on the transport; both are
//! normalized to strings.

use crate::buttons::Button;
use crate::flow::FlowError;
use crate::storage::DataMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Unsigned(n) => n.to_string(),
        RawId::Signed(n) => n.to_string(),
    })
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Identities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            bot: false,
        }
    }
}

/// Channel type as reported by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Direct conversation between the bot and one user
    Private,
    #[default]
    Text,
    Group,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
}

impl Channel {
    pub fn new(id: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind == ChannelKind::Private
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// A text message from a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(alias = "text")]
    pub content: String,
    pub author: User,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(author: User, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            author,
            channel: None,
            created_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub fn in_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// A button click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(default = "new_id", deserialize_with = "id_string")]
    pub id: String,
    pub custom_id: String,
    pub user: User,
    #[serde(default)]
    pub channel: Option<Channel>,
    /// Payload attached by the client or merged in by data buttons
    #[serde(default)]
    pub data: DataMap,
}

impl Interaction {
    pub fn new(user: User, custom_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            custom_id: custom_id.into(),
            user,
            channel: None,
            data: DataMap::new(),
        }
    }

    #[must_use]
    pub fn in_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// Membership of a user in a guild/workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Where greetings for this member should go
    #[serde(default)]
    pub channel: Option<Channel>,
}

// ============================================================================
// Inbound events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    ButtonClick,
    MemberJoin,
    MemberUpdate,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ButtonClick => "button_click",
            Self::MemberJoin => "member_join",
            Self::MemberUpdate => "member_update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the dispatcher can receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(Message),
    ButtonClick(Interaction),
    MemberJoin(Member),
    MemberUpdate { before: Member, after: Member },
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::ButtonClick(_) => EventKind::ButtonClick,
            Self::MemberJoin(_) => EventKind::MemberJoin,
            Self::MemberUpdate { .. } => EventKind::MemberUpdate,
        }
    }

    /// The user the event is about
    pub fn user(&self) -> &User {
        match self {
            Self::Message(m) => &m.author,
            Self::ButtonClick(i) => &i.user,
            Self::MemberJoin(m) | Self::MemberUpdate { after: m, .. } => &m.user,
        }
    }

    pub fn channel(&self) -> Option<&Channel> {
        match self {
            Self::Message(m) => m.channel.as_ref(),
            Self::ButtonClick(i) => i.channel.as_ref(),
            Self::MemberJoin(m) | Self::MemberUpdate { after: m, .. } => m.channel.as_ref(),
        }
    }

    /// Reject events that cannot be addressed
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.user().id.trim().is_empty() {
            return Err(FlowError::Validation("event has an empty user id".into()));
        }
        if self.channel().is_some_and(|c| c.id.trim().is_empty()) {
            return Err(FlowError::Validation("event has an empty channel id".into()));
        }
        if let Self::ButtonClick(interaction) = self {
            if interaction.custom_id.is_empty() {
                return Err(FlowError::Validation(
                    "button click has an empty custom_id".into(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// A message produced by a flow step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToSend {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl MessageToSend {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            buttons: Vec::new(),
            channel_id: None,
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }
}
