//! Per-conversation persistence
//!
//! A conversation record holds the step pointer of the flow that is waiting
//! for input, a durable `data` map and an ephemeral `bucket` map. Records are
//! addressed by a (chat, user) pair with a default-fill rule: when only one
//! half is supplied the other takes the same value.

mod memory;

#[cfg(test)]
mod proptests;

pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// String-keyed JSON map used for `data`, `bucket` and button payloads
pub type DataMap = Map<String, Value>;

/// Storage-layer errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Neither a chat id nor a user id was supplied
    #[error("conversation address requires a chat id or a user id")]
    Address,
    #[allow(dead_code)] // for non-memory backends
    #[error("storage backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Addressing
// ============================================================================

/// Fully resolved conversation key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub chat: String,
    pub user: String,
}

impl ConversationKey {
    /// Key of a user's private record (chat == user)
    pub fn user(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            chat: id.clone(),
            user: id,
        }
    }

    /// Key of a channel's shared record (user == chat)
    pub fn chat(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            user: id.clone(),
            chat: id,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.user)
    }
}

/// Partially specified address, resolved with the default-fill rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    chat: Option<String>,
    user: Option<String>,
}

impl Address {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn chat(mut self, id: impl Into<String>) -> Self {
        self.chat = Some(id.into());
        self
    }

    #[must_use]
    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user = Some(id.into());
        self
    }

    pub fn resolve(&self) -> Result<ConversationKey, StoreError> {
        resolve_address(self.chat.as_deref(), self.user.as_deref())
    }
}

impl From<&ConversationKey> for Address {
    fn from(key: &ConversationKey) -> Self {
        Self {
            chat: Some(key.chat.clone()),
            user: Some(key.user.clone()),
        }
    }
}

/// Apply the default-fill rule to a (chat, user) pair.
pub fn resolve_address(chat: Option<&str>, user: Option<&str>) -> Result<ConversationKey, StoreError> {
    match (chat, user) {
        (Some(chat), Some(user)) => Ok(ConversationKey {
            chat: chat.to_string(),
            user: user.to_string(),
        }),
        (Some(chat), None) => Ok(ConversationKey::chat(chat)),
        (None, Some(user)) => Ok(ConversationKey::user(user)),
        (None, None) => Err(StoreError::Address),
    }
}

// ============================================================================
// Records
// ============================================================================

/// Resumable position inside a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepPointer {
    pub flow: String,
    pub step: String,
}

impl StepPointer {
    pub fn new(flow: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            step: step.into(),
        }
    }
}

impl fmt::Display for StepPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.flow, self.step)
    }
}

/// Everything persisted for one conversation key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub state: Option<StepPointer>,
    #[serde(default)]
    pub data: DataMap,
    #[serde(default)]
    pub bucket: DataMap,
}

impl ConversationRecord {
    /// An empty record is equivalent to no record at all
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.data.is_empty() && self.bucket.is_empty()
    }
}

// ============================================================================
// Store contract
// ============================================================================

/// Keyed persistence of conversation records.
///
/// Reads hand out independent copies; mutating a returned map never affects
/// the stored record. Backends must prune records that become empty.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_state(&self, address: &Address) -> Result<Option<StepPointer>, StoreError>;

    async fn set_state(
        &self,
        address: &Address,
        state: Option<StepPointer>,
    ) -> Result<(), StoreError>;

    async fn get_data(&self, address: &Address) -> Result<DataMap, StoreError>;

    async fn set_data(&self, address: &Address, data: DataMap) -> Result<(), StoreError>;

    /// Shallow merge of `patch` into the stored data
    async fn update_data(&self, address: &Address, patch: DataMap) -> Result<(), StoreError>;

    async fn get_bucket(&self, address: &Address) -> Result<DataMap, StoreError>;

    async fn set_bucket(&self, address: &Address, bucket: DataMap) -> Result<(), StoreError>;

    /// Shallow merge of `patch` into the stored bucket
    async fn update_bucket(&self, address: &Address, patch: DataMap) -> Result<(), StoreError>;

    /// Clear the step pointer, and the data map too when `with_data` is set
    async fn reset_state(&self, address: &Address, with_data: bool) -> Result<(), StoreError>;

    /// Release backend resources
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_record(&self, address: &Address) -> Result<ConversationRecord, StoreError> {
        Ok(ConversationRecord {
            state: self.get_state(address).await?,
            data: self.get_data(address).await?,
            bucket: self.get_bucket(address).await?,
        })
    }

    async fn save_record(
        &self,
        address: &Address,
        record: ConversationRecord,
    ) -> Result<(), StoreError> {
        self.set_state(address, record.state).await?;
        self.set_data(address, record.data).await?;
        self.set_bucket(address, record.bucket).await
    }
}
