//! Per-dispatch execution context

use crate::config::DispatchSettings;
use crate::event::{Channel, EventKind, InboundEvent, Interaction, Member, Message, MessageToSend, User};
use crate::flow::{FlowError, FlowRegistry, FlowScope};
use crate::interface::Interface;
use crate::storage::{ConversationKey, ConversationRecord, DataMap, StepPointer};
use std::sync::Arc;

/// A conversation record loaded for the duration of one dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedRecord {
    /// `None` when the event has no such scope (no channel)
    pub key: Option<ConversationKey>,
    pub record: ConversationRecord,
}

impl ScopedRecord {
    pub fn new(key: ConversationKey, record: ConversationRecord) -> Self {
        Self {
            key: Some(key),
            record,
        }
    }
}

/// Navigation requests understood while a flow is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    GoBack,
    Reload,
}

/// Everything a step can see and touch while handling one event.
///
/// Built by the manager after the conversation locks are taken, dropped
/// when the dispatch ends. Changes to state, data and bucket are persisted
/// only if the dispatch succeeds.
pub struct FlowConnector {
    registry: Arc<FlowRegistry>,
    settings: Arc<DispatchSettings>,
    event: InboundEvent,
    user_record: ScopedRecord,
    channel_record: ScopedRecord,
    active_scope: FlowScope,
    interface: Arc<dyn Interface>,
}

impl FlowConnector {
    pub fn new(
        registry: Arc<FlowRegistry>,
        settings: Arc<DispatchSettings>,
        event: InboundEvent,
        user_record: ScopedRecord,
        channel_record: ScopedRecord,
        interface: Arc<dyn Interface>,
    ) -> Self {
        let mut connector = Self {
            registry,
            settings,
            event,
            user_record,
            channel_record,
            active_scope: FlowScope::User,
            interface,
        };
        connector.active_scope = connector.event_scope();
        connector
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Event accessors
    // ------------------------------------------------------------------

    #[allow(dead_code)] // API completeness
    pub fn event(&self) -> &InboundEvent {
        &self.event
    }

    pub fn event_kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn user(&self) -> &User {
        self.event.user()
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.event.channel()
    }

    pub fn message(&self) -> Option<&Message> {
        match &self.event {
            InboundEvent::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn interaction(&self) -> Option<&Interaction> {
        match &self.event {
            InboundEvent::ButtonClick(i) => Some(i),
            _ => None,
        }
    }

    pub fn interaction_mut(&mut self) -> Option<&mut Interaction> {
        match &mut self.event {
            InboundEvent::ButtonClick(i) => Some(i),
            _ => None,
        }
    }

    #[allow(dead_code)] // API completeness
    pub fn member(&self) -> Option<&Member> {
        match &self.event {
            InboundEvent::MemberJoin(m) | InboundEvent::MemberUpdate { after: m, .. } => Some(m),
            _ => None,
        }
    }

    /// Text of the message being handled
    pub fn response_text(&self) -> Option<&str> {
        self.message().map(|m| m.content.as_str())
    }

    /// `User` for direct conversations and channel-less events, `Channel` otherwise
    pub fn event_scope(&self) -> FlowScope {
        match self.channel() {
            Some(channel) if !channel.is_private() => FlowScope::Channel,
            _ => FlowScope::User,
        }
    }

    pub fn navigation_command(&self) -> Option<Navigation> {
        let text = self.response_text()?.trim();
        if text == self.settings.go_back_command {
            Some(Navigation::GoBack)
        } else if text == self.settings.reload_command {
            Some(Navigation::Reload)
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub fn active_scope(&self) -> FlowScope {
        self.active_scope
    }

    pub fn set_active_scope(&mut self, scope: FlowScope) {
        self.active_scope = scope;
    }

    /// Whether a record exists for `scope` in this event
    pub fn has_scope(&self, scope: FlowScope) -> bool {
        match scope {
            FlowScope::User => true,
            FlowScope::Channel => self.channel_record.key.is_some(),
        }
    }

    /// Record holding `scope`'s progress; channel-less events fall back to the user record
    pub fn scoped(&self, scope: FlowScope) -> &ScopedRecord {
        if scope == FlowScope::Channel && self.channel_record.key.is_some() {
            &self.channel_record
        } else {
            &self.user_record
        }
    }

    pub fn scoped_mut(&mut self, scope: FlowScope) -> &mut ScopedRecord {
        if scope == FlowScope::Channel && self.channel_record.key.is_some() {
            &mut self.channel_record
        } else {
            &mut self.user_record
        }
    }

    pub fn state(&self, scope: FlowScope) -> Option<&StepPointer> {
        self.scoped(scope).record.state.as_ref()
    }

    pub fn set_state(&mut self, scope: FlowScope, state: Option<StepPointer>) {
        self.scoped_mut(scope).record.state = state;
    }

    /// Durable data of the active scope
    pub fn data(&self) -> &DataMap {
        &self.scoped(self.active_scope).record.data
    }

    pub fn data_mut(&mut self) -> &mut DataMap {
        let scope = self.active_scope;
        &mut self.scoped_mut(scope).record.data
    }

    /// Ephemeral bucket of the active scope
    pub fn bucket(&self) -> &DataMap {
        &self.scoped(self.active_scope).record.bucket
    }

    pub fn bucket_mut(&mut self) -> &mut DataMap {
        let scope = self.active_scope;
        &mut self.scoped_mut(scope).record.bucket
    }

    /// Records to persist once the dispatch succeeds
    pub(crate) fn into_records(self) -> Vec<ScopedRecord> {
        [self.user_record, self.channel_record]
            .into_iter()
            .filter(|r| r.key.is_some())
            .collect()
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Send through the interface, addressed to this event's user and channel
    pub async fn send(&self, mut message: MessageToSend) -> Result<(), FlowError> {
        if message.user_id.is_none() {
            message.user_id = Some(self.user().id.clone());
        }
        if message.channel_id.is_none() {
            message.channel_id = self.channel().map(|c| c.id.clone());
        }
        self.interface.send(message).await?;
        Ok(())
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), FlowError> {
        self.send(MessageToSend::text(text)).await
    }

    #[allow(dead_code)] // API completeness
    pub fn interface(&self) -> &Arc<dyn Interface> {
        &self.interface
    }
}
